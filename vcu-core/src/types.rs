//! Core types for the vehicle control core
//!
//! This module defines the fundamental types shared by every device: the bus
//! frame, the strongly-typed device identifier used by the fault table, and
//! the library error type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used for fault history records
pub type Timestamp = DateTime<Utc>;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, VcuError>;

/// Maximum payload of a classic CAN frame
pub const MAX_FRAME_LEN: usize = 8;

/// A classic CAN frame as sent to or received from the bus transport
///
/// The payload is always eight bytes wide. Bytes past `length` are zero
/// for frames built by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    /// CAN message ID (11-bit or 29-bit)
    pub id: u32,
    /// True if this is an extended (29-bit) CAN ID
    pub extended: bool,
    /// Data length code (0-8)
    pub length: u8,
    /// Frame data bytes
    pub data: [u8; MAX_FRAME_LEN],
}

impl CanFrame {
    /// Create a frame with an all-zero payload
    pub fn new(id: u32, extended: bool, length: u8) -> Self {
        Self {
            id,
            extended,
            length: length.min(MAX_FRAME_LEN as u8),
            data: [0; MAX_FRAME_LEN],
        }
    }

    /// Create a standard (11-bit) frame with an all-zero payload
    pub fn standard(id: u32, length: u8) -> Self {
        Self::new(id, false, length)
    }

    /// Create a frame from raw bytes, truncating anything past eight bytes
    pub fn from_bytes(id: u32, extended: bool, bytes: &[u8]) -> Self {
        let len = bytes.len().min(MAX_FRAME_LEN);
        let mut frame = Self::new(id, extended, len as u8);
        frame.data[..len].copy_from_slice(&bytes[..len]);
        frame
    }

    /// The valid part of the payload
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.length as usize]
    }

    /// Fail with [`VcuError::FrameTooShort`] unless at least `needed` bytes are present
    pub fn require_len(&self, needed: usize) -> Result<()> {
        if (self.length as usize) < needed {
            return Err(VcuError::FrameTooShort {
                id: self.id,
                expected: needed,
                actual: self.length as usize,
            });
        }
        Ok(())
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}{} [", self.id, if self.extended { "x" } else { "" })?;
        for (i, b) in self.payload().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        write!(f, "]")
    }
}

/// Broad category a device belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Throttle,
    Brake,
    MotorController,
}

/// Identity of every device that can own faults or preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceId {
    PotAccelerator,
    CanAccelerator,
    TestAccelerator,
    PotBrake,
    CanBrake,
    TestBrake,
    Dmoc645,
    CkInverter,
    TestInverter,
}

impl DeviceId {
    /// Numeric identifier, also used as the preference-store namespace
    pub fn code(&self) -> u16 {
        match self {
            DeviceId::Dmoc645 => 0x1000,
            DeviceId::CkInverter => 0x1007,
            DeviceId::TestAccelerator => 0x100E,
            DeviceId::TestInverter => 0x100F,
            DeviceId::PotAccelerator => 0x1031,
            DeviceId::PotBrake => 0x1032,
            DeviceId::CanAccelerator => 0x1033,
            DeviceId::CanBrake => 0x1034,
            DeviceId::TestBrake => 0x1035,
        }
    }

    /// Device category
    pub fn kind(&self) -> DeviceKind {
        match self {
            DeviceId::PotAccelerator | DeviceId::CanAccelerator | DeviceId::TestAccelerator => {
                DeviceKind::Throttle
            }
            DeviceId::PotBrake | DeviceId::CanBrake | DeviceId::TestBrake => DeviceKind::Brake,
            DeviceId::Dmoc645 | DeviceId::CkInverter | DeviceId::TestInverter => {
                DeviceKind::MotorController
            }
        }
    }

    /// Human readable device name
    pub fn name(&self) -> &'static str {
        match self {
            DeviceId::PotAccelerator => "Potentiometer (analog) accelerator",
            DeviceId::CanAccelerator => "CANBus accelerator",
            DeviceId::TestAccelerator => "Test/Debug accelerator",
            DeviceId::PotBrake => "Potentiometer (analog) brake",
            DeviceId::CanBrake => "CANBus brake",
            DeviceId::TestBrake => "Test/Debug brake",
            DeviceId::Dmoc645 => "DMOC645 Inverter",
            DeviceId::CkInverter => "CK Inverter Ctrl Board",
            DeviceId::TestInverter => "Test Inverter",
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:X})", self.name(), self.code())
    }
}

/// Errors that can occur in the control core
#[derive(Debug, thiserror::Error)]
pub enum VcuError {
    #[error("Unknown configuration entry: {0}")]
    UnknownConfigEntry(String),

    #[error("Value {value} for {name} is outside [{min}, {max}]")]
    ValueOutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Device not registered: {0}")]
    UnknownDevice(DeviceId),

    #[error("Frame 0x{id:X} too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        id: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
