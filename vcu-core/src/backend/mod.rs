//! Inverter backends
//!
//! This module contains the command encoders and status decoders for the
//! supported inverters. Each backend implements [`InverterBackend`]; the
//! [`MotorBackend`] enum selects one from configuration.

use crate::arbiter::MotorCommand;
use crate::bus::BusFilter;
use crate::telemetry::{TelemetrySnapshot, TelemetryUpdate};
use crate::types::{CanFrame, DeviceId, Result, VcuError};

pub mod ck;
pub mod crc;
pub mod dmoc;
pub mod simulator;

// Re-export backend types
pub use ck::CkInverter;
pub use crc::crc8;
pub use dmoc::Dmoc645;
pub use simulator::SimulatedInverter;

/// Common trait for all inverter protocols
pub trait InverterBackend {
    fn device(&self) -> DeviceId;

    /// Tick interval the inverter expects commands at
    fn tick_interval_us(&self) -> u64;

    /// Receive filters as `(id, mask)` pairs for standard-id frames
    fn filters(&self) -> Vec<(u32, u32)>;

    /// Build this tick's command frames
    ///
    /// `telemetry` is the last known inverter state, needed by protocols that
    /// sequence state changes.
    fn encode(&mut self, cmd: &MotorCommand, telemetry: &TelemetrySnapshot) -> Vec<CanFrame>;

    /// Decode an inbound frame that passed the filters
    fn decode(&mut self, frame: &CanFrame) -> Result<TelemetryUpdate>;

    /// Telemetry produced without bus traffic, for simulated inverters
    fn synthesize(&mut self, _cmd: &MotorCommand) -> Option<TelemetryUpdate> {
        None
    }
}

/// The inverter backend selected for this vehicle
#[derive(Debug, Clone)]
pub enum MotorBackend {
    Dmoc(Dmoc645),
    Ck(CkInverter),
    Simulator(SimulatedInverter),
}

impl MotorBackend {
    pub fn for_device(device: DeviceId) -> Result<Self> {
        match device {
            DeviceId::Dmoc645 => Ok(MotorBackend::Dmoc(Dmoc645::new())),
            DeviceId::CkInverter => Ok(MotorBackend::Ck(CkInverter::new())),
            DeviceId::TestInverter => Ok(MotorBackend::Simulator(SimulatedInverter::new())),
            other => Err(VcuError::UnknownDevice(other)),
        }
    }

    pub fn as_backend(&self) -> &dyn InverterBackend {
        match self {
            MotorBackend::Dmoc(b) => b,
            MotorBackend::Ck(b) => b,
            MotorBackend::Simulator(b) => b,
        }
    }

    pub fn as_backend_mut(&mut self) -> &mut dyn InverterBackend {
        match self {
            MotorBackend::Dmoc(b) => b,
            MotorBackend::Ck(b) => b,
            MotorBackend::Simulator(b) => b,
        }
    }

    /// True if the backend talks to a real inverter over the bus
    pub fn uses_bus(&self) -> bool {
        !matches!(self, MotorBackend::Simulator(_))
    }

    pub fn bus_filters(&self, observer: DeviceId) -> Vec<BusFilter> {
        self.as_backend()
            .filters()
            .into_iter()
            .map(|(id, mask)| BusFilter::new(observer, id, mask, false))
            .collect()
    }
}
