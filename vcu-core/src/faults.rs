//! Fault table
//!
//! Faults are keyed by the owning device and the kind of fault. Raising a
//! fault that is already active, or cancelling one that is not, is a no-op
//! and reported as such, so callers can raise on every tick without flooding
//! the log or the history.

use crate::types::{DeviceId, Result, Timestamp, VcuError};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Number of records kept in the fault history
pub const FAULT_HISTORY_SIZE: usize = 50;

/// The kind of fault a device can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FaultKind {
    /// Signal below the configured range minus tolerance
    SignalLow,
    /// Signal above the configured range plus tolerance
    SignalHigh,
    /// No accepted response within the liveness threshold
    CommunicationLost,
    /// Redundant channels of one pedal disagree
    SignalMismatch,
}

impl FaultKind {
    /// Numeric fault code used in log output
    pub fn code(&self) -> u16 {
        match self {
            FaultKind::SignalLow => 0x0001,
            FaultKind::SignalHigh => 0x0002,
            FaultKind::CommunicationLost => 0x0003,
            FaultKind::SignalMismatch => 0x0004,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::SignalLow => write!(f, "signal too low"),
            FaultKind::SignalHigh => write!(f, "signal too high"),
            FaultKind::CommunicationLost => write!(f, "communication lost"),
            FaultKind::SignalMismatch => write!(f, "channel mismatch"),
        }
    }
}

/// One entry of the fault history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultRecord {
    pub device: DeviceId,
    pub kind: FaultKind,
    pub raised_at: Timestamp,
    /// Set once the fault has been cancelled
    pub cleared_at: Option<Timestamp>,
    pub acknowledged: bool,
}

impl FaultRecord {
    /// True while the fault condition still holds
    pub fn is_ongoing(&self) -> bool {
        self.cleared_at.is_none()
    }
}

/// Registry of active faults plus a bounded history
#[derive(Debug, Default)]
pub struct FaultTable {
    active: HashSet<(DeviceId, FaultKind)>,
    history: VecDeque<FaultRecord>,
}

impl FaultTable {
    /// Create an empty fault table
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise a fault
    ///
    /// # Returns
    /// * `true` if the fault was not active before
    /// * `false` if it was already active (nothing is recorded)
    pub fn raise(&mut self, device: DeviceId, kind: FaultKind) -> bool {
        if !self.active.insert((device, kind)) {
            return false;
        }

        log::error!(
            "Fault 0x{:X} ({}) raised by device 0x{:X}",
            kind.code(),
            kind,
            device.code()
        );

        if self.history.len() == FAULT_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(FaultRecord {
            device,
            kind,
            raised_at: Utc::now(),
            cleared_at: None,
            acknowledged: false,
        });
        true
    }

    /// Cancel an ongoing fault
    ///
    /// # Returns
    /// * `true` if the fault was active and is now cleared
    /// * `false` if it was not active
    pub fn cancel(&mut self, device: DeviceId, kind: FaultKind) -> bool {
        if !self.active.remove(&(device, kind)) {
            return false;
        }

        log::info!(
            "Fault 0x{:X} ({}) cleared for device 0x{:X}",
            kind.code(),
            kind,
            device.code()
        );

        if let Some(record) = self
            .history
            .iter_mut()
            .rev()
            .find(|r| r.device == device && r.kind == kind && r.is_ongoing())
        {
            record.cleared_at = Some(Utc::now());
        }
        true
    }

    /// Check whether a specific fault is active
    pub fn is_active(&self, device: DeviceId, kind: FaultKind) -> bool {
        self.active.contains(&(device, kind))
    }

    /// Check whether a device has any active fault
    pub fn device_has_fault(&self, device: DeviceId) -> bool {
        self.active.iter().any(|(d, _)| *d == device)
    }

    /// All active faults, sorted by device then kind
    pub fn active_faults(&self) -> Vec<(DeviceId, FaultKind)> {
        let mut faults: Vec<_> = self.active.iter().copied().collect();
        faults.sort();
        faults
    }

    /// Fault history, oldest first
    pub fn history(&self) -> impl Iterator<Item = &FaultRecord> {
        self.history.iter()
    }

    /// Acknowledge a history entry by index (0 = oldest)
    pub fn acknowledge(&mut self, index: usize) -> Result<()> {
        let record = self.history.get_mut(index).ok_or_else(|| {
            VcuError::InvalidData(format!("no fault history entry at index {}", index))
        })?;
        record.acknowledged = true;
        Ok(())
    }

    /// Acknowledge every history entry
    pub fn acknowledge_all(&mut self) {
        for record in self.history.iter_mut() {
            record.acknowledged = true;
        }
    }

    /// Number of history entries not yet acknowledged
    pub fn unacknowledged_count(&self) -> usize {
        self.history.iter().filter(|r| !r.acknowledged).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_once() {
        let mut faults = FaultTable::new();
        assert!(faults.raise(DeviceId::PotAccelerator, FaultKind::SignalHigh));
        assert!(!faults.raise(DeviceId::PotAccelerator, FaultKind::SignalHigh));
        assert_eq!(faults.history().count(), 1);
        assert!(faults.is_active(DeviceId::PotAccelerator, FaultKind::SignalHigh));
    }

    #[test]
    fn test_cancel_once() {
        let mut faults = FaultTable::new();
        assert!(!faults.cancel(DeviceId::PotBrake, FaultKind::SignalLow));

        faults.raise(DeviceId::PotBrake, FaultKind::SignalLow);
        assert!(faults.cancel(DeviceId::PotBrake, FaultKind::SignalLow));
        assert!(!faults.cancel(DeviceId::PotBrake, FaultKind::SignalLow));

        let record = faults.history().next().unwrap();
        assert!(!record.is_ongoing());
    }

    #[test]
    fn test_faults_keyed_by_device_and_kind() {
        let mut faults = FaultTable::new();
        faults.raise(DeviceId::CanAccelerator, FaultKind::CommunicationLost);
        faults.raise(DeviceId::CanBrake, FaultKind::CommunicationLost);
        faults.raise(DeviceId::CanBrake, FaultKind::SignalLow);

        assert_eq!(faults.active_faults().len(), 3);
        faults.cancel(DeviceId::CanBrake, FaultKind::CommunicationLost);
        assert!(faults.is_active(DeviceId::CanAccelerator, FaultKind::CommunicationLost));
        assert!(faults.device_has_fault(DeviceId::CanBrake));
        assert!(!faults.device_has_fault(DeviceId::Dmoc645));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut faults = FaultTable::new();
        for _ in 0..(FAULT_HISTORY_SIZE + 10) {
            faults.raise(DeviceId::Dmoc645, FaultKind::CommunicationLost);
            faults.cancel(DeviceId::Dmoc645, FaultKind::CommunicationLost);
        }
        assert_eq!(faults.history().count(), FAULT_HISTORY_SIZE);
    }

    #[test]
    fn test_acknowledge() {
        let mut faults = FaultTable::new();
        faults.raise(DeviceId::PotAccelerator, FaultKind::SignalLow);
        faults.raise(DeviceId::PotBrake, FaultKind::SignalLow);
        assert_eq!(faults.unacknowledged_count(), 2);

        faults.acknowledge(0).unwrap();
        assert_eq!(faults.unacknowledged_count(), 1);
        assert!(faults.acknowledge(5).is_err());

        faults.acknowledge_all();
        assert_eq!(faults.unacknowledged_count(), 0);
    }

    #[test]
    fn test_record_serialization() {
        let mut faults = FaultTable::new();
        faults.raise(DeviceId::Dmoc645, FaultKind::CommunicationLost);

        let record = faults.history().next().unwrap();
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["device"], "Dmoc645");
        assert_eq!(json["kind"], "CommunicationLost");
        assert!(json["raised_at"].is_string());
        assert!(json["cleared_at"].is_null());
    }
}
