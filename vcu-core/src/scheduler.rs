//! Periodic tick scheduler
//!
//! Each device is attached with its own interval in microseconds. The
//! scheduler owns simulated time: advancing it returns the devices that are
//! due, in the order they were attached.

use crate::types::{DeviceId, Result, VcuError};

#[derive(Debug, Clone)]
struct TickEntry {
    device: DeviceId,
    interval_us: u64,
    next_due_us: u64,
}

/// Cooperative tick scheduler
#[derive(Debug, Default)]
pub struct TickScheduler {
    entries: Vec<TickEntry>,
    now_us: u64,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device; re-attaching replaces its interval but keeps its
    /// position in the tick order
    ///
    /// The first tick is due one interval from now.
    pub fn attach(&mut self, device: DeviceId, interval_us: u64) -> Result<()> {
        if interval_us == 0 {
            return Err(VcuError::InvalidConfig(format!(
                "tick interval for {:?} must be greater than zero",
                device
            )));
        }

        log::debug!("Attach {:?} to scheduler every {} us", device, interval_us);
        let entry = TickEntry {
            device,
            interval_us,
            next_due_us: self.now_us + interval_us,
        };
        match self.entries.iter_mut().find(|e| e.device == device) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        Ok(())
    }

    /// Stop delivering ticks to a device
    pub fn detach(&mut self, device: DeviceId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.device != device);
        before != self.entries.len()
    }

    pub fn is_attached(&self, device: DeviceId) -> bool {
        self.entries.iter().any(|e| e.device == device)
    }

    /// Interval a device was attached with
    pub fn interval_of(&self, device: DeviceId) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.device == device)
            .map(|e| e.interval_us)
    }

    /// Current simulated time
    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    /// Advance time and collect the devices that became due
    ///
    /// A device whose interval elapsed several times during one step appears
    /// once per elapsed interval.
    pub fn advance(&mut self, step_us: u64) -> Vec<DeviceId> {
        self.now_us += step_us;
        let mut due = Vec::new();
        for entry in self.entries.iter_mut() {
            while entry.next_due_us <= self.now_us {
                due.push(entry.device);
                entry.next_due_us += entry.interval_us;
            }
        }
        due
    }
}
