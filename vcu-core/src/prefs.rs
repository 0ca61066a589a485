//! Preference store interface
//!
//! The core only needs get-with-default and set. Values are stored per device
//! under short string keys; a per-device checksum tells a loader whether the
//! stored values can be trusted or defaults must be used instead.

use crate::types::DeviceId;
use std::collections::BTreeMap;

/// Non-volatile preference storage
pub trait PreferenceStore {
    /// Read a stored value
    fn read(&self, device: DeviceId, key: &str) -> Option<f64>;

    /// Store a value
    fn write(&mut self, device: DeviceId, key: &str, value: f64);

    /// Recompute and store the checksum of a device's values
    fn save_checksum(&mut self, device: DeviceId);

    /// True if the stored checksum matches the stored values
    fn checksum_valid(&self, device: DeviceId) -> bool;

    /// Read a stored value, falling back to `default`
    fn read_or(&self, device: DeviceId, key: &str, default: f64) -> f64 {
        self.read(device, key).unwrap_or(default)
    }
}

/// Preference store held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferenceStore {
    values: BTreeMap<(DeviceId, String), f64>,
    checksums: BTreeMap<DeviceId, u8>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values across all devices
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn compute_checksum(&self, device: DeviceId) -> u8 {
        self.values
            .iter()
            .filter(|((d, _), _)| *d == device)
            .flat_map(|((_, key), value)| {
                key.bytes()
                    .chain(value.to_bits().to_le_bytes())
                    .collect::<Vec<u8>>()
            })
            .fold(0u8, |acc, b| acc.wrapping_add(b))
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn read(&self, device: DeviceId, key: &str) -> Option<f64> {
        self.values.get(&(device, key.to_string())).copied()
    }

    fn write(&mut self, device: DeviceId, key: &str, value: f64) {
        self.values.insert((device, key.to_string()), value);
    }

    fn save_checksum(&mut self, device: DeviceId) {
        let checksum = self.compute_checksum(device);
        self.checksums.insert(device, checksum);
    }

    fn checksum_valid(&self, device: DeviceId) -> bool {
        match self.checksums.get(&device) {
            Some(stored) => *stored == self.compute_checksum(device),
            None => false,
        }
    }
}
