//! Inverter telemetry
//!
//! Backends decode frames into a [`TelemetryUpdate`] that only carries the
//! fields the frame contained. Applying an update touches exactly those
//! fields, so the snapshot is assembled from partial frames and a frame never
//! resets data it did not carry.

use crate::arbiter::OperationState;
use serde::Serialize;

/// Inverter status flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusFlags {
    pub ready: bool,
    pub running: bool,
    pub faulted: bool,
    pub warning: bool,
}

/// Latest known motor and inverter state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// Torque requested this tick, Nm
    pub torque_requested: f32,
    /// Torque reported by the inverter, Nm
    pub torque_actual: f32,
    /// Torque the inverter can deliver, Nm
    pub torque_available: f32,
    /// Speed requested this tick, rpm
    pub speed_requested: i32,
    /// Speed reported by the inverter, rpm
    pub speed_actual: i32,
    /// DC bus voltage, V
    pub dc_voltage: f32,
    /// DC bus current, A
    pub dc_current: f32,
    /// Phase current, A
    pub ac_current: f32,
    /// Mechanical power, kW
    pub mechanical_power: f32,
    /// Motor temperature, degrees C
    pub motor_temp: f32,
    /// Inverter temperature, degrees C
    pub inverter_temp: f32,
    /// System temperature, degrees C
    pub system_temp: f32,
    /// Operation state reported by the inverter
    pub inverter_state: OperationState,
    pub flags: StatusFlags,
}

/// Partial telemetry decoded from one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryUpdate {
    pub torque_actual: Option<f32>,
    pub torque_available: Option<f32>,
    pub speed_actual: Option<i32>,
    pub dc_voltage: Option<f32>,
    pub dc_current: Option<f32>,
    pub ac_current: Option<f32>,
    pub mechanical_power: Option<f32>,
    pub motor_temp: Option<f32>,
    pub inverter_temp: Option<f32>,
    pub system_temp: Option<f32>,
    pub inverter_state: Option<OperationState>,
    pub ready: Option<bool>,
    pub running: Option<bool>,
    pub faulted: Option<bool>,
    pub warning: Option<bool>,
}

impl TelemetryUpdate {
    /// True if the update carries no field at all
    pub fn is_empty(&self) -> bool {
        *self == TelemetryUpdate::default()
    }
}

fn merge<T: Copy>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

impl TelemetrySnapshot {
    /// Apply every field present in `update`, leaving the rest untouched
    pub fn apply(&mut self, update: &TelemetryUpdate) {
        merge(&mut self.torque_actual, update.torque_actual);
        merge(&mut self.torque_available, update.torque_available);
        merge(&mut self.speed_actual, update.speed_actual);
        merge(&mut self.dc_voltage, update.dc_voltage);
        merge(&mut self.dc_current, update.dc_current);
        merge(&mut self.ac_current, update.ac_current);
        merge(&mut self.mechanical_power, update.mechanical_power);
        merge(&mut self.motor_temp, update.motor_temp);
        merge(&mut self.inverter_temp, update.inverter_temp);
        merge(&mut self.system_temp, update.system_temp);
        merge(&mut self.inverter_state, update.inverter_state);
        merge(&mut self.flags.ready, update.ready);
        merge(&mut self.flags.running, update.running);
        merge(&mut self.flags.faulted, update.faulted);
        merge(&mut self.flags.warning, update.warning);
    }
}

/// Read-only telemetry surface for diagnostics
///
/// Readers always get the last decoded value and never cause bus traffic.
pub trait TelemetryReader {
    /// Torque reported by the inverter, Nm
    fn torque_actual(&self) -> f32;

    /// Torque the inverter can deliver, Nm
    fn torque_available(&self) -> f32;

    /// Torque requested on the last tick, Nm
    fn torque_requested(&self) -> f32;

    /// Speed reported by the inverter, rpm
    fn speed_actual(&self) -> i32;

    /// Final throttle in tenths of a percent
    fn throttle(&self) -> i16;

    /// System temperature in tenths of a degree C
    fn temperature_system(&self) -> i16;
}

/// Convert degrees to tenths of a degree, saturating at the i16 range
pub fn to_tenths(value: f32) -> i16 {
    (value * 10.0)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
