//! Simulated inverter
//!
//! Sends nothing and produces plausible telemetry from the requested values
//! with a first-order lag. Useful for bench testing the pedal pipeline without
//! a motor attached.

use super::InverterBackend;
use crate::arbiter::{MotorCommand, PowerMode};
use crate::telemetry::{TelemetrySnapshot, TelemetryUpdate};
use crate::types::{CanFrame, DeviceId, Result};

pub const SIMULATOR_TICK_INTERVAL_US: u64 = 100_000;

/// Nominal HV bus voltage
const NOMINAL_VOLTAGE: f32 = 360.0;
const AMBIENT_TEMPERATURE: f32 = 18.0;

#[derive(Debug, Clone, Default)]
pub struct SimulatedInverter {
    speed_actual: i32,
    torque_actual: f32,
}

impl SimulatedInverter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InverterBackend for SimulatedInverter {
    fn device(&self) -> DeviceId {
        DeviceId::TestInverter
    }

    fn tick_interval_us(&self) -> u64 {
        SIMULATOR_TICK_INTERVAL_US
    }

    fn filters(&self) -> Vec<(u32, u32)> {
        Vec::new()
    }

    fn encode(&mut self, _cmd: &MotorCommand, _telemetry: &TelemetrySnapshot) -> Vec<CanFrame> {
        Vec::new()
    }

    fn decode(&mut self, _frame: &CanFrame) -> Result<TelemetryUpdate> {
        Ok(TelemetryUpdate::default())
    }

    fn synthesize(&mut self, cmd: &MotorCommand) -> Option<TelemetryUpdate> {
        let dc_current = match cmd.state.power_mode {
            PowerMode::Speed => {
                let requested = cmd.speed;
                self.speed_actual = (self.speed_actual * 8 + requested * 2) / 10;
                self.torque_actual = (self.speed_actual / 20) as f32;
                // holding current plus accelerating current
                (requested / 66 + (requested - self.speed_actual) / 10) as f32
            }
            PowerMode::Torque => {
                let requested = cmd.torque;
                self.torque_actual = (self.torque_actual * 7.0 + requested * 3.0) / 10.0;
                self.speed_actual = ((self.torque_actual * 20.0) as i32).max(0);
                requested / 3.0 + (requested - self.torque_actual) * 2.0
            }
        };

        let dc_voltage = NOMINAL_VOLTAGE - dc_current;
        let mechanical_power = dc_current * dc_voltage / 1200.0;
        let motor_temp = AMBIENT_TEMPERATURE + (mechanical_power * 2.0).abs();
        let inverter_temp = AMBIENT_TEMPERATURE + 1.0 + (mechanical_power * 3.0).abs() / 2.0;

        log::trace!(
            "simulated inverter: torque {:.1} speed {} current {:.1}",
            self.torque_actual,
            self.speed_actual,
            dc_current
        );
        Some(TelemetryUpdate {
            torque_actual: Some(self.torque_actual),
            torque_available: Some(cmd.torque_max),
            speed_actual: Some(self.speed_actual),
            dc_voltage: Some(dc_voltage),
            dc_current: Some(dc_current),
            ac_current: Some(dc_current * 40.0 / 30.0),
            mechanical_power: Some(mechanical_power),
            motor_temp: Some(motor_temp),
            inverter_temp: Some(inverter_temp),
            system_temp: Some((motor_temp + inverter_temp) / 2.0),
            inverter_state: Some(cmd.state.op_state),
            ready: Some(true),
            running: Some(true),
            faulted: Some(false),
            warning: None,
        })
    }
}
