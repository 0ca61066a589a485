//! Command arbitration
//!
//! Combines the accelerator and brake demands into a single motor command,
//! gated by the operating state. The arbiter owns the operation state, the
//! selected gear and the power mode, and keeps the telemetry snapshot the
//! backend reports into.

use crate::config::MotorConfig;
use crate::io::{DigitalInput, INPUT_NONE};
use crate::pedal::normalize::POSITION_MAX;
use crate::telemetry::{to_tenths, TelemetryReader, TelemetrySnapshot, TelemetryUpdate};
use serde::{Deserialize, Serialize};

/// Brake demand below this threshold is considered a regen request
pub const REGEN_THRESHOLD: i16 = -10;

/// Inverter operation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperationState {
    #[default]
    Disabled,
    Standby,
    Enable,
    PowerDown,
}

impl OperationState {
    /// Two-bit state code used on the wire
    pub fn code(&self) -> u8 {
        match self {
            OperationState::Disabled => 0,
            OperationState::Standby => 1,
            OperationState::Enable => 2,
            OperationState::PowerDown => 3,
        }
    }
}

/// Selected gear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gear {
    #[default]
    Neutral,
    Drive,
    Reverse,
}

impl Gear {
    pub fn code(&self) -> u8 {
        match self {
            Gear::Neutral => 0,
            Gear::Drive => 1,
            Gear::Reverse => 2,
        }
    }
}

/// Whether the throttle maps to torque or to speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PowerMode {
    #[default]
    Torque,
    Speed,
}

/// Operating state of the drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OperatingState {
    pub op_state: OperationState,
    pub gear: Gear,
    pub power_mode: PowerMode,
}

impl OperatingState {
    /// True if propulsion demand may reach the motor
    pub fn is_driving(&self) -> bool {
        self.op_state == OperationState::Enable && self.gear != Gear::Neutral
    }
}

/// The command handed to the backend each tick
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MotorCommand {
    /// Final demand in per-mille, negative for regen
    pub throttle: i16,
    /// Requested torque, Nm
    pub torque: f32,
    /// Requested speed, rpm
    pub speed: i32,
    pub torque_max: f32,
    pub speed_max: u16,
    pub state: OperatingState,
}

/// Demands collected from the pedals for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DemandInputs {
    /// Accelerator demand, 0 when there is no accelerator
    pub accelerator: i16,
    /// Brake demand, if a brake pedal is configured
    pub brake: Option<i16>,
    /// A required device stopped communicating
    pub communication_lost: bool,
}

#[derive(Debug, Clone)]
pub struct CommandArbiter {
    config: MotorConfig,
    state: OperatingState,
    communication_lost: bool,
    throttle_requested: i16,
    telemetry: TelemetrySnapshot,
}

impl CommandArbiter {
    pub fn new(config: MotorConfig) -> Self {
        let state = OperatingState {
            power_mode: config.power_mode,
            ..OperatingState::default()
        };
        Self {
            config,
            state,
            communication_lost: false,
            throttle_requested: 0,
            telemetry: TelemetrySnapshot::default(),
        }
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    pub fn state(&self) -> OperatingState {
        self.state
    }

    pub fn telemetry(&self) -> &TelemetrySnapshot {
        &self.telemetry
    }

    /// Replace the configuration, keeping the operating state
    pub fn set_config(&mut self, config: MotorConfig) {
        self.state.power_mode = config.power_mode;
        self.config = config;
    }

    /// Set the requested operation state
    ///
    /// Leaving ENABLE always drops the gear to NEUTRAL.
    pub fn command_state(&mut self, op_state: OperationState) {
        if op_state != self.state.op_state {
            log::info!("operation state {:?} -> {:?}", self.state.op_state, op_state);
        }
        self.state.op_state = op_state;
        if op_state != OperationState::Enable {
            self.state.gear = Gear::Neutral;
        }
    }

    /// Select a gear
    ///
    /// # Returns
    /// * `false` if the drive is not enabled or communication is lost
    pub fn command_gear(&mut self, gear: Gear) -> bool {
        if gear != Gear::Neutral
            && (self.state.op_state != OperationState::Enable || self.communication_lost)
        {
            log::debug!(
                "gear {:?} refused in {:?} (communication lost: {})",
                gear,
                self.state.op_state,
                self.communication_lost
            );
            return false;
        }
        if gear != self.state.gear {
            log::info!("gear {:?} -> {:?}", self.state.gear, gear);
        }
        self.state.gear = gear;
        true
    }

    pub fn set_power_mode(&mut self, power_mode: PowerMode) {
        self.state.power_mode = power_mode;
        self.config.power_mode = power_mode;
    }

    /// Sample the enable and gear selector inputs, if any are configured
    pub fn sample_inputs(&mut self, io: &dyn DigitalInput) {
        let enable = self.config.enable_input;
        if enable != INPUT_NONE {
            let op_state = if io.digital(enable) {
                OperationState::Enable
            } else {
                OperationState::Disabled
            };
            self.command_state(op_state);
        }

        let forward = self.config.forward_input;
        let reverse = self.config.reverse_input;
        if self.state.op_state != OperationState::Enable
            || (forward == INPUT_NONE && reverse == INPUT_NONE)
        {
            return;
        }

        let mut gear = Gear::Neutral;
        if reverse != INPUT_NONE && io.digital(reverse) {
            gear = Gear::Reverse;
        }
        if forward != INPUT_NONE && io.digital(forward) {
            gear = Gear::Drive;
        }
        // A lone reverse switch means drive whenever it is off
        if gear == Gear::Neutral && forward == INPUT_NONE {
            gear = Gear::Drive;
        }
        self.command_gear(gear);
    }

    /// Arbitrate one tick of demand into a motor command
    pub fn tick(&mut self, inputs: &DemandInputs) -> MotorCommand {
        self.communication_lost = inputs.communication_lost;
        if self.communication_lost && self.state.gear != Gear::Neutral {
            log::warn!("communication lost, forcing NEUTRAL");
            self.state.gear = Gear::Neutral;
        }

        let mut throttle = inputs.accelerator;
        if let Some(brake) = inputs.brake {
            if brake < REGEN_THRESHOLD && brake < throttle {
                throttle = brake;
            }
        }
        let limit = POSITION_MAX as i16;
        throttle = throttle.clamp(-limit, limit);
        if !self.state.is_driving() {
            throttle = 0;
        }
        self.throttle_requested = throttle;

        let speed_max = self.config.speed_max;
        let torque_max = self.config.torque_max;
        let (torque, speed) = match self.state.power_mode {
            PowerMode::Speed => {
                let speed = throttle.max(0) as i32 * speed_max as i32 / POSITION_MAX as i32;
                (torque_max, speed)
            }
            PowerMode::Torque => {
                let mut torque = throttle as f32 * torque_max / POSITION_MAX as f32;
                if self.state.gear == Gear::Reverse {
                    torque = -torque;
                }
                (torque, speed_max as i32)
            }
        };

        self.telemetry.torque_requested = torque;
        self.telemetry.speed_requested = speed;
        self.telemetry.mechanical_power =
            self.telemetry.dc_voltage * self.telemetry.dc_current / 1000.0;

        MotorCommand {
            throttle,
            torque,
            speed,
            torque_max,
            speed_max,
            state: self.state,
        }
    }

    /// Merge decoded telemetry into the snapshot
    pub fn apply(&mut self, update: &TelemetryUpdate) {
        self.telemetry.apply(update);
    }
}

impl TelemetryReader for CommandArbiter {
    fn torque_actual(&self) -> f32 {
        self.telemetry.torque_actual
    }

    fn torque_available(&self) -> f32 {
        self.telemetry.torque_available
    }

    fn torque_requested(&self) -> f32 {
        self.telemetry.torque_requested
    }

    fn speed_actual(&self) -> i32 {
        self.telemetry.speed_actual
    }

    fn throttle(&self) -> i16 {
        self.throttle_requested
    }

    fn temperature_system(&self) -> i16 {
        to_tenths(self.telemetry.system_temp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SimulatedIo;

    fn driving() -> CommandArbiter {
        let mut arbiter = CommandArbiter::new(MotorConfig::default().with_limits(6000, 300.0));
        arbiter.command_state(OperationState::Enable);
        assert!(arbiter.command_gear(Gear::Drive));
        arbiter
    }

    fn demand(accelerator: i16, brake: Option<i16>) -> DemandInputs {
        DemandInputs {
            accelerator,
            brake,
            communication_lost: false,
        }
    }

    #[test]
    fn test_torque_mode() {
        let mut arbiter = driving();
        let cmd = arbiter.tick(&demand(500, None));
        assert_eq!(cmd.throttle, 500);
        assert_eq!(cmd.torque, 150.0);
        assert_eq!(cmd.speed, 6000);
        assert_eq!(arbiter.throttle(), 500);
        assert_eq!(arbiter.torque_requested(), 150.0);
    }

    #[test]
    fn test_reverse_negates_torque() {
        let mut arbiter = driving();
        arbiter.command_gear(Gear::Reverse);
        let cmd = arbiter.tick(&demand(500, None));
        assert_eq!(cmd.torque, -150.0);
    }

    #[test]
    fn test_speed_mode() {
        let mut arbiter = driving();
        arbiter.set_power_mode(PowerMode::Speed);
        let cmd = arbiter.tick(&demand(250, None));
        assert_eq!(cmd.speed, 1500);
        assert_eq!(cmd.torque, 300.0);

        let cmd = arbiter.tick(&demand(0, Some(-300)));
        assert_eq!(cmd.speed, 0);
    }

    #[test]
    fn test_brake_overrides_accelerator() {
        let mut arbiter = driving();
        let cmd = arbiter.tick(&demand(400, Some(-200)));
        assert_eq!(cmd.throttle, -200);
        assert_eq!(cmd.torque, -60.0);

        // Small brake demand does not override
        let cmd = arbiter.tick(&demand(400, Some(-5)));
        assert_eq!(cmd.throttle, 400);
    }

    #[test]
    fn test_neutral_and_disabled_give_zero() {
        let mut arbiter = driving();
        arbiter.command_gear(Gear::Neutral);
        assert_eq!(arbiter.tick(&demand(800, None)).torque, 0.0);

        arbiter.command_gear(Gear::Drive);
        arbiter.command_state(OperationState::Standby);
        assert_eq!(arbiter.state().gear, Gear::Neutral);
        let cmd = arbiter.tick(&demand(800, None));
        assert_eq!(cmd.throttle, 0);
        assert_eq!(cmd.torque, 0.0);
    }

    #[test]
    fn test_gear_requires_enable() {
        let mut arbiter = CommandArbiter::new(MotorConfig::default());
        assert!(!arbiter.command_gear(Gear::Drive));
        assert_eq!(arbiter.state().gear, Gear::Neutral);
        assert!(arbiter.command_gear(Gear::Neutral));
    }

    #[test]
    fn test_communication_loss_forces_neutral() {
        let mut arbiter = driving();
        let cmd = arbiter.tick(&DemandInputs {
            accelerator: 900,
            brake: None,
            communication_lost: true,
        });
        assert_eq!(cmd.state.gear, Gear::Neutral);
        assert_eq!(cmd.torque, 0.0);
        assert!(!arbiter.command_gear(Gear::Drive));

        arbiter.tick(&demand(0, None));
        assert!(arbiter.command_gear(Gear::Drive));
    }

    #[test]
    fn test_throttle_clamped() {
        let mut arbiter = driving();
        let cmd = arbiter.tick(&demand(0, Some(-1500)));
        assert_eq!(cmd.throttle, -1000);
    }

    #[test]
    fn test_digital_inputs() {
        let config = MotorConfig::default().with_inputs(0, 1, 2);
        let mut arbiter = CommandArbiter::new(config);
        let mut io = SimulatedIo::new();

        io.set_digital(1, true);
        arbiter.sample_inputs(&io);
        assert_eq!(arbiter.state().op_state, OperationState::Disabled);
        assert_eq!(arbiter.state().gear, Gear::Neutral);

        io.set_digital(0, true);
        arbiter.sample_inputs(&io);
        assert_eq!(arbiter.state().gear, Gear::Drive);

        io.set_digital(1, false);
        io.set_digital(2, true);
        arbiter.sample_inputs(&io);
        assert_eq!(arbiter.state().gear, Gear::Reverse);

        io.set_digital(0, false);
        arbiter.sample_inputs(&io);
        assert_eq!(arbiter.state().op_state, OperationState::Disabled);
        assert_eq!(arbiter.state().gear, Gear::Neutral);
    }

    #[test]
    fn test_lone_reverse_switch() {
        let config = MotorConfig::default().with_inputs(INPUT_NONE, INPUT_NONE, 3);
        let mut arbiter = CommandArbiter::new(config);
        arbiter.command_state(OperationState::Enable);
        let mut io = SimulatedIo::new();

        arbiter.sample_inputs(&io);
        assert_eq!(arbiter.state().gear, Gear::Drive);
        io.set_digital(3, true);
        arbiter.sample_inputs(&io);
        assert_eq!(arbiter.state().gear, Gear::Reverse);
    }

    #[test]
    fn test_mechanical_power_and_temperature() {
        let mut arbiter = driving();
        arbiter.apply(&TelemetryUpdate {
            dc_voltage: Some(350.0),
            dc_current: Some(20.0),
            system_temp: Some(31.25),
            ..Default::default()
        });
        arbiter.tick(&demand(0, None));
        assert_eq!(arbiter.telemetry().mechanical_power, 7.0);
        assert_eq!(arbiter.temperature_system(), 313);
    }
}
