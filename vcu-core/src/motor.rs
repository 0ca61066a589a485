//! Motor controller
//!
//! Glues the command arbiter to the selected inverter backend and watches the
//! inverter's liveness. Losing the inverter raises a communication fault and
//! forces the arbiter into NEUTRAL until frames arrive again.

use crate::arbiter::{CommandArbiter, DemandInputs, MotorCommand};
use crate::backend::MotorBackend;
use crate::bus::{BusFilter, CanBus};
use crate::config::MotorConfig;
use crate::faults::{FaultKind, FaultTable};
use crate::io::DigitalInput;
use crate::liveness::LivenessMonitor;
use crate::telemetry::TelemetryUpdate;
use crate::types::{CanFrame, DeviceId, Result};

/// Demands collected from the pedals for one motor tick
#[derive(Debug, Clone, Copy, Default)]
pub struct PedalDemands {
    pub accelerator: i16,
    pub brake: Option<i16>,
    /// A polled pedal stopped answering
    pub pedal_communication_lost: bool,
}

#[derive(Debug, Clone)]
pub struct MotorController {
    config: MotorConfig,
    backend: MotorBackend,
    arbiter: CommandArbiter,
    liveness: Option<LivenessMonitor>,
    /// Link state seen on the previous tick, `None` before the first tick
    link_lost: Option<bool>,
    last_command: MotorCommand,
}

impl MotorController {
    pub fn new(config: MotorConfig) -> Result<Self> {
        config.validate()?;
        let backend = MotorBackend::for_device(config.device)?;
        let liveness = backend.uses_bus().then(|| {
            LivenessMonitor::with_timeout(
                config.liveness_timeout_ms,
                backend.as_backend().tick_interval_us(),
            )
        });

        log::info!("add device: {}", config.device);
        Ok(Self {
            arbiter: CommandArbiter::new(config.clone()),
            config,
            backend,
            liveness,
            link_lost: None,
            last_command: MotorCommand::default(),
        })
    }

    pub fn id(&self) -> DeviceId {
        self.config.device
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    pub fn backend(&self) -> &MotorBackend {
        &self.backend
    }

    pub fn arbiter(&self) -> &CommandArbiter {
        &self.arbiter
    }

    pub fn arbiter_mut(&mut self) -> &mut CommandArbiter {
        &mut self.arbiter
    }

    pub fn liveness(&self) -> Option<&LivenessMonitor> {
        self.liveness.as_ref()
    }

    /// True while the inverter is considered unreachable
    pub fn communication_lost(&self) -> bool {
        self.link_lost == Some(true)
    }

    pub fn last_command(&self) -> &MotorCommand {
        &self.last_command
    }

    pub fn tick_interval_us(&self) -> u64 {
        self.backend.as_backend().tick_interval_us()
    }

    /// Bus index, for backends attached to a bus
    pub fn bus_index(&self) -> Option<u8> {
        self.backend.uses_bus().then_some(self.config.bus_index)
    }

    pub fn filters(&self) -> Vec<BusFilter> {
        self.backend.bus_filters(self.id())
    }

    /// Handle a frame that passed one of the backend's filters
    pub fn on_frame(&mut self, frame: &CanFrame) {
        if let Some(liveness) = self.liveness.as_mut() {
            liveness.record_response();
        }
        match self.backend.as_backend_mut().decode(frame) {
            Ok(update) => self.arbiter.apply(&update),
            Err(e) => log::warn!("{:?}: dropping frame {}: {}", self.id(), frame, e),
        }
    }

    /// Run one control cycle
    ///
    /// Samples the digital inputs, arbitrates the pedal demands, sends the
    /// backend's command frames and applies any synthesized telemetry.
    pub fn tick(
        &mut self,
        io: &dyn DigitalInput,
        demands: PedalDemands,
        bus: Option<&mut dyn CanBus>,
        faults: &mut FaultTable,
    ) -> MotorCommand {
        self.update_liveness(faults);
        self.arbiter.sample_inputs(io);

        let cmd = self.arbiter.tick(&DemandInputs {
            accelerator: demands.accelerator,
            brake: demands.brake,
            communication_lost: self.communication_lost() || demands.pedal_communication_lost,
        });

        let frames = self
            .backend
            .as_backend_mut()
            .encode(&cmd, self.arbiter.telemetry());
        match bus {
            Some(bus) => frames.into_iter().for_each(|f| bus.send_frame(f)),
            None if !frames.is_empty() => {
                log::warn!("{:?}: no bus attached, {} frames dropped", self.id(), frames.len())
            }
            None => {}
        }

        if let Some(update) = self.backend.as_backend_mut().synthesize(&cmd) {
            self.arbiter.apply(&update);
        }

        self.last_command = cmd;
        cmd
    }

    /// Change a configuration entry, applied from the next tick on
    pub fn set_entry(&mut self, name: &str, value: f64) -> Result<()> {
        let mut updated = self.config.clone();
        updated.set_entry(name, value)?;
        updated.validate()?;
        self.arbiter.set_config(updated.clone());
        self.config = updated;
        Ok(())
    }

    fn update_liveness(&mut self, faults: &mut FaultTable) {
        let id = self.config.device;
        let Some(liveness) = self.liveness.as_mut() else {
            return;
        };
        liveness.tick();
        let lost = liveness.is_lost();
        let previous = self.link_lost.replace(lost);
        if previous == Some(lost) {
            return;
        }

        if lost {
            log::error!(
                "{:?}: no response for {} ticks",
                id,
                liveness.ticks_without_response()
            );
            faults.raise(id, FaultKind::CommunicationLost);
        } else if previous.is_some() {
            log::info!("{:?}: communication restored", id);
            faults.cancel(id, FaultKind::CommunicationLost);
        }
        self.arbiter.apply(&TelemetryUpdate {
            running: Some(!lost),
            ..Default::default()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::{Gear, OperationState};
    use crate::bus::SimBus;
    use crate::io::SimulatedIo;

    fn dmoc() -> MotorController {
        let config = MotorConfig::for_device(DeviceId::Dmoc645).unwrap();
        MotorController::new(config).unwrap()
    }

    fn speed_report(state: u8) -> CanFrame {
        CanFrame::from_bytes(0x23B, false, &[0x4E, 0x20, 0, 0, 0, 0, state << 4, 0])
    }

    #[test]
    fn test_dmoc_sends_three_frames() {
        let io = SimulatedIo::new();
        let mut bus = SimBus::new();
        let mut faults = FaultTable::new();
        let mut motor = dmoc();

        motor.tick(&io, PedalDemands::default(), Some(&mut bus), &mut faults);
        let ids: Vec<u32> = bus.take_sent().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![0x232, 0x233, 0x234]);
    }

    #[test]
    fn test_silent_inverter_raises_fault_once() {
        let io = SimulatedIo::new();
        let mut bus = SimBus::new();
        let mut faults = FaultTable::new();
        let mut motor = dmoc();

        for _ in 0..5 {
            motor.tick(&io, PedalDemands::default(), Some(&mut bus), &mut faults);
        }
        assert!(motor.communication_lost());
        assert!(faults.is_active(DeviceId::Dmoc645, FaultKind::CommunicationLost));
        assert_eq!(faults.history().count(), 1);
    }

    #[test]
    fn test_frames_restore_communication() {
        let io = SimulatedIo::new();
        let mut bus = SimBus::new();
        let mut faults = FaultTable::new();
        let mut motor = dmoc();
        motor.tick(&io, PedalDemands::default(), Some(&mut bus), &mut faults);

        motor.on_frame(&speed_report(3));
        motor.tick(&io, PedalDemands::default(), Some(&mut bus), &mut faults);
        assert!(!motor.communication_lost());
        assert!(!faults.is_active(DeviceId::Dmoc645, FaultKind::CommunicationLost));
        assert!(motor.arbiter().telemetry().flags.running);
        assert_eq!(motor.arbiter().telemetry().inverter_state, OperationState::Enable);
    }

    #[test]
    fn test_lost_inverter_forces_neutral() {
        let io = SimulatedIo::new();
        let mut bus = SimBus::new();
        let mut faults = FaultTable::new();
        let mut motor = dmoc();

        motor.on_frame(&speed_report(3));
        motor.tick(&io, PedalDemands::default(), Some(&mut bus), &mut faults);
        motor.arbiter_mut().command_state(OperationState::Enable);
        assert!(motor.arbiter_mut().command_gear(Gear::Drive));

        let threshold = motor.liveness().unwrap().threshold() as usize;
        let demands = PedalDemands {
            accelerator: 500,
            ..Default::default()
        };
        let mut cmd = motor.tick(&io, demands, Some(&mut bus), &mut faults);
        assert_eq!(cmd.throttle, 500);
        for _ in 0..threshold {
            cmd = motor.tick(&io, demands, Some(&mut bus), &mut faults);
        }
        assert_eq!(cmd.state.gear, Gear::Neutral);
        assert_eq!(cmd.throttle, 0);
    }

    #[test]
    fn test_pedal_loss_forces_neutral() {
        let io = SimulatedIo::new();
        let mut faults = FaultTable::new();
        let mut motor = MotorController::new(MotorConfig::default()).unwrap();
        motor.arbiter_mut().command_state(OperationState::Enable);
        motor.arbiter_mut().command_gear(Gear::Drive);

        let cmd = motor.tick(
            &io,
            PedalDemands {
                accelerator: 300,
                brake: None,
                pedal_communication_lost: true,
            },
            None,
            &mut faults,
        );
        assert_eq!(cmd.state.gear, Gear::Neutral);
        assert!(faults.active_faults().is_empty());
    }

    #[test]
    fn test_simulator_produces_telemetry() {
        let io = SimulatedIo::new();
        let mut faults = FaultTable::new();
        let mut motor = MotorController::new(MotorConfig::default()).unwrap();
        assert!(motor.liveness().is_none());
        assert!(motor.bus_index().is_none());
        motor.arbiter_mut().command_state(OperationState::Enable);
        motor.arbiter_mut().command_gear(Gear::Drive);

        let demands = PedalDemands {
            accelerator: 500,
            ..Default::default()
        };
        motor.tick(&io, demands, None, &mut faults);
        let telemetry = motor.arbiter().telemetry();
        assert_eq!(telemetry.torque_requested, 150.0);
        assert_eq!(telemetry.torque_actual, 45.0);
        assert!(telemetry.flags.running);
    }

    #[test]
    fn test_set_entry() {
        let mut motor = dmoc();
        motor.set_entry("TORQ", 150.0).unwrap();
        assert_eq!(motor.config().torque_max, 150.0);
        assert_eq!(motor.arbiter().config().torque_max, 150.0);
        assert!(motor.set_entry("RPM", 40000.0).is_err());
        assert!(motor.set_entry("BOGUS", 1.0).is_err());
    }
}
