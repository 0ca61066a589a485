//! Pedal signal pipeline
//!
//! Each tick a pedal runs its stages in a fixed order:
//! - acquire a [`RawSignal`] from its [`SignalSource`]
//! - validate it against the configured range (and liveness for polled sources)
//! - normalize it to a per-mille position
//! - map the position to a signed propulsion demand
//!
//! Status transitions raise or cancel faults exactly once; a steady status
//! produces no further fault events.

pub mod normalize;
pub mod remote;
pub mod source;
pub mod validate;

pub use source::SignalSource;
pub use validate::{validate, ValidationStatus};

use crate::bus::{BusFilter, CanBus};
use crate::config::PedalConfig;
use crate::faults::FaultTable;
use crate::io::AnalogInput;
use crate::liveness::LivenessMonitor;
use crate::types::{CanFrame, DeviceId, DeviceKind, Result, VcuError};
use serde::Serialize;

/// Up to three raw channel readings from a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RawSignal {
    pub input1: i32,
    pub input2: i32,
    pub input3: i32,
}

impl RawSignal {
    /// Signal carrying only a primary reading
    pub fn single(input1: i32) -> Self {
        Self {
            input1,
            ..Self::default()
        }
    }
}

/// What a pedal's demand is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PedalRole {
    Accelerator,
    Brake,
}

impl PedalRole {
    pub fn for_device(device: DeviceId) -> Result<Self> {
        match device.kind() {
            DeviceKind::Throttle => Ok(PedalRole::Accelerator),
            DeviceKind::Brake => Ok(PedalRole::Brake),
            DeviceKind::MotorController => Err(VcuError::InvalidConfig(format!(
                "{:?} is not a pedal device",
                device
            ))),
        }
    }
}

/// An accelerator or brake pedal with its source and pipeline state
#[derive(Debug, Clone)]
pub struct Pedal {
    config: PedalConfig,
    role: PedalRole,
    source: SignalSource,
    raw: RawSignal,
    status: ValidationStatus,
    position: u16,
    level: i16,
}

impl Pedal {
    /// Create a pedal from its configuration
    ///
    /// # Returns
    /// * `Err(VcuError::InvalidConfig)` if the configuration is unusable or the
    ///   selected ECU profile has no such pedal
    pub fn new(config: PedalConfig) -> Result<Self> {
        config.validate()?;
        let role = PedalRole::for_device(config.device)?;
        let source = SignalSource::for_config(&config)?;

        log::info!("add device: {}", config.device);
        Ok(Self {
            config,
            role,
            source,
            raw: RawSignal::default(),
            status: ValidationStatus::Ok,
            position: 0,
            level: 0,
        })
    }

    pub fn id(&self) -> DeviceId {
        self.config.device
    }

    pub fn role(&self) -> PedalRole {
        self.role
    }

    pub fn config(&self) -> &PedalConfig {
        &self.config
    }

    /// Reading acquired on the last tick
    pub fn raw(&self) -> RawSignal {
        self.raw
    }

    pub fn status(&self) -> ValidationStatus {
        self.status
    }

    /// Per-mille position from the last tick
    pub fn position(&self) -> u16 {
        self.position
    }

    /// Propulsion demand from the last tick
    pub fn level(&self) -> i16 {
        self.level
    }

    /// Bus index, for pedals polled over the bus
    pub fn bus_index(&self) -> Option<u8> {
        self.source.uses_bus().then_some(self.config.bus_index)
    }

    pub fn filter(&self) -> Option<BusFilter> {
        self.source.filter(self.id())
    }

    pub fn liveness(&self) -> Option<&LivenessMonitor> {
        self.source.liveness()
    }

    /// Run the pipeline once and return the resulting demand
    pub fn tick(
        &mut self,
        io: &dyn AnalogInput,
        bus: Option<&mut dyn CanBus>,
        faults: &mut FaultTable,
    ) -> i16 {
        self.raw = self.source.acquire(io, bus);

        if self.is_disabled_brake() {
            self.update_status(ValidationStatus::Ok, faults);
            self.position = 0;
            self.level = 0;
            return 0;
        }

        let status = validate(&self.raw, &self.config, self.source.liveness());
        self.update_status(status, faults);

        self.position = self.calculate_position();
        self.level = if status.is_usable(self.role) {
            self.map_demand(self.position)
        } else {
            0
        };

        log::trace!(
            "{:?}: raw {} position {} level {}",
            self.id(),
            self.raw.input1,
            self.position,
            self.level
        );
        self.level
    }

    /// Hand an inbound frame to the source
    pub fn on_frame(&mut self, frame: &CanFrame) -> bool {
        self.source.on_frame(frame)
    }

    /// Change a configuration entry
    ///
    /// # Returns
    /// * `Ok(true)` if the bus filter changed and must be re-registered
    pub fn set_entry(&mut self, name: &str, value: f64) -> Result<bool> {
        let mut updated = self.config.clone();
        updated.set_entry(name, value)?;
        updated.validate()?;

        let reattach = updated.car_type != self.config.car_type
            || updated.bus_index != self.config.bus_index;
        let rebuild = reattach
            || updated.adc_channel != self.config.adc_channel
            || updated.adc_channel2 != self.config.adc_channel2
            || updated.pot_count != self.config.pot_count
            || (matches!(self.source, SignalSource::SyntheticRamp(_))
                && (updated.minimum_level, updated.maximum_level)
                    != (self.config.minimum_level, self.config.maximum_level));

        if rebuild {
            self.source = SignalSource::for_config(&updated)?;
        }
        self.config = updated;
        Ok(reattach && self.source.uses_bus())
    }

    fn is_disabled_brake(&self) -> bool {
        self.role == PedalRole::Brake && self.config.maximum_level == 0
    }

    fn calculate_position(&self) -> u16 {
        let min = self.config.minimum_level;
        let max = self.config.maximum_level;
        match self.role {
            PedalRole::Accelerator => normalize::accelerator_position(&self.raw, &self.config),
            PedalRole::Brake => normalize::brake_position(self.raw.input1, min, max),
        }
    }

    fn map_demand(&self, position: u16) -> i16 {
        match self.role {
            PedalRole::Accelerator => normalize::accelerator_demand(position),
            PedalRole::Brake => normalize::regen_demand(
                position,
                self.config.minimum_regen,
                self.config.maximum_regen,
            ),
        }
    }

    fn update_status(&mut self, status: ValidationStatus, faults: &mut FaultTable) {
        if status == self.status {
            return;
        }

        if let Some(kind) = self.status.fault_kind() {
            faults.cancel(self.id(), kind);
        }
        match status.fault_kind() {
            Some(kind) => {
                log::error!("{:?}: {} (raw input {})", self.id(), kind, self.raw.input1);
                faults.raise(self.id(), kind);
            }
            None => log::info!("{:?}: normal operation", self.id()),
        }
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SimBus;
    use crate::config::PotTracking;
    use crate::faults::FaultKind;
    use crate::io::SimulatedIo;

    fn accelerator() -> Pedal {
        let config = PedalConfig::for_device(DeviceId::PotAccelerator)
            .unwrap()
            .with_range(400, 1800);
        Pedal::new(config).unwrap()
    }

    #[test]
    fn test_accelerator_scenario() {
        let mut io = SimulatedIo::new();
        let mut faults = FaultTable::new();
        let mut pedal = accelerator();

        io.set_analog(0, 1100);
        assert_eq!(pedal.tick(&io, None, &mut faults), 500);
        assert_eq!(pedal.position(), 500);
        assert!(pedal.status().is_ok());
    }

    #[test]
    fn test_out_of_range_accelerator_gives_zero() {
        let mut io = SimulatedIo::new();
        let mut faults = FaultTable::new();
        let mut pedal = accelerator();

        io.set_analog(0, 3000);
        assert_eq!(pedal.tick(&io, None, &mut faults), 0);
        assert_eq!(pedal.status(), ValidationStatus::ErrHigh);
        assert_eq!(pedal.position(), 1000);
        assert!(faults.is_active(DeviceId::PotAccelerator, FaultKind::SignalHigh));
    }

    #[test]
    fn test_status_change_swaps_fault() {
        let mut io = SimulatedIo::new();
        let mut faults = FaultTable::new();
        let mut pedal = accelerator();

        io.set_analog(0, 3000);
        pedal.tick(&io, None, &mut faults);
        io.set_analog(0, 0);
        pedal.tick(&io, None, &mut faults);

        assert_eq!(
            faults.active_faults(),
            vec![(DeviceId::PotAccelerator, FaultKind::SignalLow)]
        );
        io.set_analog(0, 1000);
        pedal.tick(&io, None, &mut faults);
        assert!(faults.active_faults().is_empty());
    }

    #[test]
    fn test_brake_high_is_full_regen() {
        let mut io = SimulatedIo::new();
        let mut faults = FaultTable::new();
        let config = PedalConfig::for_device(DeviceId::PotBrake)
            .unwrap()
            .with_regen(0, 50);
        let mut brake = Pedal::new(config).unwrap();

        io.set_analog(2, 4000);
        assert_eq!(brake.tick(&io, None, &mut faults), -500);
        assert_eq!(brake.status(), ValidationStatus::ErrHigh);
        assert!(faults.is_active(DeviceId::PotBrake, FaultKind::SignalHigh));

        io.set_analog(2, -100);
        assert_eq!(brake.tick(&io, None, &mut faults), 0);
        assert_eq!(brake.status(), ValidationStatus::ErrLow);
        assert!(!faults.is_active(DeviceId::PotBrake, FaultKind::SignalHigh));
    }

    #[test]
    fn test_disabled_brake() {
        let mut io = SimulatedIo::new();
        let mut faults = FaultTable::new();
        let config = PedalConfig::for_device(DeviceId::PotBrake)
            .unwrap()
            .with_range(0, 0);
        let mut brake = Pedal::new(config).unwrap();

        io.set_analog(2, 2500);
        assert_eq!(brake.tick(&io, None, &mut faults), 0);
        assert!(faults.active_faults().is_empty());
    }

    #[test]
    fn test_polled_pedal_loses_communication() {
        let io = SimulatedIo::new();
        let mut bus = SimBus::new();
        let mut faults = FaultTable::new();
        let config = PedalConfig::for_device(DeviceId::CanAccelerator)
            .unwrap()
            .with_range(0, 255);
        let mut pedal = Pedal::new(config).unwrap();

        pedal.tick(&io, Some(&mut bus), &mut faults);
        assert_eq!(pedal.status(), ValidationStatus::ErrMisc);

        let response = CanFrame::from_bytes(0x7E8, false, &[0x04, 0x62, 0xEE, 0xCB, 0x0A, 0, 0, 0]);
        pedal.on_frame(&response);
        pedal.tick(&io, Some(&mut bus), &mut faults);
        assert!(pedal.status().is_ok());
        assert!(!faults.is_active(DeviceId::CanAccelerator, FaultKind::CommunicationLost));

        for _ in 0..3 {
            pedal.tick(&io, Some(&mut bus), &mut faults);
        }
        assert_eq!(pedal.status(), ValidationStatus::ErrMisc);
        assert_eq!(pedal.level(), 0);
    }

    #[test]
    fn test_dual_pot_accelerator() {
        let mut io = SimulatedIo::new();
        let mut faults = FaultTable::new();
        let config = PedalConfig::for_device(DeviceId::PotAccelerator)
            .unwrap()
            .with_range(400, 1800)
            .with_second_pot(200, 900, PotTracking::Linear);
        let mut pedal = Pedal::new(config).unwrap();

        io.set_analog(0, 1100);
        io.set_analog(1, 620);
        assert_eq!(pedal.tick(&io, None, &mut faults), 550);
        assert_eq!(pedal.raw().input2, 620);
        assert!(pedal.status().is_ok());

        // second channel drifts to 700 per-mille
        io.set_analog(1, 690);
        assert_eq!(pedal.tick(&io, None, &mut faults), 0);
        assert_eq!(pedal.status(), ValidationStatus::Mismatch);
        assert!(faults.is_active(DeviceId::PotAccelerator, FaultKind::SignalMismatch));

        io.set_analog(1, 550);
        assert_eq!(pedal.tick(&io, None, &mut faults), 500);
        assert!(faults.active_faults().is_empty());
    }

    #[test]
    fn test_set_entry_enables_second_pot() {
        let mut io = SimulatedIo::new();
        let mut faults = FaultTable::new();
        let mut pedal = accelerator();
        pedal.set_entry("T2MN", 900.0).unwrap();
        pedal.set_entry("T2MX", 200.0).unwrap();
        pedal.set_entry("TTYPE", 2.0).unwrap();
        assert!(!pedal.set_entry("TPOT", 2.0).unwrap());

        io.set_analog(0, 1100);
        io.set_analog(1, 550);
        assert_eq!(pedal.tick(&io, None, &mut faults), 500);
        assert_eq!(pedal.raw().input2, 550);

        io.set_analog(1, 340);
        assert_eq!(pedal.tick(&io, None, &mut faults), 0);
        assert_eq!(pedal.status(), ValidationStatus::Mismatch);
    }

    #[test]
    fn test_set_entry_rebuilds_source() {
        let mut pedal = Pedal::new(PedalConfig::for_device(DeviceId::CanAccelerator).unwrap()).unwrap();
        assert!(pedal.set_entry("CANTHROT-CARTYPE", 2.0).unwrap());
        assert_eq!(pedal.filter().unwrap().id, 0x21);
        assert!(!pedal.set_entry("T1MX", 2000.0).unwrap());
        assert_eq!(pedal.config().maximum_level, 2000);
        assert!(pedal.set_entry("T1MX", 9000.0).is_err());
    }
}
