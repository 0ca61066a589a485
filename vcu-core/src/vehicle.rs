//! Vehicle registry
//!
//! Owns every configured device together with the fault table, the tick
//! scheduler and the buses. There is exactly one registry per vehicle and it
//! is passed around explicitly.
//!
//! Each call to [`Vehicle::advance`] first delivers all pending inbound
//! frames, then ticks the devices that became due in attach order:
//! accelerator, brake, motor controller. The motor controller therefore always
//! sees the pedal demands of the same step.

use crate::arbiter::MotorCommand;
use crate::bus::CanBus;
use crate::config::VehicleConfig;
use crate::faults::{FaultKind, FaultTable};
use crate::io::{AnalogInput, DigitalInput};
use crate::motor::{MotorController, PedalDemands};
use crate::pedal::Pedal;
use crate::prefs::PreferenceStore;
use crate::scheduler::TickScheduler;
use crate::telemetry::TelemetryReader;
use crate::types::{CanFrame, DeviceId, Result, VcuError};

/// Tick interval for pedals read from local inputs
pub const PEDAL_TICK_INTERVAL_US: u64 = 40_000;

/// Tick interval for pedals polled from another ECU
pub const POLLED_PEDAL_TICK_INTERVAL_US: u64 = 100_000;

fn pedal_interval(pedal: &Pedal) -> u64 {
    if pedal.bus_index().is_some() {
        POLLED_PEDAL_TICK_INTERVAL_US
    } else {
        PEDAL_TICK_INTERVAL_US
    }
}

fn bus_at<B: CanBus>(buses: &mut [B], index: Option<u8>) -> Option<&mut dyn CanBus> {
    index
        .and_then(|i| buses.get_mut(i as usize))
        .map(|b| b as &mut dyn CanBus)
}

pub struct Vehicle<B: CanBus> {
    accelerator: Option<Pedal>,
    brake: Option<Pedal>,
    motor: MotorController,
    faults: FaultTable,
    scheduler: TickScheduler,
    buses: Vec<B>,
}

impl<B: CanBus> Vehicle<B> {
    /// Build the registry and attach every device to its bus and the scheduler
    ///
    /// # Returns
    /// * `Err(VcuError::InvalidConfig)` if a device is misconfigured or refers
    ///   to a bus that does not exist
    pub fn new(config: VehicleConfig, buses: Vec<B>) -> Result<Self> {
        config.validate()?;
        let accelerator = config.accelerator.map(Pedal::new).transpose()?;
        let brake = config.brake.map(Pedal::new).transpose()?;
        let motor = MotorController::new(config.motor)?;

        let mut vehicle = Self {
            accelerator,
            brake,
            motor,
            faults: FaultTable::new(),
            scheduler: TickScheduler::new(),
            buses,
        };
        vehicle.attach_devices()?;
        Ok(vehicle)
    }

    fn check_bus(&self, device: DeviceId, index: Option<u8>) -> Result<()> {
        match index {
            Some(i) if i as usize >= self.buses.len() => Err(VcuError::InvalidConfig(format!(
                "{:?} is configured for bus {} but only {} bus(es) exist",
                device,
                i,
                self.buses.len()
            ))),
            _ => Ok(()),
        }
    }

    fn attach_pedal(&mut self, pedal: &Pedal) -> Result<()> {
        self.check_bus(pedal.id(), pedal.bus_index())?;
        if let (Some(filter), Some(index)) = (pedal.filter(), pedal.bus_index()) {
            self.buses[index as usize].attach(filter);
        }
        self.scheduler.attach(pedal.id(), pedal_interval(pedal))
    }

    fn attach_devices(&mut self) -> Result<()> {
        let pedals: Vec<Pedal> = self
            .accelerator
            .iter()
            .chain(self.brake.iter())
            .cloned()
            .collect();
        for pedal in &pedals {
            self.attach_pedal(pedal)?;
        }

        let motor_id = self.motor.id();
        let motor_bus = self.motor.bus_index();
        self.check_bus(motor_id, motor_bus)?;
        if let Some(index) = motor_bus {
            for filter in self.motor.filters() {
                self.buses[index as usize].attach(filter);
            }
        }
        self.scheduler.attach(motor_id, self.motor.tick_interval_us())
    }

    pub fn accelerator(&self) -> Option<&Pedal> {
        self.accelerator.as_ref()
    }

    pub fn brake(&self) -> Option<&Pedal> {
        self.brake.as_ref()
    }

    pub fn motor(&self) -> &MotorController {
        &self.motor
    }

    pub fn motor_mut(&mut self) -> &mut MotorController {
        &mut self.motor
    }

    pub fn faults(&self) -> &FaultTable {
        &self.faults
    }

    pub fn faults_mut(&mut self) -> &mut FaultTable {
        &mut self.faults
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    pub fn buses(&self) -> &[B] {
        &self.buses
    }

    pub fn buses_mut(&mut self) -> &mut [B] {
        &mut self.buses
    }

    /// Current configuration of every device
    pub fn configuration(&self) -> VehicleConfig {
        VehicleConfig {
            accelerator: self.accelerator.as_ref().map(|p| p.config().clone()),
            brake: self.brake.as_ref().map(|p| p.config().clone()),
            motor: self.motor.config().clone(),
        }
    }

    /// Write the current configuration to the preference store
    pub fn save_configuration(&self, store: &mut dyn PreferenceStore) {
        self.configuration().save(store);
        log::info!("configuration saved");
    }

    /// Change a configuration entry of one device
    ///
    /// Pedals whose bus or ECU profile changes are re-registered on the bus.
    pub fn set_entry(&mut self, device: DeviceId, name: &str, value: f64) -> Result<()> {
        if device == self.motor.id() {
            return self.motor.set_entry(name, value);
        }

        let mut updated = [&self.accelerator, &self.brake]
            .into_iter()
            .flatten()
            .find(|p| p.id() == device)
            .cloned()
            .ok_or(VcuError::UnknownDevice(device))?;
        let reattach = updated.set_entry(name, value)?;
        if reattach {
            self.check_bus(device, updated.bus_index())?;
            for bus in self.buses.iter_mut() {
                bus.detach(device);
            }
            self.attach_pedal(&updated)?;
        }

        if self.accelerator.as_ref().map(|p| p.id()) == Some(device) {
            self.accelerator = Some(updated);
        } else {
            self.brake = Some(updated);
        }
        Ok(())
    }

    /// Advance simulated time by `step_us`
    ///
    /// # Returns
    /// The motor commands issued during this step, oldest first
    pub fn advance<I: AnalogInput + DigitalInput>(&mut self, step_us: u64, io: &I) -> Vec<MotorCommand> {
        self.deliver_frames();

        let mut commands = Vec::new();
        for device in self.scheduler.advance(step_us) {
            if let Some(cmd) = self.tick_device(device, io) {
                commands.push(cmd);
            }
        }
        commands
    }

    fn deliver_frames(&mut self) {
        for index in 0..self.buses.len() {
            while let Some((frame, observers)) = self.buses[index].receive() {
                for observer in observers {
                    self.dispatch(observer, &frame);
                }
            }
        }
    }

    fn dispatch(&mut self, observer: DeviceId, frame: &CanFrame) {
        if observer == self.motor.id() {
            self.motor.on_frame(frame);
            return;
        }
        let pedal = self
            .accelerator
            .iter_mut()
            .chain(self.brake.iter_mut())
            .find(|p| p.id() == observer);
        match pedal {
            Some(pedal) => {
                pedal.on_frame(frame);
            }
            None => log::warn!("frame {} for unknown observer {:?}", frame, observer),
        }
    }

    fn tick_device<I: AnalogInput + DigitalInput>(
        &mut self,
        device: DeviceId,
        io: &I,
    ) -> Option<MotorCommand> {
        let faults = &mut self.faults;
        let buses = &mut self.buses;

        for pedal in self.accelerator.iter_mut().chain(self.brake.iter_mut()) {
            if pedal.id() == device {
                let bus = bus_at(buses, pedal.bus_index());
                pedal.tick(io, bus, faults);
                return None;
            }
        }

        if device != self.motor.id() {
            log::warn!("tick for unknown device {:?}", device);
            return None;
        }

        let pedal_lost = self
            .accelerator
            .iter()
            .chain(self.brake.iter())
            .any(|p| faults.is_active(p.id(), FaultKind::CommunicationLost));
        let demands = PedalDemands {
            accelerator: self.accelerator.as_ref().map_or(0, |p| p.level()),
            brake: self.brake.as_ref().map(|p| p.level()),
            pedal_communication_lost: pedal_lost,
        };
        let bus = bus_at(buses, self.motor.bus_index());
        Some(self.motor.tick(io, demands, bus, faults))
    }
}

impl<B: CanBus> TelemetryReader for Vehicle<B> {
    fn torque_actual(&self) -> f32 {
        self.motor.arbiter().torque_actual()
    }

    fn torque_available(&self) -> f32 {
        self.motor.arbiter().torque_available()
    }

    fn torque_requested(&self) -> f32 {
        self.motor.arbiter().torque_requested()
    }

    fn speed_actual(&self) -> i32 {
        self.motor.arbiter().speed_actual()
    }

    fn throttle(&self) -> i16 {
        self.motor.arbiter().throttle()
    }

    fn temperature_system(&self) -> i16 {
        self.motor.arbiter().temperature_system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::{Gear, OperationState};
    use crate::bus::SimBus;
    use crate::config::{MotorConfig, PedalConfig};
    use crate::io::SimulatedIo;
    use crate::prefs::MemoryPreferenceStore;

    fn config() -> VehicleConfig {
        VehicleConfig {
            accelerator: Some(
                PedalConfig::for_device(DeviceId::PotAccelerator)
                    .unwrap()
                    .with_range(400, 1800),
            ),
            brake: None,
            motor: MotorConfig::default(),
        }
    }

    #[test]
    fn test_missing_bus_rejected() {
        let mut config = config();
        config.motor = MotorConfig::for_device(DeviceId::Dmoc645).unwrap().with_bus(1);
        let result = Vehicle::new(config, vec![SimBus::new()]);
        assert!(matches!(result, Err(VcuError::InvalidConfig(_))));
    }

    #[test]
    fn test_devices_attached_to_scheduler() {
        let vehicle = Vehicle::new(config(), vec![SimBus::new()]).unwrap();
        assert_eq!(
            vehicle.scheduler().interval_of(DeviceId::PotAccelerator),
            Some(PEDAL_TICK_INTERVAL_US)
        );
        assert!(vehicle.scheduler().is_attached(DeviceId::TestInverter));
    }

    #[test]
    fn test_accelerator_drives_simulated_motor() {
        let mut vehicle = Vehicle::new(config(), vec![SimBus::new()]).unwrap();
        let arbiter = vehicle.motor_mut().arbiter_mut();
        arbiter.command_state(OperationState::Enable);
        arbiter.command_gear(Gear::Drive);

        let mut io = SimulatedIo::new();
        io.set_analog(0, 1100);
        for _ in 0..10 {
            vehicle.advance(100_000, &io);
        }
        assert_eq!(vehicle.accelerator().unwrap().level(), 500);
        assert_eq!(vehicle.throttle(), 500);
        assert_eq!(vehicle.torque_requested(), 150.0);
        assert!(vehicle.torque_actual() > 100.0);
    }

    #[test]
    fn test_set_entry_routes_to_device() {
        let mut vehicle = Vehicle::new(config(), vec![SimBus::new()]).unwrap();
        vehicle.set_entry(DeviceId::PotAccelerator, "T1MX", 2000.0).unwrap();
        assert_eq!(vehicle.accelerator().unwrap().config().maximum_level, 2000);

        vehicle.set_entry(DeviceId::TestInverter, "RPM", 8000.0).unwrap();
        assert_eq!(vehicle.motor().config().speed_max, 8000);

        assert!(matches!(
            vehicle.set_entry(DeviceId::PotBrake, "B1MX", 1.0),
            Err(VcuError::UnknownDevice(DeviceId::PotBrake))
        ));
    }

    #[test]
    fn test_polled_pedal_reattached_on_profile_change() {
        let mut config = config();
        config.accelerator = Some(PedalConfig::for_device(DeviceId::CanAccelerator).unwrap());
        let mut vehicle = Vehicle::new(config, vec![SimBus::new(), SimBus::new()]).unwrap();
        assert_eq!(vehicle.buses()[1].filters()[0].id, 0x7E8);

        vehicle
            .set_entry(DeviceId::CanAccelerator, "CANTHROT-CARTYPE", 2.0)
            .unwrap();
        let filters = vehicle.buses()[1].filters();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].id, 0x21);
        assert!(filters[0].extended);

        assert!(vehicle
            .set_entry(DeviceId::CanAccelerator, "CANTHROT-CANBUS", 2.0)
            .is_err());
        assert_eq!(vehicle.accelerator().unwrap().config().bus_index, 1);
    }

    #[test]
    fn test_save_configuration() {
        let vehicle = Vehicle::new(config(), vec![SimBus::new()]).unwrap();
        let mut store = MemoryPreferenceStore::new();
        vehicle.save_configuration(&mut store);

        let loaded = VehicleConfig::load(
            Some(DeviceId::PotAccelerator),
            None,
            DeviceId::TestInverter,
            &store,
        )
        .unwrap();
        assert_eq!(loaded.accelerator.unwrap().maximum_level, 1800);
    }
}
