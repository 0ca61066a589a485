//! Device configuration types
//!
//! Configuration is created once at startup, either from defaults, from the
//! preference store, or from a serialized file handled by the application.
//! During operation it only changes through the named configuration entries,
//! which validate their range before applying.

use crate::arbiter::PowerMode;
use crate::io::INPUT_NONE;
use crate::prefs::PreferenceStore;
use crate::types::{DeviceId, DeviceKind, Result, VcuError};
use serde::{Deserialize, Serialize};

/// Default tolerance band around the configured pedal range, in raw counts
pub const DEFAULT_TOLERANCE: u16 = 150;

/// Remote ECU a polled pedal talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EcuProfile {
    #[default]
    VolvoS80Gas,
    VolvoV50Diesel,
}

impl EcuProfile {
    /// Numeric car type as exposed on the configuration surface
    pub fn code(&self) -> u8 {
        match self {
            EcuProfile::VolvoS80Gas => 1,
            EcuProfile::VolvoV50Diesel => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(EcuProfile::VolvoS80Gas),
            2 => Some(EcuProfile::VolvoV50Diesel),
            _ => None,
        }
    }
}

/// How the channels of a potentiometer accelerator track pedal travel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PotTracking {
    /// Every channel rises with pedal travel
    #[default]
    Linear,
    /// The second channel falls while the first rises; a lone pot falls
    Inverse,
}

impl PotTracking {
    /// Throttle subtype as exposed on the configuration surface
    pub fn code(&self) -> u8 {
        match self {
            PotTracking::Linear => 1,
            PotTracking::Inverse => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(PotTracking::Linear),
            2 => Some(PotTracking::Inverse),
            _ => None,
        }
    }
}

/// A named, range-checked configuration value
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    /// Short name used to get/set the value
    pub name: &'static str,
    /// One-line description
    pub help: &'static str,
    pub min: f64,
    pub max: f64,
}

impl ConfigEntry {
    const fn new(name: &'static str, help: &'static str, min: f64, max: f64) -> Self {
        Self {
            name,
            help,
            min,
            max,
        }
    }

    /// Fail unless `value` lies within the entry's range
    pub fn check(&self, value: f64) -> Result<()> {
        if value.is_nan() || value < self.min || value > self.max {
            return Err(VcuError::ValueOutOfRange {
                name: self.name.to_string(),
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PedalField {
    MinimumLevel,
    MaximumLevel,
    MinimumRegen,
    MaximumRegen,
    AdcChannel,
    BusIndex,
    CarType,
    PotCount,
    Tracking,
    MinimumLevel2,
    MaximumLevel2,
    AdcChannel2,
}

/// Configuration of an accelerator or brake pedal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedalConfig {
    /// Which pedal device this configures
    pub device: DeviceId,

    /// Raw reading at released pedal
    pub minimum_level: u16,

    /// Raw reading at fully pressed pedal
    pub maximum_level: u16,

    /// Regen at minimal brake press, percent of max torque
    #[serde(default)]
    pub minimum_regen: u8,

    /// Regen at full brake press, percent of max torque
    #[serde(default = "default_maximum_regen")]
    pub maximum_regen: u8,

    /// Accepted excursion beyond the configured range, raw counts
    #[serde(default = "default_tolerance")]
    pub tolerance: u16,

    /// ECU profile for bus-polled pedals
    #[serde(default)]
    pub car_type: EcuProfile,

    /// Bus the pedal is polled on
    #[serde(default)]
    pub bus_index: u8,

    /// Analog channel for potentiometer pedals
    #[serde(default)]
    pub adc_channel: u8,

    /// Potentiometers on the accelerator, 1 or 2
    #[serde(default = "default_pot_count")]
    pub pot_count: u8,

    /// How the potentiometer channels track each other
    #[serde(default)]
    pub tracking: PotTracking,

    /// Raw reading of the second channel at released pedal
    #[serde(default)]
    pub minimum_level2: u16,

    /// Raw reading of the second channel at fully pressed pedal
    #[serde(default)]
    pub maximum_level2: u16,

    /// Analog channel of the second potentiometer
    #[serde(default = "default_adc_channel2")]
    pub adc_channel2: u8,
}

fn default_pot_count() -> u8 {
    1
}

fn default_adc_channel2() -> u8 {
    1
}

fn default_maximum_regen() -> u8 {
    50
}

fn default_tolerance() -> u16 {
    DEFAULT_TOLERANCE
}

impl Default for PedalConfig {
    fn default() -> Self {
        Self::base(DeviceId::PotAccelerator, 20, 3150)
    }
}

impl PedalConfig {
    fn base(device: DeviceId, minimum_level: u16, maximum_level: u16) -> Self {
        Self {
            device,
            minimum_level,
            maximum_level,
            minimum_regen: 0,
            maximum_regen: default_maximum_regen(),
            tolerance: DEFAULT_TOLERANCE,
            car_type: EcuProfile::default(),
            bus_index: 0,
            adc_channel: 0,
            pot_count: default_pot_count(),
            tracking: PotTracking::default(),
            minimum_level2: 0,
            maximum_level2: 0,
            adc_channel2: default_adc_channel2(),
        }
    }

    /// Default configuration for a pedal device
    ///
    /// # Returns
    /// * `Err(VcuError::InvalidConfig)` if `device` is not a pedal
    pub fn for_device(device: DeviceId) -> Result<Self> {
        let config = match device {
            DeviceId::PotAccelerator => Self::base(device, 20, 3150),
            DeviceId::CanAccelerator => Self {
                bus_index: 1,
                ..Self::base(device, 400, 1800)
            },
            DeviceId::TestAccelerator => Self::base(device, 100, 1700),
            DeviceId::PotBrake => Self {
                adc_channel: 2,
                ..Self::base(device, 100, 3200)
            },
            DeviceId::CanBrake => Self {
                bus_index: 1,
                ..Self::base(device, 2, 255)
            },
            DeviceId::TestBrake => Self::base(device, 100, 1700),
            other => {
                return Err(VcuError::InvalidConfig(format!(
                    "{:?} is not a pedal device",
                    other
                )))
            }
        };
        Ok(config)
    }

    /// Builder method: set the raw range
    pub fn with_range(mut self, minimum_level: u16, maximum_level: u16) -> Self {
        self.minimum_level = minimum_level;
        self.maximum_level = maximum_level;
        self
    }

    /// Builder method: set the regen range in percent
    pub fn with_regen(mut self, minimum_regen: u8, maximum_regen: u8) -> Self {
        self.minimum_regen = minimum_regen;
        self.maximum_regen = maximum_regen;
        self
    }

    /// Builder method: set the tolerance band
    pub fn with_tolerance(mut self, tolerance: u16) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Builder method: set the ECU profile
    pub fn with_car_type(mut self, car_type: EcuProfile) -> Self {
        self.car_type = car_type;
        self
    }

    /// Builder method: set the bus index
    pub fn with_bus(mut self, bus_index: u8) -> Self {
        self.bus_index = bus_index;
        self
    }

    /// Builder method: set the analog channel
    pub fn with_adc_channel(mut self, adc_channel: u8) -> Self {
        self.adc_channel = adc_channel;
        self
    }

    /// Builder method: add a second potentiometer channel
    pub fn with_second_pot(
        mut self,
        minimum_level2: u16,
        maximum_level2: u16,
        tracking: PotTracking,
    ) -> Self {
        self.pot_count = 2;
        self.minimum_level2 = minimum_level2;
        self.maximum_level2 = maximum_level2;
        self.tracking = tracking;
        self
    }

    /// Builder method: set the channel tracking
    pub fn with_tracking(mut self, tracking: PotTracking) -> Self {
        self.tracking = tracking;
        self
    }

    /// True if a second potentiometer cross-checks the first
    pub fn is_dual_pot(&self) -> bool {
        self.pot_count > 1
    }

    pub fn is_brake(&self) -> bool {
        self.device.kind() == DeviceKind::Brake
    }

    /// Check the configuration for values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.device.kind(), DeviceKind::Throttle | DeviceKind::Brake) {
            return Err(VcuError::InvalidConfig(format!(
                "{:?} is not a pedal device",
                self.device
            )));
        }
        // A brake with maximum level 0 is disabled, not misconfigured
        let disabled_brake = self.is_brake() && self.maximum_level == 0;
        if self.minimum_level == self.maximum_level && !disabled_brake {
            return Err(VcuError::InvalidConfig(format!(
                "{:?}: minimum and maximum level are both {}",
                self.device, self.minimum_level
            )));
        }
        if self.minimum_regen > 100 || self.maximum_regen > 100 {
            return Err(VcuError::InvalidConfig(format!(
                "{:?}: regen must be within 0-100%",
                self.device
            )));
        }
        if !(1..=2).contains(&self.pot_count) {
            return Err(VcuError::InvalidConfig(format!(
                "{:?}: {} potentiometers configured, 1 or 2 supported",
                self.device, self.pot_count
            )));
        }
        if self.is_dual_pot() {
            if self.device != DeviceId::PotAccelerator {
                return Err(VcuError::InvalidConfig(format!(
                    "{:?} has no second potentiometer",
                    self.device
                )));
            }
            if self.minimum_level2 == self.maximum_level2 {
                return Err(VcuError::InvalidConfig(format!(
                    "{:?}: second channel minimum and maximum level are both {}",
                    self.device, self.minimum_level2
                )));
            }
        }
        Ok(())
    }

    fn field_entries(&self) -> Vec<(ConfigEntry, PedalField)> {
        let brake = self.is_brake();
        let mut entries = Vec::new();

        if brake {
            entries.push((ConfigEntry::new("B1MN", "Set brake min value", 0.0, 4096.0), PedalField::MinimumLevel));
            entries.push((ConfigEntry::new("B1MX", "Set brake max value", 0.0, 4096.0), PedalField::MaximumLevel));
            entries.push((
                ConfigEntry::new("BMINR", "Percent of full torque for start of brake regen", 0.0, 100.0),
                PedalField::MinimumRegen,
            ));
            entries.push((
                ConfigEntry::new("BMAXR", "Percent of full torque for maximum brake regen", 0.0, 100.0),
                PedalField::MaximumRegen,
            ));
        } else {
            entries.push((ConfigEntry::new("T1MN", "Set throttle 1 min value", 0.0, 4096.0), PedalField::MinimumLevel));
            entries.push((ConfigEntry::new("T1MX", "Set throttle 1 max value", 0.0, 4096.0), PedalField::MaximumLevel));
        }

        match self.device {
            DeviceId::PotAccelerator => {
                entries.push((
                    ConfigEntry::new("TPOT", "Number of pots to use (1 or 2)", 1.0, 2.0),
                    PedalField::PotCount,
                ));
                entries.push((
                    ConfigEntry::new("TTYPE", "Set throttle subtype (1=std linear, 2=inverse)", 1.0, 2.0),
                    PedalField::Tracking,
                ));
                entries.push((
                    ConfigEntry::new("T1ADC", "Set throttle 1 ADC pin", 0.0, 255.0),
                    PedalField::AdcChannel,
                ));
                entries.push((ConfigEntry::new("T2ADC", "Set throttle 2 ADC pin", 0.0, 255.0), PedalField::AdcChannel2));
                entries.push((ConfigEntry::new("T2MN", "Set throttle 2 min value", 0.0, 4096.0), PedalField::MinimumLevel2));
                entries.push((ConfigEntry::new("T2MX", "Set throttle 2 max value", 0.0, 4096.0), PedalField::MaximumLevel2));
            }
            DeviceId::PotBrake => entries.push((
                ConfigEntry::new("B1ADC", "Set brake ADC pin", 0.0, 255.0),
                PedalField::AdcChannel,
            )),
            DeviceId::CanAccelerator => {
                entries.push((
                    ConfigEntry::new("CANTHROT-CANBUS", "Set which CAN bus to connect to (0-2)", 0.0, 2.0),
                    PedalField::BusIndex,
                ));
                entries.push((
                    ConfigEntry::new(
                        "CANTHROT-CARTYPE",
                        "Set CAN pedal type (1=Volvo S80 Gasoline, 2=Volvo V50 Diesel)",
                        1.0,
                        2.0,
                    ),
                    PedalField::CarType,
                ));
            }
            DeviceId::CanBrake => {
                entries.push((
                    ConfigEntry::new("CANBRAKE-CANBUS", "Set which CAN bus to connect to (0-2)", 0.0, 2.0),
                    PedalField::BusIndex,
                ));
                entries.push((
                    ConfigEntry::new(
                        "CANBRAKE-CARTYPE",
                        "Set CAN pedal type (1=Volvo S80 Gasoline, 2=Volvo V50 Diesel)",
                        1.0,
                        2.0,
                    ),
                    PedalField::CarType,
                ));
            }
            _ => {}
        }
        entries
    }

    /// Configuration entries exposed by this pedal
    pub fn entries(&self) -> Vec<ConfigEntry> {
        self.field_entries().into_iter().map(|(e, _)| e).collect()
    }

    fn find_field(&self, name: &str) -> Result<(ConfigEntry, PedalField)> {
        self.field_entries()
            .into_iter()
            .find(|(e, _)| e.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| VcuError::UnknownConfigEntry(name.to_string()))
    }

    /// Read a configuration entry by name
    pub fn get_entry(&self, name: &str) -> Result<f64> {
        let (_, field) = self.find_field(name)?;
        let value = match field {
            PedalField::MinimumLevel => self.minimum_level as f64,
            PedalField::MaximumLevel => self.maximum_level as f64,
            PedalField::MinimumRegen => self.minimum_regen as f64,
            PedalField::MaximumRegen => self.maximum_regen as f64,
            PedalField::AdcChannel => self.adc_channel as f64,
            PedalField::BusIndex => self.bus_index as f64,
            PedalField::CarType => self.car_type.code() as f64,
            PedalField::PotCount => self.pot_count as f64,
            PedalField::Tracking => self.tracking.code() as f64,
            PedalField::MinimumLevel2 => self.minimum_level2 as f64,
            PedalField::MaximumLevel2 => self.maximum_level2 as f64,
            PedalField::AdcChannel2 => self.adc_channel2 as f64,
        };
        Ok(value)
    }

    /// Set a configuration entry by name after checking its range
    pub fn set_entry(&mut self, name: &str, value: f64) -> Result<()> {
        let (entry, field) = self.find_field(name)?;
        entry.check(value)?;
        match field {
            PedalField::MinimumLevel => self.minimum_level = value as u16,
            PedalField::MaximumLevel => self.maximum_level = value as u16,
            PedalField::MinimumRegen => self.minimum_regen = value as u8,
            PedalField::MaximumRegen => self.maximum_regen = value as u8,
            PedalField::AdcChannel => self.adc_channel = value as u8,
            PedalField::BusIndex => self.bus_index = value as u8,
            PedalField::CarType => {
                self.car_type = EcuProfile::from_code(value as u8)
                    .ok_or_else(|| VcuError::InvalidConfig(format!("unknown car type {}", value)))?
            }
            PedalField::PotCount => self.pot_count = value as u8,
            PedalField::Tracking => {
                self.tracking = PotTracking::from_code(value as u8)
                    .ok_or_else(|| VcuError::InvalidConfig(format!("unknown throttle type {}", value)))?
            }
            PedalField::MinimumLevel2 => self.minimum_level2 = value as u16,
            PedalField::MaximumLevel2 => self.maximum_level2 = value as u16,
            PedalField::AdcChannel2 => self.adc_channel2 = value as u8,
        }
        log::info!("{:?}: {} set to {}", self.device, entry.name, value);
        Ok(())
    }

    /// Load the pedal configuration from the preference store
    ///
    /// Falls back to the device defaults when the stored checksum is invalid.
    pub fn load(device: DeviceId, store: &dyn PreferenceStore) -> Result<Self> {
        let mut config = Self::for_device(device)?;
        if !store.checksum_valid(device) {
            log::info!("{}: invalid checksum, using hard coded config values", device);
            return Ok(config);
        }

        log::debug!("{}: valid checksum, using stored config values", device);
        let keys = PedalKeys::for_config(&config);
        config.minimum_level = read_u16(store, device, keys.minimum, config.minimum_level);
        config.maximum_level = read_u16(store, device, keys.maximum, config.maximum_level);
        config.tolerance = read_u16(store, device, "Tolerance", config.tolerance);
        config.bus_index = read_u8(store, device, "CanbusNum", config.bus_index);
        config.adc_channel = read_u8(store, device, keys.adc, config.adc_channel);
        let car_type = read_u8(store, device, keys.car_type, config.car_type.code());
        config.car_type = EcuProfile::from_code(car_type).unwrap_or(config.car_type);
        if config.is_brake() {
            config.minimum_regen = read_u8(store, device, "BrakeMinRegen", config.minimum_regen);
            config.maximum_regen = read_u8(store, device, "BrakeMaxRegen", config.maximum_regen);
        }
        if device == DeviceId::PotAccelerator {
            config.pot_count = read_u8(store, device, "NumThrottles", config.pot_count);
            let tracking = read_u8(store, device, "ThrottleType", config.tracking.code());
            config.tracking = PotTracking::from_code(tracking).unwrap_or(config.tracking);
            config.minimum_level2 = read_u16(store, device, "ThrottleMin2", config.minimum_level2);
            config.maximum_level2 = read_u16(store, device, "ThrottleMax2", config.maximum_level2);
            config.adc_channel2 = read_u8(store, device, "ADC2", config.adc_channel2);
        }

        log::debug!(
            "{:?} MIN: {} MAX: {} Type: {}",
            device,
            config.minimum_level,
            config.maximum_level,
            config.car_type.code()
        );
        Ok(config)
    }

    /// Store the pedal configuration and refresh the checksum
    pub fn save(&self, store: &mut dyn PreferenceStore) {
        let keys = PedalKeys::for_config(self);
        store.write(self.device, keys.minimum, self.minimum_level as f64);
        store.write(self.device, keys.maximum, self.maximum_level as f64);
        store.write(self.device, "Tolerance", self.tolerance as f64);
        store.write(self.device, "CanbusNum", self.bus_index as f64);
        store.write(self.device, keys.adc, self.adc_channel as f64);
        store.write(self.device, keys.car_type, self.car_type.code() as f64);
        if self.is_brake() {
            store.write(self.device, "BrakeMinRegen", self.minimum_regen as f64);
            store.write(self.device, "BrakeMaxRegen", self.maximum_regen as f64);
        }
        if self.device == DeviceId::PotAccelerator {
            store.write(self.device, "NumThrottles", self.pot_count as f64);
            store.write(self.device, "ThrottleType", self.tracking.code() as f64);
            store.write(self.device, "ThrottleMin2", self.minimum_level2 as f64);
            store.write(self.device, "ThrottleMax2", self.maximum_level2 as f64);
            store.write(self.device, "ADC2", self.adc_channel2 as f64);
        }
        store.save_checksum(self.device);
    }
}

struct PedalKeys {
    minimum: &'static str,
    maximum: &'static str,
    adc: &'static str,
    car_type: &'static str,
}

impl PedalKeys {
    fn for_config(config: &PedalConfig) -> Self {
        if config.is_brake() {
            Self {
                minimum: "BrakeMin",
                maximum: "BrakeMax",
                adc: "BrakeADC",
                car_type: "BrakeCarType",
            }
        } else {
            Self {
                minimum: "ThrottleMin1",
                maximum: "ThrottleMax1",
                adc: "ThrottleADC1",
                car_type: "ThrottleCarType",
            }
        }
    }
}

fn read_u16(store: &dyn PreferenceStore, device: DeviceId, key: &str, default: u16) -> u16 {
    store
        .read_or(device, key, default as f64)
        .clamp(0.0, u16::MAX as f64) as u16
}

fn read_u8(store: &dyn PreferenceStore, device: DeviceId, key: &str, default: u8) -> u8 {
    store
        .read_or(device, key, default as f64)
        .clamp(0.0, u8::MAX as f64) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MotorField {
    TorqueMax,
    SpeedMax,
    EnableInput,
    ForwardInput,
    ReverseInput,
}

/// Configuration of the motor controller and its backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    /// Which inverter backend drives the motor
    #[serde(default = "default_motor_device")]
    pub device: DeviceId,

    /// Maximum motor speed in rpm
    #[serde(default = "default_speed_max")]
    pub speed_max: u16,

    /// Maximum motor torque in Nm
    #[serde(default = "default_torque_max")]
    pub torque_max: f32,

    /// Torque or speed control
    #[serde(default)]
    pub power_mode: PowerMode,

    /// Digital input that enables the inverter (255 = none)
    #[serde(default = "default_input_none")]
    pub enable_input: u8,

    /// Digital input that selects DRIVE (255 = none)
    #[serde(default = "default_input_none")]
    pub forward_input: u8,

    /// Digital input that selects REVERSE (255 = none)
    #[serde(default = "default_input_none")]
    pub reverse_input: u8,

    /// Bus the inverter is attached to
    #[serde(default)]
    pub bus_index: u8,

    /// Time without any inverter frame before communication is considered lost
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_ms: u32,
}

fn default_motor_device() -> DeviceId {
    DeviceId::TestInverter
}

fn default_speed_max() -> u16 {
    6000
}

fn default_torque_max() -> f32 {
    300.0
}

fn default_input_none() -> u8 {
    INPUT_NONE
}

fn default_liveness_timeout() -> u32 {
    1000
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            device: default_motor_device(),
            speed_max: default_speed_max(),
            torque_max: default_torque_max(),
            power_mode: PowerMode::default(),
            enable_input: INPUT_NONE,
            forward_input: INPUT_NONE,
            reverse_input: INPUT_NONE,
            bus_index: 0,
            liveness_timeout_ms: default_liveness_timeout(),
        }
    }
}

impl MotorConfig {
    /// Default configuration for a motor controller backend
    pub fn for_device(device: DeviceId) -> Result<Self> {
        if device.kind() != DeviceKind::MotorController {
            return Err(VcuError::InvalidConfig(format!(
                "{:?} is not a motor controller",
                device
            )));
        }
        Ok(Self {
            device,
            ..Self::default()
        })
    }

    /// Builder method: set speed and torque limits
    pub fn with_limits(mut self, speed_max: u16, torque_max: f32) -> Self {
        self.speed_max = speed_max;
        self.torque_max = torque_max;
        self
    }

    /// Builder method: set the power mode
    pub fn with_power_mode(mut self, power_mode: PowerMode) -> Self {
        self.power_mode = power_mode;
        self
    }

    /// Builder method: set the enable/forward/reverse digital inputs
    pub fn with_inputs(mut self, enable: u8, forward: u8, reverse: u8) -> Self {
        self.enable_input = enable;
        self.forward_input = forward;
        self.reverse_input = reverse;
        self
    }

    /// Builder method: set the bus index
    pub fn with_bus(mut self, bus_index: u8) -> Self {
        self.bus_index = bus_index;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.kind() != DeviceKind::MotorController {
            return Err(VcuError::InvalidConfig(format!(
                "{:?} is not a motor controller",
                self.device
            )));
        }
        if !(self.torque_max.is_finite() && self.torque_max >= 0.0) {
            return Err(VcuError::InvalidConfig(format!(
                "torque limit {} is not a valid torque",
                self.torque_max
            )));
        }
        Ok(())
    }

    fn field_entries() -> Vec<(ConfigEntry, MotorField)> {
        vec![
            (ConfigEntry::new("TORQ", "Set torque upper limit (Nm)", 0.0, 5000.0), MotorField::TorqueMax),
            (ConfigEntry::new("RPM", "Set maximum RPM", 0.0, 30000.0), MotorField::SpeedMax),
            (
                ConfigEntry::new("ENABLEIN", "Digital input to enable motor controller (0-11, 255 for none)", 0.0, 255.0),
                MotorField::EnableInput,
            ),
            (
                ConfigEntry::new("FWDIN", "Digital input to enable forward motion (0-11, 255 for none)", 0.0, 255.0),
                MotorField::ForwardInput,
            ),
            (
                ConfigEntry::new("REVIN", "Digital input to enable reverse motion (0-11, 255 for none)", 0.0, 255.0),
                MotorField::ReverseInput,
            ),
        ]
    }

    /// Configuration entries exposed by the motor controller
    pub fn entries(&self) -> Vec<ConfigEntry> {
        Self::field_entries().into_iter().map(|(e, _)| e).collect()
    }

    fn find_field(name: &str) -> Result<(ConfigEntry, MotorField)> {
        Self::field_entries()
            .into_iter()
            .find(|(e, _)| e.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| VcuError::UnknownConfigEntry(name.to_string()))
    }

    pub fn get_entry(&self, name: &str) -> Result<f64> {
        let (_, field) = Self::find_field(name)?;
        let value = match field {
            MotorField::TorqueMax => self.torque_max as f64,
            MotorField::SpeedMax => self.speed_max as f64,
            MotorField::EnableInput => self.enable_input as f64,
            MotorField::ForwardInput => self.forward_input as f64,
            MotorField::ReverseInput => self.reverse_input as f64,
        };
        Ok(value)
    }

    pub fn set_entry(&mut self, name: &str, value: f64) -> Result<()> {
        let (entry, field) = Self::find_field(name)?;
        entry.check(value)?;
        match field {
            MotorField::TorqueMax => self.torque_max = value as f32,
            MotorField::SpeedMax => self.speed_max = value as u16,
            MotorField::EnableInput => self.enable_input = value as u8,
            MotorField::ForwardInput => self.forward_input = value as u8,
            MotorField::ReverseInput => self.reverse_input = value as u8,
        }
        log::info!("{:?}: {} set to {}", self.device, entry.name, value);
        Ok(())
    }

    /// Load the motor configuration from the preference store
    pub fn load(device: DeviceId, store: &dyn PreferenceStore) -> Result<Self> {
        let mut config = Self::for_device(device)?;
        if !store.checksum_valid(device) {
            log::info!("{}: invalid checksum, using hard coded config values", device);
            return Ok(config);
        }

        config.speed_max = read_u16(store, device, "MaxRPM", config.speed_max);
        config.torque_max = store.read_or(device, "MaxTorque", config.torque_max as f64) as f32;
        config.enable_input = read_u8(store, device, "EnableIn", config.enable_input);
        config.forward_input = read_u8(store, device, "ForwardIn", config.forward_input);
        config.reverse_input = read_u8(store, device, "ReverseIn", config.reverse_input);
        config.bus_index = read_u8(store, device, "CanbusNum", config.bus_index);
        config.power_mode = match read_u8(store, device, "PowerMode", 0) {
            1 => PowerMode::Speed,
            _ => PowerMode::Torque,
        };
        config.liveness_timeout_ms = store
            .read_or(device, "LivenessTimeout", config.liveness_timeout_ms as f64)
            .clamp(0.0, u32::MAX as f64) as u32;

        log::info!("MaxTorque: {:.1} MaxRPM: {}", config.torque_max, config.speed_max);
        Ok(config)
    }

    /// Store the motor configuration and refresh the checksum
    pub fn save(&self, store: &mut dyn PreferenceStore) {
        store.write(self.device, "MaxRPM", self.speed_max as f64);
        store.write(self.device, "MaxTorque", self.torque_max as f64);
        store.write(self.device, "EnableIn", self.enable_input as f64);
        store.write(self.device, "ForwardIn", self.forward_input as f64);
        store.write(self.device, "ReverseIn", self.reverse_input as f64);
        store.write(self.device, "CanbusNum", self.bus_index as f64);
        let mode = match self.power_mode {
            PowerMode::Torque => 0.0,
            PowerMode::Speed => 1.0,
        };
        store.write(self.device, "PowerMode", mode);
        store.write(self.device, "LivenessTimeout", self.liveness_timeout_ms as f64);
        store.save_checksum(self.device);
    }
}

/// Devices making up one vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleConfig {
    #[serde(default)]
    pub accelerator: Option<PedalConfig>,
    #[serde(default)]
    pub brake: Option<PedalConfig>,
    #[serde(default)]
    pub motor: MotorConfig,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            accelerator: Some(PedalConfig::default()),
            brake: None,
            motor: MotorConfig::default(),
        }
    }
}

impl VehicleConfig {
    /// Load every device configuration from the preference store
    pub fn load(
        accelerator: Option<DeviceId>,
        brake: Option<DeviceId>,
        motor: DeviceId,
        store: &dyn PreferenceStore,
    ) -> Result<Self> {
        let config = Self {
            accelerator: accelerator.map(|d| PedalConfig::load(d, store)).transpose()?,
            brake: brake.map(|d| PedalConfig::load(d, store)).transpose()?,
            motor: MotorConfig::load(motor, store)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Store every device configuration
    pub fn save(&self, store: &mut dyn PreferenceStore) {
        if let Some(accelerator) = &self.accelerator {
            accelerator.save(store);
        }
        if let Some(brake) = &self.brake {
            brake.save(store);
        }
        self.motor.save(store);
    }

    /// Check that every device is of the right kind and sanely configured
    pub fn validate(&self) -> Result<()> {
        if let Some(accelerator) = &self.accelerator {
            if accelerator.device.kind() != DeviceKind::Throttle {
                return Err(VcuError::InvalidConfig(format!(
                    "{:?} cannot be used as accelerator",
                    accelerator.device
                )));
            }
            accelerator.validate()?;
        }
        if let Some(brake) = &self.brake {
            if brake.device.kind() != DeviceKind::Brake {
                return Err(VcuError::InvalidConfig(format!(
                    "{:?} cannot be used as brake",
                    brake.device
                )));
            }
            brake.validate()?;
        }
        self.motor.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPreferenceStore;

    #[test]
    fn test_device_defaults() {
        let can = PedalConfig::for_device(DeviceId::CanAccelerator).unwrap();
        assert_eq!((can.minimum_level, can.maximum_level), (400, 1800));
        assert_eq!(can.bus_index, 1);

        let brake = PedalConfig::for_device(DeviceId::PotBrake).unwrap();
        assert_eq!((brake.minimum_level, brake.maximum_level), (100, 3200));
        assert_eq!((brake.minimum_regen, brake.maximum_regen), (0, 50));
        assert_eq!(brake.adc_channel, 2);
        assert_eq!(brake.tolerance, DEFAULT_TOLERANCE);

        assert!(PedalConfig::for_device(DeviceId::Dmoc645).is_err());
    }

    #[test]
    fn test_pedal_config_builder() {
        let config = PedalConfig::for_device(DeviceId::CanBrake)
            .unwrap()
            .with_range(10, 200)
            .with_regen(5, 60)
            .with_tolerance(20)
            .with_car_type(EcuProfile::VolvoS80Gas)
            .with_bus(0);

        assert_eq!(config.minimum_level, 10);
        assert_eq!(config.maximum_regen, 60);
        assert_eq!(config.tolerance, 20);
        assert_eq!(config.bus_index, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_entry_surface_validates_range() {
        let mut config = PedalConfig::for_device(DeviceId::PotAccelerator).unwrap();
        config.set_entry("T1MN", 400.0).unwrap();
        assert_eq!(config.minimum_level, 400);
        assert_eq!(config.get_entry("t1mn").unwrap(), 400.0);

        assert!(matches!(
            config.set_entry("T1MX", 5000.0),
            Err(VcuError::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            config.set_entry("BMAXR", 50.0),
            Err(VcuError::UnknownConfigEntry(_))
        ));
    }

    #[test]
    fn test_brake_regen_entries() {
        let mut config = PedalConfig::for_device(DeviceId::CanBrake).unwrap();
        let names: Vec<_> = config.entries().iter().map(|e| e.name).collect();
        assert!(names.contains(&"BMINR"));
        assert!(names.contains(&"CANBRAKE-CARTYPE"));

        config.set_entry("BMAXR", 80.0).unwrap();
        assert_eq!(config.maximum_regen, 80);
        assert!(config.set_entry("BMINR", 101.0).is_err());
        config.set_entry("CANBRAKE-CARTYPE", 2.0).unwrap();
        assert_eq!(config.car_type, EcuProfile::VolvoV50Diesel);
    }

    #[test]
    fn test_validate_rejects_empty_range() {
        let config = PedalConfig::default().with_range(500, 500);
        assert!(config.validate().is_err());

        let disabled_brake = PedalConfig::for_device(DeviceId::PotBrake)
            .unwrap()
            .with_range(0, 0);
        assert!(disabled_brake.validate().is_ok());
    }

    #[test]
    fn test_load_without_checksum_uses_defaults() {
        let mut store = MemoryPreferenceStore::new();
        store.write(DeviceId::CanAccelerator, "ThrottleMin1", 123.0);

        let config = PedalConfig::load(DeviceId::CanAccelerator, &store).unwrap();
        assert_eq!(config.minimum_level, 400);
    }

    #[test]
    fn test_save_then_load() {
        let mut store = MemoryPreferenceStore::new();
        let config = PedalConfig::for_device(DeviceId::PotBrake)
            .unwrap()
            .with_range(150, 3000)
            .with_regen(10, 70);
        config.save(&mut store);

        let loaded = PedalConfig::load(DeviceId::PotBrake, &store).unwrap();
        assert_eq!(loaded, config);

        let motor = MotorConfig::for_device(DeviceId::Dmoc645)
            .unwrap()
            .with_limits(8000, 250.0)
            .with_power_mode(PowerMode::Speed);
        motor.save(&mut store);
        assert_eq!(MotorConfig::load(DeviceId::Dmoc645, &store).unwrap(), motor);
    }

    #[test]
    fn test_liveness_timeout_survives_reload() {
        let mut store = MemoryPreferenceStore::new();
        let mut motor = MotorConfig::for_device(DeviceId::CkInverter).unwrap();
        motor.liveness_timeout_ms = 400;
        motor.save(&mut store);

        let loaded = MotorConfig::load(DeviceId::CkInverter, &store).unwrap();
        assert_eq!(loaded.liveness_timeout_ms, 400);
    }

    #[test]
    fn test_dual_pot_save_then_load() {
        let mut store = MemoryPreferenceStore::new();
        let config = PedalConfig::default()
            .with_range(300, 3000)
            .with_second_pot(3100, 400, PotTracking::Inverse)
            .with_adc_channel(4);
        config.save(&mut store);

        let loaded = PedalConfig::load(DeviceId::PotAccelerator, &store).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.is_dual_pot());
    }

    #[test]
    fn test_dual_pot_entries() {
        let mut config = PedalConfig::default();
        config.set_entry("TPOT", 2.0).unwrap();
        config.set_entry("TTYPE", 2.0).unwrap();
        config.set_entry("T2MN", 100.0).unwrap();
        config.set_entry("T2MX", 2000.0).unwrap();
        config.set_entry("T2ADC", 3.0).unwrap();
        assert!(config.is_dual_pot());
        assert_eq!(config.tracking, PotTracking::Inverse);
        assert_eq!(config.get_entry("T2MX").unwrap(), 2000.0);
        assert_eq!(config.adc_channel2, 3);
        assert!(config.validate().is_ok());

        assert!(config.set_entry("TPOT", 3.0).is_err());
        assert!(config.set_entry("TTYPE", 0.0).is_err());

        let can = PedalConfig::for_device(DeviceId::CanAccelerator).unwrap();
        assert!(!can.entries().iter().any(|e| e.name == "TPOT"));
    }

    #[test]
    fn test_validate_dual_pot() {
        let dual = PedalConfig::default().with_second_pot(500, 500, PotTracking::Linear);
        assert!(dual.validate().is_err());

        let brake = PedalConfig::for_device(DeviceId::PotBrake)
            .unwrap()
            .with_second_pot(100, 3200, PotTracking::Linear);
        assert!(brake.validate().is_err());

        let mut config = PedalConfig::default();
        config.pot_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_motor_entries() {
        let mut config = MotorConfig::default();
        config.set_entry("RPM", 8000.0).unwrap();
        config.set_entry("TORQ", 150.5).unwrap();
        assert_eq!(config.speed_max, 8000);
        assert_eq!(config.get_entry("TORQ").unwrap(), 150.5);
        assert!(config.set_entry("RPM", 40000.0).is_err());
        assert_eq!(config.entries().len(), 5);
    }

    #[test]
    fn test_vehicle_config_validation() {
        let mut config = VehicleConfig::default();
        assert!(config.validate().is_ok());

        config.brake = Some(PedalConfig::for_device(DeviceId::CanAccelerator).unwrap());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserialization() {
        let json = r#"{ "device": "CanAccelerator", "minimum_level": 400, "maximum_level": 1800 }"#;
        let config: PedalConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.tolerance, DEFAULT_TOLERANCE);
        assert_eq!(config.maximum_regen, 50);
        assert_eq!(config.car_type, EcuProfile::VolvoS80Gas);
        assert_eq!(config.pot_count, 1);
        assert_eq!(config.tracking, PotTracking::Linear);
        assert_eq!(config.adc_channel2, 1);
    }
}
