//! Signal sources
//!
//! Every source produces one [`RawSignal`] per tick and never blocks. Before
//! any data has been seen the reading is 0.

use crate::bus::{BusFilter, CanBus};
use crate::config::{EcuProfile, PedalConfig};
use crate::io::AnalogInput;
use crate::liveness::{LivenessMonitor, PEDAL_MAX_LOST_RESPONSES};
use crate::pedal::remote::{self, EcuRequest};
use crate::pedal::{PedalRole, RawSignal};
use crate::types::{CanFrame, DeviceId, Result, VcuError};

/// Analog potentiometer on one ADC channel, optionally with a second
/// channel that cross-checks the first
#[derive(Debug, Clone)]
pub struct Potentiometer {
    channel: u8,
    channel2: Option<u8>,
}

impl Potentiometer {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            channel2: None,
        }
    }

    pub fn dual(channel: u8, channel2: u8) -> Self {
        Self {
            channel,
            channel2: Some(channel2),
        }
    }

    pub fn acquire(&self, io: &dyn AnalogInput) -> RawSignal {
        RawSignal {
            input1: io.analog(self.channel),
            input2: self.channel2.map_or(0, |c| io.analog(c)),
            input3: 0,
        }
    }
}

/// Pedal reading polled from another ECU over the bus
#[derive(Debug, Clone)]
pub struct RemoteEcuPoll {
    profile: EcuProfile,
    role: PedalRole,
    request: EcuRequest,
    last_value: i32,
    liveness: LivenessMonitor,
}

impl RemoteEcuPoll {
    pub fn new(profile: EcuProfile, role: PedalRole) -> Result<Self> {
        let request = remote::request_for(profile, role).ok_or_else(|| {
            VcuError::InvalidConfig(format!("{:?} has no {:?} pedal", profile, role))
        })?;
        Ok(Self {
            profile,
            role,
            request,
            last_value: 0,
            liveness: LivenessMonitor::new(PEDAL_MAX_LOST_RESPONSES),
        })
    }

    /// Send the request and report the most recent response value
    pub fn acquire(&mut self, bus: Option<&mut dyn CanBus>) -> RawSignal {
        match bus {
            Some(bus) => bus.send_frame(self.request.request),
            None => log::warn!("{:?} pedal poll has no bus attached", self.role),
        }
        self.liveness.tick();
        RawSignal::single(self.last_value)
    }

    /// Accept a response frame; returns true if it carried a reading
    pub fn on_frame(&mut self, frame: &CanFrame) -> bool {
        match remote::decode_response(self.profile, self.role, frame) {
            Some(value) => {
                log::trace!("{:?} pedal response: {}", self.role, value);
                self.last_value = value;
                self.liveness.record_response();
                true
            }
            None => false,
        }
    }

    pub fn filter(&self, observer: DeviceId) -> BusFilter {
        BusFilter::new(
            observer,
            self.request.response_id,
            self.request.response_mask(),
            self.request.response_extended,
        )
    }

    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }
}

/// Triangle wave between two bounds, one step per tick
#[derive(Debug, Clone)]
pub struct SyntheticRamp {
    value: i32,
    rising: bool,
    min: i32,
    max: i32,
}

impl SyntheticRamp {
    pub fn new(min: i32, max: i32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            value: min,
            rising: true,
            min,
            max,
        }
    }

    pub fn acquire(&mut self) -> RawSignal {
        if self.rising {
            self.value += 1;
        } else {
            self.value -= 1;
        }

        if self.value <= self.min {
            self.value = self.min;
            self.rising = true;
        }
        if self.value >= self.max {
            self.value = self.max;
            self.rising = false;
        }
        RawSignal::single(self.value)
    }
}

/// The source variants a pedal can be built on
#[derive(Debug, Clone)]
pub enum SignalSource {
    Potentiometer(Potentiometer),
    RemoteEcu(RemoteEcuPoll),
    SyntheticRamp(SyntheticRamp),
}

impl SignalSource {
    /// Build the source matching a pedal configuration
    pub fn for_config(config: &PedalConfig) -> Result<Self> {
        let role = PedalRole::for_device(config.device)?;
        let source = match config.device {
            DeviceId::PotAccelerator if config.is_dual_pot() => SignalSource::Potentiometer(
                Potentiometer::dual(config.adc_channel, config.adc_channel2),
            ),
            DeviceId::PotAccelerator | DeviceId::PotBrake => {
                SignalSource::Potentiometer(Potentiometer::new(config.adc_channel))
            }
            DeviceId::CanAccelerator | DeviceId::CanBrake => {
                SignalSource::RemoteEcu(RemoteEcuPoll::new(config.car_type, role)?)
            }
            DeviceId::TestAccelerator | DeviceId::TestBrake => SignalSource::SyntheticRamp(
                SyntheticRamp::new(config.minimum_level as i32, config.maximum_level as i32),
            ),
            other => {
                return Err(VcuError::InvalidConfig(format!(
                    "{:?} has no signal source",
                    other
                )))
            }
        };
        Ok(source)
    }

    /// Acquire this tick's reading
    pub fn acquire(&mut self, io: &dyn AnalogInput, bus: Option<&mut dyn CanBus>) -> RawSignal {
        match self {
            SignalSource::Potentiometer(pot) => pot.acquire(io),
            SignalSource::RemoteEcu(poll) => poll.acquire(bus),
            SignalSource::SyntheticRamp(ramp) => ramp.acquire(),
        }
    }

    /// Forward an inbound frame; only polled sources consume frames
    pub fn on_frame(&mut self, frame: &CanFrame) -> bool {
        match self {
            SignalSource::RemoteEcu(poll) => poll.on_frame(frame),
            _ => false,
        }
    }

    /// Receive filter, for sources that listen on the bus
    pub fn filter(&self, observer: DeviceId) -> Option<BusFilter> {
        match self {
            SignalSource::RemoteEcu(poll) => Some(poll.filter(observer)),
            _ => None,
        }
    }

    /// Liveness monitor, for sources that poll
    pub fn liveness(&self) -> Option<&LivenessMonitor> {
        match self {
            SignalSource::RemoteEcu(poll) => Some(poll.liveness()),
            _ => None,
        }
    }

    pub fn uses_bus(&self) -> bool {
        matches!(self, SignalSource::RemoteEcu(_))
    }
}
