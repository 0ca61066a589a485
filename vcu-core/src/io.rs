//! Analog and digital input abstraction
//!
//! Devices never talk to hardware directly. They sample inputs through these
//! traits, which read the last value the I/O layer latched. Reading a channel
//! that was never sampled yields 0 / `false`.

use std::collections::HashMap;

/// Input number meaning "not connected"
pub const INPUT_NONE: u8 = 255;

/// Read access to analog channels (ADC counts)
pub trait AnalogInput {
    fn analog(&self, channel: u8) -> i32;
}

/// Read access to digital inputs
pub trait DigitalInput {
    fn digital(&self, pin: u8) -> bool;
}

/// In-memory I/O used by simulations and tests
#[derive(Debug, Clone, Default)]
pub struct SimulatedIo {
    analog: HashMap<u8, i32>,
    digital: HashMap<u8, bool>,
}

impl SimulatedIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch a new value on an analog channel
    pub fn set_analog(&mut self, channel: u8, value: i32) {
        self.analog.insert(channel, value);
    }

    /// Latch a new state on a digital input
    pub fn set_digital(&mut self, pin: u8, state: bool) {
        self.digital.insert(pin, state);
    }
}

impl AnalogInput for SimulatedIo {
    fn analog(&self, channel: u8) -> i32 {
        self.analog.get(&channel).copied().unwrap_or(0)
    }
}

impl DigitalInput for SimulatedIo {
    fn digital(&self, pin: u8) -> bool {
        self.digital.get(&pin).copied().unwrap_or(false)
    }
}
