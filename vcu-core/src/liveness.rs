//! Loss-of-communication detection
//!
//! Counts ticks since the last accepted response. The counter starts
//! saturated, so a device that never answered is treated as lost.

/// Sentinel the tick counter saturates at
pub const LIVENESS_SATURATED: u8 = 255;

/// Lost responses tolerated from a polled pedal before it is considered dead
pub const PEDAL_MAX_LOST_RESPONSES: u8 = 3;

#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    ticks_without_response: u8,
    threshold: u8,
    fresh_response: bool,
}

impl LivenessMonitor {
    /// Create a monitor that reports loss at `threshold` silent ticks
    pub fn new(threshold: u8) -> Self {
        Self {
            ticks_without_response: LIVENESS_SATURATED,
            threshold: threshold.max(1),
            fresh_response: false,
        }
    }

    /// Monitor for a backend, threshold given as a timeout in milliseconds
    pub fn with_timeout(timeout_ms: u32, tick_interval_us: u64) -> Self {
        let ticks = (timeout_ms as u64 * 1000) / tick_interval_us.max(1);
        Self::new(ticks.clamp(1, (LIVENESS_SATURATED - 1) as u64) as u8)
    }

    /// Note that an accepted response arrived since the last tick
    pub fn record_response(&mut self) {
        self.fresh_response = true;
    }

    /// Advance one tick
    pub fn tick(&mut self) {
        if self.fresh_response {
            self.ticks_without_response = 0;
            self.fresh_response = false;
        } else {
            self.ticks_without_response = self.ticks_without_response.saturating_add(1);
        }
    }

    pub fn ticks_without_response(&self) -> u8 {
        self.ticks_without_response
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// True once the threshold has been reached
    pub fn is_lost(&self) -> bool {
        self.ticks_without_response >= self.threshold
    }
}
