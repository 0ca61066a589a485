//! Pedal normalization and demand mapping
//!
//! Positions are per-mille of pedal travel. Demand is signed: accelerator
//! demand is the position itself, brake demand is negative regen in tenths
//! of a percent of maximum torque.

use crate::config::{PedalConfig, PotTracking};
use crate::pedal::RawSignal;

/// Full pedal travel in per-mille
pub const POSITION_MAX: i32 = 1000;

/// Brake positions below this are treated as released
pub const BRAKE_DEAD_BAND: u16 = 15;

/// Linearly map `input` from `[min, max]` onto `[0, 1000]` without clamping
///
/// Works for inverted ranges (`min > max`). A degenerate range maps to 0.
pub fn normalize(input: i32, min: i32, max: i32) -> i32 {
    if min == max {
        return 0;
    }
    let scaled = (input as i64 - min as i64) * POSITION_MAX as i64 / (max as i64 - min as i64);
    scaled.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Map `input` onto `[0, 1000]`, clamping anything outside the range
///
/// # Example
/// ```
/// use vcu_core::pedal::normalize::normalize_and_constrain;
///
/// assert_eq!(normalize_and_constrain(1100, 400, 1800), 500);
/// assert_eq!(normalize_and_constrain(5000, 400, 1800), 1000);
/// ```
pub fn normalize_and_constrain(input: i32, min: i32, max: i32) -> u16 {
    normalize(input, min, max).clamp(0, POSITION_MAX) as u16
}

/// Accelerator position from one or two potentiometer channels
///
/// A dual-pot pedal reports the average of both channels. Inverse tracking
/// flips the second channel, or the only channel of a single-pot pedal.
pub fn accelerator_position(signal: &RawSignal, config: &PedalConfig) -> u16 {
    let position1 = normalize_and_constrain(
        signal.input1,
        config.minimum_level as i32,
        config.maximum_level as i32,
    );
    let inverse = config.tracking == PotTracking::Inverse;
    if !config.is_dual_pot() {
        return if inverse { POSITION_MAX as u16 - position1 } else { position1 };
    }

    let mut position2 = normalize_and_constrain(
        signal.input2,
        config.minimum_level2 as i32,
        config.maximum_level2 as i32,
    );
    if inverse {
        position2 = POSITION_MAX as u16 - position2;
    }
    ((position1 as u32 + position2 as u32) / 2) as u16
}

/// Brake position with the released-pedal dead band applied
///
/// A maximum level of 0 disables the brake entirely.
pub fn brake_position(input: i32, min: u16, max: u16) -> u16 {
    if max == 0 {
        return 0;
    }
    let position = normalize_and_constrain(input, min as i32, max as i32);
    if position < BRAKE_DEAD_BAND {
        0
    } else {
        position
    }
}

/// Regen demand for a brake position
///
/// The magnitude grows linearly from `min_regen` percent at the first
/// position past zero to `max_regen` percent at full travel. A released
/// pedal always yields exactly 0.
pub fn regen_demand(position: u16, min_regen: u8, max_regen: u8) -> i16 {
    if position == 0 {
        return 0;
    }
    let position = (position as i32).min(POSITION_MAX);
    let range = (max_regen as i32 - min_regen as i32).max(0);
    let demand = -(10 * range * position / POSITION_MAX) - 10 * min_regen as i32;
    demand.clamp(-POSITION_MAX, 0) as i16
}

/// Accelerator demand for a position
pub fn accelerator_demand(position: u16) -> i16 {
    (position as i32).min(POSITION_MAX) as i16
}
