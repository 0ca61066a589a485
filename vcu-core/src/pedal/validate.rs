//! Raw signal validation

use crate::config::{PedalConfig, PotTracking};
use crate::faults::FaultKind;
use crate::liveness::LivenessMonitor;
use crate::pedal::normalize::{normalize_and_constrain, POSITION_MAX};
use crate::pedal::{PedalRole, RawSignal};
use serde::Serialize;

/// Largest deviation between the two channels of a dual-pot pedal, per-mille
pub const MAX_CHANNEL_DEVIATION: i32 = 150;

/// Outcome of validating one raw reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ValidationStatus {
    #[default]
    Ok,
    /// Below the configured range minus tolerance
    ErrLow,
    /// Above the configured range plus tolerance
    ErrHigh,
    /// Polled source stopped answering
    ErrMisc,
    /// The channels of a dual-pot pedal disagree
    Mismatch,
}

impl ValidationStatus {
    /// Fault raised while this status holds
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            ValidationStatus::Ok => None,
            ValidationStatus::ErrLow => Some(FaultKind::SignalLow),
            ValidationStatus::ErrHigh => Some(FaultKind::SignalHigh),
            ValidationStatus::ErrMisc => Some(FaultKind::CommunicationLost),
            ValidationStatus::Mismatch => Some(FaultKind::SignalMismatch),
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == ValidationStatus::Ok
    }

    /// Whether the pipeline may still use the reading
    ///
    /// A brake reading above range is a full regen request.
    pub fn is_usable(&self, role: PedalRole) -> bool {
        match (self, role) {
            (ValidationStatus::Ok, _) => true,
            (ValidationStatus::ErrHigh, PedalRole::Brake) => true,
            _ => false,
        }
    }
}

/// Check a reading against the configured range and the source's liveness
///
/// Loss of communication takes precedence over the range checks. On a
/// dual-pot pedal the second channel is range checked as well, then both
/// channels must agree within [`MAX_CHANNEL_DEVIATION`].
pub fn validate(
    signal: &RawSignal,
    config: &PedalConfig,
    liveness: Option<&LivenessMonitor>,
) -> ValidationStatus {
    if liveness.map_or(false, |l| l.is_lost()) {
        return ValidationStatus::ErrMisc;
    }

    let tolerance = config.tolerance as i32;
    let status = check_range(
        signal.input1,
        config.minimum_level,
        config.maximum_level,
        tolerance,
    );
    if !status.is_ok() || !config.is_dual_pot() {
        return status;
    }

    let status = check_range(
        signal.input2,
        config.minimum_level2,
        config.maximum_level2,
        tolerance,
    );
    if !status.is_ok() {
        return status;
    }

    let position1 = normalize_and_constrain(
        signal.input1,
        config.minimum_level as i32,
        config.maximum_level as i32,
    ) as i32;
    let position2 = normalize_and_constrain(
        signal.input2,
        config.minimum_level2 as i32,
        config.maximum_level2 as i32,
    ) as i32;
    let deviation = match config.tracking {
        PotTracking::Linear => (position1 - position2).abs(),
        PotTracking::Inverse => (POSITION_MAX - position1 - position2).abs(),
    };
    if deviation > MAX_CHANNEL_DEVIATION {
        log::debug!(
            "{:?}: channel 1 at {} and channel 2 at {} disagree",
            config.device,
            position1,
            position2
        );
        return ValidationStatus::Mismatch;
    }
    ValidationStatus::Ok
}

fn check_range(input: i32, minimum: u16, maximum: u16, tolerance: i32) -> ValidationStatus {
    let (low, high) = if minimum <= maximum {
        (minimum as i32, maximum as i32)
    } else {
        (maximum as i32, minimum as i32)
    };

    if input < low - tolerance {
        ValidationStatus::ErrLow
    } else if input > high + tolerance {
        ValidationStatus::ErrHigh
    } else {
        ValidationStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceId;

    fn config() -> PedalConfig {
        PedalConfig::for_device(DeviceId::PotAccelerator)
            .unwrap()
            .with_range(400, 1800)
            .with_tolerance(150)
    }

    #[test]
    fn test_tolerance_window() {
        let config = config();
        assert_eq!(validate(&RawSignal::single(250), &config, None), ValidationStatus::Ok);
        assert_eq!(validate(&RawSignal::single(249), &config, None), ValidationStatus::ErrLow);
        assert_eq!(validate(&RawSignal::single(1950), &config, None), ValidationStatus::Ok);
        assert_eq!(validate(&RawSignal::single(1951), &config, None), ValidationStatus::ErrHigh);
    }

    #[test]
    fn test_inverted_range_window() {
        let config = config().with_range(1800, 400);
        assert_eq!(validate(&RawSignal::single(1000), &config, None), ValidationStatus::Ok);
        assert_eq!(validate(&RawSignal::single(100), &config, None), ValidationStatus::ErrLow);
    }

    #[test]
    fn test_liveness_overrides_range() {
        let config = config();
        let lost = LivenessMonitor::new(3);
        assert_eq!(
            validate(&RawSignal::single(1000), &config, Some(&lost)),
            ValidationStatus::ErrMisc
        );

        let mut alive = LivenessMonitor::new(3);
        alive.record_response();
        alive.tick();
        assert_eq!(
            validate(&RawSignal::single(1000), &config, Some(&alive)),
            ValidationStatus::Ok
        );
    }

    #[test]
    fn test_usable_statuses() {
        assert!(ValidationStatus::ErrHigh.is_usable(PedalRole::Brake));
        assert!(!ValidationStatus::ErrHigh.is_usable(PedalRole::Accelerator));
        assert!(!ValidationStatus::ErrLow.is_usable(PedalRole::Brake));
        assert!(!ValidationStatus::ErrMisc.is_usable(PedalRole::Brake));
        assert!(!ValidationStatus::Mismatch.is_usable(PedalRole::Accelerator));
        assert_eq!(ValidationStatus::Mismatch.fault_kind(), Some(FaultKind::SignalMismatch));
    }

    fn dual(tracking: PotTracking) -> PedalConfig {
        match tracking {
            PotTracking::Linear => config().with_second_pot(200, 900, tracking),
            PotTracking::Inverse => config().with_second_pot(900, 200, tracking),
        }
    }

    fn signal(input1: i32, input2: i32) -> RawSignal {
        RawSignal {
            input1,
            input2,
            input3: 0,
        }
    }

    #[test]
    fn test_dual_pot_channels_agree() {
        // channel 1 at 500, channel 2 at 500 and 600
        let linear = dual(PotTracking::Linear);
        assert_eq!(validate(&signal(1100, 550), &linear, None), ValidationStatus::Ok);
        assert_eq!(validate(&signal(1100, 620), &linear, None), ValidationStatus::Ok);

        // inverse channel 2 at 500 for a pedal at 500 sums to 1000
        let inverse = dual(PotTracking::Inverse);
        assert_eq!(validate(&signal(1100, 550), &inverse, None), ValidationStatus::Ok);
    }

    #[test]
    fn test_dual_pot_channels_disagree() {
        // channel 1 at 500, channel 2 at 700
        let linear = dual(PotTracking::Linear);
        assert_eq!(validate(&signal(1100, 690), &linear, None), ValidationStatus::Mismatch);

        // inverse channels at 500 and 800 sum to 1300
        let inverse = dual(PotTracking::Inverse);
        assert_eq!(validate(&signal(1100, 340), &inverse, None), ValidationStatus::Mismatch);
    }

    #[test]
    fn test_dual_pot_second_channel_range() {
        let linear = dual(PotTracking::Linear);
        assert_eq!(validate(&signal(1100, 1200), &linear, None), ValidationStatus::ErrHigh);
        assert_eq!(validate(&signal(1100, 0), &linear, None), ValidationStatus::ErrLow);
        // channel 1 is checked first
        assert_eq!(validate(&signal(0, 1200), &linear, None), ValidationStatus::ErrLow);
    }
}
