//! Remote ECU pedal profiles
//!
//! A polled pedal sends a fixed diagnostic request every tick and picks the
//! pedal reading out of whatever response frame arrives later.

use crate::config::EcuProfile;
use crate::pedal::PedalRole;
use crate::types::CanFrame;

/// Receive mask for standard-id responses
pub const RESPONSE_MASK_STANDARD: u32 = 0x7FF;

/// Receive mask for extended-id responses
pub const RESPONSE_MASK_EXTENDED: u32 = 0x1FFF_FFFF;

/// Request frame and expected response for one profile
#[derive(Debug, Clone, PartialEq)]
pub struct EcuRequest {
    pub request: CanFrame,
    pub response_id: u32,
    pub response_extended: bool,
}

impl EcuRequest {
    pub fn response_mask(&self) -> u32 {
        if self.response_extended {
            RESPONSE_MASK_EXTENDED
        } else {
            RESPONSE_MASK_STANDARD
        }
    }
}

/// Request/response pair for a profile and pedal role
///
/// Returns `None` when the ECU does not expose that pedal.
pub fn request_for(profile: EcuProfile, role: PedalRole) -> Option<EcuRequest> {
    match (profile, role) {
        (EcuProfile::VolvoS80Gas, PedalRole::Accelerator) => Some(EcuRequest {
            request: CanFrame::from_bytes(0x7E0, false, &[0x03, 0x22, 0xEE, 0xCB, 0x00, 0x00, 0x00, 0x00]),
            response_id: 0x7E8,
            response_extended: false,
        }),
        (EcuProfile::VolvoS80Gas, PedalRole::Brake) => Some(EcuRequest {
            request: CanFrame::from_bytes(0x760, false, &[0x03, 0x22, 0x2B, 0x0D, 0x00, 0x00, 0x00, 0x00]),
            response_id: 0x768,
            response_extended: false,
        }),
        (EcuProfile::VolvoV50Diesel, PedalRole::Accelerator) => Some(EcuRequest {
            request: CanFrame::from_bytes(0x3FFFE, true, &[0xCE, 0x11, 0xE6, 0x00, 0x24, 0x03, 0xFD, 0x00]),
            response_id: 0x21,
            response_extended: true,
        }),
        (EcuProfile::VolvoV50Diesel, PedalRole::Brake) => None,
    }
}

/// Extract the raw pedal reading from a response frame
///
/// Returns `None` for frames that are not the expected response.
pub fn decode_response(profile: EcuProfile, role: PedalRole, frame: &CanFrame) -> Option<i32> {
    let expected = request_for(profile, role)?;
    if frame.id != expected.response_id || frame.extended != expected.response_extended {
        return None;
    }

    let data = &frame.data;
    let value = match (profile, role) {
        (EcuProfile::VolvoS80Gas, PedalRole::Accelerator) => {
            frame.require_len(5).ok()?;
            data[4] as i32
        }
        (EcuProfile::VolvoS80Gas, PedalRole::Brake) => {
            frame.require_len(6).ok()?;
            data[5] as i32
        }
        (EcuProfile::VolvoV50Diesel, PedalRole::Accelerator) => {
            frame.require_len(7).ok()?;
            (data[5] as i32 + 1) * data[6] as i32
        }
        (EcuProfile::VolvoV50Diesel, PedalRole::Brake) => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s80_accelerator() {
        let req = request_for(EcuProfile::VolvoS80Gas, PedalRole::Accelerator).unwrap();
        assert_eq!(req.request.id, 0x7E0);
        assert_eq!(req.request.payload(), &[0x03, 0x22, 0xEE, 0xCB, 0, 0, 0, 0]);
        assert_eq!(req.response_mask(), 0x7FF);

        let response = CanFrame::from_bytes(0x7E8, false, &[0x04, 0x62, 0xEE, 0xCB, 0x14, 0, 0, 0]);
        assert_eq!(
            decode_response(EcuProfile::VolvoS80Gas, PedalRole::Accelerator, &response),
            Some(0x14)
        );
    }

    #[test]
    fn test_s80_brake() {
        let response = CanFrame::from_bytes(0x768, false, &[0x05, 0x62, 0x2B, 0x0D, 0x00, 0x80, 0, 0]);
        assert_eq!(
            decode_response(EcuProfile::VolvoS80Gas, PedalRole::Brake, &response),
            Some(0x80)
        );
    }

    #[test]
    fn test_v50_accelerator() {
        let req = request_for(EcuProfile::VolvoV50Diesel, PedalRole::Accelerator).unwrap();
        assert!(req.request.extended);
        assert_eq!(req.request.id, 0x3FFFE);

        let response = CanFrame::from_bytes(0x21, true, &[0xCE, 0x11, 0xE6, 0x00, 0x24, 0x03, 0xFD, 0x00]);
        assert_eq!(
            decode_response(EcuProfile::VolvoV50Diesel, PedalRole::Accelerator, &response),
            Some(4 * 0xFD)
        );
    }

    #[test]
    fn test_wrong_frame_ignored() {
        let standard = CanFrame::from_bytes(0x21, false, &[0; 8]);
        assert_eq!(
            decode_response(EcuProfile::VolvoV50Diesel, PedalRole::Accelerator, &standard),
            None
        );
        let short = CanFrame::from_bytes(0x7E8, false, &[0x04, 0x62]);
        assert_eq!(
            decode_response(EcuProfile::VolvoS80Gas, PedalRole::Accelerator, &short),
            None
        );
        assert!(request_for(EcuProfile::VolvoV50Diesel, PedalRole::Brake).is_none());
    }
}
