//! Simulated bus partners
//!
//! Answers the frames the vehicle sends the way the real devices would: the
//! remote pedal ECU replies to diagnostic polls and the inverter reports the
//! state it was asked for. Replies are injected back into the bus and reach
//! the vehicle on the next step.

use vcu_core::backend::ck::CK_COMMAND_ID;
use vcu_core::backend::dmoc::{
    DMOC_HV_BUS_REPORT_ID, DMOC_SPEED_COMMAND_ID, DMOC_SPEED_REPORT_ID,
    DMOC_TEMPERATURE_REPORT_ID, DMOC_TORQUE_COMMAND_ID, DMOC_TORQUE_REPORT_ID,
};
use vcu_core::{CanFrame, DeviceId};

/// Heartbeat id of the CK inverter board
const CK_HEARTBEAT_ID: u32 = 0x410;

/// 360.0 V on the HV bus
const HV_VOLTAGE: u16 = 3600;
/// 0 A on the HV bus (offset encoded)
const HV_CURRENT: u16 = 5000;
/// Rotor 40 C, inverter 35 C, stator 38 C (offset encoded)
const TEMPERATURES: [u8; 3] = [80, 75, 78];

#[derive(Debug, Clone)]
pub struct Responder {
    inverter: DeviceId,
    accelerator_raw: i32,
    brake_raw: i32,
}

impl Responder {
    pub fn new(inverter: DeviceId) -> Self {
        Self {
            inverter,
            accelerator_raw: 0,
            brake_raw: 0,
        }
    }

    /// Raw readings the remote pedal ECU reports
    pub fn set_pedals(&mut self, accelerator_raw: i32, brake_raw: i32) {
        self.accelerator_raw = accelerator_raw;
        self.brake_raw = brake_raw;
    }

    /// Build the replies to frames sent on one bus
    pub fn answer(&self, sent: &[CanFrame]) -> Vec<CanFrame> {
        let mut replies = Vec::new();
        for frame in sent {
            match (frame.id, frame.extended) {
                (0x7E0, false) => replies.push(CanFrame::from_bytes(
                    0x7E8,
                    false,
                    &[0x04, 0x62, 0xEE, 0xCB, byte(self.accelerator_raw), 0, 0, 0],
                )),
                (0x760, false) => replies.push(CanFrame::from_bytes(
                    0x768,
                    false,
                    &[0x05, 0x62, 0x2B, 0x0D, 0x00, byte(self.brake_raw), 0, 0],
                )),
                (0x3FFFE, true) => replies.push(v50_accelerator(self.accelerator_raw)),
                (id, false) => replies.extend(self.answer_inverter(id, frame)),
                _ => log::trace!("no reply to {}", frame),
            }
        }
        replies
    }

    fn answer_inverter(&self, id: u32, frame: &CanFrame) -> Vec<CanFrame> {
        match (self.inverter, id) {
            (DeviceId::Dmoc645, DMOC_SPEED_COMMAND_ID) => {
                let state = match frame.data[6] >> 6 {
                    0 => 1,
                    1 => 2,
                    2 => 3,
                    _ => 4,
                };
                vec![
                    CanFrame::from_bytes(
                        DMOC_SPEED_REPORT_ID,
                        false,
                        &[frame.data[0], frame.data[1], 0, 0, 0, 0, state << 4, 0],
                    ),
                    hv_bus_report(),
                    CanFrame::from_bytes(DMOC_TEMPERATURE_REPORT_ID, false, &TEMPERATURES),
                ]
            }
            (DeviceId::Dmoc645, DMOC_TORQUE_COMMAND_ID) => vec![CanFrame::from_bytes(
                DMOC_TORQUE_REPORT_ID,
                false,
                &[frame.data[0], frame.data[1], 0, 0, 0, 0, 0, 0],
            )],
            (DeviceId::CkInverter, CK_COMMAND_ID) => vec![CanFrame::from_bytes(
                CK_HEARTBEAT_ID,
                false,
                &[frame.data[4], frame.data[5]],
            )],
            _ => Vec::new(),
        }
    }
}

fn byte(raw: i32) -> u8 {
    raw.clamp(0, u8::MAX as i32) as u8
}

fn hv_bus_report() -> CanFrame {
    let voltage = HV_VOLTAGE.to_be_bytes();
    let current = HV_CURRENT.to_be_bytes();
    CanFrame::from_bytes(
        DMOC_HV_BUS_REPORT_ID,
        false,
        &[voltage[0], voltage[1], current[0], current[1], 0, 0, 0, 0],
    )
}

/// The V50 ECU reports `(data[5] + 1) * data[6]`
fn v50_accelerator(raw: i32) -> CanFrame {
    let raw = raw.clamp(0, 256 * 255);
    let factor = (raw / 256) as u8;
    let value = (raw / (factor as i32 + 1)) as u8;
    CanFrame::from_bytes(0x21, true, &[0, 0, 0, 0, 0, factor, value, 0])
}
