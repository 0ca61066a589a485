//! CK inverter control board
//!
//! One 7-byte command frame per tick. The board only sends debug frames back,
//! which are used for liveness and otherwise ignored.

use super::crc::crc8;
use super::InverterBackend;
use crate::arbiter::{Gear, MotorCommand, OperationState, OperatingState, PowerMode};
use crate::telemetry::{TelemetrySnapshot, TelemetryUpdate};
use crate::types::{CanFrame, DeviceId, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Command frame id
pub const CK_COMMAND_ID: u32 = 0x232;

/// Command frame length
pub const CK_COMMAND_LEN: u8 = 7;

/// Receive filter for the board's debug frames
pub const CK_STATUS_FILTER: (u32, u32) = (0x410, 0x7F0);

pub const CK_TICK_INTERVAL_US: u64 = 40_000;

/// State byte: enable bit plus direction
pub fn state_byte(state: &OperatingState) -> u8 {
    if state.op_state != OperationState::Enable {
        return 0;
    }
    match state.gear {
        Gear::Neutral => 1,
        Gear::Drive => 1 + 2,
        Gear::Reverse => 1 + 4,
    }
}

/// Build the command frame
///
/// Layout: speed u16 LE, torque in 0.1 Nm i16 LE, state byte, alive counter,
/// CRC-8 over the first six bytes.
pub fn encode_command(speed: u16, torque: f32, state: &OperatingState, alive: u8) -> CanFrame {
    let mut frame = CanFrame::standard(CK_COMMAND_ID, CK_COMMAND_LEN);
    let torque_tenths = (torque * 10.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;

    LittleEndian::write_u16(&mut frame.data[0..2], speed);
    LittleEndian::write_i16(&mut frame.data[2..4], torque_tenths);
    frame.data[4] = state_byte(state);
    frame.data[5] = alive;
    frame.data[6] = crc8(&frame.data[0..6]);
    frame
}

#[derive(Debug, Clone, Default)]
pub struct CkInverter {
    alive: u8,
}

impl CkInverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alive(&self) -> u8 {
        self.alive
    }
}

impl InverterBackend for CkInverter {
    fn device(&self) -> DeviceId {
        DeviceId::CkInverter
    }

    fn tick_interval_us(&self) -> u64 {
        CK_TICK_INTERVAL_US
    }

    fn filters(&self) -> Vec<(u32, u32)> {
        vec![CK_STATUS_FILTER]
    }

    fn encode(&mut self, cmd: &MotorCommand, _telemetry: &TelemetrySnapshot) -> Vec<CanFrame> {
        self.alive = self.alive.wrapping_add(1);

        // The board takes either a speed or a torque target, never both
        let (speed, torque) = match cmd.state.power_mode {
            PowerMode::Speed => (cmd.speed.clamp(0, u16::MAX as i32) as u16, 0.0),
            PowerMode::Torque => (0, cmd.torque),
        };
        let frame = encode_command(speed, torque, &cmd.state, self.alive);
        log::debug!("CK inverter tx: {}", frame);
        vec![frame]
    }

    fn decode(&mut self, frame: &CanFrame) -> Result<TelemetryUpdate> {
        log::trace!("CK inverter rx: {}", frame);
        Ok(TelemetryUpdate::default())
    }
}
