//! DMOC645 inverter
//!
//! The inverter expects three command frames every tick, all carrying the same
//! alive counter and an additive checksum in the last byte. It reports torque,
//! speed with its operation state, HV bus values and temperatures.
//!
//! State changes are sequenced: from DISABLED the inverter is first asked for
//! STANDBY, and only once it reports STANDBY or ENABLE is ENABLE requested.

use super::InverterBackend;
use crate::arbiter::{Gear, MotorCommand, OperationState, PowerMode};
use crate::telemetry::{TelemetrySnapshot, TelemetryUpdate};
use crate::types::{CanFrame, DeviceId, Result};
use byteorder::{BigEndian, ByteOrder};

pub const DMOC_SPEED_COMMAND_ID: u32 = 0x232;
pub const DMOC_TORQUE_COMMAND_ID: u32 = 0x233;
pub const DMOC_LIMITS_COMMAND_ID: u32 = 0x234;

pub const DMOC_TORQUE_REPORT_ID: u32 = 0x23A;
pub const DMOC_SPEED_REPORT_ID: u32 = 0x23B;
pub const DMOC_HV_BUS_REPORT_ID: u32 = 0x650;
pub const DMOC_TEMPERATURE_REPORT_ID: u32 = 0x651;

pub const DMOC_TICK_INTERVAL_US: u64 = 40_000;

/// Speed field offset, 0 rpm
const SPEED_OFFSET: i32 = 20_000;
/// Torque field offset, 0 Nm (0.1 Nm units)
const TORQUE_OFFSET: i32 = 30_000;
/// HV current offset, 0 A (0.1 A units)
const CURRENT_OFFSET: i32 = 5_000;
/// Temperature offset in degrees C
const TEMPERATURE_OFFSET: f32 = 40.0;

const KEY_ON: u8 = 1;
const STANDBY_TORQUE: [u8; 2] = [0x75, 0x30];
const REGEN_POWER_LIMIT: u16 = 55_000;
const ACCEL_POWER_LIMIT: u16 = 25_000;
/// 20 degrees C ambient
const AMBIENT_TEMPERATURE: u8 = 60;

/// Next value of the alive counter
pub fn next_alive(alive: u8) -> u8 {
    alive.wrapping_add(2) & 0x0F
}

/// Additive checksum over the first seven payload bytes and the frame id
pub fn checksum(frame: &CanFrame) -> u8 {
    let sum = frame.data[0..7]
        .iter()
        .fold(frame.id as u8, |acc, &b| acc.wrapping_add(b));
    0u8.wrapping_sub(sum.wrapping_add(3))
}

/// State to request given what the inverter reports and what is wanted
pub fn requested_state(reported: OperationState, wanted: OperationState) -> OperationState {
    match (reported, wanted) {
        (_, OperationState::PowerDown) => OperationState::PowerDown,
        (OperationState::Disabled, OperationState::Standby | OperationState::Enable) => {
            OperationState::Standby
        }
        (OperationState::Standby | OperationState::Enable, OperationState::Enable) => {
            OperationState::Enable
        }
        _ => OperationState::Disabled,
    }
}

fn finish(mut frame: CanFrame) -> CanFrame {
    frame.data[7] = checksum(&frame);
    frame
}

fn offset_u16(value: i32) -> u16 {
    value.clamp(0, u16::MAX as i32) as u16
}

/// Speed target, key state, gear and requested state
pub fn encode_speed_command(cmd: &MotorCommand, reported: OperationState, alive: u8) -> CanFrame {
    let mut frame = CanFrame::standard(DMOC_SPEED_COMMAND_ID, 8);

    let state = cmd.state;
    let speed = if cmd.throttle > 0 && state.is_driving() && state.power_mode == PowerMode::Speed {
        SPEED_OFFSET + cmd.speed
    } else {
        SPEED_OFFSET
    };
    BigEndian::write_u16(&mut frame.data[0..2], offset_u16(speed));
    frame.data[5] = KEY_ON;

    let gear = if reported == OperationState::Enable {
        state.gear
    } else {
        Gear::Neutral
    };
    let new_state = requested_state(reported, state.op_state);
    frame.data[6] = alive + (gear.code() << 4) + (new_state.code() << 6);
    finish(frame)
}

/// Torque limits; upper and lower limit are equal in torque mode
pub fn encode_torque_command(
    cmd: &MotorCommand,
    reported: OperationState,
    speed_actual: i32,
    alive: u8,
) -> CanFrame {
    let mut frame = CanFrame::standard(DMOC_TORQUE_COMMAND_ID, 8);

    match cmd.state.power_mode {
        PowerMode::Torque => {
            let torque = if reported == OperationState::Enable {
                (cmd.torque * 10.0) as i32
            } else {
                0
            };
            let command = if speed_actual < cmd.speed_max as i32 {
                TORQUE_OFFSET + torque
            } else {
                TORQUE_OFFSET + (torque as f32 / 1.3) as i32
            };
            let command = offset_u16(command);
            BigEndian::write_u16(&mut frame.data[0..2], command);
            BigEndian::write_u16(&mut frame.data[2..4], command);
        }
        PowerMode::Speed => {
            let limit = (cmd.torque_max * 10.0) as i32;
            BigEndian::write_u16(&mut frame.data[0..2], offset_u16(TORQUE_OFFSET + limit));
            BigEndian::write_u16(&mut frame.data[2..4], offset_u16(TORQUE_OFFSET - limit));
        }
    }
    frame.data[4..6].copy_from_slice(&STANDBY_TORQUE);
    frame.data[6] = alive;
    finish(frame)
}

/// Power limits and ambient temperature
pub fn encode_limits_command(alive: u8) -> CanFrame {
    let mut frame = CanFrame::standard(DMOC_LIMITS_COMMAND_ID, 8);
    BigEndian::write_u16(&mut frame.data[0..2], REGEN_POWER_LIMIT);
    BigEndian::write_u16(&mut frame.data[2..4], ACCEL_POWER_LIMIT);
    frame.data[5] = AMBIENT_TEMPERATURE;
    frame.data[6] = alive;
    finish(frame)
}

/// Decode one status frame
///
/// Frames from the filtered range that carry no known report decode to an
/// empty update.
pub fn decode_status(frame: &CanFrame) -> Result<TelemetryUpdate> {
    let data = &frame.data;
    let mut update = TelemetryUpdate::default();

    match frame.id {
        DMOC_TEMPERATURE_REPORT_ID => {
            frame.require_len(3)?;
            let rotor = data[0] as f32 - TEMPERATURE_OFFSET;
            let stator = data[2] as f32 - TEMPERATURE_OFFSET;
            update.inverter_temp = Some(data[1] as f32 - TEMPERATURE_OFFSET);
            update.motor_temp = Some(rotor.max(stator));
        }
        DMOC_TORQUE_REPORT_ID => {
            frame.require_len(2)?;
            let raw = BigEndian::read_u16(&data[0..2]) as i32;
            update.torque_actual = Some((raw - TORQUE_OFFSET) as f32 / 10.0);
        }
        DMOC_SPEED_REPORT_ID => {
            frame.require_len(7)?;
            let raw = BigEndian::read_u16(&data[0..2]) as i32;
            update.speed_actual = Some((raw - SPEED_OFFSET).abs());

            let (state, faulted) = match data[6] >> 4 {
                0 | 1 => (OperationState::Disabled, false),
                2 => {
                    update.ready = Some(true);
                    (OperationState::Standby, false)
                }
                3 => (OperationState::Enable, false),
                4 => (OperationState::PowerDown, false),
                _ => (OperationState::Disabled, true),
            };
            log::debug!("DMOC645 reported state {:?} (0x{:X})", state, data[6] >> 4);
            update.inverter_state = Some(state);
            update.faulted = Some(faulted);
        }
        DMOC_HV_BUS_REPORT_ID => {
            frame.require_len(4)?;
            let voltage = BigEndian::read_u16(&data[0..2]) as i32;
            let current = BigEndian::read_u16(&data[2..4]) as i32;
            update.dc_voltage = Some(voltage as f32 / 10.0);
            update.dc_current = Some((current - CURRENT_OFFSET) as f32 / 10.0);
        }
        _ => log::trace!("DMOC645 frame ignored: {}", frame),
    }
    Ok(update)
}

#[derive(Debug, Clone, Default)]
pub struct Dmoc645 {
    alive: u8,
}

impl Dmoc645 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alive(&self) -> u8 {
        self.alive
    }
}

impl InverterBackend for Dmoc645 {
    fn device(&self) -> DeviceId {
        DeviceId::Dmoc645
    }

    fn tick_interval_us(&self) -> u64 {
        DMOC_TICK_INTERVAL_US
    }

    fn filters(&self) -> Vec<(u32, u32)> {
        vec![(0x230, 0x7F0), (0x650, 0x7F0)]
    }

    fn encode(&mut self, cmd: &MotorCommand, telemetry: &TelemetrySnapshot) -> Vec<CanFrame> {
        self.alive = next_alive(self.alive);
        let reported = telemetry.inverter_state;

        let frames = vec![
            encode_speed_command(cmd, reported, self.alive),
            encode_torque_command(cmd, reported, telemetry.speed_actual, self.alive),
            encode_limits_command(self.alive),
        ];
        for frame in &frames {
            log::debug!("DMOC645 tx: {}", frame);
        }
        frames
    }

    fn decode(&mut self, frame: &CanFrame) -> Result<TelemetryUpdate> {
        log::debug!("DMOC645 rx: {}", frame);
        decode_status(frame)
    }
}
