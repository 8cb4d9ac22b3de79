//! Scaling between physical values and OBD-II PID data bytes.
use crate::obd::constants::{
    CurrentDataPid, Mode, VehicleInfoPid, CURRENT_DATA_SUPPORTED, POSITIVE_RESPONSE,
    VEHICLE_INFO_SUPPORTED, VIN_DATA_ITEMS,
};
use crate::vehicle::{VehicleState, VIN_LEN};

const COOLANT_OFFSET: f32 = 40.0;

fn round_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, u8::MAX as f32) as u8
}

fn percent_to_byte(percent: f32) -> u8 {
    round_to_u8(percent * 255.0 / 100.0)
}

fn byte_to_percent(byte: u8) -> f32 {
    byte as f32 * 100.0 / 255.0
}

/// Data bytes of a Mode 1 response for `pid`, taken from `state`.
pub fn encode_current_data(pid: CurrentDataPid, state: &VehicleState) -> Vec<u8> {
    match pid {
        CurrentDataPid::Supported => CURRENT_DATA_SUPPORTED.to_vec(),
        CurrentDataPid::EngineRpm => {
            let raw = (state.rpm * 4.0).round().clamp(0.0, u16::MAX as f32) as u16;
            raw.to_be_bytes().to_vec()
        }
        CurrentDataPid::VehicleSpeed => vec![state.speed.min(u8::MAX as u32) as u8],
        CurrentDataPid::ThrottlePosition => vec![percent_to_byte(state.throttle)],
        CurrentDataPid::CoolantTemperature => vec![round_to_u8(state.coolant.round() + COOLANT_OFFSET)],
        CurrentDataPid::FuelLevel => vec![percent_to_byte(state.fuel_level)],
    }
}

/// Physical value of a Mode 1 response. Returns `None` for the support bitmask or if `data` is too short.
pub fn decode_current_data(pid: CurrentDataPid, data: &[u8]) -> Option<f32> {
    match pid {
        CurrentDataPid::Supported => None,
        CurrentDataPid::EngineRpm => match data {
            [a, b, ..] => Some(u16::from_be_bytes([*a, *b]) as f32 / 4.0),
            _ => None,
        },
        CurrentDataPid::VehicleSpeed => data.first().map(|a| *a as f32),
        CurrentDataPid::ThrottlePosition | CurrentDataPid::FuelLevel => {
            data.first().map(|a| byte_to_percent(*a))
        }
        CurrentDataPid::CoolantTemperature => data.first().map(|a| *a as f32 - COOLANT_OFFSET),
    }
}

/// Support bitmask for Mode 9 PID 0x00.
pub fn vehicle_info_supported() -> Vec<u8> {
    VEHICLE_INFO_SUPPORTED.to_vec()
}

/// Complete ISO-TP payload of a VIN response: service, PID, item count and the 17 VIN bytes.
pub fn vin_payload(vin: &[u8; VIN_LEN]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(3 + VIN_LEN);
    payload.push(Mode::VehicleInformation as u8 + POSITIVE_RESPONSE);
    payload.push(VehicleInfoPid::Vin as u8);
    payload.push(VIN_DATA_ITEMS);
    payload.extend_from_slice(vin);
    payload
}
