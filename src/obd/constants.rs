use strum_macros::{Display, FromRepr};

/// Functional (broadcast) request identifier
pub const FUNCTIONAL_REQUEST_ID: u32 = 0x7df;
/// Physical request identifier of this ECU
pub const PHYSICAL_REQUEST_ID: u32 = 0x7e0;
/// Response identifier of this ECU
pub const RESPONSE_ID: u32 = 0x7e8;

/// Added to the request mode to get the response service id
pub const POSITIVE_RESPONSE: u8 = 0x40;
pub const PADDING: u8 = 0x00;

/// Mode 1 PIDs 0x01-0x20 advertised as supported: 0x0C, 0x0D, 0x11
pub static CURRENT_DATA_SUPPORTED: [u8; 4] = [0x00, 0x18, 0x80, 0x00];
/// Mode 9 PIDs 0x01-0x20 advertised as supported: 0x02
pub static VEHICLE_INFO_SUPPORTED: [u8; 4] = [0x40, 0x00, 0x00, 0x00];

/// Number of data items in a VIN response
pub const VIN_DATA_ITEMS: u8 = 0x01;

#[derive(Debug, PartialEq, Eq, Copy, Clone, Display, FromRepr)]
#[repr(u8)]
pub enum Mode {
    CurrentData = 0x01,
    VehicleInformation = 0x09,
}

/// Mode 1 parameter identifiers
#[derive(Debug, PartialEq, Eq, Copy, Clone, Display, FromRepr)]
#[repr(u8)]
pub enum CurrentDataPid {
    Supported = 0x00,
    CoolantTemperature = 0x05,
    EngineRpm = 0x0c,
    VehicleSpeed = 0x0d,
    ThrottlePosition = 0x11,
    FuelLevel = 0x2f,
}

/// Mode 9 parameter identifiers
#[derive(Debug, PartialEq, Eq, Copy, Clone, Display, FromRepr)]
#[repr(u8)]
pub enum VehicleInfoPid {
    Supported = 0x00,
    Vin = 0x02,
}
