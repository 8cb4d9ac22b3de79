//! Simulated vehicle signals.
//!
//! The state is published as whole snapshots through a [`tokio::sync::watch`] channel. There is a single writer, the [`VehicleHandle`], which a control surface uses to nudge values, and any number of [`VehicleReader`]s. Readers always get a complete copy, never a mix of an old and a new value.

use std::fmt;

use strum_macros::{Display, EnumString};
use tokio::sync::watch;
use tracing::{debug, info};

pub const VIN_LEN: usize = 17;
pub const DEFAULT_VIN: &[u8; VIN_LEN] = b"ESP32OBD2EMULATOR";

#[derive(Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleState {
    /// km/h
    pub speed: u32,
    pub rpm: f32,
    /// Throttle position in percent
    pub throttle: f32,
    /// Coolant temperature in °C
    pub coolant: f32,
    /// Fuel level in percent
    pub fuel_level: f32,
    pub vin: [u8; VIN_LEN],
}

impl Default for VehicleState {
    fn default() -> Self {
        VehicleState {
            speed: 0,
            rpm: 0.0,
            throttle: 0.0,
            coolant: 90.0,
            fuel_level: 100.0,
            vin: *DEFAULT_VIN,
        }
    }
}

impl VehicleState {
    /// VIN as text, stopping at the first zero byte.
    pub fn vin_str(&self) -> String {
        let end = self.vin.iter().position(|b| *b == 0).unwrap_or(VIN_LEN);
        String::from_utf8_lossy(&self.vin[..end]).into_owned()
    }
}

impl fmt::Debug for VehicleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VehicleState")
            .field("speed", &self.speed)
            .field("rpm", &self.rpm)
            .field("throttle", &self.throttle)
            .field("coolant", &self.coolant)
            .field("fuel_level", &self.fuel_level)
            .field("vin", &self.vin_str())
            .finish()
    }
}

/// Field names accepted by [`VehicleHandle::set_field`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum VehicleField {
    Speed,
    Rpm,
    Throttle,
    Coolant,
    Fuel,
    Vin,
}

/// Writer side of the vehicle state.
pub struct VehicleHandle {
    sender: watch::Sender<VehicleState>,
}

impl VehicleHandle {
    pub fn new(initial: VehicleState) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub fn reader(&self) -> VehicleReader {
        VehicleReader {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn snapshot(&self) -> VehicleState {
        *self.sender.borrow()
    }

    /// Modify the state and publish the result as one snapshot.
    pub fn update(&self, f: impl FnOnce(&mut VehicleState)) {
        self.sender.send_modify(f);
    }

    /// Set a field by name from its text value, the way a web form submits it. Unknown names are ignored and return `None`.
    ///
    /// Numbers are parsed leniently: leading whitespace is skipped, the longest numeric prefix is used and text without one reads as zero. `speed` and `rpm` take whole numbers, a negative speed reads as zero. A VIN longer than 17 characters is truncated, a shorter one is zero filled.
    pub fn set_field(&self, name: &str, value: &str) -> Option<VehicleField> {
        let field = match name.parse::<VehicleField>() {
            Ok(field) => field,
            Err(_) => {
                debug!("Ignoring unknown vehicle field {:?}", name);
                return None;
            }
        };

        info!("Received {} = {}", field, value);

        self.update(|state| match field {
            VehicleField::Speed => {
                state.speed = parse_leading_int(value).clamp(0, u32::MAX as i64) as u32
            }
            VehicleField::Rpm => state.rpm = parse_leading_int(value) as f32,
            VehicleField::Throttle => state.throttle = parse_leading_float(value),
            VehicleField::Coolant => state.coolant = parse_leading_float(value),
            VehicleField::Fuel => state.fuel_level = parse_leading_float(value),
            VehicleField::Vin => {
                let mut vin = [0u8; VIN_LEN];
                let bytes = value.as_bytes();
                let len = bytes.len().min(VIN_LEN);
                vin[..len].copy_from_slice(&bytes[..len]);
                state.vin = vin;
            }
        });

        Some(field)
    }
}

impl Default for VehicleHandle {
    fn default() -> Self {
        Self::new(VehicleState::default())
    }
}

/// Reader side of the vehicle state.
#[derive(Clone)]
pub struct VehicleReader {
    receiver: watch::Receiver<VehicleState>,
}

impl VehicleReader {
    /// Copy of the latest published state.
    pub fn snapshot(&self) -> VehicleState {
        *self.receiver.borrow()
    }
}

/// Length of the optional sign plus digits at the start of `s`.
fn integer_prefix(s: &str) -> usize {
    let bytes = s.as_bytes();
    let sign = usize::from(matches!(bytes.first(), Some(b'+') | Some(b'-')));
    let digits = bytes[sign..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        0
    } else {
        sign + digits
    }
}

fn parse_leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let len = integer_prefix(s);
    if len == 0 {
        return 0;
    }

    let prefix = &s[..len];
    prefix.parse::<i64>().unwrap_or(if prefix.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    })
}

fn parse_leading_float(s: &str) -> f32 {
    let s = s.trim_start();
    let bytes = s.as_bytes();

    let mut end = usize::from(matches!(bytes.first(), Some(b'+') | Some(b'-')));
    let int_digits = bytes[end..].iter().take_while(|b| b.is_ascii_digit()).count();
    end += int_digits;

    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = bytes[end + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
        if int_digits + frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }

    if int_digits + frac_digits == 0 {
        return 0.0;
    }

    if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let exponent = integer_prefix(&s[end + 1..]);
        if exponent > 0 {
            end += 1 + exponent;
        }
    }

    s[..end].parse::<f32>().unwrap_or(0.0)
}
