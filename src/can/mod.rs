//! Generic CAN types and traits

pub mod alert;
pub mod bitrate;
pub mod error;
pub mod status;
pub mod transport;
pub mod virtual_bus;
pub mod wire;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::Result;

pub use alert::Alerts;
pub use bitrate::{BitRate, BitTiming};
pub use status::{BusState, BusStatus};
pub use transport::{BusConfig, BusTransport};
pub use virtual_bus::VirtualBus;
pub use wire::RawMessage;

/// Maximum number of data bytes in a classic CAN frame
pub const MAX_DLC: usize = 8;

const MAX_STANDARD_ID: u32 = 0x7ff;
const MAX_EXTENDED_ID: u32 = 0x1fff_ffff;

/// Identifier for a CAN frame
#[derive(Copy, Clone, PartialOrd, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Identifier {
    Standard(u32),
    Extended(u32),
}

impl Identifier {
    pub fn is_standard(&self) -> bool {
        match self {
            Identifier::Standard(_) => true,
            Identifier::Extended(_) => false,
        }
    }
    pub fn is_extended(&self) -> bool {
        !self.is_standard()
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Extended(id) => write!(f, "0x{:08x}", id),
            Identifier::Standard(id) => write!(f, "0x{:03x}", id),
        }
    }
}

impl From<u32> for Identifier {
    fn from(id: u32) -> Identifier {
        if id <= MAX_STANDARD_ID {
            Identifier::Standard(id)
        } else {
            Identifier::Extended(id)
        }
    }
}

impl From<Identifier> for u32 {
    fn from(val: Identifier) -> u32 {
        match val {
            Identifier::Standard(id) => id,
            Identifier::Extended(id) => id,
        }
    }
}

/// A classic CAN frame. Bytes past the data length are always zero and never exposed.
#[derive(Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "FrameFields"))]
pub struct Frame {
    id: Identifier,
    dlc: u8,
    rtr: bool,
    data: [u8; MAX_DLC],
}

/// Unchecked serialized form of a [`Frame`].
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct FrameFields {
    id: Identifier,
    dlc: u8,
    rtr: bool,
    data: [u8; MAX_DLC],
}

#[cfg(feature = "serde")]
impl TryFrom<FrameFields> for Frame {
    type Error = crate::Error;

    fn try_from(fields: FrameFields) -> Result<Frame> {
        let dlc = fields.dlc as usize;
        if fields.rtr {
            Frame::new_remote(fields.id, dlc)
        } else if dlc > MAX_DLC {
            Err(crate::Error::MalformedFrame)
        } else {
            Frame::new(fields.id, &fields.data[..dlc])
        }
    }
}

impl Frame {
    /// Build a data frame. Fails with [`crate::Error::MalformedFrame`] if the data is longer than 8 bytes or the identifier is out of range.
    pub fn new(id: Identifier, data: &[u8]) -> Result<Frame> {
        if data.len() > MAX_DLC {
            return Err(crate::Error::MalformedFrame);
        }
        check_id(id)?;

        let mut buf = [0u8; MAX_DLC];
        buf[..data.len()].copy_from_slice(data);

        Ok(Frame {
            id,
            dlc: data.len() as u8,
            rtr: false,
            data: buf,
        })
    }

    /// Build a remote transmission request. The DLC is carried without any data.
    pub fn new_remote(id: Identifier, dlc: usize) -> Result<Frame> {
        if dlc > MAX_DLC {
            return Err(crate::Error::MalformedFrame);
        }
        check_id(id)?;

        Ok(Frame {
            id,
            dlc: dlc as u8,
            rtr: true,
            data: [0u8; MAX_DLC],
        })
    }

    pub fn id(&self) -> Identifier {
        self.id
    }

    /// Data length code (0-8)
    pub fn dlc(&self) -> usize {
        self.dlc as usize
    }

    /// Valid data bytes. Always empty for remote frames.
    pub fn data(&self) -> &[u8] {
        if self.rtr {
            &[]
        } else {
            &self.data[..self.dlc as usize]
        }
    }

    pub fn is_remote(&self) -> bool {
        self.rtr
    }

    pub fn is_extended(&self) -> bool {
        self.id.is_extended()
    }
}

fn check_id(id: Identifier) -> Result<()> {
    match id {
        Identifier::Standard(id) if id > MAX_STANDARD_ID => Err(crate::Error::MalformedFrame),
        Identifier::Extended(id) if id > MAX_EXTENDED_ID => Err(crate::Error::MalformedFrame),
        _ => Ok(()),
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("dlc", &self.dlc)
            .field("rtr", &self.rtr)
            .field("data", &hex::encode(self.data()))
            .finish()
    }
}

/// The CAN controller a [`BusTransport`] drives. Methods take `&self` so the receive loop and the responder can use the controller at the same time, implementations handle their own locking.
pub trait CanController: Send + Sync {
    /// Install the driver with the given timing and pins, accepting all identifiers.
    fn install(&self, timing: &BitTiming, tx_pin: u8, rx_pin: u8) -> Result<()>;
    fn uninstall(&self) -> Result<()>;
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    /// Queue a message for transmission, blocking up to `timeout`.
    fn transmit(&self, message: &RawMessage, timeout: Duration) -> Result<()>;
    /// Wait up to `timeout` for a message. Returns `None` on timeout.
    fn receive(&self, timeout: Duration) -> Result<Option<RawMessage>>;
    /// Read and clear pending alerts. Never blocks.
    fn read_alerts(&self) -> Result<Alerts>;
    fn initiate_recovery(&self) -> Result<()>;
    fn status(&self) -> Result<BusStatus>;
}

impl<T: CanController + ?Sized> CanController for Arc<T> {
    fn install(&self, timing: &BitTiming, tx_pin: u8, rx_pin: u8) -> Result<()> {
        (**self).install(timing, tx_pin, rx_pin)
    }
    fn uninstall(&self) -> Result<()> {
        (**self).uninstall()
    }
    fn start(&self) -> Result<()> {
        (**self).start()
    }
    fn stop(&self) -> Result<()> {
        (**self).stop()
    }
    fn transmit(&self, message: &RawMessage, timeout: Duration) -> Result<()> {
        (**self).transmit(message, timeout)
    }
    fn receive(&self, timeout: Duration) -> Result<Option<RawMessage>> {
        (**self).receive(timeout)
    }
    fn read_alerts(&self) -> Result<Alerts> {
        (**self).read_alerts()
    }
    fn initiate_recovery(&self) -> Result<()> {
        (**self).initiate_recovery()
    }
    fn status(&self) -> Result<BusStatus> {
        (**self).status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_compare() {
        assert_eq!(true, Identifier::Standard(0x123) < Identifier::Standard(0x124));
        assert_eq!(true, Identifier::Standard(0x7ff) > Identifier::Standard(0x100));

        // Extended IDs always have lower priority than standard IDs
        assert_eq!(true, Identifier::Extended(0x1) > Identifier::Standard(0x100));
    }

    #[test]
    fn id_from_u32() {
        assert_eq!(Identifier::from(0x7df), Identifier::Standard(0x7df));
        assert_eq!(Identifier::from(0x800), Identifier::Extended(0x800));
        assert_eq!(u32::from(Identifier::Extended(0x18daf110)), 0x18daf110);
    }

    #[test]
    fn frame_rejects_long_data() {
        assert!(matches!(
            Frame::new(0x7e8.into(), &[0u8; 9]),
            Err(crate::Error::MalformedFrame)
        ));
        assert!(matches!(
            Frame::new_remote(0x7e8.into(), 9),
            Err(crate::Error::MalformedFrame)
        ));
    }

    #[test]
    fn frame_rejects_out_of_range_id() {
        assert!(Frame::new(Identifier::Standard(0x800), &[]).is_err());
        assert!(Frame::new(Identifier::Extended(0x2000_0000), &[]).is_err());
        assert!(Frame::new(Identifier::Extended(0x1fff_ffff), &[]).is_ok());
    }

    #[test]
    fn frame_data_is_bounded_by_dlc() {
        let frame = Frame::new(0x7e8.into(), &[0x03, 0x41, 0x0d]).unwrap();
        assert_eq!(frame.dlc(), 3);
        assert_eq!(frame.data(), &[0x03, 0x41, 0x0d]);

        let remote = Frame::new_remote(0x7df.into(), 8).unwrap();
        assert!(remote.is_remote());
        assert_eq!(remote.dlc(), 8);
        assert!(remote.data().is_empty());
    }

    #[test]
    fn frame_debug_is_hex() {
        let frame = Frame::new(0x7e8.into(), &[0x10, 0x14]).unwrap();
        let debug = format!("{:?}", frame);
        assert!(debug.contains("0x7e8"));
        assert!(debug.contains("1014"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_validates_frame() {
        let frame = Frame::new(0x7e8.into(), &[0x03, 0x41, 0x0d]).unwrap();
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(serde_json::from_str::<Frame>(&json).unwrap(), frame);

        let oversized = json.replace("\"dlc\":3", "\"dlc\":20");
        assert_ne!(oversized, json);
        assert!(serde_json::from_str::<Frame>(&oversized).is_err());

        let remote = json
            .replace("\"dlc\":3", "\"dlc\":9")
            .replace("\"rtr\":false", "\"rtr\":true");
        assert!(serde_json::from_str::<Frame>(&remote).is_err());

        let bad_id = serde_json::to_string(&Frame::new(0x7ff.into(), &[]).unwrap())
            .unwrap()
            .replace("2047", "4096");
        assert!(serde_json::from_str::<Frame>(&bad_id).is_err());
    }
}
