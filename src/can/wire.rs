//! Controller-level frame representation. Uses the Linux `can_frame` layout: a 32-bit id word carrying the EFF/RTR flags, the DLC, then 8 data bytes.

use crate::can::{Frame, Identifier, MAX_DLC};

/// Extended frame format flag in the id word
pub const EFF_FLAG: u32 = 0x8000_0000;
/// Remote transmission request flag in the id word
pub const RTR_FLAG: u32 = 0x4000_0000;
pub const SFF_MASK: u32 = 0x0000_07ff;
pub const EFF_MASK: u32 = 0x1fff_ffff;

/// Message as handed to and received from a [`crate::can::CanController`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RawMessage {
    pub can_id: u32,
    pub can_dlc: u8,
    pub data: [u8; MAX_DLC],
}

impl RawMessage {
    pub fn is_extended(&self) -> bool {
        self.can_id & EFF_FLAG != 0
    }

    pub fn is_remote(&self) -> bool {
        self.can_id & RTR_FLAG != 0
    }
}

fn id_to_can_id(id: Identifier) -> u32 {
    match id {
        Identifier::Standard(id) => id,
        Identifier::Extended(id) => id | EFF_FLAG,
    }
}

fn can_id_to_id(can_id: u32) -> Identifier {
    match can_id & EFF_FLAG != 0 {
        true => Identifier::Extended(can_id & EFF_MASK),
        false => Identifier::Standard(can_id & SFF_MASK),
    }
}

impl From<&Frame> for RawMessage {
    fn from(frame: &Frame) -> RawMessage {
        let mut can_id = id_to_can_id(frame.id());
        if frame.is_remote() {
            can_id |= RTR_FLAG;
        }

        let mut data = [0u8; MAX_DLC];
        data[..frame.data().len()].copy_from_slice(frame.data());

        RawMessage {
            can_id,
            can_dlc: frame.dlc() as u8,
            data,
        }
    }
}

impl TryFrom<&RawMessage> for Frame {
    type Error = crate::Error;

    fn try_from(message: &RawMessage) -> Result<Frame, Self::Error> {
        let dlc = message.can_dlc as usize;
        if dlc > MAX_DLC {
            return Err(crate::Error::MalformedFrame);
        }

        let id = can_id_to_id(message.can_id);
        if message.is_remote() {
            Frame::new_remote(id, dlc)
        } else {
            Frame::new(id, &message.data[..dlc])
        }
    }
}
