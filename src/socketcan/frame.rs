use ::socketcan::{CanFrame, EmbeddedFrame, ExtendedId, Id, StandardId};

use crate::can::{Frame, Identifier};

impl From<Id> for Identifier {
    fn from(id: Id) -> Self {
        match id {
            Id::Standard(id) => Identifier::Standard(id.as_raw() as u32),
            Id::Extended(id) => Identifier::Extended(id.as_raw()),
        }
    }
}

impl TryFrom<Identifier> for Id {
    type Error = crate::Error;

    fn try_from(id: Identifier) -> crate::Result<Self> {
        let id = match id {
            Identifier::Standard(id) => u16::try_from(id)
                .ok()
                .and_then(StandardId::new)
                .map(Id::Standard),
            Identifier::Extended(id) => ExtendedId::new(id).map(Id::Extended),
        };
        id.ok_or(crate::Error::MalformedFrame)
    }
}

impl TryFrom<&Frame> for CanFrame {
    type Error = crate::Error;

    fn try_from(frame: &Frame) -> crate::Result<Self> {
        let id = Id::try_from(frame.id())?;
        let frame = if frame.is_remote() {
            CanFrame::new_remote(id, frame.dlc())
        } else {
            CanFrame::new(id, frame.data())
        };
        frame.ok_or(crate::Error::MalformedFrame)
    }
}

/// Convert a received data or remote frame. Error frames are handled by the controller and give `None`.
pub(crate) fn from_can_frame(frame: &CanFrame) -> Option<crate::Result<Frame>> {
    match frame {
        CanFrame::Data(frame) => Some(Frame::new(frame.id().into(), frame.data())),
        CanFrame::Remote(frame) => Some(Frame::new_remote(frame.id().into(), frame.dlc())),
        CanFrame::Error(_) => None,
    }
}
