//! Transmit side of the ISO Transport Protocol (ISO-TP, ISO 15765-2), limited to what an OBD-II responder needs.
//!
//! A payload longer than a single frame is split into a First Frame, which is sent right away, and Consecutive Frames that are held until the tester answers with a Flow Control frame. Block size and separation time from the tester are not honored, all pending frames are released at once.
//!
//! ## Example:
//! ```rust
//! use obd_emulator::isotp::MultiFrameTransmission;
//!
//! let mut pending = MultiFrameTransmission::new(0x7e8.into());
//! let payload: Vec<u8> = (0..20).collect();
//!
//! let first_frame = pending.begin(&payload).unwrap();
//! assert_eq!(&first_frame.data()[..2], &[0x10, 0x14]);
//!
//! // After Flow Control "continue"
//! let consecutive_frames = pending.release();
//! assert_eq!(consecutive_frames.len(), 2);
//! assert!(pending.release().is_empty());
//! ```

pub mod constants;
pub mod error;

use crate::can::{Frame, Identifier, MAX_DLC};
use crate::isotp::constants::FrameType;
use crate::Result;

use tracing::debug;

/// Number of Consecutive Frames that can be pending at once.
pub const PENDING_SLOTS: usize = 5;
const FIRST_FRAME_DATA_LEN: usize = MAX_DLC - 2;
const CONSECUTIVE_FRAME_DATA_LEN: usize = MAX_DLC - 1;
/// Largest payload that fits in a First Frame plus the pending slots.
pub const MAX_PAYLOAD_LEN: usize = FIRST_FRAME_DATA_LEN + PENDING_SLOTS * CONSECUTIVE_FRAME_DATA_LEN;
/// Marker byte of a slot that holds no frame
const EMPTY_SLOT: u8 = 0x00;

/// The single pending multi-frame transmission of a responder. Slots are released in order, slots that were never populated are skipped.
pub struct MultiFrameTransmission {
    tx_id: Identifier,
    padding: u8,
    slots: [[u8; MAX_DLC]; PENDING_SLOTS],
}

impl MultiFrameTransmission {
    pub fn new(tx_id: Identifier) -> Self {
        Self {
            tx_id,
            padding: 0x00,
            slots: [[EMPTY_SLOT; MAX_DLC]; PENDING_SLOTS],
        }
    }

    /// Start a new transmission. Any frames still pending from an earlier transmission are discarded first. Returns the First Frame, the remaining data is held until [`MultiFrameTransmission::release`].
    pub fn begin(&mut self, data: &[u8]) -> Result<Frame> {
        if data.len() <= CONSECUTIVE_FRAME_DATA_LEN {
            return Err(crate::isotp::error::Error::NotSegmented(data.len()).into());
        }
        if data.len() > MAX_PAYLOAD_LEN {
            return Err(crate::isotp::error::Error::DataTooLarge(data.len()).into());
        }

        if self.is_pending() {
            debug!("Discarding stale multi-frame transmission");
        }
        self.clear();

        let b0: u8 = FrameType::First as u8 | ((data.len() >> 8) & 0xF) as u8;
        let b1: u8 = (data.len() & 0xFF) as u8;

        let mut buf = vec![b0, b1];
        buf.extend(&data[..FIRST_FRAME_DATA_LEN]);

        debug!("TX FF, length: {} data {}", data.len(), hex::encode(&buf));

        let chunks = data[FIRST_FRAME_DATA_LEN..].chunks(CONSECUTIVE_FRAME_DATA_LEN);
        for (idx, chunk) in chunks.enumerate() {
            self.slots[idx] = self.consecutive_frame(chunk, idx);
        }

        Frame::new(self.tx_id, &buf)
    }

    fn consecutive_frame(&self, data: &[u8], idx: usize) -> [u8; MAX_DLC] {
        let idx = ((idx + 1) & 0xF) as u8;

        let mut buf = [self.padding; MAX_DLC];
        buf[0] = FrameType::Consecutive as u8 | idx;
        buf[1..=data.len()].copy_from_slice(data);

        debug!("Queued CF, idx: {} data {}", idx, hex::encode(buf));
        buf
    }

    /// Take all pending Consecutive Frames in sequence order and clear the queue. Returns nothing if no transmission is pending.
    pub fn release(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();

        for slot in self.slots.iter().filter(|slot| slot[0] != EMPTY_SLOT) {
            match Frame::new(self.tx_id, slot) {
                Ok(frame) => frames.push(frame),
                Err(e) => debug!("Skipping pending slot {}: {}", hex::encode(slot), e),
            }
        }

        self.clear();
        frames
    }

    pub fn is_pending(&self) -> bool {
        self.slots.iter().any(|slot| slot[0] != EMPTY_SLOT)
    }

    /// Number of Consecutive Frames waiting for Flow Control.
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|slot| slot[0] != EMPTY_SLOT).count()
    }

    pub fn clear(&mut self) {
        self.slots = [[EMPTY_SLOT; MAX_DLC]; PENDING_SLOTS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        (1..=len as u8).collect()
    }

    #[test]
    fn first_frame_layout() {
        let mut tx = MultiFrameTransmission::new(0x7e8.into());
        let ff = tx.begin(&payload(20)).unwrap();

        assert_eq!(ff.id(), Identifier::Standard(0x7e8));
        assert_eq!(ff.data(), &[0x10, 0x14, 1, 2, 3, 4, 5, 6]);
        assert_eq!(tx.pending(), 2);
    }

    #[test]
    fn last_consecutive_frame_is_padded() {
        let mut tx = MultiFrameTransmission::new(0x7e8.into());
        tx.begin(&payload(15)).unwrap();

        let frames = tx.release();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data(), &[0x21, 7, 8, 9, 10, 11, 12, 13]);
        assert_eq!(frames[1].data(), &[0x22, 14, 15, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn release_uses_every_slot() {
        let mut tx = MultiFrameTransmission::new(0x7e8.into());
        tx.begin(&payload(MAX_PAYLOAD_LEN)).unwrap();

        let pci: Vec<u8> = tx.release().iter().map(|frame| frame.data()[0]).collect();
        assert_eq!(pci, vec![0x21, 0x22, 0x23, 0x24, 0x25]);
    }

    #[test]
    fn release_twice_sends_nothing() {
        let mut tx = MultiFrameTransmission::new(0x7e8.into());
        tx.begin(&payload(20)).unwrap();

        assert_eq!(tx.release().len(), 2);
        assert!(!tx.is_pending());
        assert!(tx.release().is_empty());
    }

    #[test]
    fn begin_replaces_stale_frames() {
        let mut tx = MultiFrameTransmission::new(0x7e8.into());
        tx.begin(&payload(MAX_PAYLOAD_LEN)).unwrap();
        assert_eq!(tx.pending(), 5);

        tx.begin(&payload(20)).unwrap();
        let frames = tx.release();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].data()[0], 0x22);
    }

    #[test]
    fn size_limits() {
        let mut tx = MultiFrameTransmission::new(0x7e8.into());
        assert!(matches!(
            tx.begin(&payload(7)),
            Err(crate::Error::IsoTPError(error::Error::NotSegmented(7)))
        ));
        assert!(matches!(
            tx.begin(&payload(MAX_PAYLOAD_LEN + 1)),
            Err(crate::Error::IsoTPError(error::Error::DataTooLarge(42)))
        ));
        assert!(!tx.is_pending());
    }

    #[test]
    fn frame_type_from_pci() {
        assert_eq!(FrameType::from(0x10), FrameType::First);
        assert_eq!(FrameType::from(0x21), FrameType::Consecutive);
        assert_eq!(FrameType::from(0x30), FrameType::FlowControl);
        assert_eq!(FrameType::from(0x45), FrameType::Unknown);
    }
}
