//! OBD-II (SAE J1979) request decoding and response building for a single emulated ECU.
//!
//! ## Example
//! ```rust
//! use obd_emulator::can::Frame;
//! use obd_emulator::obd::{single_frame_response, IncomingDiagnosticRequest};
//!
//! let request = Frame::new(0x7df.into(), &[0x02, 0x01, 0x0d, 0, 0, 0, 0, 0]).unwrap();
//! assert_eq!(
//!     IncomingDiagnosticRequest::decode(&request),
//!     Some(IncomingDiagnosticRequest::Query { mode: 0x01, pid: 0x0d })
//! );
//!
//! let response = single_frame_response(0x01, 0x0d, &[85]).unwrap();
//! assert_eq!(response.data(), &[0x03, 0x41, 0x0d, 85, 0, 0, 0, 0]);
//! ```

pub mod constants;
pub mod error;
pub mod pid;

use crate::can::{Frame, MAX_DLC};
use crate::isotp::constants::{FlowStatus, FrameType};
use crate::obd::constants::*;
use crate::Result;

/// Bytes of a single frame response that precede the PID data: length, service and PID.
const HEADER_LEN: usize = 3;

/// A frame on the bus this ECU has to act on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IncomingDiagnosticRequest {
    /// Broadcast query for one PID.
    Query { mode: u8, pid: u8 },
    /// Flow Control from the tester, the pending Consecutive Frames may be sent.
    FlowControlContinue,
}

impl IncomingDiagnosticRequest {
    /// Classify a received frame. Returns `None` for traffic this ECU ignores.
    pub fn decode(frame: &Frame) -> Option<Self> {
        if frame.is_extended() || frame.is_remote() {
            return None;
        }

        let data = frame.data();
        match u32::from(frame.id()) {
            FUNCTIONAL_REQUEST_ID => match data {
                [_, mode, pid, ..] => Some(IncomingDiagnosticRequest::Query { mode: *mode, pid: *pid }),
                _ => None,
            },
            PHYSICAL_REQUEST_ID => match data.first() {
                Some(&pci) if pci == FrameType::FlowControl as u8 | FlowStatus::ContinueToSend as u8 => {
                    Some(IncomingDiagnosticRequest::FlowControlContinue)
                }
                _ => None,
            },
            _ => None,
        }
    }
}

/// Build a positive single frame response. The frame always carries 8 bytes, unused ones are padded.
pub fn single_frame_response(mode: u8, pid: u8, data: &[u8]) -> Result<Frame> {
    if HEADER_LEN + data.len() > MAX_DLC {
        return Err(crate::Error::MalformedFrame);
    }

    let mut buf = [PADDING; MAX_DLC];
    buf[0] = (2 + data.len()) as u8;
    buf[1] = mode.wrapping_add(POSITIVE_RESPONSE);
    buf[2] = pid;
    buf[HEADER_LEN..HEADER_LEN + data.len()].copy_from_slice(data);

    Frame::new(RESPONSE_ID.into(), &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::Identifier;

    #[test]
    fn broadcast_query() {
        let frame = Frame::new(0x7df.into(), &[0x02, 0x01, 0x0c, 0x55, 0x55, 0x55, 0x55, 0x55]).unwrap();
        assert_eq!(
            IncomingDiagnosticRequest::decode(&frame),
            Some(IncomingDiagnosticRequest::Query { mode: 0x01, pid: 0x0c })
        );
    }

    #[test]
    fn short_query_ignored() {
        let frame = Frame::new(0x7df.into(), &[0x01, 0x09]).unwrap();
        assert_eq!(IncomingDiagnosticRequest::decode(&frame), None);
    }

    #[test]
    fn flow_control() {
        let frame = Frame::new(0x7e0.into(), &[0x30, 0x00, 0x00, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(
            IncomingDiagnosticRequest::decode(&frame),
            Some(IncomingDiagnosticRequest::FlowControlContinue)
        );

        // Wait and overflow are not a continue
        let frame = Frame::new(0x7e0.into(), &[0x31, 0x00, 0x00]).unwrap();
        assert_eq!(IncomingDiagnosticRequest::decode(&frame), None);
    }

    #[test]
    fn other_traffic_ignored() {
        let physical_query = Frame::new(0x7e0.into(), &[0x02, 0x01, 0x0d]).unwrap();
        assert_eq!(IncomingDiagnosticRequest::decode(&physical_query), None);

        let other = Frame::new(0x123.into(), &[0x02, 0x01, 0x0d]).unwrap();
        assert_eq!(IncomingDiagnosticRequest::decode(&other), None);

        let extended = Frame::new(Identifier::Extended(0x7df), &[0x02, 0x01, 0x0d]).unwrap();
        assert_eq!(IncomingDiagnosticRequest::decode(&extended), None);

        let remote = Frame::new_remote(0x7df.into(), 8).unwrap();
        assert_eq!(IncomingDiagnosticRequest::decode(&remote), None);
    }

    #[test]
    fn single_frame_layout() {
        let frame = single_frame_response(0x01, 0x0c, &[0x32, 0x00]).unwrap();
        assert_eq!(frame.id(), Identifier::Standard(0x7e8));
        assert_eq!(frame.data(), &[0x04, 0x41, 0x0c, 0x32, 0x00, 0x00, 0x00, 0x00]);

        let frame = single_frame_response(0x01, 0x00, &[0x00, 0x18, 0x80, 0x00]).unwrap();
        assert_eq!(frame.data(), &[0x06, 0x41, 0x00, 0x00, 0x18, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn single_frame_too_long() {
        assert!(matches!(
            single_frame_response(0x01, 0x00, &[0u8; 6]),
            Err(crate::Error::MalformedFrame)
        ));
    }

    #[test]
    fn mode_and_pid_enums() {
        assert_eq!(Mode::from_repr(0x09), Some(Mode::VehicleInformation));
        assert_eq!(Mode::from_repr(0x03), None);
        assert_eq!(CurrentDataPid::from_repr(0x2f), Some(CurrentDataPid::FuelLevel));
        assert_eq!(CurrentDataPid::from_repr(0x99), None);
        assert_eq!(VehicleInfoPid::from_repr(0x02), Some(VehicleInfoPid::Vin));
    }
}
