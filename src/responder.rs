//! Turns received frames into OBD-II responses.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, trace};

use crate::can::{BusTransport, CanController, Frame};
use crate::isotp::MultiFrameTransmission;
use crate::obd::constants::{CurrentDataPid, Mode, VehicleInfoPid, RESPONSE_ID};
use crate::obd::{pid, single_frame_response, IncomingDiagnosticRequest};
use crate::vehicle::VehicleReader;
use crate::Result;

/// Answers Mode 1 and Mode 9 queries from the latest vehicle snapshot. Owns the single pending multi-frame transmission, so all frames must be handled from one task.
pub struct Responder {
    vehicle: VehicleReader,
    pending: MultiFrameTransmission,
}

impl Responder {
    pub fn new(vehicle: VehicleReader) -> Self {
        Self {
            vehicle,
            pending: MultiFrameTransmission::new(RESPONSE_ID.into()),
        }
    }

    /// Handle one received frame and return the frames to transmit, in order. Unsupported requests and unrelated traffic produce nothing.
    pub fn handle(&mut self, frame: &Frame) -> Vec<Frame> {
        match IncomingDiagnosticRequest::decode(frame) {
            Some(IncomingDiagnosticRequest::Query { mode, pid }) => {
                debug!("OBD query, mode: 0x{:02x} pid: 0x{:02x}", mode, pid);
                match self.query(mode, pid) {
                    Ok(frames) => frames,
                    Err(e) => {
                        debug!("Ignoring query: {}", e);
                        vec![]
                    }
                }
            }
            Some(IncomingDiagnosticRequest::FlowControlContinue) => {
                let frames = self.pending.release();
                if frames.is_empty() {
                    debug!("Flow control without pending transmission");
                } else {
                    debug!("Flow control, releasing {} consecutive frames", frames.len());
                }
                frames
            }
            None => {
                trace!("Ignoring {:?}", frame);
                vec![]
            }
        }
    }

    fn query(&mut self, mode: u8, pid: u8) -> Result<Vec<Frame>> {
        let unsupported = crate::obd::error::Error::UnsupportedPid { mode, pid };
        let state = self.vehicle.snapshot();

        match Mode::from_repr(mode) {
            Some(Mode::CurrentData) => {
                let pid_type = CurrentDataPid::from_repr(pid).ok_or(unsupported)?;
                let data = pid::encode_current_data(pid_type, &state);
                Ok(vec![single_frame_response(mode, pid, &data)?])
            }
            Some(Mode::VehicleInformation) => match VehicleInfoPid::from_repr(pid).ok_or(unsupported)? {
                VehicleInfoPid::Supported => {
                    let data = pid::vehicle_info_supported();
                    Ok(vec![single_frame_response(mode, pid, &data)?])
                }
                VehicleInfoPid::Vin => {
                    let first_frame = self.pending.begin(&pid::vin_payload(&state.vin))?;
                    Ok(vec![first_frame])
                }
            },
            None => Err(crate::obd::error::Error::UnsupportedMode(mode).into()),
        }
    }

    /// Number of Consecutive Frames waiting for Flow Control.
    pub fn pending(&self) -> usize {
        self.pending.pending()
    }

    /// Consume frames until the channel closes or `shutdown` fires. The channel is polled with `poll` as timeout. Responses are sent one at a time, each send blocks for at most `tx_timeout` and failed sends are not retried.
    pub async fn run<C: CanController + 'static>(
        mut self,
        transport: BusTransport<C>,
        frames: mpsc::Receiver<Frame>,
        poll: Duration,
        tx_timeout: Duration,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        info!("OBD responder started");

        let stream = ReceiverStream::new(frames).timeout(poll);
        tokio::pin!(stream);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                item = stream.next() => match item {
                    Some(Ok(frame)) => {
                        for response in self.handle(&frame) {
                            send(&transport, response, tx_timeout).await;
                        }
                    }
                    Some(Err(_)) => trace!("No frame received"),
                    None => {
                        debug!("Frame channel closed");
                        break;
                    }
                },
            }
        }

        info!("OBD responder stopped");
    }
}

async fn send<C: CanController + 'static>(transport: &BusTransport<C>, frame: Frame, timeout: Duration) {
    let transport = transport.clone();
    // Failures are already logged by the transport
    if let Err(e) = tokio::task::spawn_blocking(move || transport.send(&frame, timeout)).await {
        error!("Send task failed: {}", e);
    }
}
