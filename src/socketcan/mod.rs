//! This module provides a [`CanController`] implementation for the [`socketcan`] crate.
//!
//! The bit rate of a SocketCAN interface is configured by the system (`ip link set can0 type can bitrate 500000 restart-ms 100`), the timing passed to [`CanController::install`] is only logged. Bus-off recovery is done by the kernel when `restart-ms` is set. Error frames are mapped to [`Alerts`].
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use ::socketcan::errors::ControllerProblem;
use ::socketcan::{CanError, CanFrame, CanSocket, Socket, SocketOptions};
use tracing::{debug, info, warn};

use crate::can::{Alerts, BitTiming, BusState, BusStatus, CanController, RawMessage};
use crate::Result;

mod frame;

/// Error counter value reported after a bus-off.
const BUS_OFF_ERROR_COUNTER: u32 = 256;

struct ControllerState {
    status: BusStatus,
    alerts: Alerts,
}

/// Controller backed by a raw SocketCAN socket.
pub struct SocketCanController {
    interface: String,
    socket: RwLock<Option<Arc<CanSocket>>>,
    state: Mutex<ControllerState>,
}

impl SocketCanController {
    /// Controller for the interface `name`, such as `can0` or `vcan0`. The socket is opened on install.
    pub fn new(name: &str) -> Self {
        Self {
            interface: name.to_owned(),
            socket: RwLock::new(None),
            state: Mutex::new(ControllerState {
                status: BusStatus::default(),
                alerts: Alerts::empty(),
            }),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn socket(&self) -> Result<Arc<CanSocket>> {
        self.socket
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| crate::can::error::Error::NotInstalled.into())
    }

    fn handle_error_frame(&self, error: CanError) {
        let mut state = self.lock();
        let status = &mut state.status;

        let alert = match error {
            CanError::BusOff => {
                status.state = BusState::BusOff;
                status.tx_error_counter = BUS_OFF_ERROR_COUNTER;
                Some(Alerts::BUS_OFF)
            }
            CanError::Restarted => {
                status.state = BusState::Stopped;
                status.tx_error_counter = 0;
                status.rx_error_counter = 0;
                Some(Alerts::BUS_RECOVERED)
            }
            CanError::NoAck | CanError::TransmitTimeout => {
                status.tx_failed_count += 1;
                Some(Alerts::TX_FAILED)
            }
            CanError::LostArbitration(_) => {
                status.arb_lost_count += 1;
                None
            }
            CanError::ControllerProblem(
                ControllerProblem::ReceiveErrorPassive | ControllerProblem::TransmitErrorPassive,
            ) => Some(Alerts::ERROR_PASSIVE),
            CanError::ControllerProblem(ControllerProblem::ReceiveBufferOverflow) => {
                status.rx_overrun_count += 1;
                Some(Alerts::BUS_ERROR)
            }
            other => {
                debug!("CAN error frame: {}", other);
                status.bus_error_count += 1;
                Some(Alerts::BUS_ERROR)
            }
        };

        if let Some(alert) = alert {
            state.alerts.insert(alert);
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

impl CanController for SocketCanController {
    fn install(&self, timing: &BitTiming, _tx_pin: u8, _rx_pin: u8) -> Result<()> {
        let mut socket = self.socket.write().unwrap_or_else(PoisonError::into_inner);
        if socket.is_some() {
            return Err(crate::can::error::Error::InvalidState("socket already open".into()).into());
        }

        let can_socket = CanSocket::open(&self.interface)?;
        can_socket.set_error_filter_accept_all()?;
        *socket = Some(Arc::new(can_socket));

        debug!(
            "Requested {} bps on {}, the interface bit rate is set by the system",
            timing.bitrate(),
            self.interface
        );
        info!("Connected to SocketCAN interface {}", self.interface);

        self.lock().status = BusStatus::new(BusState::Stopped);
        Ok(())
    }

    fn uninstall(&self) -> Result<()> {
        let mut socket = self.socket.write().unwrap_or_else(PoisonError::into_inner);
        if socket.take().is_none() {
            return Err(crate::can::error::Error::NotInstalled.into());
        }
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.socket()?;
        self.lock().status.state = BusState::Running;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.socket()?;
        self.lock().status.state = BusState::Stopped;
        Ok(())
    }

    fn transmit(&self, message: &RawMessage, timeout: Duration) -> Result<()> {
        let socket = self.socket()?;
        let frame = crate::can::Frame::try_from(message)?;
        let can_frame = CanFrame::try_from(&frame)?;

        socket.set_write_timeout(timeout)?;
        if let Err(e) = socket.write_frame(&can_frame) {
            self.lock().status.tx_failed_count += 1;
            if is_timeout(&e) {
                return Err(crate::can::error::Error::TransmitTimeout.into());
            }
            return Err(crate::can::error::Error::TransmitFailed(e.to_string()).into());
        }

        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<RawMessage>> {
        let socket = self.socket()?;

        let can_frame = match socket.read_frame_timeout(timeout) {
            Ok(can_frame) => can_frame,
            Err(e) if is_timeout(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match frame::from_can_frame(&can_frame) {
            Some(frame) => Ok(Some(RawMessage::from(&frame?))),
            None => {
                if let CanFrame::Error(error_frame) = can_frame {
                    self.handle_error_frame(error_frame.into_error());
                }
                Ok(None)
            }
        }
    }

    fn read_alerts(&self) -> Result<Alerts> {
        Ok(std::mem::replace(&mut self.lock().alerts, Alerts::empty()))
    }

    fn initiate_recovery(&self) -> Result<()> {
        self.socket()?;

        let mut state = self.lock();
        if state.status.state != BusState::BusOff {
            warn!("Recovery requested while {}", state.status.state);
        }
        state.status.state = BusState::Recovering;

        info!("Waiting for {} to be restarted by the kernel", self.interface);
        Ok(())
    }

    fn status(&self) -> Result<BusStatus> {
        Ok(self.lock().status)
    }
}
