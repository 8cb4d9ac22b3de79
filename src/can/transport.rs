//! Bus transport. Bridges [`Frame`] to a [`CanController`], tracks the link state and drives bus-off recovery.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::can::{Alerts, BitRate, BusState, BusStatus, CanController, Frame, RawMessage};
use crate::diagnostics::DiagnosticsReport;
use crate::Result;

/// Default receive poll timeout of the background receive loop.
pub const DEFAULT_RX_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Controller configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusConfig {
    pub bit_rate: BitRate,
    pub tx_pin: u8,
    pub rx_pin: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            bit_rate: BitRate::Kbps500,
            tx_pin: 5,
            rx_pin: 35,
        }
    }
}

struct ReceiveLoop {
    handle: std::thread::JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

struct Inner<C> {
    controller: C,
    state: AtomicU8,
    stopped: AtomicBool,
    receiver: Mutex<Option<ReceiveLoop>>,
}

/// Handle to a started controller. Cheap to clone, all clones share the same controller and link state.
pub struct BusTransport<C: CanController> {
    inner: Arc<Inner<C>>,
}

impl<C: CanController> Clone for BusTransport<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: CanController + 'static> BusTransport<C> {
    /// Install and start the controller. If starting fails the controller is uninstalled again before the error is returned.
    pub fn configure_and_start(controller: C, config: BusConfig) -> Result<Self> {
        let timing = config.bit_rate.timing()?;

        if let Err(e) = controller.install(&timing, config.tx_pin, config.rx_pin) {
            error!("Failed to install CAN controller: {}", e);
            return Err(crate::can::error::Error::ControllerInstallFailed(e.to_string()).into());
        }

        if let Err(e) = controller.start() {
            error!("Failed to start CAN controller: {}", e);
            if let Err(e) = controller.uninstall() {
                error!("Failed to uninstall CAN controller: {}", e);
            }
            return Err(crate::can::error::Error::ControllerStartFailed(e.to_string()).into());
        }

        info!(
            "CAN controller started on TX:{} RX:{} at {} kbps",
            config.tx_pin,
            config.rx_pin,
            config.bit_rate.kbps()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                controller,
                state: AtomicU8::new(BusState::Running as u8),
                stopped: AtomicBool::new(false),
                receiver: Mutex::new(None),
            }),
        })
    }

    /// Start the background receive loop. Received frames are pushed into a channel of `capacity` frames, when the channel is full new frames are dropped.
    pub fn spawn_receiver(&self, capacity: usize, poll_timeout: Duration) -> Result<mpsc::Receiver<Frame>> {
        if capacity == 0 {
            return Err(crate::can::error::Error::InvalidQueueCapacity(capacity).into());
        }

        let mut receiver = self.receiver();
        if receiver.is_some() {
            return Err(crate::can::error::Error::ReceiverRunning.into());
        }

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let (frame_sender, frame_receiver) = mpsc::channel(capacity);

        let transport = self.clone();
        let handle = std::thread::Builder::new()
            .name("can-rx".into())
            .spawn(move || receive_loop(transport, shutdown_receiver, frame_sender, poll_timeout))?;

        *receiver = Some(ReceiveLoop {
            handle,
            shutdown: shutdown_sender,
        });

        Ok(frame_receiver)
    }
}

impl<C: CanController> BusTransport<C> {
    /// Transmit a single frame, blocking up to `timeout`. Failures are logged and returned as [`TransmitTimeout`](crate::can::error::Error::TransmitTimeout) or [`TransmitFailed`](crate::can::error::Error::TransmitFailed), the frame is not retried.
    pub fn send(&self, frame: &Frame, timeout: Duration) -> Result<()> {
        match self.state() {
            BusState::Running => {}
            BusState::BusOff | BusState::Recovering => {
                warn!("Not transmitting {:?}, bus is off", frame);
                return Err(crate::can::error::Error::BusOff.into());
            }
            BusState::Stopped => {
                warn!("Not transmitting {:?}, controller stopped", frame);
                return Err(crate::can::error::Error::NotRunning.into());
            }
        }

        debug!("TX {:?}", frame);

        let message = RawMessage::from(frame);
        if let Err(e) = self.inner.controller.transmit(&message, timeout) {
            warn!("Failed to transmit {:?}: {}", frame, e);
            let e = match e {
                crate::Error::Timeout
                | crate::Error::CanError(crate::can::error::Error::TransmitTimeout) => {
                    crate::can::error::Error::TransmitTimeout
                }
                crate::Error::CanError(e @ crate::can::error::Error::TransmitFailed(_)) => e,
                e => crate::can::error::Error::TransmitFailed(e.to_string()),
            };
            return Err(e.into());
        }

        Ok(())
    }

    /// Wait up to `timeout` for one frame. Returns `None` on timeout. Controller errors and undecodable messages are logged and reported as `None`.
    pub fn poll_receive(&self, timeout: Duration) -> Option<Frame> {
        match self.receive(timeout) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to receive: {}", e);
                None
            }
        }
    }

    fn receive(&self, timeout: Duration) -> Result<Option<Frame>> {
        let Some(message) = self.inner.controller.receive(timeout)? else {
            return Ok(None);
        };

        match Frame::try_from(&message) {
            Ok(frame) => Ok(Some(frame)),
            Err(e) => {
                debug!("Dropping undecodable message {:?}: {}", message, e);
                Ok(None)
            }
        }
    }

    /// Read pending alerts without blocking and apply them to the link state.
    pub fn poll_alerts(&self) -> Alerts {
        let alerts = match self.inner.controller.read_alerts() {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!("Failed to read alerts: {}", e);
                return Alerts::empty();
            }
        };

        for alert in alerts.iter() {
            if alert == Alerts::BUS_OFF {
                self.enter_bus_off();
            } else if alert == Alerts::BUS_RECOVERED {
                self.bus_recovered();
            } else if alert == Alerts::ERROR_PASSIVE {
                warn!("CAN controller is error passive");
            } else if alert == Alerts::BUS_ERROR {
                warn!("CAN bus error");
            } else if alert == Alerts::TX_FAILED {
                warn!("CAN transmit failed");
            } else if alert == Alerts::TX_SUCCESS {
                trace!("CAN transmit succeeded");
            }
        }

        alerts
    }

    fn enter_bus_off(&self) {
        let entered = self
            .inner
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
                match BusState::from_repr(state) {
                    Some(BusState::BusOff) | Some(BusState::Recovering) => None,
                    _ => Some(BusState::BusOff as u8),
                }
            })
            .is_ok();

        if !entered {
            debug!("Bus off alert while already recovering");
            return;
        }

        error!("Bus Off condition occurred. Initiating recovery...");
        match self.inner.controller.initiate_recovery() {
            Ok(()) => {
                // A recovered alert may already have moved the state on
                let _ = self.inner.state.compare_exchange(
                    BusState::BusOff as u8,
                    BusState::Recovering as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            }
            Err(e) => error!("Failed to initiate bus recovery: {}", e),
        }
    }

    fn bus_recovered(&self) {
        let recovering = self
            .inner
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
                match BusState::from_repr(state) {
                    Some(BusState::BusOff) | Some(BusState::Recovering) => {
                        Some(BusState::Recovering as u8)
                    }
                    _ => None,
                }
            })
            .is_ok();

        if !recovering {
            debug!("Ignoring bus recovered alert in state {}", self.state());
            return;
        }

        info!("Bus Recovered. Restarting CAN controller...");
        match self.inner.controller.start() {
            Ok(()) => self.set_state(BusState::Running),
            Err(e) => error!("Failed to restart CAN controller: {}", e),
        }
    }

    /// Halt the receive loop, then stop and uninstall the controller. Calling this more than once is a no-op.
    pub fn stop(&self) -> Result<()> {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let receiver = self.receiver().take();
        if let Some(receiver) = receiver {
            // The loop also exits on its own once the frame channel is closed
            let _ = receiver.shutdown.send(());
            if receiver.handle.join().is_err() {
                error!("CAN receive loop panicked");
            }
        }

        self.set_state(BusState::Stopped);

        if let Err(e) = self.inner.controller.stop() {
            error!("Failed to stop CAN controller: {}", e);
        }
        if let Err(e) = self.inner.controller.uninstall() {
            error!("Failed to uninstall CAN controller: {}", e);
            return Err(e);
        }

        info!("CAN controller stopped");
        Ok(())
    }

    /// Link state as tracked from alerts.
    pub fn state(&self) -> BusState {
        BusState::from_repr(self.inner.state.load(Ordering::SeqCst)).unwrap_or(BusState::Stopped)
    }

    /// Live status read from the controller.
    pub fn status(&self) -> Result<BusStatus> {
        self.inner.controller.status()
    }

    /// Operator report built from the live status.
    pub fn diagnostics(&self) -> Result<DiagnosticsReport> {
        Ok(DiagnosticsReport::new(&self.status()?))
    }

    pub fn controller(&self) -> &C {
        &self.inner.controller
    }

    fn set_state(&self, state: BusState) {
        self.inner.state.store(state as u8, Ordering::SeqCst);
    }

    fn receiver(&self) -> MutexGuard<'_, Option<ReceiveLoop>> {
        self.inner
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn receive_loop<C: CanController>(
    transport: BusTransport<C>,
    mut shutdown: oneshot::Receiver<()>,
    frames: mpsc::Sender<Frame>,
    poll_timeout: Duration,
) {
    debug!("CAN receive loop started");

    while let Err(oneshot::error::TryRecvError::Empty) = shutdown.try_recv() {
        transport.poll_alerts();

        match transport.receive(poll_timeout) {
            Ok(Some(frame)) => {
                debug!("RX {:?}", frame);
                match frames.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(frame)) => debug!("RX queue full, dropping {:?}", frame),
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            Ok(None) if frames.is_closed() => break,
            Ok(None) => {}
            Err(e) => {
                // Errors such as a downed interface return at once, wait out the poll period
                warn!("Failed to receive: {}", e);
                std::thread::sleep(poll_timeout);
            }
        }
    }

    debug!("CAN receive loop stopped");
}
