//! Emulated ECU runtime. Wires a controller, the receive loop and the [`Responder`] together.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use obd_emulator::can::VirtualBus;
//! use obd_emulator::ecu::{Ecu, EcuConfig};
//! use obd_emulator::vehicle::VehicleHandle;
//!
//! async fn run() -> obd_emulator::Result<()> {
//!     let vehicle = VehicleHandle::default();
//!     let ecu = Ecu::start(Arc::new(VirtualBus::new()), EcuConfig::default(), vehicle.reader())?;
//!     println!("{}", ecu.diagnostics()?);
//!     ecu.shutdown().await
//! }
//! ```

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::can::transport::DEFAULT_RX_POLL_TIMEOUT;
use crate::can::{BusConfig, BusTransport, CanController};
use crate::diagnostics::DiagnosticsReport;
use crate::obd::constants::{CurrentDataPid, Mode};
use crate::obd::{pid, single_frame_response};
use crate::responder::Responder;
use crate::vehicle::VehicleReader;
use crate::Result;

const DEFAULT_RX_QUEUE_CAPACITY: usize = 10;
const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_RESPONDER_POLL: Duration = Duration::from_millis(30);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for [`Ecu::start`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EcuConfig {
    pub bus: BusConfig,
    /// Frames buffered between the receive loop and the responder. Frames arriving while it is full are dropped.
    pub rx_queue_capacity: usize,
    /// Max time a single response transmit may block
    pub tx_timeout: Duration,
    pub rx_poll_timeout: Duration,
    pub responder_poll: Duration,
    /// Transmit a vehicle speed response once at start-up
    pub self_test: bool,
}

impl Default for EcuConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            rx_queue_capacity: DEFAULT_RX_QUEUE_CAPACITY,
            tx_timeout: DEFAULT_TX_TIMEOUT,
            rx_poll_timeout: DEFAULT_RX_POLL_TIMEOUT,
            responder_poll: DEFAULT_RESPONDER_POLL,
            self_test: true,
        }
    }
}

struct ResponderTask {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

/// A running emulated ECU. Must be created from within a tokio runtime.
pub struct Ecu<C: CanController + 'static> {
    transport: BusTransport<C>,
    responder: Option<ResponderTask>,
}

impl<C: CanController + 'static> Ecu<C> {
    /// Start the controller, send the optional self-test frame and spawn the receive loop and the responder.
    pub fn start(controller: C, config: EcuConfig, vehicle: VehicleReader) -> Result<Self> {
        let transport = BusTransport::configure_and_start(controller, config.bus)?;

        if config.self_test {
            self_test(&transport, &vehicle, config.tx_timeout);
        }

        let frames = match transport.spawn_receiver(config.rx_queue_capacity, config.rx_poll_timeout) {
            Ok(frames) => frames,
            Err(e) => {
                if let Err(e) = transport.stop() {
                    error!("Failed to stop transport: {}", e);
                }
                return Err(e);
            }
        };

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let handle = tokio::spawn(Responder::new(vehicle).run(
            transport.clone(),
            frames,
            config.responder_poll,
            config.tx_timeout,
            shutdown_receiver,
        ));

        info!("ECU emulator started");

        Ok(Self {
            transport,
            responder: Some(ResponderTask {
                handle,
                shutdown: shutdown_sender,
            }),
        })
    }

    pub fn transport(&self) -> &BusTransport<C> {
        &self.transport
    }

    pub fn diagnostics(&self) -> Result<DiagnosticsReport> {
        self.transport.diagnostics()
    }

    /// Stop the responder, then the receive loop and the controller. A responder that does not stop in time is aborted, the controller is still released and [`crate::Error::Timeout`] is returned.
    pub async fn shutdown(mut self) -> Result<()> {
        let mut timed_out = false;
        if let Some(responder) = self.responder.take() {
            let _ = responder.shutdown.send(());
            let mut handle = responder.handle;
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Responder task failed: {}", e),
                Err(_) => {
                    warn!("Responder did not stop within {:?}, aborting", SHUTDOWN_TIMEOUT);
                    handle.abort();
                    timed_out = true;
                }
            }
        }

        let transport = self.transport.clone();
        match tokio::task::spawn_blocking(move || transport.stop()).await {
            Ok(result) => result?,
            Err(e) => error!("Transport stop task failed: {}", e),
        }

        info!("ECU emulator stopped");
        if timed_out {
            return Err(crate::Error::Timeout);
        }
        Ok(())
    }
}

impl<C: CanController + 'static> Drop for Ecu<C> {
    fn drop(&mut self) {
        if let Some(responder) = self.responder.take() {
            let _ = responder.shutdown.send(());
        }
        if let Err(e) = self.transport.stop() {
            error!("Failed to stop transport: {}", e);
        }
    }
}

/// Send a speed response built from the current snapshot so the bus can be checked without a tester.
fn self_test<C: CanController>(transport: &BusTransport<C>, vehicle: &VehicleReader, timeout: Duration) {
    let state = vehicle.snapshot();
    let data = pid::encode_current_data(CurrentDataPid::VehicleSpeed, &state);

    let frame = match single_frame_response(Mode::CurrentData as u8, CurrentDataPid::VehicleSpeed as u8, &data) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to build self-test frame: {}", e);
            return;
        }
    };

    match transport.send(&frame, timeout) {
        Ok(()) => info!("Sent test speed frame: {} km/h", state.speed.min(u8::MAX as u32)),
        Err(e) => warn!("Self-test frame not sent: {}", e),
    }
}
