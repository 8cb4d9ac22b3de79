//! Error types for the CAN transport.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Controller Install Failed: {0}")]
    ControllerInstallFailed(String),
    #[error("Controller Start Failed: {0}")]
    ControllerStartFailed(String),
    #[error("Transmit Timeout")]
    TransmitTimeout,
    #[error("Transmit Failed: {0}")]
    TransmitFailed(String),
    #[error("Bus Off")]
    BusOff,
    #[error("Controller Not Installed")]
    NotInstalled,
    #[error("Controller Not Running")]
    NotRunning,
    #[error("Receive Loop Already Running")]
    ReceiverRunning,
    #[error("Invalid Receive Queue Capacity: {0}")]
    InvalidQueueCapacity(usize),
    #[error("Invalid Controller State: {0}")]
    InvalidState(String),
}
