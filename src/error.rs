//! Contains the main error type for the library.
use thiserror::Error;

/// The main error type for the library. Each module has it's own error type that is contained by this error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed Frame")]
    MalformedFrame,
    #[error("Invalid Bitrate: {0} kbps")]
    InvalidBitrate(u32),
    #[error("Timeout")]
    Timeout,
    #[error(transparent)]
    CanError(#[from] crate::can::error::Error),
    #[error(transparent)]
    IsoTPError(#[from] crate::isotp::error::Error),
    #[error(transparent)]
    ObdError(#[from] crate::obd::error::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Error {
        Error::Timeout
    }
}
