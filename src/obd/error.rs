//! Error types for OBD-II request handling. None of these are reported on the bus, the request is dropped.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("Unsupported Mode: 0x{0:02x}")]
    UnsupportedMode(u8),
    #[error("Unsupported PID: mode 0x{mode:02x} pid 0x{pid:02x}")]
    UnsupportedPid { mode: u8, pid: u8 },
}
