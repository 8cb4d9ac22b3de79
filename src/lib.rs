//! # The OBD Emulator Crate
//! Emulates a vehicle ECU that answers OBD-II queries over a CAN bus. The crate contains a CAN transport with bus-off recovery, an OBD-II query decoder and PID codec, and the ISO-TP subset needed to send responses that don't fit in a single frame.
//!
//! ## Example
//!
//! The following starts an emulated ECU on the in-memory [`can::VirtualBus`] controller and answers a speed query.
//!
//! ```rust
//! use std::sync::Arc;
//! use obd_emulator::can::{Frame, VirtualBus};
//! use obd_emulator::ecu::{Ecu, EcuConfig};
//! use obd_emulator::vehicle::{VehicleHandle, VehicleState};
//!
//! async fn ecu_example() {
//!     let bus = Arc::new(VirtualBus::new());
//!     let vehicle = VehicleHandle::new(VehicleState::default());
//!     let ecu = Ecu::start(bus.clone(), EcuConfig::default(), vehicle.reader()).unwrap();
//!
//!     vehicle.set_field("speed", "85");
//!     bus.inject(&Frame::new(0x7df.into(), &[0x02, 0x01, 0x0d, 0, 0, 0, 0, 0]).unwrap());
//!
//!     ecu.shutdown().await.unwrap();
//! }
//! ```
//!
//! ## Supported controllers
//!  - In-memory virtual bus (all platforms)
//!  - SocketCAN (Linux only, `socketcan` feature, supported using [socketcan-rs](https://github.com/socketcan-rs/socketcan-rs))
//!

pub mod can;
pub mod diagnostics;
pub mod ecu;
mod error;
pub mod isotp;
pub mod obd;
pub mod responder;
pub mod vehicle;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;
