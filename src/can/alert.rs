//! Link-health alerts raised by the CAN controller.

use bitflags::bitflags;

bitflags! {
    /// Alerts returned by a single read. Bit values follow the TWAI alert word.
    ///
    /// Iteration follows declaration order: a bus-off reported together with a recovery in the same poll is handled before the recovery.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Alerts: u32 {
        const BUS_OFF = 0x2000;
        const BUS_RECOVERED = 0x0040;
        const ERROR_PASSIVE = 0x1000;
        const BUS_ERROR = 0x0200;
        const TX_FAILED = 0x0400;
        const TX_SUCCESS = 0x0002;
    }
}
