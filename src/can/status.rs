use strum_macros::{Display, FromRepr};

/// Controller state as tracked by the transport and reported by the controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum BusState {
    #[strum(serialize = "STOPPED")]
    Stopped = 0,
    #[strum(serialize = "RUNNING")]
    Running = 1,
    #[strum(serialize = "BUS OFF")]
    BusOff = 2,
    #[strum(serialize = "RECOVERING")]
    Recovering = 3,
}

/// Live controller status. Counters only ever increase, except the queue depths.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusStatus {
    pub state: BusState,
    pub tx_error_counter: u32,
    pub rx_error_counter: u32,
    /// Messages waiting in the transmit queue
    pub msgs_to_tx: u32,
    /// Messages waiting in the receive queue
    pub msgs_to_rx: u32,
    pub tx_failed_count: u32,
    pub rx_missed_count: u32,
    pub rx_overrun_count: u32,
    pub arb_lost_count: u32,
    pub bus_error_count: u32,
}

impl BusStatus {
    pub fn new(state: BusState) -> Self {
        BusStatus {
            state,
            tx_error_counter: 0,
            rx_error_counter: 0,
            msgs_to_tx: 0,
            msgs_to_rx: 0,
            tx_failed_count: 0,
            rx_missed_count: 0,
            rx_overrun_count: 0,
            arb_lost_count: 0,
            bus_error_count: 0,
        }
    }
}

impl Default for BusStatus {
    fn default() -> Self {
        BusStatus::new(BusState::Stopped)
    }
}
