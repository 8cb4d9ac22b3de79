//! In-memory [`CanController`]. Frames are injected by the caller, transmitted frames are recorded, and alerts can be raised on demand. Used by the tests and the demo, and handy for driving the emulator without hardware.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::can::error::Error;
use crate::can::{Alerts, BitTiming, BusState, BusStatus, CanController, Frame, RawMessage};
use crate::Result;

/// Number of times each controller operation was called.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub install: usize,
    pub uninstall: usize,
    pub start: usize,
    pub stop: usize,
    pub recovery: usize,
    pub transmit: usize,
    pub receive: usize,
}

#[derive(Default)]
struct Faults {
    install: bool,
    start: bool,
    transmit: Option<Error>,
    transmit_delay: Option<Duration>,
    receive: Option<Error>,
}

struct VirtualState {
    timing: Option<BitTiming>,
    pins: Option<(u8, u8)>,
    status: BusStatus,
    rx: VecDeque<RawMessage>,
    tx: Vec<RawMessage>,
    alerts: Alerts,
    calls: CallCounts,
    faults: Faults,
}

pub struct VirtualBus {
    state: Mutex<VirtualState>,
    rx_ready: Condvar,
}

impl VirtualBus {
    pub fn new() -> Self {
        VirtualBus {
            state: Mutex::new(VirtualState {
                timing: None,
                pins: None,
                status: BusStatus::default(),
                rx: VecDeque::new(),
                tx: Vec::new(),
                alerts: Alerts::empty(),
                calls: CallCounts::default(),
                faults: Faults::default(),
            }),
            rx_ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a frame on the bus as if another node had sent it.
    pub fn inject(&self, frame: &Frame) {
        self.inject_raw(RawMessage::from(frame));
    }

    pub fn inject_raw(&self, message: RawMessage) {
        self.lock().rx.push_back(message);
        self.rx_ready.notify_all();
    }

    /// Frames injected but not yet received.
    pub fn pending_rx(&self) -> usize {
        self.lock().rx.len()
    }

    /// Raise alerts. `BUS_OFF` and `BUS_RECOVERED` also move the simulated controller into the matching state.
    pub fn raise(&self, alerts: Alerts) {
        let mut state = self.lock();
        if alerts.contains(Alerts::BUS_OFF) {
            state.status.state = BusState::BusOff;
            state.status.tx_error_counter = 256;
        }
        if alerts.contains(Alerts::BUS_RECOVERED) {
            state.status.state = BusState::Stopped;
            state.status.tx_error_counter = 0;
            state.status.rx_error_counter = 0;
        }
        if alerts.contains(Alerts::BUS_ERROR) {
            state.status.bus_error_count += 1;
        }
        if alerts.contains(Alerts::TX_FAILED) {
            state.status.tx_failed_count += 1;
        }
        state.alerts.insert(alerts);
    }

    pub fn set_error_counters(&self, tx_error_counter: u32, rx_error_counter: u32) {
        let mut state = self.lock();
        state.status.tx_error_counter = tx_error_counter;
        state.status.rx_error_counter = rx_error_counter;
    }

    /// Make the next installs fail.
    pub fn fail_install(&self, fail: bool) {
        self.lock().faults.install = fail;
    }

    /// Make the next starts fail.
    pub fn fail_start(&self, fail: bool) {
        self.lock().faults.start = fail;
    }

    /// Make every transmit fail with `error` until cleared with `None`.
    pub fn fail_transmit(&self, error: Option<Error>) {
        self.lock().faults.transmit = error;
    }

    /// Make every transmit block for `delay` before it completes.
    pub fn delay_transmit(&self, delay: Option<Duration>) {
        self.lock().faults.transmit_delay = delay;
    }

    /// Make every receive fail at once with `error` until cleared with `None`.
    pub fn fail_receive(&self, error: Option<Error>) {
        self.lock().faults.receive = error;
    }

    /// Frames transmitted so far, in order.
    pub fn transmitted(&self) -> Vec<Frame> {
        self.lock()
            .tx
            .iter()
            .filter_map(|message| Frame::try_from(message).ok())
            .collect()
    }

    /// Drain the transmitted frames.
    pub fn take_transmitted(&self) -> Vec<Frame> {
        let tx = std::mem::take(&mut self.lock().tx);
        tx.iter()
            .filter_map(|message| Frame::try_from(message).ok())
            .collect()
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn is_installed(&self) -> bool {
        self.lock().timing.is_some()
    }

    pub fn timing(&self) -> Option<BitTiming> {
        self.lock().timing
    }

    pub fn pins(&self) -> Option<(u8, u8)> {
        self.lock().pins
    }
}

impl Default for VirtualBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CanController for VirtualBus {
    fn install(&self, timing: &BitTiming, tx_pin: u8, rx_pin: u8) -> Result<()> {
        let mut state = self.lock();
        state.calls.install += 1;

        if state.faults.install {
            return Err(Error::InvalidState("driver install rejected".into()).into());
        }
        if state.timing.is_some() {
            return Err(Error::InvalidState("driver already installed".into()).into());
        }

        state.timing = Some(*timing);
        state.pins = Some((tx_pin, rx_pin));
        state.status = BusStatus::new(BusState::Stopped);
        Ok(())
    }

    fn uninstall(&self) -> Result<()> {
        let mut state = self.lock();
        state.calls.uninstall += 1;

        if state.timing.is_none() {
            return Err(Error::NotInstalled.into());
        }
        if state.status.state == BusState::Running {
            return Err(Error::InvalidState("driver must be stopped first".into()).into());
        }

        state.timing = None;
        state.pins = None;
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let mut state = self.lock();
        state.calls.start += 1;

        if state.timing.is_none() {
            return Err(Error::NotInstalled.into());
        }
        if state.faults.start {
            return Err(Error::InvalidState("driver start rejected".into()).into());
        }
        if state.status.state != BusState::Stopped {
            return Err(Error::InvalidState(format!("cannot start from {}", state.status.state)).into());
        }

        state.status.state = BusState::Running;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut state = self.lock();
        state.calls.stop += 1;

        if state.timing.is_none() {
            return Err(Error::NotInstalled.into());
        }

        state.status.state = BusState::Stopped;
        Ok(())
    }

    fn transmit(&self, message: &RawMessage, _timeout: Duration) -> Result<()> {
        let delay = {
            let mut state = self.lock();
            state.calls.transmit += 1;
            state.faults.transmit_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.lock();

        if state.timing.is_none() {
            return Err(Error::NotInstalled.into());
        }
        if let Some(error) = state.faults.transmit.clone() {
            state.status.tx_failed_count += 1;
            return Err(error.into());
        }
        if state.status.state != BusState::Running {
            state.status.tx_failed_count += 1;
            return Err(Error::TransmitFailed(format!("controller is {}", state.status.state)).into());
        }

        state.tx.push(*message);
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<RawMessage>> {
        let mut state = self.lock();
        state.calls.receive += 1;
        if let Some(error) = state.faults.receive.clone() {
            return Err(error.into());
        }

        let (mut state, _) = self
            .rx_ready
            .wait_timeout_while(state, timeout, |state| state.rx.is_empty())
            .unwrap_or_else(PoisonError::into_inner);

        Ok(state.rx.pop_front())
    }

    fn read_alerts(&self) -> Result<Alerts> {
        Ok(std::mem::replace(&mut self.lock().alerts, Alerts::empty()))
    }

    fn initiate_recovery(&self) -> Result<()> {
        let mut state = self.lock();
        state.calls.recovery += 1;

        if state.status.state != BusState::BusOff {
            return Err(Error::InvalidState(format!("cannot recover from {}", state.status.state)).into());
        }

        state.status.state = BusState::Recovering;
        Ok(())
    }

    fn status(&self) -> Result<BusStatus> {
        let state = self.lock();
        let mut status = state.status;
        status.msgs_to_rx = state.rx.len() as u32;
        Ok(status)
    }
}
