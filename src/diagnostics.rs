//! Human readable bus health report.

use std::fmt;

use strum_macros::Display;

use crate::can::{BusState, BusStatus};

/// Error counter value above which the counter is considered critical. The controller goes error passive at 128.
pub const ERROR_COUNTER_THRESHOLD: u32 = 96;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Health {
    #[strum(serialize = "OK")]
    Ok,
    #[strum(serialize = "warning")]
    Warning,
    #[strum(serialize = "critical")]
    Critical,
}

impl Health {
    /// Classify an error counter.
    pub fn classify(error_counter: u32) -> Health {
        match error_counter {
            0 => Health::Ok,
            1..=ERROR_COUNTER_THRESHOLD => Health::Warning,
            _ => Health::Critical,
        }
    }
}

/// Snapshot of a [`BusStatus`] together with its interpretation. `Display` renders the operator report.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiagnosticsReport {
    pub status: BusStatus,
    pub tx_health: Health,
    pub rx_health: Health,
}

impl DiagnosticsReport {
    pub fn new(status: &BusStatus) -> Self {
        DiagnosticsReport {
            status: *status,
            tx_health: Health::classify(status.tx_error_counter),
            rx_health: Health::classify(status.rx_error_counter),
        }
    }

    pub fn is_bus_off(&self) -> bool {
        self.status.state == BusState::BusOff
    }

    /// Worst of the TX and RX classifications. Bus off is always critical.
    pub fn health(&self) -> Health {
        if self.is_bus_off() {
            return Health::Critical;
        }
        self.tx_health.max(self.rx_health)
    }
}

impl fmt::Display for DiagnosticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = &self.status;

        writeln!(f, "========== CAN BUS DIAGNOSTICS ==========")?;
        if self.is_bus_off() {
            writeln!(f, "State: {} (CRITICAL - Too many errors!)", status.state)?;
        } else {
            writeln!(f, "State: {}", status.state)?;
        }
        writeln!(f, "TX Error Counter: {}", status.tx_error_counter)?;
        writeln!(f, "RX Error Counter: {}", status.rx_error_counter)?;
        writeln!(f, "Messages in TX Queue: {}", status.msgs_to_tx)?;
        writeln!(f, "Messages in RX Queue: {}", status.msgs_to_rx)?;
        writeln!(f, "TX Failed Count: {}", status.tx_failed_count)?;
        writeln!(f, "RX Missed Count: {}", status.rx_missed_count)?;
        writeln!(f, "RX Overrun Count: {}", status.rx_overrun_count)?;
        writeln!(f, "Arbitration Lost Count: {}", status.arb_lost_count)?;
        writeln!(f, "Bus Error Count: {}", status.bus_error_count)?;

        writeln!(f)?;
        writeln!(f, "--- DIAGNOSIS ---")?;
        match self.tx_health {
            Health::Critical => {
                writeln!(f, "HIGH TX ERRORS! Usually means NO ACK from other devices.")?;
                writeln!(f, "  Check: 1) Other device is powered and connected")?;
                writeln!(f, "  Check: 2) 120 Ohm termination resistors at BOTH ends")?;
                writeln!(f, "  Check: 3) CANH/CANL wiring is correct")?;
            }
            Health::Warning => writeln!(f, "Some TX errors detected (ACK issues).")?,
            Health::Ok => writeln!(f, "TX Error Counter: OK")?,
        }
        match self.rx_health {
            Health::Critical => writeln!(f, "HIGH RX ERRORS! Check signal quality and termination.")?,
            Health::Warning => writeln!(f, "Some RX errors detected.")?,
            Health::Ok => writeln!(f, "RX Error Counter: OK")?,
        }

        if self.is_bus_off() {
            writeln!(f)?;
            writeln!(f, "BUS OFF STATE - CAN controller has shut down!")?;
            writeln!(f, "  This means too many consecutive errors occurred.")?;
            writeln!(f, "  Fix hardware issues, then restart the device.")?;
        }

        write!(f, "=========================================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_thresholds() {
        assert_eq!(Health::classify(0), Health::Ok);
        assert_eq!(Health::classify(1), Health::Warning);
        assert_eq!(Health::classify(96), Health::Warning);
        assert_eq!(Health::classify(97), Health::Critical);
        assert_eq!(Health::classify(256), Health::Critical);
    }

    #[test]
    fn healthy_bus() {
        let report = DiagnosticsReport::new(&BusStatus::new(BusState::Running));
        assert_eq!(report.health(), Health::Ok);

        let text = report.to_string();
        assert!(text.contains("State: RUNNING"));
        assert!(text.contains("TX Error Counter: OK"));
        assert!(text.contains("RX Error Counter: OK"));
        assert!(!text.contains("BUS OFF STATE"));
    }

    #[test]
    fn missing_ack() {
        let mut status = BusStatus::new(BusState::Running);
        status.tx_error_counter = 128;
        status.rx_error_counter = 5;

        let report = DiagnosticsReport::new(&status);
        assert_eq!(report.tx_health, Health::Critical);
        assert_eq!(report.rx_health, Health::Warning);

        let text = report.to_string();
        assert!(text.contains("TX Error Counter: 128"));
        assert!(text.contains("NO ACK"));
        assert!(text.contains("termination resistors"));
        assert!(text.contains("Some RX errors detected."));
    }

    #[test]
    fn bus_off_callout() {
        let mut status = BusStatus::new(BusState::BusOff);
        status.tx_error_counter = 256;

        let report = DiagnosticsReport::new(&status);
        assert!(report.is_bus_off());
        assert_eq!(report.health(), Health::Critical);

        let text = report.to_string();
        assert!(text.contains("State: BUS OFF (CRITICAL"));
        assert!(text.contains("BUS OFF STATE - CAN controller has shut down!"));
    }

    #[test]
    fn report_does_not_touch_status() {
        let mut status = BusStatus::new(BusState::Recovering);
        status.bus_error_count = 3;
        let report = DiagnosticsReport::new(&status);
        assert_eq!(report.status, status);
        assert_eq!(report.health(), Health::Ok);
    }
}
