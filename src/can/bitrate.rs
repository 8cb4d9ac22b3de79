//! Bit rate selection and controller timing profiles.
//!
//! Standard rates map to fixed timing profiles for an 80 MHz controller clock. Any other rate is treated as a user rate and resolved with 20 time quanta per bit.

use crate::Result;

/// Controller source clock in Hz
pub const CONTROLLER_CLOCK_HZ: u32 = 80_000_000;

const CAN_SYNC_SEG: u32 = 1;
const USER_TSEG1: u32 = 15;
const USER_TSEG2: u32 = 4;
const USER_SJW: u32 = 3;
const BRP_MIN: u32 = 2;
const BRP_MAX: u32 = 128;

/// CAN bit rate, in kbit/s.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BitRate {
    Kbps100,
    Kbps125,
    Kbps250,
    #[default]
    Kbps500,
    Kbps800,
    Kbps1000,
    /// Non-standard rate in kbit/s
    User(u32),
}

impl BitRate {
    /// Map a rate in kbit/s to a standard profile where one exists.
    pub fn from_kbps(kbps: u32) -> BitRate {
        match kbps {
            100 => BitRate::Kbps100,
            125 => BitRate::Kbps125,
            250 => BitRate::Kbps250,
            500 => BitRate::Kbps500,
            800 => BitRate::Kbps800,
            1000 => BitRate::Kbps1000,
            other => BitRate::User(other),
        }
    }

    pub fn kbps(&self) -> u32 {
        match self {
            BitRate::Kbps100 => 100,
            BitRate::Kbps125 => 125,
            BitRate::Kbps250 => 250,
            BitRate::Kbps500 => 500,
            BitRate::Kbps800 => 800,
            BitRate::Kbps1000 => 1000,
            BitRate::User(kbps) => *kbps,
        }
    }

    /// Resolve the timing profile. User rates that cannot be reached with a valid prescaler fail with [`crate::Error::InvalidBitrate`].
    pub fn timing(&self) -> Result<BitTiming> {
        let timing = match self {
            BitRate::Kbps100 => BitTiming::new(40, 15, 4, 3),
            BitRate::Kbps125 => BitTiming::new(32, 15, 4, 3),
            BitRate::Kbps250 => BitTiming::new(16, 15, 4, 3),
            BitRate::Kbps500 => BitTiming::new(8, 15, 4, 3),
            BitRate::Kbps800 => BitTiming::new(4, 16, 8, 3),
            BitRate::Kbps1000 => BitTiming::new(4, 15, 4, 3),
            BitRate::User(kbps) => return user_timing(*kbps),
        };
        Ok(timing)
    }
}

fn user_timing(kbps: u32) -> Result<BitTiming> {
    let tq_per_bit = CAN_SYNC_SEG + USER_TSEG1 + USER_TSEG2;
    let bitrate = (kbps as u64) * 1000;
    if bitrate == 0 {
        return Err(crate::Error::InvalidBitrate(kbps));
    }

    let brp = CONTROLLER_CLOCK_HZ as u64 / (bitrate * tq_per_bit as u64);
    if !(BRP_MIN as u64..=BRP_MAX as u64).contains(&brp) {
        return Err(crate::Error::InvalidBitrate(kbps));
    }

    Ok(BitTiming::new(brp as u32, USER_TSEG1, USER_TSEG2, USER_SJW))
}

/// Timing values handed to the controller driver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitTiming {
    pub brp: u32,
    pub tseg1: u32,
    pub tseg2: u32,
    pub sjw: u32,
    pub triple_sampling: bool,
}

impl BitTiming {
    fn new(brp: u32, tseg1: u32, tseg2: u32, sjw: u32) -> Self {
        BitTiming {
            brp,
            tseg1,
            tseg2,
            sjw,
            triple_sampling: false,
        }
    }

    /// Duration of one bit in time quanta.
    pub fn bit_time_tq(&self) -> u32 {
        CAN_SYNC_SEG + self.tseg1 + self.tseg2
    }

    /// Resulting bitrate in bits per second.
    pub fn bitrate(&self) -> u32 {
        CONTROLLER_CLOCK_HZ / (self.brp * self.bit_time_tq())
    }

    /// Sample point in normalized form (`0.0..1.0`).
    pub fn sample_point(&self) -> f64 {
        (CAN_SYNC_SEG + self.tseg1) as f64 / self.bit_time_tq() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_profiles_hit_their_rate() {
        for kbps in [100, 125, 250, 500, 800, 1000] {
            let rate = BitRate::from_kbps(kbps);
            assert!(!matches!(rate, BitRate::User(_)));

            let timing = rate.timing().unwrap();
            assert_eq!(timing.bitrate(), kbps * 1000);
            assert!(!timing.triple_sampling);
        }
    }

    #[test]
    fn default_is_500k_at_80_percent() {
        let timing = BitRate::default().timing().unwrap();
        assert_eq!(timing.bitrate(), 500_000);
        assert!((timing.sample_point() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn user_rate() {
        let rate = BitRate::from_kbps(200);
        assert_eq!(rate, BitRate::User(200));
        assert_eq!(rate.kbps(), 200);

        let timing = rate.timing().unwrap();
        assert_eq!(timing.brp, 20);
        assert_eq!(timing.bitrate(), 200_000);
    }

    #[test]
    fn unreachable_user_rates_rejected() {
        assert!(matches!(
            BitRate::User(0).timing(),
            Err(crate::Error::InvalidBitrate(0))
        ));
        assert!(BitRate::User(5000).timing().is_err());
        assert!(BitRate::User(10).timing().is_err());
    }
}
