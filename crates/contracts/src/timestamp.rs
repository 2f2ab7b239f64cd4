//! TimeStamp - seconds + nanoseconds with an embedded pulse id
//!
//! By convention the low 17 bits of `nsec` carry the fiducial pulse id of the
//! event that produced the stamp. Unsynced stamps carry [`PULSE_ID_INVALID`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pulse::{PulseId, PULSE_ID_INVALID, PULSE_ID_MASK};

const NSEC_PER_SEC: u32 = 1_000_000_000;

/// Wall / fiducial time stamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeStamp {
    /// Whole seconds
    pub sec: u32,
    /// Nanoseconds, low bits overloaded with the pulse id
    pub nsec: u32,
}

impl TimeStamp {
    pub const fn new(sec: u32, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    /// Build a stamp from floating seconds (sub-nanosecond part truncated).
    pub fn from_secs_f64(secs: f64) -> Self {
        let secs = secs.max(0.0);
        let whole = secs.floor();
        let mut sec = whole as u32;
        let mut nsec = ((secs - whole) * NSEC_PER_SEC as f64).round() as u32;
        if nsec >= NSEC_PER_SEC {
            sec = sec.saturating_add(1);
            nsec -= NSEC_PER_SEC;
        }
        Self { sec, nsec }
    }

    /// Seconds as `f64`, pulse-id bits included (they are below 131 µs).
    #[inline]
    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.nsec as f64 / NSEC_PER_SEC as f64
    }

    /// Shift by `secs` (may be negative).
    pub fn add_secs(&self, secs: f64) -> Self {
        Self::from_secs_f64(self.as_secs_f64() + secs)
    }

    /// Pulse id carried in the low `nsec` bits.
    #[inline]
    pub fn pulse_id(&self) -> PulseId {
        PulseId::new(self.nsec & PULSE_ID_MASK)
    }

    /// Replace the low `nsec` bits with `pulse_id`.
    pub fn with_pulse_id(&self, pulse_id: PulseId) -> Self {
        let nsec = (self.nsec & !PULSE_ID_MASK) | (pulse_id.raw() & PULSE_ID_MASK);
        Self { sec: self.sec, nsec }
    }

    /// Force the embedded pulse id to INVALID.
    #[inline]
    pub fn with_invalid_pulse_id(&self) -> Self {
        Self {
            sec: self.sec,
            nsec: self.nsec | PULSE_ID_INVALID,
        }
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09} [{}]", self.sec, self.nsec, self.pulse_id())
    }
}

/// One timestamp request issued by the polling consumer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStampRequest {
    /// Hardware tick count at the time of the request
    pub now_ticks: u64,
    /// External reference time (seconds), used by the internal correlator
    pub reference_time: Option<f64>,
}

impl TimeStampRequest {
    pub fn at(now_ticks: u64) -> Self {
        Self {
            now_ticks,
            reference_time: None,
        }
    }

    pub fn with_reference(mut self, reference_time: f64) -> Self {
        self.reference_time = Some(reference_time);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_id_embedding() {
        let ts = TimeStamp::new(1_700_000_000, 500_000_000).with_pulse_id(PulseId::new(0x1234));
        assert_eq!(ts.pulse_id(), PulseId::new(0x1234));
        assert_eq!(ts.sec, 1_700_000_000);
        assert_eq!(ts.nsec & !PULSE_ID_MASK, 500_000_000 & !PULSE_ID_MASK);
    }

    #[test]
    fn test_invalid_marking() {
        let ts = TimeStamp::new(10, 0).with_pulse_id(PulseId::new(7));
        assert!(ts.pulse_id().is_valid());
        assert!(!ts.with_invalid_pulse_id().pulse_id().is_valid());
    }

    #[test]
    fn test_secs_round_trip_carry() {
        let ts = TimeStamp::from_secs_f64(41.999_999_999_9);
        assert_eq!(ts.sec, 42);
        assert_eq!(ts.nsec, 0);
        let shifted = TimeStamp::new(100, 250_000_000).add_secs(-0.5);
        assert_eq!(shifted.sec, 99);
        assert_eq!(shifted.nsec, 750_000_000);
    }
}
