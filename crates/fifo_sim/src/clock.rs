//! Manually driven tick clock implementing [`TimeSource`].

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{TimeSource, TimeStamp};

/// Simulated hardware tick counter plus wall clock.
///
/// Wall time is derived from the tick count: `epoch_s + ticks / tick_rate_hz`.
#[derive(Debug)]
pub struct SimClock {
    ticks: AtomicU64,
    tick_rate_hz: f64,
    epoch_s: f64,
}

impl SimClock {
    pub fn new(tick_rate_hz: f64, epoch_s: f64) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            tick_rate_hz: if tick_rate_hz > 0.0 { tick_rate_hz } else { 1.0e9 },
            epoch_s,
        }
    }

    pub fn tick_rate_hz(&self) -> f64 {
        self.tick_rate_hz
    }

    pub fn set_ticks(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::Release);
    }

    pub fn advance_ticks(&self, ticks: u64) -> u64 {
        self.ticks.fetch_add(ticks, Ordering::AcqRel) + ticks
    }

    pub fn advance_secs(&self, secs: f64) -> u64 {
        self.advance_ticks(self.secs_to_ticks(secs))
    }

    /// Convert seconds to ticks (negative values clamp to zero)
    pub fn secs_to_ticks(&self, secs: f64) -> u64 {
        (secs.max(0.0) * self.tick_rate_hz).round() as u64
    }

    /// Wall time in seconds at `ticks`
    pub fn secs_at(&self, ticks: u64) -> f64 {
        self.epoch_s + self.ticks_to_seconds(ticks)
    }
}

impl TimeSource for SimClock {
    fn now_ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn ticks_to_seconds(&self, ticks: u64) -> f64 {
        ticks as f64 / self.tick_rate_hz
    }

    fn wall_clock(&self) -> TimeStamp {
        TimeStamp::from_secs_f64(self.secs_at(self.now_ticks()))
    }
}
