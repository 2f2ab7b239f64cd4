//! Consumer pickup timing: when the polling thread gets around to asking.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Seeded uniform jitter in `[-amplitude, +amplitude]` ticks.
#[derive(Debug)]
pub struct PollJitter {
    rng: StdRng,
    amplitude_ticks: u64,
}

impl PollJitter {
    pub fn new(seed: u64, amplitude_ticks: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            amplitude_ticks,
        }
    }

    /// No jitter at all
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn sample(&mut self) -> i64 {
        if self.amplitude_ticks == 0 {
            return 0;
        }
        let amplitude = self.amplitude_ticks.min(i64::MAX as u64) as i64;
        self.rng.random_range(-amplitude..=amplitude)
    }
}

/// A scheduled pickup for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pickup {
    pub tick: u64,
    pub channel: usize,
}

/// Min-heap of pending pickups ordered by tick.
#[derive(Debug)]
pub struct PickupScheduler {
    pending: BinaryHeap<Reverse<Pickup>>,
    jitter: PollJitter,
}

impl PickupScheduler {
    pub fn new(jitter: PollJitter) -> Self {
        Self {
            pending: BinaryHeap::new(),
            jitter,
        }
    }

    /// Queue a pickup `delay_ticks` after `capture_tick`, plus jitter.
    ///
    /// Returns the scheduled tick; jitter never moves a pickup before the capture.
    pub fn schedule(&mut self, channel: usize, capture_tick: u64, delay_ticks: u64) -> u64 {
        let nominal = capture_tick.saturating_add(delay_ticks);
        let tick = nominal
            .saturating_add_signed(self.jitter.sample())
            .max(capture_tick);
        self.pending.push(Reverse(Pickup { tick, channel }));
        tick
    }

    /// Tick of the earliest pending pickup
    pub fn next_due(&self) -> Option<u64> {
        self.pending.peek().map(|Reverse(p)| p.tick)
    }

    /// Pop the earliest pickup if it is due strictly before `before_tick`.
    pub fn pop_due(&mut self, before_tick: u64) -> Option<Pickup> {
        if self.next_due()? < before_tick {
            self.pending.pop().map(|Reverse(p)| p)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pickups_pop_in_tick_order() {
        let mut scheduler = PickupScheduler::new(PollJitter::none());
        scheduler.schedule(1, 500, 100);
        scheduler.schedule(0, 100, 100);
        scheduler.schedule(2, 300, 0);

        assert_eq!(scheduler.next_due(), Some(200));
        assert_eq!(scheduler.pop_due(1_000).unwrap().channel, 0);
        assert_eq!(scheduler.pop_due(1_000).unwrap().channel, 2);
        assert!(scheduler.pop_due(600).is_none());
        assert_eq!(scheduler.pop_due(601).unwrap().tick, 600);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_jitter_is_bounded_and_seeded() {
        let mut a = PollJitter::new(7, 50);
        let mut b = PollJitter::new(7, 50);
        for _ in 0..100 {
            let sample = a.sample();
            assert!((-50..=50).contains(&sample));
            assert_eq!(sample, b.sample());
        }
    }

    #[test]
    fn test_jitter_never_precedes_capture() {
        let mut scheduler = PickupScheduler::new(PollJitter::new(1, 1_000));
        for _ in 0..50 {
            assert!(scheduler.schedule(0, 10_000, 0) >= 10_000);
        }
    }
}
