//! Fixed-rate fiducial pulse train feeding a [`SimFifo`].

use std::sync::Arc;

use contracts::{
    EventCode, FifoEntry, PulseId, SimulationConfig, TimeSource, TimeStamp, FIDUCIAL_RATE_HZ,
};
use tracing::trace;

use crate::{SimClock, SimFifo};

/// An event code firing every `divisor` fiducials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSchedule {
    pub event_code: EventCode,
    pub divisor: u32,
    pub phase: u32,
}

impl EventSchedule {
    pub fn every(event_code: EventCode, divisor: u32) -> Self {
        Self {
            event_code,
            divisor: divisor.max(1),
            phase: 0,
        }
    }

    fn fires_on(&self, fiducial: u64) -> bool {
        (fiducial + self.phase as u64) % self.divisor.max(1) as u64 == 0
    }
}

/// Generates fiducials at [`FIDUCIAL_RATE_HZ`] and records scheduled events.
///
/// Fiducial `k` fires at tick `round(k * tick_rate / 360)`; the clock is moved
/// forward to that tick before the event is recorded, so `capture_tick` is the
/// fiducial tick.
#[derive(Debug)]
pub struct PulseTrain {
    fifo: Arc<SimFifo>,
    clock: Arc<SimClock>,
    schedules: Vec<EventSchedule>,
    start_pulse: PulseId,
    /// Fiducials emitted so far
    emitted: u64,
}

impl PulseTrain {
    pub fn new(fifo: Arc<SimFifo>, clock: Arc<SimClock>, start_pulse: PulseId) -> Self {
        Self {
            fifo,
            clock,
            schedules: Vec::new(),
            start_pulse: if start_pulse.is_valid() {
                start_pulse
            } else {
                PulseId::new(0)
            },
            emitted: 0,
        }
    }

    /// Build the FIFO, clock and train described by a simulation section.
    ///
    /// Schedules naming an out-of-range event code are skipped.
    pub fn from_config(config: &SimulationConfig) -> Self {
        let fifo = Arc::new(SimFifo::new(config.fifo_depth));
        let clock = Arc::new(SimClock::new(config.tick_rate_hz, config.start_time_s));
        let mut train = Self::new(fifo, clock, PulseId::new(config.start_pulse));
        for event in &config.events {
            match EventCode::from_raw(event.event_code as i64) {
                Some(event_code) => train.add_schedule(EventSchedule {
                    event_code,
                    divisor: event.divisor.max(1),
                    phase: event.phase,
                }),
                None => tracing::warn!(
                    event_code = event.event_code,
                    "skipping schedule with invalid event code"
                ),
            }
        }
        train
    }

    pub fn add_schedule(&mut self, schedule: EventSchedule) {
        self.fifo.enable(schedule.event_code);
        self.schedules.push(schedule);
    }

    pub fn fifo(&self) -> &Arc<SimFifo> {
        &self.fifo
    }

    pub fn clock(&self) -> &Arc<SimClock> {
        &self.clock
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Tick at which fiducial `k` fires
    pub fn fiducial_tick(&self, k: u64) -> u64 {
        self.clock.secs_to_ticks(k as f64 / FIDUCIAL_RATE_HZ)
    }

    /// Tick of the next fiducial to be emitted
    pub fn next_fiducial_tick(&self) -> u64 {
        self.fiducial_tick(self.emitted)
    }

    /// Emit one fiducial; returns its pulse id.
    pub fn step(&mut self) -> PulseId {
        let k = self.emitted;
        let tick = self.fiducial_tick(k);
        self.clock.set_ticks(tick);

        let pulse_id = self.start_pulse.offset(k as i64);
        let timestamp = TimeStamp::from_secs_f64(self.clock.secs_at(tick)).with_pulse_id(pulse_id);

        for schedule in self.schedules.iter().filter(|s| s.fires_on(k)) {
            self.fifo.push(
                schedule.event_code,
                FifoEntry {
                    pulse_id,
                    timestamp,
                    capture_tick: tick,
                },
            );
        }
        self.fifo.set_last_fiducial(pulse_id, timestamp);
        self.emitted += 1;

        trace!(fiducial = k, pulse_id = %pulse_id, tick, "fiducial emitted");
        pulse_id
    }

    /// Emit `count` fiducials
    pub fn run(&mut self, count: u64) {
        for _ in 0..count {
            self.step();
        }
    }

    /// Emit every fiducial due at or before `tick`, then park the clock at `tick`.
    pub fn advance_to(&mut self, tick: u64) {
        while self.next_fiducial_tick() <= tick {
            self.step();
        }
        if self.clock.now_ticks() < tick {
            self.clock.set_ticks(tick);
        }
    }
}
