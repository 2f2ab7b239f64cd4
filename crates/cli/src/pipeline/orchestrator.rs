//! Pipeline orchestrator - drives registered channels against a synthetic
//! pulse train.
//!
//! Every capture of a channel's event code schedules one pickup at
//! `capture + expected_delay + jitter`. Pickups due before the next fiducial
//! are served first, so the simulated clock only ever moves forward.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use contracts::{
    ChannelConfig, CorrelatorRequest, EventCode, FifoDriver, FifoSyncBlueprint, TimeSource,
    TimeStampPolicy, TimeStampRequest, FIDUCIAL_RATE_HZ,
};
use fifo_sim::{Pickup, PickupScheduler, PollJitter, PulseTrain};
use sync_engine::{ChannelRegistry, TimeStampChannel};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, trace};

use super::PipelineStats;
use crate::error::CliError;

/// Fiducials between cooperative yields when running unpaced
const YIELD_EVERY: u64 = 360;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Loaded configuration; must carry a simulation section
    pub blueprint: FifoSyncBlueprint,

    /// Where the blueprint came from, for error messages
    pub source: String,

    /// Stop after this many pickups (None = unlimited)
    pub max_pickups: Option<u64>,

    /// Pace fiducials at 360 Hz wall time
    pub realtime: bool,
}

/// One registered channel and its per-cycle inputs
struct ChannelSlot {
    channel: Arc<TimeStampChannel>,
    config: ChannelConfig,
    delay_s: f64,
    delay_ticks: u64,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Build the simulation. Fails when the blueprint has no simulation
    /// section or a channel cannot be registered.
    pub fn build(self) -> Result<Simulation> {
        let blueprint = &self.config.blueprint;
        let sim = blueprint
            .simulation
            .as_ref()
            .ok_or_else(|| CliError::missing_simulation(&self.config.source))?;

        let train = PulseTrain::from_config(sim);
        let registry = ChannelRegistry::new(
            train.fifo().clone(),
            train.clock().clone(),
            blueprint.engine.clone(),
        );

        let mut slots = Vec::with_capacity(blueprint.channels.len());
        for entry in &blueprint.channels {
            let channel = registry
                .register(&entry.name, entry.owner())
                .map_err(|e| CliError::registration(&entry.name, e))?;

            let mut config = entry.to_channel_config();
            if config.policy == TimeStampPolicy::Internal {
                // Edge-triggered: anchors once, then tracks
                config.correlator_request = CorrelatorRequest::Set;
            }
            channel.update(&config);

            let delay_s = entry.expected_delay_s().unwrap_or(0.0);
            slots.push(ChannelSlot {
                channel,
                config,
                delay_s,
                delay_ticks: train.clock().secs_to_ticks(delay_s),
            });
        }

        let jitter_ticks = train.clock().secs_to_ticks(sim.pickup_jitter_ms / 1e3);
        let scheduler = PickupScheduler::new(PollJitter::new(sim.seed, jitter_ticks));

        info!(
            channels = slots.len(),
            fifo_depth = sim.fifo_depth,
            events = sim.events.len(),
            jitter_ms = sim.pickup_jitter_ms,
            "Simulation configured"
        );

        let stats = PipelineStats {
            active_channels: slots.len(),
            ..Default::default()
        };

        Ok(Simulation {
            train,
            registry,
            slots,
            scheduler,
            last_capture: BTreeMap::new(),
            stats,
            max_pickups: self.config.max_pickups,
            realtime: self.config.realtime,
            started: Instant::now(),
        })
    }
}

/// A built simulation, ready to run
pub struct Simulation {
    train: PulseTrain,
    registry: ChannelRegistry,
    slots: Vec<ChannelSlot>,
    scheduler: PickupScheduler,
    /// Newest capture tick seen per event code
    last_capture: BTreeMap<EventCode, u64>,
    stats: PipelineStats,
    max_pickups: Option<u64>,
    realtime: bool,
    started: Instant,
}

impl Simulation {
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Run until `max_pickups` is reached. Without a limit this never
    /// returns; callers race it against a shutdown signal.
    pub async fn run(&mut self) {
        self.started = Instant::now();
        let mut ticker = self.realtime.then(|| {
            let mut interval =
                tokio::time::interval(Duration::from_secs_f64(1.0 / FIDUCIAL_RATE_HZ));
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            interval
        });

        while !self.limit_reached() {
            self.pace(ticker.as_mut()).await;

            let next_fiducial = self.train.next_fiducial_tick();
            while let Some(pickup) = self.scheduler.pop_due(next_fiducial) {
                self.serve(pickup);
                if self.limit_reached() {
                    break;
                }
            }
            if self.limit_reached() {
                break;
            }

            self.train.step();
            self.stats.fiducials += 1;
            self.schedule_new_captures();
        }

        info!(pickups = self.stats.pickups, "Reached pickup limit");
    }

    /// Consume the simulation and return its statistics
    pub fn finish(mut self) -> (PipelineStats, ChannelRegistry) {
        self.stats.duration = self.started.elapsed();
        info!(
            duration_secs = self.stats.duration.as_secs_f64(),
            simulated_secs = self.stats.simulated_secs(),
            pickups = self.stats.pickups,
            "Simulation finished"
        );
        (self.stats, self.registry)
    }

    fn limit_reached(&self) -> bool {
        self.max_pickups
            .is_some_and(|max| self.stats.pickups >= max)
    }

    async fn pace(&self, ticker: Option<&mut Interval>) {
        match ticker {
            Some(interval) => {
                interval.tick().await;
            }
            None if self.stats.fiducials % YIELD_EVERY == 0 => tokio::task::yield_now().await,
            None => {}
        }
    }

    /// Schedule a pickup for every channel whose event code fired on the
    /// fiducial just emitted.
    fn schedule_new_captures(&mut self) {
        let codes: Vec<EventCode> = self
            .slots
            .iter()
            .filter_map(|slot| EventCode::from_raw(slot.config.event_code))
            .collect();

        for code in codes {
            let Ok(entry) = self.train.fifo().latest(code) else {
                continue;
            };
            if self.last_capture.get(&code) == Some(&entry.capture_tick) {
                continue;
            }
            self.last_capture.insert(code, entry.capture_tick);
            self.stats.events += 1;
            observability::record_event_pushed(code.get());

            for (idx, slot) in self.slots.iter().enumerate() {
                if slot.config.event_code == code.get() as i64 {
                    let tick = self
                        .scheduler
                        .schedule(idx, entry.capture_tick, slot.delay_ticks);
                    trace!(channel = %slot.channel.name(), capture = entry.capture_tick, tick, "pickup scheduled");
                }
            }
        }
    }

    /// Serve one pickup: request a stamp, then push the cycle inputs and
    /// read back the outputs.
    fn serve(&mut self, pickup: Pickup) {
        let clock = self.train.clock();
        if pickup.tick > clock.now_ticks() {
            clock.set_ticks(pickup.tick);
        }
        let now = clock.now_ticks();

        let Some(slot) = self.slots.get(pickup.channel) else {
            return;
        };
        let name = slot.channel.name().to_string();

        let mut request = TimeStampRequest::at(now);
        if slot.config.policy == TimeStampPolicy::Internal {
            // The external reference runs on the same time base as the FIFO
            request = request.with_reference(clock.secs_at(now) - slot.delay_s);
        }

        let result = slot.channel.get_timestamp(&request);
        let report = slot.channel.update(&slot.config);

        self.stats.pickups += 1;
        match &result {
            Ok(ts) => {
                if ts.pulse_id().is_valid() {
                    let latency_ms = (clock.secs_at(now) - ts.as_secs_f64()) * 1e3;
                    observability::record_pickup_latency_ms(&name, latency_ms);
                }
                trace!(channel = %name, stamp = %ts, "timestamp served");
            }
            Err(failure) => {
                self.stats.fallbacks += 1;
                debug!(channel = %name, error = %failure.error, "timestamp fallback");
            }
        }

        self.stats
            .channel_metrics
            .record_request(&name, result.as_ref().err().map(|f| &f.error));
        self.stats.channel_metrics.update(&name, &report);
        observability::record_channel_report(&name, &report);
    }
}
