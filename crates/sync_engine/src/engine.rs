//! Per-channel sync state machine.
//!
//! One cycle (`SyncEngine::cycle`) locates the FIFO entry matching the
//! expected delay: primary fetch, staleness guard, direct-hit band, cadence
//! fallback and a bounded backward search, followed by the generation check.
//! The caller holds the channel lock for the whole cycle.

use contracts::{
    seconds_to_pulses, ChannelConfig, ChannelReport, EngineConfig, EventCode, FifoDriver,
    FifoEntry, FifoStep, PulseId, SyncError, SyncThresholds, TimeSource, TimeStampPolicy,
};
use tracing::{debug, info, instrument, trace};

use crate::correlator::InternalCorrelator;
use crate::cursor::FifoCursor;
use crate::stats::DiffStats;

/// How the last cycle ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncKind {
    /// Primary entry inside the acceptance band
    Direct,
    /// Pulse cadence matched the previous cycle
    Cadence,
    /// Matching entry found by stepping backward
    Backtrack,
    /// Most recent entry, no delay model
    Latest,
    /// Internal correlator match
    Correlated,
    /// FIFO bypassed
    TimeOfDay,
    #[default]
    Failed,
}

impl SyncKind {
    pub fn label(self) -> &'static str {
        match self {
            SyncKind::Direct => "direct",
            SyncKind::Cadence => "cadence",
            SyncKind::Backtrack => "backtrack",
            SyncKind::Latest => "latest",
            SyncKind::Correlated => "correlated",
            SyncKind::TimeOfDay => "time_of_day",
            SyncKind::Failed => "failed",
        }
    }
}

/// Summary of the most recent cycle, for metrics and logs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CycleOutcome {
    pub kind: SyncKind,
    /// Backward steps taken by the search
    pub backtrack_steps: u32,
    /// Driver reads issued
    pub reads: u32,
    /// Pulse id the delay model aimed at
    pub target_pulse: PulseId,
    /// Pulse id of the entry finally selected
    pub selected_pulse: PulseId,
}

/// Mutable sync state, exclusively owned by one engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncState {
    pub synced: bool,
    /// Consecutive direct hits
    pub sync_count: u32,
    pub min_sync_count: u32,
    pub prior_pulse: PulseId,
    /// Pulse delta between the last two primary entries
    pub prior_pulse_delta: Option<i32>,
    pub prior_generation: u32,
    pub diff_vs_expected_s: f64,
    pub actual_delay_s: f64,
}

impl SyncState {
    fn new(min_sync_count: u32) -> Self {
        Self {
            synced: false,
            sync_count: 0,
            min_sync_count,
            prior_pulse: PulseId::INVALID,
            prior_pulse_delta: None,
            prior_generation: 0,
            diff_vs_expected_s: 0.0,
            actual_delay_s: 0.0,
        }
    }
}

/// Timestamp FIFO sync engine for one channel
#[derive(Debug, Clone)]
pub struct SyncEngine {
    thresholds: SyncThresholds,
    /// Inputs as last applied
    inputs: ChannelConfig,
    /// Last valid event code; invalid inputs leave it untouched
    event_code: Option<EventCode>,
    state: SyncState,
    cursor: FifoCursor,
    diff_stats: DiffStats,
    latency_stats: DiffStats,
    correlator: InternalCorrelator,
    /// Entry selected by the last cycle; pulse id INVALID when unsynced
    last_entry: Option<FifoEntry>,
    last_outcome: CycleOutcome,
}

impl SyncEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            thresholds: config.sync.clone(),
            inputs: ChannelConfig::default(),
            event_code: None,
            state: SyncState::new(config.sync.min_sync_count),
            cursor: FifoCursor::new(),
            diff_stats: DiffStats::new(),
            latency_stats: DiffStats::new(),
            correlator: InternalCorrelator::new(config.correlator.clone()),
            last_entry: None,
            last_outcome: CycleOutcome::default(),
        }
    }

    /// Apply per-cycle inputs.
    ///
    /// An out-of-range event code is ignored. Returns `true` when the
    /// selection criteria (event code, expected delay or policy) changed, in
    /// which case the running statistics have been reset.
    pub fn apply(&mut self, inputs: &ChannelConfig) -> bool {
        let before = (self.event_code, self.inputs.expected_delay_s, self.inputs.effective_policy());

        if let Some(code) = EventCode::from_raw(inputs.event_code) {
            self.event_code = Some(code);
        }
        self.inputs = inputs.clone();

        let after = (self.event_code, self.inputs.expected_delay_s, self.inputs.effective_policy());
        let changed = before != after;
        if changed {
            debug!(
                event_code = ?self.event_code,
                expected_delay_s = self.inputs.expected_delay_s,
                policy = %self.inputs.effective_policy(),
                "channel criteria changed"
            );
            self.reset_stats();
        }
        changed
    }

    /// Clear running min/max diff, latency and correlator statistics.
    pub fn reset_stats(&mut self) {
        self.diff_stats.reset();
        self.latency_stats.reset();
        self.correlator.reset_stats();
    }

    pub fn inputs(&self) -> &ChannelConfig {
        &self.inputs
    }

    pub fn event_code(&self) -> Option<EventCode> {
        self.event_code
    }

    pub fn policy(&self) -> TimeStampPolicy {
        self.inputs.effective_policy()
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn is_synced(&self) -> bool {
        self.state.synced
    }

    pub fn cursor(&self) -> &FifoCursor {
        &self.cursor
    }

    pub fn diff_stats(&self) -> &DiffStats {
        &self.diff_stats
    }

    pub fn latency_stats(&self) -> &DiffStats {
        &self.latency_stats
    }

    pub fn correlator(&self) -> &InternalCorrelator {
        &self.correlator
    }

    pub fn last_entry(&self) -> Option<FifoEntry> {
        self.last_entry
    }

    pub fn last_outcome(&self) -> CycleOutcome {
        self.last_outcome
    }

    pub(crate) fn set_outcome_kind(&mut self, kind: SyncKind) {
        self.last_outcome = CycleOutcome {
            kind,
            ..CycleOutcome::default()
        };
    }

    /// Outputs for the configuration layer
    pub fn report(&self) -> ChannelReport {
        let (min_diff_ms, max_diff_ms) = self.diff_stats.bounds_or_zero();
        let (min_latency_ms, max_latency_ms) = self.latency_stats.bounds_or_zero();
        let (correlator_min_ms, correlator_max_ms) = self.correlator.stats().bounds_or_zero();
        ChannelReport {
            synced: self.state.synced,
            diff_vs_expected_ms: self.state.diff_vs_expected_s * 1e3,
            min_diff_ms,
            max_diff_ms,
            min_latency_ms,
            max_latency_ms,
            correlator_ack: self.correlator.ack(),
            correlator_diff_ms: self.correlator.diff_ms(),
            correlator_min_ms,
            correlator_max_ms,
            correlator_avg_ms: self.correlator.average_ms(),
            delta_s: self.correlator.delta_s(),
        }
    }

    /// Most-recent policy: newest entry, no delay model.
    ///
    /// `synced` survives only if the read succeeds and the previous cycle was synced.
    pub fn most_recent(&mut self, driver: &dyn FifoDriver) -> Result<FifoEntry, SyncError> {
        let synced_prior = self.state.synced;
        let result = match self.event_code {
            Some(code) => driver
                .latest(code)
                .map_err(|err| SyncError::from_read(err, code)),
            None => Err(self.invalid_event_code()),
        };
        self.state.synced = result.is_ok() && synced_prior;
        self.last_outcome = CycleOutcome {
            kind: if result.is_ok() {
                SyncKind::Latest
            } else {
                SyncKind::Failed
            },
            reads: 1,
            selected_pulse: result.as_ref().map_or(PulseId::INVALID, |e| e.pulse_id),
            ..CycleOutcome::default()
        };
        result
    }

    /// Internal-correlator cycle against an external reference time.
    pub fn correlate(
        &mut self,
        driver: &dyn FifoDriver,
        reference: Option<f64>,
    ) -> Result<FifoEntry, SyncError> {
        let Some(code) = self.event_code else {
            self.desync();
            return Err(self.invalid_event_code());
        };
        let request = self.inputs.correlator_request;
        let result = self
            .correlator
            .service(&mut self.cursor, driver, code, request, reference);
        let reads = self.cursor.take_reads();

        self.state.synced = result.is_ok();
        self.last_entry = result.as_ref().ok().copied();
        if result.is_err() {
            self.desync();
        }
        self.last_outcome = CycleOutcome {
            kind: if result.is_ok() {
                SyncKind::Correlated
            } else {
                SyncKind::Failed
            },
            reads,
            selected_pulse: result.as_ref().map_or(PulseId::INVALID, |e| e.pulse_id),
            ..CycleOutcome::default()
        };
        result
    }

    /// Delay-model cycle.
    ///
    /// Returns the matching entry when synced. Every failure leaves the
    /// channel unsynced with the cursor in `Reset` mode.
    #[instrument(
        name = "sync_engine_cycle",
        level = "trace",
        skip(self, driver, clock),
        fields(event_code = ?self.event_code, generation = self.inputs.generation)
    )]
    pub fn cycle(
        &mut self,
        driver: &dyn FifoDriver,
        clock: &dyn TimeSource,
        now_ticks: u64,
    ) -> Result<FifoEntry, SyncError> {
        let synced_prior = self.state.synced;
        self.state.synced = false;
        self.last_outcome = CycleOutcome::default();

        let Some(code) = self.event_code else {
            self.desync();
            return Err(self.invalid_event_code());
        };

        let target = driver.last_fiducial().offset(-seconds_to_pulses(self.inputs.expected_delay_s));
        self.last_outcome.target_pulse = target;

        let located = match self.primary_fetch(driver, clock, code, now_ticks) {
            Ok(entry) => self.select(driver, clock, code, now_ticks, entry, synced_prior),
            Err(err) => {
                // Nothing read: generation bookkeeping waits for the next good fetch.
                self.last_outcome.reads = self.cursor.take_reads();
                self.desync();
                self.log_transition(synced_prior);
                return Err(err);
            }
        };

        let generation = self.inputs.generation;
        let prior_generation = self.state.prior_generation;
        self.state.prior_generation = generation;
        let result = match located {
            Ok(_) if generation != prior_generation => Err(SyncError::GenerationMismatch {
                prior: prior_generation,
                current: generation,
            }),
            other => other,
        };

        self.last_outcome.reads = self.cursor.take_reads();
        match &result {
            Ok(entry) => {
                self.state.synced = true;
                self.last_entry = Some(*entry);
                self.diff_stats.record(self.state.diff_vs_expected_s * 1e3);
                self.latency_stats.record(self.state.actual_delay_s * 1e3);
            }
            Err(_) => {
                self.last_outcome.kind = SyncKind::Failed;
                self.desync();
            }
        }

        debug!(
            kind = self.last_outcome.kind.label(),
            synced = self.state.synced,
            target = %target,
            selected = %self.last_outcome.selected_pulse,
            diff_ms = self.state.diff_vs_expected_s * 1e3,
            steps = self.last_outcome.backtrack_steps,
            "sync cycle"
        );
        self.log_transition(synced_prior);
        result
    }

    /// Primary fetch plus staleness guard
    fn primary_fetch(
        &mut self,
        driver: &dyn FifoDriver,
        clock: &dyn TimeSource,
        code: EventCode,
        now_ticks: u64,
    ) -> Result<FifoEntry, SyncError> {
        let mut fetched = self
            .cursor
            .fetch(driver, code)
            .map_err(|err| SyncError::from_read(err, code))?;
        self.measure(clock, now_ticks, &fetched.entry);

        if self.state.diff_vs_expected_s * 1e3 > self.thresholds.stale_ms
            && fetched.step != FifoStep::Reset
        {
            trace!(
                diff_ms = self.state.diff_vs_expected_s * 1e3,
                "stale entry, refetching newest"
            );
            self.cursor.reset();
            fetched = self
                .cursor
                .fetch(driver, code)
                .map_err(|err| SyncError::from_read(err, code))?;
            self.measure(clock, now_ticks, &fetched.entry);
        }

        if fetched.step == FifoStep::Reset {
            // Cadence continuity is lost across a rebase
            self.state.prior_pulse = PulseId::INVALID;
        }
        Ok(fetched.entry)
    }

    /// Acceptance test, cadence fallback and backward search
    fn select(
        &mut self,
        driver: &dyn FifoDriver,
        clock: &dyn TimeSource,
        code: EventCode,
        now_ticks: u64,
        primary: FifoEntry,
        synced_prior: bool,
    ) -> Result<FifoEntry, SyncError> {
        let pulse_delta = primary.pulse_id.diff(self.state.prior_pulse);
        let result = if self.in_band() {
            self.state.sync_count = self.state.sync_count.saturating_add(1);
            self.last_outcome.kind = SyncKind::Direct;
            Ok(primary)
        } else if self.cadence_holds(pulse_delta, synced_prior) {
            self.state.sync_count = 0;
            self.last_outcome.kind = SyncKind::Cadence;
            Ok(primary)
        } else {
            self.search_backward(driver, clock, code, now_ticks, primary)
        };

        self.state.prior_pulse = match &result {
            Ok(entry) => entry.pulse_id,
            Err(_) => PulseId::INVALID,
        };
        self.state.prior_pulse_delta = pulse_delta;
        self.last_outcome.selected_pulse = self.state.prior_pulse;
        result
    }

    fn in_band(&self) -> bool {
        self.thresholds
            .band
            .contains(self.state.diff_vs_expected_s, self.inputs.expected_delay_s)
    }

    fn cadence_holds(&self, pulse_delta: Option<i32>, synced_prior: bool) -> bool {
        let diff_ms = self.state.diff_vs_expected_s * 1e3;
        let steady = matches!(
            (pulse_delta, self.state.prior_pulse_delta),
            (Some(now), Some(before)) if now == before && now != 0
        );
        steady
            && synced_prior
            && self.state.sync_count >= self.state.min_sync_count
            && diff_ms > -self.thresholds.cadence_early_ms
            && diff_ms < self.thresholds.cadence_late_ms
    }

    /// Step backward until an entry lands in the band.
    ///
    /// Terminates on a match, on the oldest entry, or once the diff passes the
    /// backtrack limit (older entries only move further away).
    fn search_backward(
        &mut self,
        driver: &dyn FifoDriver,
        clock: &dyn TimeSource,
        code: EventCode,
        now_ticks: u64,
        primary: FifoEntry,
    ) -> Result<FifoEntry, SyncError> {
        let mut steps = 0u32;
        let mut entry = primary;
        loop {
            let diff_ms = self.state.diff_vs_expected_s * 1e3;
            if diff_ms >= self.thresholds.backtrack_limit_ms {
                self.state.sync_count = 0;
                self.last_outcome.backtrack_steps = steps;
                return Err(if steps == 0 && diff_ms > self.thresholds.stale_ms {
                    SyncError::StaleEntry { diff_ms }
                } else {
                    SyncError::SearchOvershoot { steps, diff_ms }
                });
            }

            steps += 1;
            entry = match self.cursor.step(driver, code, FifoStep::Backward) {
                Ok(older) => older,
                Err(err) => {
                    trace!(steps, error = %err, last = %entry.pulse_id, "backward search exhausted");
                    self.state.sync_count = 0;
                    self.last_outcome.backtrack_steps = steps;
                    return Err(SyncError::CursorExhausted { steps });
                }
            };
            self.measure(clock, now_ticks, &entry);
            trace!(
                steps,
                pulse_id = %entry.pulse_id,
                diff_ms = self.state.diff_vs_expected_s * 1e3,
                "backward step"
            );

            if self.in_band() {
                self.state.sync_count = 0;
                self.last_outcome.kind = SyncKind::Backtrack;
                self.last_outcome.backtrack_steps = steps;
                return Ok(entry);
            }
        }
    }

    fn measure(&mut self, clock: &dyn TimeSource, now_ticks: u64, entry: &FifoEntry) {
        let actual = if now_ticks >= entry.capture_tick {
            clock.ticks_to_seconds(now_ticks - entry.capture_tick)
        } else {
            -clock.ticks_to_seconds(entry.capture_tick - now_ticks)
        };
        self.state.actual_delay_s = actual;
        self.state.diff_vs_expected_s = actual - self.inputs.expected_delay_s;
    }

    fn desync(&mut self) {
        self.state.synced = false;
        self.cursor.reset();
        if let Some(entry) = self.last_entry.as_mut() {
            entry.pulse_id = PulseId::INVALID;
            entry.timestamp = entry.timestamp.with_invalid_pulse_id();
        }
    }

    fn invalid_event_code(&self) -> SyncError {
        SyncError::InvalidEventCode {
            code: self.inputs.event_code,
        }
    }

    fn log_transition(&self, synced_prior: bool) {
        match (synced_prior, self.state.synced) {
            (false, true) => info!(
                kind = self.last_outcome.kind.label(),
                diff_ms = self.state.diff_vs_expected_s * 1e3,
                "channel synced"
            ),
            (true, false) => info!(
                diff_ms = self.state.diff_vs_expected_s * 1e3,
                "channel lost sync"
            ),
            _ => {}
        }
    }
}
