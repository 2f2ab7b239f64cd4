//! TimeStampChannel - one named timestamp source.
//!
//! Owns the per-channel lock around its [`SyncEngine`]. The lock covers the
//! policy dispatch only; the consumer callback runs after it is released, so
//! the callback may call straight back into the channel.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{
    ChannelConfig, ChannelDump, ChannelName, ChannelReport, EngineConfig, FifoDriver,
    StateCallback, SyncError, TimeSource, TimeStamp, TimeStampFailure, TimeStampPolicy,
    TimeStampRequest,
};
use tracing::{debug, instrument};

use crate::engine::SyncEngine;
use crate::policy::{resolve, RequestContext};

pub struct TimeStampChannel {
    name: ChannelName,
    owner: String,
    engine: Mutex<SyncEngine>,
    driver: Arc<dyn FifoDriver>,
    clock: Arc<dyn TimeSource>,
    callback: Option<StateCallback>,
}

impl fmt::Debug for TimeStampChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeStampChannel")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl TimeStampChannel {
    pub fn new(
        name: ChannelName,
        owner: impl Into<String>,
        driver: Arc<dyn FifoDriver>,
        clock: Arc<dyn TimeSource>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            name,
            owner: owner.into(),
            engine: Mutex::new(SyncEngine::new(config)),
            driver,
            clock,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: StateCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn lock(&self) -> MutexGuard<'_, SyncEngine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply per-cycle inputs and read back the outputs.
    pub fn update(&self, config: &ChannelConfig) -> ChannelReport {
        let mut engine = self.lock();
        if engine.apply(config) {
            debug!(channel = %self.name, "selection criteria changed, statistics reset");
        }
        engine.report()
    }

    /// Outputs without applying new inputs
    pub fn report(&self) -> ChannelReport {
        self.lock().report()
    }

    pub fn is_synced(&self) -> bool {
        self.lock().is_synced()
    }

    pub fn policy(&self) -> TimeStampPolicy {
        self.lock().policy()
    }

    pub fn reset_stats(&self) {
        self.lock().reset_stats();
    }

    /// Run one request under the channel's current policy.
    ///
    /// On failure the error carries the fallback stamp: wall clock with the
    /// pulse id forced to INVALID.
    #[instrument(
        name = "timestamp_channel_get",
        level = "trace",
        skip(self, request),
        fields(channel = %self.name, now_ticks = request.now_ticks)
    )]
    pub fn get_timestamp(
        &self,
        request: &TimeStampRequest,
    ) -> Result<TimeStamp, TimeStampFailure> {
        let ctx = RequestContext {
            driver: self.driver.as_ref(),
            clock: self.clock.as_ref(),
            request,
        };

        let result = {
            let mut engine = self.lock();
            let policy = engine.policy();
            let result = resolve(policy, &mut engine, ctx);
            self.record_metrics(&engine, result.as_ref().err());
            result
        };

        if let Some(callback) = &self.callback {
            callback(&self.name);
        }

        result.map_err(|error| TimeStampFailure {
            error,
            fallback: self.clock.wall_clock().with_invalid_pulse_id(),
        })
    }

    /// Like [`Self::get_timestamp`], always yielding a stamp.
    pub fn timestamp_or_fallback(&self, request: &TimeStampRequest) -> TimeStamp {
        self.get_timestamp(request)
            .unwrap_or_else(|failure| failure.fallback)
    }

    /// Diagnostic snapshot
    pub fn dump(&self) -> ChannelDump {
        let engine = self.lock();
        let (min_diff_ms, max_diff_ms) = engine.diff_stats().bounds_or_zero();
        ChannelDump {
            name: self.name.clone(),
            owner: self.owner.clone(),
            event_code: engine.event_code().map(|code| code.get()),
            generation: engine.inputs().generation,
            expected_delay_s: engine.inputs().expected_delay_s,
            min_diff_ms,
            max_diff_ms,
            policy: engine.policy().name(),
            synced: engine.is_synced(),
        }
    }

    fn record_metrics(&self, engine: &SyncEngine, error: Option<&SyncError>) {
        let channel = self.name.to_string();
        let outcome = engine.last_outcome();

        metrics::counter!(
            "tsfifo_cycles_total",
            "channel" => channel.clone(),
            "kind" => outcome.kind.label()
        )
        .increment(1);
        metrics::gauge!("tsfifo_synced", "channel" => channel.clone())
            .set(if engine.is_synced() { 1.0 } else { 0.0 });

        if outcome.backtrack_steps > 0 {
            metrics::histogram!("tsfifo_backtrack_steps").record(outcome.backtrack_steps as f64);
        }
        if engine.policy().uses_delay_model() {
            metrics::histogram!("tsfifo_diff_vs_expected_ms", "channel" => channel.clone())
                .record(engine.state().diff_vs_expected_s * 1e3);
        }
        if engine.policy() == TimeStampPolicy::Internal && engine.correlator().is_synced() {
            metrics::histogram!("tsfifo_correlator_error_ms", "channel" => channel.clone())
                .record(engine.correlator().diff_ms());
        }
        if let Some(error) = error {
            metrics::counter!(
                "tsfifo_errors_total",
                "channel" => channel,
                "error" => error.label()
            )
            .increment(1);
        }
    }
}
