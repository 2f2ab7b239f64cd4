//! InternalCorrelator - locks a channel to an external reference clock.
//!
//! Tracks an offset `delta` with `fifo_time ≈ delta + reference_time`. The
//! operator anchors it with a `Set` request and nudges it one FIFO slot at a
//! time with `TweakForward` / `TweakBackward`. On ordinary cycles the FIFO is
//! walked towards the predicted time and a slow corrector keeps the running
//! average error inside half the match tolerance.

use contracts::{
    CorrelatorConfig, CorrelatorRequest, EventCode, FifoDriver, FifoEntry, FifoStep, SyncError,
};
use tracing::{debug, info, trace};

use crate::cursor::FifoCursor;
use crate::stats::DiffStats;

/// Outcome of one correlator cycle
pub(crate) type CorrelatorResult = Result<FifoEntry, SyncError>;

#[derive(Debug, Clone)]
pub struct InternalCorrelator {
    config: CorrelatorConfig,
    /// Offset between FIFO time and reference time (s)
    delta_s: f64,
    synced: bool,
    last_reference: Option<f64>,
    /// Last request seen, for edge detection
    last_request: CorrelatorRequest,
    /// Last request serviced
    ack: CorrelatorRequest,
    diff_ms: f64,
    average_ms: f64,
    stats: DiffStats,
}

impl InternalCorrelator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self {
            config,
            delta_s: 0.0,
            synced: false,
            last_reference: None,
            last_request: CorrelatorRequest::None,
            ack: CorrelatorRequest::None,
            diff_ms: 0.0,
            average_ms: 0.0,
            stats: DiffStats::new(),
        }
    }

    pub fn delta_s(&self) -> f64 {
        self.delta_s
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn ack(&self) -> CorrelatorRequest {
        self.ack
    }

    pub fn diff_ms(&self) -> f64 {
        self.diff_ms
    }

    pub fn average_ms(&self) -> f64 {
        self.average_ms
    }

    pub fn stats(&self) -> &DiffStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
        self.average_ms = 0.0;
        self.diff_ms = 0.0;
    }

    fn tolerance_s(&self) -> f64 {
        self.config.tolerance_ms / 1e3
    }

    /// Run one cycle.
    ///
    /// `request` is level-triggered by the caller and edge-detected here: a
    /// request is serviced once and re-armed when the input returns to `None`.
    pub(crate) fn service(
        &mut self,
        cursor: &mut FifoCursor,
        driver: &dyn FifoDriver,
        event_code: EventCode,
        request: CorrelatorRequest,
        reference: Option<f64>,
    ) -> CorrelatorResult {
        let fresh = if request != self.last_request {
            self.last_request = request;
            request
        } else {
            CorrelatorRequest::None
        };

        let Some(reference) = reference else {
            return Err(self.desync(cursor, "no reference sample"));
        };

        match fresh {
            CorrelatorRequest::Set => self.anchor(cursor, driver, event_code, reference),
            CorrelatorRequest::TweakForward => {
                self.tweak(cursor, driver, event_code, FifoStep::Forward, fresh, reference)
            }
            CorrelatorRequest::TweakBackward => {
                self.tweak(cursor, driver, event_code, FifoStep::Backward, fresh, reference)
            }
            CorrelatorRequest::None => self.track(cursor, driver, event_code, reference),
        }
    }

    fn anchor(
        &mut self,
        cursor: &mut FifoCursor,
        driver: &dyn FifoDriver,
        event_code: EventCode,
        reference: f64,
    ) -> CorrelatorResult {
        let entry = self.read(cursor, driver, event_code, FifoStep::Reset)?;
        self.delta_s = entry.timestamp.as_secs_f64() - reference;
        self.last_reference = Some(reference);
        self.ack = CorrelatorRequest::Set;
        self.reset_stats();
        if !self.synced {
            info!(event_code = %event_code, delta_s = self.delta_s, "correlator anchored");
        }
        self.synced = true;
        Ok(entry)
    }

    fn tweak(
        &mut self,
        cursor: &mut FifoCursor,
        driver: &dyn FifoDriver,
        event_code: EventCode,
        step: FifoStep,
        request: CorrelatorRequest,
        reference: f64,
    ) -> CorrelatorResult {
        self.validate_reference(reference)
            .map_err(|reason| self.desync(cursor, reason))?;
        let anchor = self.last_reference.unwrap_or(reference);
        self.last_reference = Some(reference);

        let entry = self.read(cursor, driver, event_code, step)?;
        self.delta_s = entry.timestamp.as_secs_f64() - anchor;
        self.ack = request;
        debug!(event_code = %event_code, ?step, delta_s = self.delta_s, "correlator tweaked");
        Ok(entry)
    }

    fn track(
        &mut self,
        cursor: &mut FifoCursor,
        driver: &dyn FifoDriver,
        event_code: EventCode,
        reference: f64,
    ) -> CorrelatorResult {
        self.validate_reference(reference)
            .map_err(|reason| self.desync(cursor, reason))?;
        self.last_reference = Some(reference);

        let predicted = self.delta_s + reference;
        let tolerance = self.tolerance_s();

        let mut entry = match cursor.fetch(driver, event_code) {
            Ok(fetched) => fetched.entry,
            Err(err) => {
                self.lose_lock(cursor);
                return Err(SyncError::from_read(err, event_code));
            }
        };
        let mut error = entry.timestamp.as_secs_f64() - predicted;

        if error.abs() > tolerance {
            // Entry later than predicted: walk back. Earlier: walk forward.
            let direction = if error > 0.0 {
                FifoStep::Backward
            } else {
                FifoStep::Forward
            };
            let sign = error.signum();
            let mut steps = 0;
            loop {
                if steps >= self.config.step_budget {
                    self.lose_lock(cursor);
                    return Err(SyncError::CursorExhausted { steps });
                }
                steps += 1;
                entry = match cursor.step(driver, event_code, direction) {
                    Ok(entry) => entry,
                    Err(_) => {
                        self.lose_lock(cursor);
                        return Err(SyncError::CursorExhausted { steps });
                    }
                };
                error = entry.timestamp.as_secs_f64() - predicted;
                trace!(steps, ?direction, error_ms = error * 1e3, "correlator step");
                if error.abs() <= tolerance {
                    break;
                }
                if error.signum() != sign {
                    return Err(self.desync(cursor, "search reversed without a match"));
                }
            }
        }

        self.apply_match(error * 1e3);
        Ok(entry)
    }

    /// Update the running average and apply the slow offset correction.
    fn apply_match(&mut self, error_ms: f64) {
        let weight = self.config.average_weight;
        self.average_ms += weight * (error_ms - self.average_ms);

        let half = self.config.tolerance_ms / 2.0;
        if self.average_ms > half {
            self.delta_s += half / 1e3;
            self.average_ms -= half;
            debug!(delta_s = self.delta_s, "correlator offset nudged later");
        } else if self.average_ms < -half {
            self.delta_s -= half / 1e3;
            self.average_ms += half;
            debug!(delta_s = self.delta_s, "correlator offset nudged earlier");
        }

        self.diff_ms = error_ms;
        self.stats.record(error_ms);
        if !self.synced {
            info!(delta_s = self.delta_s, "correlator locked");
        }
        self.synced = true;
    }

    /// Single explicit read; a failure drops the lock.
    fn read(
        &mut self,
        cursor: &mut FifoCursor,
        driver: &dyn FifoDriver,
        event_code: EventCode,
        step: FifoStep,
    ) -> CorrelatorResult {
        cursor.step(driver, event_code, step).map_err(|err| {
            self.lose_lock(cursor);
            SyncError::from_read(err, event_code)
        })
    }

    fn validate_reference(&self, reference: f64) -> Result<(), &'static str> {
        if !reference.is_finite() {
            return Err("reference not finite");
        }
        match self.last_reference {
            Some(last) if reference < last => Err("reference regressed"),
            Some(last) if reference - last > self.config.max_reference_jump_s => {
                Err("reference jumped too far ahead")
            }
            _ => Ok(()),
        }
    }

    fn lose_lock(&mut self, cursor: &mut FifoCursor) {
        if self.synced {
            info!(delta_s = self.delta_s, "correlator lost lock");
        }
        self.synced = false;
        cursor.reset();
    }

    /// Drop the offset entirely; the channel falls back to the most recent entry.
    fn desync(&mut self, cursor: &mut FifoCursor, reason: &str) -> SyncError {
        self.lose_lock(cursor);
        self.delta_s = 0.0;
        debug!(reason, "correlator desynced");
        SyncError::ExternalReferenceInvalid {
            reason: reason.to_string(),
        }
    }
}
