//! Policy dispatch: turns one request into a time stamp.

use contracts::{FifoDriver, SyncError, TimeSource, TimeStamp, TimeStampPolicy, TimeStampRequest};
use tracing::trace;

use crate::engine::{SyncEngine, SyncKind};

/// Collaborators of one request
#[derive(Clone, Copy)]
pub struct RequestContext<'a> {
    pub driver: &'a dyn FifoDriver,
    pub clock: &'a dyn TimeSource,
    pub request: &'a TimeStampRequest,
}

/// Resolve a request under `policy`.
///
/// - `MostRecent`: newest FIFO stamp, whatever its age
/// - `Synced`: delay-model stamp or [`SyncError`]
/// - `Best`: delay-model stamp, else the latest fiducial stamp with INVALID pulse id
/// - `TimeOfDay`: wall clock with INVALID pulse id
/// - `Internal`: correlator stamp; a desynced correlator falls back to `MostRecent`
pub fn resolve(
    policy: TimeStampPolicy,
    engine: &mut SyncEngine,
    ctx: RequestContext<'_>,
) -> Result<TimeStamp, SyncError> {
    match policy {
        TimeStampPolicy::TimeOfDay => {
            engine.set_outcome_kind(SyncKind::TimeOfDay);
            Ok(ctx.clock.wall_clock().with_invalid_pulse_id())
        }
        TimeStampPolicy::MostRecent => engine.most_recent(ctx.driver).map(|e| e.timestamp),
        TimeStampPolicy::Synced => engine
            .cycle(ctx.driver, ctx.clock, ctx.request.now_ticks)
            .map(|e| e.timestamp),
        TimeStampPolicy::Best => {
            match engine.cycle(ctx.driver, ctx.clock, ctx.request.now_ticks) {
                Ok(entry) => Ok(entry.timestamp),
                Err(err) => match ctx.driver.fiducial_timestamp() {
                    Ok(fiducial) => {
                        trace!(error = %err, "unsynced, using fiducial stamp");
                        Ok(fiducial.with_invalid_pulse_id())
                    }
                    Err(_) => Err(err),
                },
            }
        }
        TimeStampPolicy::Internal => {
            match engine.correlate(ctx.driver, ctx.request.reference_time) {
                Ok(entry) => Ok(entry.timestamp),
                Err(SyncError::ExternalReferenceInvalid { reason }) => {
                    trace!(reason, "correlator desynced, using most recent entry");
                    engine.most_recent(ctx.driver).map(|e| e.timestamp)
                }
                Err(err) => Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ChannelConfig, EngineConfig, EventCode, PulseId};
    use fifo_sim::{EventSchedule, PulseTrain, SimClock, SimFifo};
    use std::sync::Arc;

    fn setup(policy: TimeStampPolicy) -> (PulseTrain, SyncEngine) {
        let fifo = Arc::new(SimFifo::new(16));
        let clock = Arc::new(SimClock::new(1.0e9, 500.0));
        let mut train = PulseTrain::new(fifo, clock, PulseId::new(7));
        train.add_schedule(EventSchedule::every(EventCode::from_raw(40).unwrap(), 1));
        train.run(10);
        let mut engine = SyncEngine::new(&EngineConfig::default());
        engine.apply(&ChannelConfig::new(40, 0.5, policy));
        (train, engine)
    }

    fn resolve_now(
        policy: TimeStampPolicy,
        train: &PulseTrain,
        engine: &mut SyncEngine,
        reference: Option<f64>,
    ) -> Result<TimeStamp, SyncError> {
        let mut request = TimeStampRequest::at(train.clock().now_ticks());
        request.reference_time = reference;
        let ctx = RequestContext {
            driver: train.fifo().as_ref(),
            clock: train.clock().as_ref(),
            request: &request,
        };
        resolve(policy, engine, ctx)
    }

    #[test]
    fn test_time_of_day_always_succeeds() {
        let (train, mut engine) = setup(TimeStampPolicy::TimeOfDay);
        let ts = resolve_now(TimeStampPolicy::TimeOfDay, &train, &mut engine, None).unwrap();
        assert!(!ts.pulse_id().is_valid());
        assert_eq!(ts.sec, 500);
    }

    #[test]
    fn test_synced_refuses_unsynced() {
        // 0.5 s expected delay: nothing in a 16-deep FIFO is that old
        let (train, mut engine) = setup(TimeStampPolicy::Synced);
        assert!(resolve_now(TimeStampPolicy::Synced, &train, &mut engine, None).is_err());
    }

    #[test]
    fn test_best_falls_back_to_fiducial() {
        let (train, mut engine) = setup(TimeStampPolicy::Best);
        let ts = resolve_now(TimeStampPolicy::Best, &train, &mut engine, None).unwrap();
        assert!(!ts.pulse_id().is_valid());
        let fiducial = train.fifo().fiducial_timestamp().unwrap();
        assert_eq!(ts.sec, fiducial.sec);
    }

    #[test]
    fn test_most_recent_returns_newest() {
        let (train, mut engine) = setup(TimeStampPolicy::MostRecent);
        let ts = resolve_now(TimeStampPolicy::MostRecent, &train, &mut engine, None).unwrap();
        assert_eq!(ts.pulse_id(), PulseId::new(16));
    }

    #[test]
    fn test_internal_without_reference_uses_most_recent() {
        let (train, mut engine) = setup(TimeStampPolicy::Internal);
        let ts = resolve_now(TimeStampPolicy::Internal, &train, &mut engine, None).unwrap();
        assert_eq!(ts.pulse_id(), PulseId::new(16));
        assert!(!engine.is_synced());
    }
}
