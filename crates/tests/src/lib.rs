//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 基于合成脉冲序列的端到端测试（无需硬件）
//! - 同步引擎关键性质：回绕、锁定、代际重置、有界回溯、统计单调、相关器稳定

#[cfg(test)]
mod support {
    use std::sync::Arc;

    use contracts::{ChannelConfig, EngineConfig, EventCode, PulseId};
    use fifo_sim::{EventSchedule, PulseTrain, SimClock, SimFifo};
    use sync_engine::TimeStampChannel;

    pub const EC: i64 = 140;
    pub const EPOCH_S: f64 = 1_700_000_000.0;

    pub fn code() -> EventCode {
        EventCode::from_raw(EC).unwrap()
    }

    /// 1 GHz clock; event `EC` fires every `divisor` fiducials
    pub fn train(depth: usize, divisor: u32, start_pulse: u32) -> PulseTrain {
        let fifo = Arc::new(SimFifo::new(depth));
        let clock = Arc::new(SimClock::new(1.0e9, EPOCH_S));
        let mut train = PulseTrain::new(fifo, clock, PulseId::new(start_pulse));
        train.add_schedule(EventSchedule::every(code(), divisor));
        train
    }

    pub fn ms(train: &PulseTrain, ms: f64) -> u64 {
        train.clock().secs_to_ticks(ms / 1e3)
    }

    pub fn channel(train: &PulseTrain, config: &ChannelConfig) -> TimeStampChannel {
        let channel = TimeStampChannel::new(
            "CAM1".into(),
            "CAM1:TSS",
            train.fifo().clone(),
            train.clock().clone(),
            &EngineConfig::default(),
        );
        channel.update(config);
        channel
    }
}

#[cfg(test)]
mod contract_tests {
    use contracts::{
        EngineConfig, PulseId, TimeStampPolicy, FIDUCIAL_RATE_HZ, PULSE_ID_INVALID,
        PULSE_ID_MODULUS,
    };

    #[test]
    fn test_contract_constants() {
        assert_eq!(PULSE_ID_MODULUS, 0x1FFE0);
        assert_eq!(PULSE_ID_INVALID, 0x1FFFF);
        assert_eq!(FIDUCIAL_RATE_HZ, 360.0);
        assert!(!PulseId::INVALID.is_valid());
    }

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert!(config.sync.check().is_ok());
        assert_eq!(config.sync.stale_ms, 60.0);
        assert_eq!(config.sync.backtrack_limit_ms, 30.0);
        assert_eq!(config.correlator.step_budget, 8);
        assert_eq!(TimeStampPolicy::default(), TimeStampPolicy::MostRecent);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        ChannelConfig, ChannelName, CorrelatorRequest, EngineConfig, EventCode, FifoDriver,
        PulseId, StateCallback, SyncError, TimeSource, TimeStampPolicy, TimeStampRequest,
        PULSE_ID_MODULUS,
    };
    use fifo_sim::{PickupScheduler, PollJitter, PulseTrain};
    use observability::ChannelMetricsAggregator;
    use sync_engine::{ChannelRegistry, SyncEngine, SyncKind};

    use crate::support::{channel, ms, train, EC, EPOCH_S};

    fn synced_engine(delay_s: f64) -> SyncEngine {
        let mut engine = SyncEngine::new(&EngineConfig::default());
        engine.apply(&ChannelConfig::new(EC, delay_s, TimeStampPolicy::Synced));
        engine
    }

    /// Events on every fiducial, picked up exactly 12 ms after capture,
    /// starting ten pulses before the wrap point.
    #[test]
    fn test_lock_holds_across_pulse_id_wrap() {
        let start = PulseId::new(PULSE_ID_MODULUS - 10);
        let mut train = train(32, 1, start.raw());
        let channel = channel(
            &train,
            &ChannelConfig::new(EC, 0.012, TimeStampPolicy::Synced),
        );
        let delay = ms(&train, 12.0);

        let mut prior: Option<PulseId> = None;
        for k in 0..30u64 {
            let tick = train.fiducial_tick(k) + delay;
            train.advance_to(tick);
            let ts = channel
                .get_timestamp(&TimeStampRequest::at(tick))
                .unwrap_or_else(|f| panic!("pickup {k} failed: {}", f.error));

            assert_eq!(ts.pulse_id(), start.offset(k as i64));
            if let Some(prior) = prior {
                assert_eq!(ts.pulse_id().diff(prior), Some(1));
            }
            prior = Some(ts.pulse_id());
        }

        assert!(channel.is_synced());
        assert!(start.offset(29).raw() < start.raw(), "run must cross the wrap");
        let report = channel.report();
        assert!(report.min_diff_ms.abs() < 1e-6);
        assert!(report.max_diff_ms.abs() < 1e-6);
    }

    /// First pickup finds the entry by backtracking, later ones hit directly.
    #[test]
    fn test_lock_on_backtrack_then_direct() {
        let mut train = train(32, 1, 0);
        let mut engine = synced_engine(0.012);
        let delay = ms(&train, 12.0);

        let tick = train.fiducial_tick(0) + delay;
        train.advance_to(tick);
        let entry = engine
            .cycle(train.fifo().as_ref(), train.clock().as_ref(), tick)
            .unwrap();
        assert_eq!(entry.pulse_id, PulseId::new(0));
        let outcome = engine.last_outcome();
        assert_eq!(outcome.kind, SyncKind::Backtrack);
        // Newest entry is four fiducials younger than the match
        assert_eq!(outcome.backtrack_steps, 4);
        assert_eq!(engine.state().sync_count, 0);

        for k in 1..=3u64 {
            let tick = train.fiducial_tick(k) + delay;
            train.advance_to(tick);
            let entry = engine
                .cycle(train.fifo().as_ref(), train.clock().as_ref(), tick)
                .unwrap();
            assert_eq!(entry.pulse_id, PulseId::new(k as u32));
            assert_eq!(engine.last_outcome().kind, SyncKind::Direct);
            assert_eq!(engine.state().sync_count, k as u32);
        }
        assert!(engine.is_synced());
    }

    #[test]
    fn test_generation_change_forces_one_failed_cycle() {
        let mut train = train(32, 1, 500);
        let mut config = ChannelConfig::new(EC, 0.012, TimeStampPolicy::Synced);
        let channel = channel(&train, &config);
        let delay = ms(&train, 12.0);
        let mut poll = |k: u64| {
            let tick = train.fiducial_tick(k) + delay;
            train.advance_to(tick);
            channel.get_timestamp(&TimeStampRequest::at(tick))
        };

        for k in 0..4 {
            assert!(poll(k).is_ok());
        }

        config.generation = 1;
        channel.update(&config);

        let failure = poll(4).unwrap_err();
        assert_eq!(
            failure.error,
            SyncError::GenerationMismatch {
                prior: 0,
                current: 1
            }
        );
        assert!(!failure.fallback.pulse_id().is_valid());
        assert!(!channel.is_synced());

        let ts = poll(5).unwrap();
        assert_eq!(ts.pulse_id(), PulseId::new(505));
        assert!(channel.is_synced());
    }

    /// The match lies ten entries back but the FIFO only holds eight.
    #[test]
    fn test_backward_search_bounded_by_depth() {
        let mut train = train(8, 1, 0);
        let mut engine = synced_engine(0.030);
        train.run(21);
        let tick = train.fiducial_tick(20) + ms(&train, 1.0);
        train.advance_to(tick);

        let err = engine
            .cycle(train.fifo().as_ref(), train.clock().as_ref(), tick)
            .unwrap_err();
        assert_eq!(err, SyncError::CursorExhausted { steps: 8 });

        let outcome = engine.last_outcome();
        assert_eq!(outcome.kind, SyncKind::Failed);
        assert!(outcome.reads <= 10, "reads: {}", outcome.reads);
        assert!(engine.cursor().is_reset());
        assert!(!engine.is_synced());
    }

    /// Entries 13.9 ms apart straddle the band; the search stops past the
    /// backtrack limit.
    #[test]
    fn test_backward_search_stops_at_limit() {
        let mut train = train(32, 5, 0);
        let mut engine = synced_engine(0.020);
        train.run(41);
        let tick = train.fiducial_tick(40) + ms(&train, 1.0);
        train.advance_to(tick);

        let err = engine
            .cycle(train.fifo().as_ref(), train.clock().as_ref(), tick)
            .unwrap_err();
        match err {
            SyncError::SearchOvershoot { steps, diff_ms } => {
                assert_eq!(steps, 4);
                assert!(diff_ms >= 30.0 && diff_ms < 40.0, "diff {diff_ms}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(engine.cursor().is_reset());
    }

    #[test]
    fn test_stale_primary_entry() {
        let mut train = train(32, 1, 0);
        let mut engine = synced_engine(0.010);
        train.run(10);
        // Nothing captured for 100 ms
        let tick = train.fiducial_tick(9) + ms(&train, 100.0);
        train.clock().set_ticks(tick);

        let err = engine
            .cycle(train.fifo().as_ref(), train.clock().as_ref(), tick)
            .unwrap_err();
        assert!(
            matches!(err, SyncError::StaleEntry { diff_ms } if (diff_ms - 90.0).abs() < 1e-6),
            "got {err:?}"
        );
    }

    /// Jittered pickups: min never rises, max never falls.
    #[test]
    fn test_diff_statistics_are_monotone() {
        let mut train = train(32, 3, 77);
        let mut engine = synced_engine(0.012);
        let jitter = ms(&train, 0.5);
        let mut scheduler = PickupScheduler::new(PollJitter::new(7, jitter));
        let delay = ms(&train, 12.0);

        let mut bounds: Option<(f64, f64)> = None;
        for m in 0..60u64 {
            scheduler.schedule(0, train.fiducial_tick(3 * m), delay);
            let pickup = scheduler.pop_due(u64::MAX).unwrap();
            train.advance_to(pickup.tick);

            let entry = engine
                .cycle(train.fifo().as_ref(), train.clock().as_ref(), pickup.tick)
                .unwrap();
            assert_eq!(entry.pulse_id, PulseId::new(77).offset(3 * m as i64));

            let stats = engine.diff_stats();
            let (min, max) = (stats.min().unwrap(), stats.max().unwrap());
            if let Some((prior_min, prior_max)) = bounds {
                assert!(min <= prior_min);
                assert!(max >= prior_max);
            }
            assert!(min >= -0.5 - 1e-6 && max <= 0.5 + 1e-6);
            bounds = Some((min, max));
        }
        assert_eq!(engine.diff_stats().count(), 60);
        assert!(scheduler.is_empty());
    }

    /// A reference 2.5 ms ahead of the FIFO, stepping with the events.
    #[test]
    fn test_correlator_holds_lock() {
        let mut train = train(32, 3, 100);
        let mut config = ChannelConfig::new(EC, 0.0, TimeStampPolicy::Internal);
        config.correlator_request = CorrelatorRequest::Set;
        let channel = channel(&train, &config);
        let tolerance_ms = EngineConfig::default().correlator.tolerance_ms;

        for m in 1..=40u64 {
            let capture = train.fiducial_tick(3 * m);
            let tick = capture + ms(&train, 1.0);
            train.advance_to(tick);
            let reference = train.clock().secs_at(capture) + 0.0025;

            let ts = channel
                .get_timestamp(&TimeStampRequest::at(tick).with_reference(reference))
                .unwrap();
            assert_eq!(ts.pulse_id(), PulseId::new(100).offset(3 * m as i64));

            let report = channel.report();
            assert!(report.synced, "lost lock at m={m}");
            assert!(report.correlator_avg_ms.abs() < tolerance_ms);
            assert!((report.delta_s + 0.0025).abs() < 1e-3, "delta {}", report.delta_s);
            assert_eq!(report.correlator_ack, CorrelatorRequest::Set);
        }

        // A regressing reference desyncs; the stamp comes from the newest entry instead
        let tick = train.fiducial_tick(123) + ms(&train, 1.0);
        train.advance_to(tick);
        let ts = channel
            .get_timestamp(&TimeStampRequest::at(tick).with_reference(EPOCH_S))
            .unwrap();
        assert_eq!(ts.pulse_id(), PulseId::new(100).offset(123));
        assert!(!channel.is_synced());
        assert_eq!(channel.report().delta_s, 0.0);
    }

    /// No anchor request: the correlator starts from a zero offset and the
    /// running average pulls it toward a reference 2.5 ms ahead.
    #[test]
    fn test_correlator_offset_converges_without_anchor() {
        let mut train = train(32, 1, 200);
        let channel = channel(&train, &ChannelConfig::new(EC, 0.0, TimeStampPolicy::Internal));
        let tolerance_ms = EngineConfig::default().correlator.tolerance_ms;
        let half_ms = tolerance_ms / 2.0;

        let mut converged = None;
        for k in 0..=80u64 {
            let capture = train.fiducial_tick(k);
            let tick = capture + ms(&train, 1.0);
            train.advance_to(tick);
            let reference = train.clock().secs_at(capture) + 0.0025;

            let ts = channel
                .get_timestamp(&TimeStampRequest::at(tick).with_reference(reference))
                .unwrap();
            assert_eq!(ts.pulse_id(), PulseId::new(200).offset(k as i64));

            let report = channel.report();
            assert!(report.synced, "lost lock at k={k}");
            assert_eq!(report.correlator_ack, CorrelatorRequest::None);
            if k == 20 {
                // One half-tolerance nudge toward the reference
                assert!((report.delta_s + half_ms / 1e3).abs() < 1e-9, "delta {}", report.delta_s);
                converged = Some(report.delta_s);
            }
            if k >= 20 {
                assert_eq!(Some(report.delta_s), converged, "offset moved at k={k}");
                assert!(
                    report.correlator_diff_ms.abs() <= tolerance_ms + half_ms,
                    "diff {} ms at k={k}",
                    report.correlator_diff_ms
                );
            }
        }
    }

    #[test]
    fn test_registry_channels_share_one_fifo() {
        let mut train = train(32, 1, 0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let callback: StateCallback = Arc::new(move |_: &ChannelName| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let registry = ChannelRegistry::new(
            train.fifo().clone(),
            train.clock().clone(),
            EngineConfig::default(),
        )
        .with_callback(callback);

        registry
            .process("SYNCED", "a", &ChannelConfig::new(EC, 0.012, TimeStampPolicy::Synced))
            .unwrap();
        registry
            .process("LATEST", "b", &ChannelConfig::new(EC, 0.0, TimeStampPolicy::MostRecent))
            .unwrap();
        let mut tod = ChannelConfig::new(EC, 0.0, TimeStampPolicy::Best);
        tod.free_run = true;
        registry.process("WALL", "c", &tod).unwrap();

        let tick = train.fiducial_tick(0) + ms(&train, 12.0);
        train.advance_to(tick);
        let request = TimeStampRequest::at(tick);

        let synced = registry.lookup("SYNCED").unwrap().get_timestamp(&request).unwrap();
        let latest = registry.lookup("LATEST").unwrap().get_timestamp(&request).unwrap();
        let wall = registry.lookup("WALL").unwrap().get_timestamp(&request).unwrap();

        assert_eq!(synced.pulse_id(), PulseId::new(0));
        assert_eq!(latest.pulse_id(), PulseId::new(4));
        assert!(!wall.pulse_id().is_valid());
        assert_eq!(wall.sec, train.clock().wall_clock().sec);
        // Every policy notifies, time-of-day included
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let names: Vec<_> = registry.dump_all().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["LATEST", "SYNCED", "WALL"]);
        assert_eq!(registry.dump("WALL").unwrap().policy, "TOD");
    }

    #[test]
    fn test_best_policy_never_fails_once_fiducials_flow() {
        let mut train = train(4, 1, 0);
        let channel = channel(&train, &ChannelConfig::new(EC, 0.5, TimeStampPolicy::Best));

        for k in 0..20u64 {
            let tick = train.fiducial_tick(k) + ms(&train, 1.0);
            train.advance_to(tick);
            let ts = channel.get_timestamp(&TimeStampRequest::at(tick)).unwrap();
            // 500 ms is far beyond a 4-deep FIFO: always the fiducial fallback
            assert!(!ts.pulse_id().is_valid());
            assert_eq!(ts.sec, train.fifo().fiducial_timestamp().unwrap().sec);
        }
        assert!(!channel.is_synced());
    }

    const DEMO: &str = r#"
[[channels]]
name = "CAM1"
event_code = 140
expected_delay_s = 0.012
policy = "synced"

[[channels]]
name = "BPM1"
event_code = 40
delay_fiducials = 1.5
policy = "best"

[simulation]
fifo_depth = 32
start_pulse = 131000
pickup_jitter_ms = 0.3
seed = 11

[[simulation.events]]
event_code = 140
divisor = 3

[[simulation.events]]
event_code = 40
"#;

    /// Loader output drives the simulator and registry end to end.
    #[test]
    fn test_config_to_engine_pipeline() {
        let blueprint = ConfigLoader::load_from_str(DEMO, ConfigFormat::Toml).unwrap();
        let sim = blueprint.simulation.as_ref().unwrap();
        let mut train = PulseTrain::from_config(sim);
        let registry = ChannelRegistry::new(
            train.fifo().clone(),
            train.clock().clone(),
            blueprint.engine.clone(),
        );

        let mut channels = Vec::new();
        for entry in &blueprint.channels {
            let config = entry.to_channel_config();
            registry.process(&entry.name, entry.owner(), &config).unwrap();
            let delay = train.clock().secs_to_ticks(entry.expected_delay_s().unwrap());
            channels.push((registry.lookup(&entry.name).unwrap(), config, delay));
        }

        let jitter = train.clock().secs_to_ticks(sim.pickup_jitter_ms / 1e3);
        let mut scheduler = PickupScheduler::new(PollJitter::new(sim.seed, jitter));
        let mut aggregator = ChannelMetricsAggregator::new();
        let mut last_capture = [None, None];

        for _ in 0..300 {
            let next = train.next_fiducial_tick();
            while let Some(pickup) = scheduler.pop_due(next) {
                train.advance_to(pickup.tick);
                let (channel, config, _) = &channels[pickup.channel];
                let result = channel.get_timestamp(&TimeStampRequest::at(pickup.tick));
                let report = channel.update(config);
                aggregator.record_request(channel.name(), result.as_ref().err().map(|f| &f.error));
                aggregator.update(channel.name(), &report);
            }

            train.step();
            for (idx, (_, config, delay)) in channels.iter().enumerate() {
                let code = EventCode::from_raw(config.event_code).unwrap();
                let entry = train.fifo().latest(code).unwrap();
                if last_capture[idx] != Some(entry.capture_tick) {
                    last_capture[idx] = Some(entry.capture_tick);
                    scheduler.schedule(idx, entry.capture_tick, *delay);
                }
            }
        }

        // Starts 40 pulses before the wrap point
        assert!(train.emitted() > 200);
        for name in ["CAM1", "BPM1"] {
            let channel = registry.lookup(name).unwrap();
            assert!(channel.is_synced(), "{name} not synced");
            let tally = &aggregator.channels[name];
            assert!(tally.requests > 50);
            // Only the lock-on pickup may miss
            assert!(tally.synced + 1 >= tally.requests, "{name}: {tally:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_channels_polled_from_parallel_tasks() {
        let mut train = train(32, 1, 0);
        let tick = train.fiducial_tick(10) + ms(&train, 12.0);
        train.advance_to(tick);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let callback: StateCallback = Arc::new(move |_: &ChannelName| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let registry = Arc::new(
            ChannelRegistry::new(
                train.fifo().clone(),
                train.clock().clone(),
                EngineConfig::default(),
            )
            .with_callback(callback),
        );

        let mut handles = Vec::new();
        for name in ["A", "B", "C", "D"] {
            let registry = registry.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                registry
                    .process(name, "owner", &ChannelConfig::new(EC, 0.012, TimeStampPolicy::Best))
                    .unwrap();
                let channel = registry.lookup(name).unwrap();
                (0..100)
                    .filter(|_| channel.get_timestamp(&TimeStampRequest::at(tick)).is_ok())
                    .count()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 100);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 400);
        assert_eq!(registry.len(), 4);
    }
}
