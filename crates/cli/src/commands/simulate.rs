//! `simulate` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::SimulateArgs;
use crate::commands::load_blueprint;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `simulate` command
pub async fn run_simulate(args: &SimulateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut blueprint = load_blueprint(&args.config)?;

    // Apply CLI overrides
    if let Some(sim) = blueprint.simulation.as_mut() {
        if let Some(jitter_ms) = args.jitter_ms {
            if !jitter_ms.is_finite() || jitter_ms < 0.0 {
                return Err(CliError::invalid_override("jitter-ms", "must be >= 0").into());
            }
            info!(jitter_ms, "Overriding pickup jitter from CLI");
            sim.pickup_jitter_ms = jitter_ms;
        }
        if let Some(seed) = args.seed {
            info!(seed, "Overriding jitter seed from CLI");
            sim.seed = seed;
        }
    }

    info!(
        channels = blueprint.channels.len(),
        pickups = args.pickups,
        realtime = args.realtime,
        "Configuration loaded"
    );

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        source: args.config.display().to_string(),
        max_pickups: (args.pickups != 0).then_some(args.pickups),
        realtime: args.realtime,
    });
    let mut simulation = pipeline.build().context("Failed to build simulation")?;

    let timeout = (args.timeout != 0).then(|| Duration::from_secs(args.timeout));
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending::<()>().await,
        }
    };

    info!("Starting simulation...");

    tokio::select! {
        _ = simulation.run() => {}
        _ = deadline => {
            warn!(timeout_secs = args.timeout, "Simulation timed out");
        }
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping simulation...");
        }
    }

    let (stats, registry) = simulation.finish();
    stats.print_summary();

    if args.dump {
        for dump in registry.dump_all() {
            println!("{dump}");
        }
    }

    info!("tsfifo simulation finished");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM. A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
