//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tsfifo - timestamp FIFO sync engine
#[derive(Parser, Debug)]
#[command(
    name = "tsfifo",
    author,
    version,
    about = "Timestamp FIFO sync engine",
    long_about = "Associates data acquisitions with the hardware event that triggered them.\n\n\
                  Loads channel configuration, validates it, and drives the sync engine \n\
                  against a synthetic 360 Hz fiducial pulse train."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TSFIFO_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TSFIFO_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the configured channels against a synthetic pulse train
    Simulate(SimulateArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `simulate` command
#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "tsfifo.toml", env = "TSFIFO_CONFIG")]
    pub config: PathBuf,

    /// Number of channel pickups to run (0 = unlimited)
    #[arg(long, default_value = "1000", env = "TSFIFO_PICKUPS")]
    pub pickups: u64,

    /// Pace fiducials at the real 360 Hz rate instead of as fast as possible
    #[arg(long)]
    pub realtime: bool,

    /// Simulation timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "TSFIFO_TIMEOUT")]
    pub timeout: u64,

    /// Override the pickup jitter from configuration (ms)
    #[arg(long)]
    pub jitter_ms: Option<f64>,

    /// Override the jitter seed from configuration
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the diagnostic dump of every channel when done
    #[arg(long)]
    pub dump: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TSFIFO_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "tsfifo.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "tsfifo.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show engine thresholds
    #[arg(long)]
    pub engine: bool,

    /// Show the simulation section
    #[arg(long)]
    pub simulation: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "tsfifo",
            "-v",
            "simulate",
            "-c",
            "demo.toml",
            "--pickups",
            "50",
            "--jitter-ms",
            "0.5",
            "--dump",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.config, PathBuf::from("demo.toml"));
                assert_eq!(args.pickups, 50);
                assert_eq!(args.jitter_ms, Some(0.5));
                assert!(args.dump);
                assert!(!args.realtime);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["tsfifo", "-q", "-v", "validate"]).is_err());
    }
}
