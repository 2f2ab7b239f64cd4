//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{FifoSyncBlueprint, TimeStampPolicy};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    channel_count: usize,
    synced_policies: usize,
    internal_policies: usize,
    simulated_event_codes: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(summarize(&blueprint)),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

fn summarize(blueprint: &FifoSyncBlueprint) -> ConfigSummary {
    let count = |f: fn(TimeStampPolicy) -> bool| {
        blueprint
            .channels
            .iter()
            .filter(|c| f(c.to_channel_config().effective_policy()))
            .count()
    };

    ConfigSummary {
        version: format!("{:?}", blueprint.version),
        channel_count: blueprint.channels.len(),
        synced_policies: count(TimeStampPolicy::uses_delay_model),
        internal_policies: count(|p| p == TimeStampPolicy::Internal),
        simulated_event_codes: blueprint
            .simulation
            .as_ref()
            .map_or(0, |sim| sim.events.len()),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &FifoSyncBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.channels.is_empty() {
        warnings.push("No channels configured".to_string());
    }

    if blueprint.simulation.is_none() {
        warnings.push("No [simulation] section - `simulate` will refuse to run".to_string());
    }

    for channel in &blueprint.channels {
        if channel.free_run && channel.policy != TimeStampPolicy::TimeOfDay {
            warnings.push(format!(
                "Channel '{}' is free-running; policy {} is ignored",
                channel.name, channel.policy
            ));
        }
        // The backward search cannot reach past the FIFO depth
        if let (Some(sim), Some(delay)) = (&blueprint.simulation, channel.expected_delay_s()) {
            let span_s = sim.fifo_depth as f64 / contracts::FIDUCIAL_RATE_HZ;
            if channel.policy.uses_delay_model() && delay > span_s {
                warnings.push(format!(
                    "Channel '{}' expects {:.1}ms delay but the FIFO only spans {:.1}ms",
                    channel.name,
                    delay * 1e3,
                    span_s * 1e3
                ));
            }
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Channels: {}", summary.channel_count);
            println!("  Delay-model policies: {}", summary.synced_policies);
            println!("  Internal policies: {}", summary.internal_policies);
            println!("  Simulated event codes: {}", summary.simulated_event_codes);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let file = write_config(
            r#"
[[channels]]
name = "CAM1"
event_code = 140
expected_delay_s = 0.5
policy = "synced"

[simulation]
fifo_depth = 8

[[simulation.events]]
event_code = 140
"#,
        );
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        let result = validate_config(&args);
        assert!(result.valid, "error: {:?}", result.error);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("FIFO only spans")));
        let summary = result.summary.unwrap();
        assert_eq!(summary.channel_count, 1);
        assert_eq!(summary.synced_policies, 1);
    }

    #[test]
    fn test_missing_file() {
        let args = ValidateArgs {
            config: "/nonexistent/tsfifo.toml".into(),
            json: false,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
        assert!(run_validate(&args).is_err());
    }
}
