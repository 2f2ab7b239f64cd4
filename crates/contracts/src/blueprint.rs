//! FifoSyncBlueprint - Config Loader output
//!
//! Engine tuning, the channel list and an optional synthetic pulse-train
//! description used by the simulator.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{pulses_to_seconds, ChannelConfig, EngineConfig, TimeStampPolicy};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete configuration blueprint
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct FifoSyncBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    /// Engine tuning
    #[serde(default)]
    #[validate(nested)]
    pub engine: EngineConfig,

    /// Timestamp channels
    #[serde(default)]
    #[validate(nested)]
    pub channels: Vec<ChannelBlueprint>,

    /// Synthetic pulse train (simulate command only)
    #[serde(default)]
    #[validate(nested)]
    pub simulation: Option<SimulationConfig>,
}

/// One timestamp channel
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChannelBlueprint {
    /// Unique channel name
    #[validate(length(min = 1))]
    pub name: String,

    /// Registering owner, defaults to the channel name
    #[serde(default)]
    pub owner: Option<String>,

    /// Event code to track
    #[validate(range(min = 1, max = 255))]
    pub event_code: u32,

    /// Expected delay in seconds
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub expected_delay_s: Option<f64>,

    /// Expected delay in fiducials (alternative to `expected_delay_s`)
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub delay_fiducials: Option<f64>,

    #[serde(default)]
    pub policy: TimeStampPolicy,

    #[serde(default)]
    pub free_run: bool,

    #[serde(default)]
    pub generation: u32,
}

impl ChannelBlueprint {
    pub fn owner(&self) -> &str {
        self.owner.as_deref().unwrap_or(&self.name)
    }

    /// Expected delay in seconds, whichever way it was given
    pub fn expected_delay_s(&self) -> Option<f64> {
        self.expected_delay_s
            .or_else(|| self.delay_fiducials.map(pulses_to_seconds))
    }

    /// Initial per-cycle inputs for this channel
    pub fn to_channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            event_code: self.event_code as i64,
            generation: self.generation,
            expected_delay_s: self.expected_delay_s().unwrap_or(0.0),
            policy: self.policy,
            free_run: self.free_run,
            ..Default::default()
        }
    }
}

/// Synthetic fiducial pulse train
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SimulationConfig {
    /// Per-event-code FIFO depth
    #[serde(default = "default_fifo_depth")]
    #[validate(range(min = 1))]
    pub fifo_depth: usize,

    /// Hardware tick rate (Hz)
    #[serde(default = "default_tick_rate_hz")]
    #[validate(range(exclusive_min = 0.0))]
    pub tick_rate_hz: f64,

    /// First pulse id of the train
    #[serde(default)]
    pub start_pulse: u32,

    /// Wall time of the first fiducial (s)
    #[serde(default = "default_start_time_s")]
    #[validate(range(min = 0.0))]
    pub start_time_s: f64,

    /// Uniform pickup jitter added to every poll (ms, ±)
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub pickup_jitter_ms: f64,

    /// Seed for the jitter generator
    #[serde(default)]
    pub seed: u64,

    /// Event schedules
    #[validate(length(min = 1), nested)]
    pub events: Vec<EventScheduleConfig>,
}

/// An event code firing every `divisor` fiducials
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EventScheduleConfig {
    #[validate(range(min = 1, max = 255))]
    pub event_code: u32,

    #[serde(default = "default_divisor")]
    #[validate(range(min = 1))]
    pub divisor: u32,

    /// Fiducial offset within the divisor period
    #[serde(default)]
    pub phase: u32,
}

fn default_fifo_depth() -> usize {
    32
}

fn default_tick_rate_hz() -> f64 {
    1.0e9
}

fn default_start_time_s() -> f64 {
    1_000_000_000.0
}

fn default_divisor() -> u32 {
    1
}
