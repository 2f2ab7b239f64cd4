//! Channel inputs / outputs exchanged with the configuration layer.
//!
//! `ChannelConfig` is written once per processing cycle; `ChannelReport` is
//! read back. `ChannelDump` is the diagnostic snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::{pulses_to_seconds, ChannelName, CorrelatorRequest, TimeStampPolicy};

/// Consumer notification hook: "new state available for this channel".
///
/// Invoked outside the channel lock; repeated calls before the consumer
/// catches up are harmless.
pub type StateCallback = Arc<dyn Fn(&ChannelName) + Send + Sync>;

/// Per-cycle inputs for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Event code to track (ignored if non-positive or out of range)
    pub event_code: i64,
    /// Bumped whenever the timing configuration changes
    pub generation: u32,
    /// Seconds between trigger and timestamp pickup
    pub expected_delay_s: f64,
    /// Timestamp policy selector
    pub policy: TimeStampPolicy,
    /// Forces the time-of-day policy
    pub free_run: bool,
    /// Internal correlator request
    pub correlator_request: CorrelatorRequest,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            event_code: 0,
            generation: 0,
            expected_delay_s: 0.0,
            policy: TimeStampPolicy::MostRecent,
            free_run: false,
            correlator_request: CorrelatorRequest::None,
        }
    }
}

impl ChannelConfig {
    pub fn new(event_code: i64, expected_delay_s: f64, policy: TimeStampPolicy) -> Self {
        Self {
            event_code,
            expected_delay_s,
            policy,
            ..Default::default()
        }
    }

    /// Expected delay given in fiducials rather than seconds
    pub fn with_delay_fiducials(mut self, fiducials: f64) -> Self {
        self.expected_delay_s = pulses_to_seconds(fiducials);
        self
    }

    /// Policy actually applied, free-run taking precedence
    pub fn effective_policy(&self) -> TimeStampPolicy {
        if self.free_run {
            TimeStampPolicy::TimeOfDay
        } else {
            self.policy
        }
    }
}

/// Per-cycle outputs for one channel (milliseconds unless noted)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelReport {
    pub synced: bool,
    pub diff_vs_expected_ms: f64,
    pub min_diff_ms: f64,
    pub max_diff_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    /// Last correlator request serviced
    pub correlator_ack: CorrelatorRequest,
    pub correlator_diff_ms: f64,
    pub correlator_min_ms: f64,
    pub correlator_max_ms: f64,
    pub correlator_avg_ms: f64,
    /// Correlator offset (seconds)
    pub delta_s: f64,
}

/// Diagnostic snapshot of one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDump {
    pub name: ChannelName,
    pub owner: String,
    pub event_code: Option<u32>,
    pub generation: u32,
    pub expected_delay_s: f64,
    pub min_diff_ms: f64,
    pub max_diff_ms: f64,
    pub policy: &'static str,
    pub synced: bool,
}

impl fmt::Display for ChannelDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TimeStamp FIFO channel {} (owner {})", self.name, self.owner)?;
        match self.event_code {
            Some(code) => writeln!(f, "\tEventCode:\t{code}")?,
            None => writeln!(f, "\tEventCode:\tunset")?,
        }
        writeln!(f, "\tGeneration:\t{}", self.generation)?;
        writeln!(f, "\tExpDelay:\t{:.3e}s", self.expected_delay_s)?;
        writeln!(
            f,
            "\tDiffVsExp:\tmin {:.3}ms, max {:.3}ms",
            self.min_diff_ms, self.max_diff_ms
        )?;
        writeln!(f, "\tTS Policy:\t{}", self.policy)?;
        write!(
            f,
            "\tSync Status:\t{}",
            if self.synced { "Synced" } else { "Unsynced" }
        )
    }
}
