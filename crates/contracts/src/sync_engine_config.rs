//! Sync engine configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Tuning shared by every channel of one engine instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Delay-model thresholds
    #[serde(default)]
    #[validate(nested)]
    pub sync: SyncThresholds,

    /// Internal correlator tuning
    #[serde(default)]
    #[validate(nested)]
    pub correlator: CorrelatorConfig,
}

/// Thresholds of the acceptance test, cadence fallback and backward search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SyncThresholds {
    /// Direct-hit acceptance band
    pub band: AcceptanceBand,

    /// Looser band for the cadence-consistency fallback: early tolerance (ms)
    #[validate(range(min = 0.0))]
    pub cadence_early_ms: f64,

    /// Looser band for the cadence-consistency fallback: late tolerance (ms)
    #[validate(range(min = 0.0))]
    pub cadence_late_ms: f64,

    /// Entries older than expected by more than this are re-fetched (ms)
    #[validate(range(exclusive_min = 0.0))]
    pub stale_ms: f64,

    /// Backward search stops once the diff passes this limit (ms)
    #[validate(range(exclusive_min = 0.0))]
    pub backtrack_limit_ms: f64,

    /// Direct hits required before a cadence match is trusted
    pub min_sync_count: u32,
}

impl Default for SyncThresholds {
    fn default() -> Self {
        Self {
            band: AcceptanceBand::default(),
            cadence_early_ms: 2.0,
            cadence_late_ms: 15.0,
            stale_ms: 60.0,
            backtrack_limit_ms: 30.0,
            min_sync_count: 1,
        }
    }
}

/// Window around the expected delay inside which an entry is accepted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AcceptanceBand {
    /// Fixed tolerances in milliseconds
    Fixed { early_ms: f64, late_ms: f64 },
    /// Tolerances scaled with the expected delay, never tighter than `floor_ms`
    Proportional {
        early_fraction: f64,
        late_fraction: f64,
        #[serde(default)]
        floor_ms: f64,
    },
}

impl Default for AcceptanceBand {
    fn default() -> Self {
        Self::Fixed {
            early_ms: 2.0,
            late_ms: 7.0,
        }
    }
}

impl AcceptanceBand {
    /// `(lower, upper)` bounds on `diff_vs_expected`, in seconds.
    pub fn bounds(&self, expected_delay_s: f64) -> (f64, f64) {
        match *self {
            Self::Fixed { early_ms, late_ms } => (-early_ms / 1e3, late_ms / 1e3),
            Self::Proportional {
                early_fraction,
                late_fraction,
                floor_ms,
            } => {
                let delay = expected_delay_s.abs();
                let floor = floor_ms / 1e3;
                (
                    -(early_fraction * delay).max(floor),
                    (late_fraction * delay).max(floor),
                )
            }
        }
    }

    /// Whether `diff_s` lies strictly inside the band.
    #[inline]
    pub fn contains(&self, diff_s: f64, expected_delay_s: f64) -> bool {
        let (lower, upper) = self.bounds(expected_delay_s);
        diff_s > lower && diff_s < upper
    }

    /// Largest late tolerance for the given delay (ms); used by validation.
    pub fn late_ms(&self, expected_delay_s: f64) -> f64 {
        self.bounds(expected_delay_s).1 * 1e3
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        match *self {
            Self::Fixed { early_ms, late_ms } => early_ms >= 0.0 && late_ms > 0.0,
            Self::Proportional {
                early_fraction,
                late_fraction,
                floor_ms,
            } => early_fraction >= 0.0 && late_fraction > 0.0 && floor_ms >= 0.0,
        }
    }
}

/// Internal correlator tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Match tolerance between predicted and FIFO time (ms)
    #[validate(range(exclusive_min = 0.0))]
    pub tolerance_ms: f64,

    /// Maximum cursor steps per request
    #[validate(range(min = 1))]
    pub step_budget: u32,

    /// Largest plausible forward jump of the external reference (s)
    #[validate(range(exclusive_min = 0.0))]
    pub max_reference_jump_s: f64,

    /// Weight of the newest error in the running average (0, 1]
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub average_weight: f64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            tolerance_ms: 3.0,
            step_budget: 8,
            max_reference_jump_s: 2.0,
            average_weight: 0.125,
        }
    }
}

impl SyncThresholds {
    /// Cross-field sanity: band well formed, stale/backtrack limits beyond the late edge.
    pub fn check(&self) -> Result<(), String> {
        if !self.band.is_well_formed() {
            return Err(format!("acceptance band not well formed: {:?}", self.band));
        }
        let late_ms = self.band.late_ms(0.0);
        if self.stale_ms <= late_ms {
            return Err(format!(
                "stale_ms ({}) must exceed the late tolerance ({late_ms})",
                self.stale_ms
            ));
        }
        if self.backtrack_limit_ms <= late_ms {
            return Err(format!(
                "backtrack_limit_ms ({}) must exceed the late tolerance ({late_ms})",
                self.backtrack_limit_ms
            ));
        }
        Ok(())
    }
}
