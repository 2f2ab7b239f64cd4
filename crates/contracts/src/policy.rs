//! Timestamp policy and internal-correlator request codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a channel turns a request into a time stamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeStampPolicy {
    /// Most recent FIFO entry for the event code, no matter how old
    #[default]
    MostRecent,
    /// Synced FIFO stamp or nothing
    Synced,
    /// Synced FIFO stamp if available, else the latest fiducial stamp
    Best,
    /// Current wall clock, FIFO bypassed
    TimeOfDay,
    /// Locked to an external reference by the internal correlator
    Internal,
}

impl TimeStampPolicy {
    /// Decode the selector written by the configuration layer.
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(Self::MostRecent),
            1 => Some(Self::Synced),
            2 => Some(Self::Best),
            3 => Some(Self::TimeOfDay),
            4 => Some(Self::Internal),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MostRecent => "LAST_EC",
            Self::Synced => "SYNCED",
            Self::Best => "BEST",
            Self::TimeOfDay => "TOD",
            Self::Internal => "INTERNAL",
        }
    }

    /// Policies that run the fiducial delay model.
    pub fn uses_delay_model(self) -> bool {
        matches!(self, Self::Synced | Self::Best)
    }
}

impl fmt::Display for TimeStampPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operator request to the internal correlator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelatorRequest {
    #[default]
    None,
    /// Re-anchor the offset on the most recent FIFO entry
    Set,
    /// Move the lock one FIFO slot later
    TweakForward,
    /// Move the lock one FIFO slot earlier
    TweakBackward,
}

impl CorrelatorRequest {
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            1 => Self::Set,
            2 => Self::TweakForward,
            3 => Self::TweakBackward,
            _ => Self::None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Set => 1,
            Self::TweakForward => 2,
            Self::TweakBackward => 3,
        }
    }
}
