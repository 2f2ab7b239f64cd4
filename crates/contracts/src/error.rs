//! Layered error definitions
//!
//! Categorized by source: config / registry / fifo driver / sync

use thiserror::Error;

use crate::{EventCode, TimeStamp};

/// Unified error type for configuration and channel registration
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Registry Errors =====
    /// Channel name is empty or not yet known
    #[error("channel name unavailable: '{name}'")]
    ChannelNameUnavailable { name: String },

    /// Channel already registered to another owner
    #[error("channel '{name}' already registered to '{owner}', rejected for '{requested_by}'")]
    ChannelOwnerConflict {
        name: String,
        owner: String,
        requested_by: String,
    },

    /// Channel not found
    #[error("channel not found: {name}")]
    ChannelNotFound { name: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create channel-not-found error
    pub fn channel_not_found(name: impl Into<String>) -> Self {
        Self::ChannelNotFound { name: name.into() }
    }
}

/// Failure modes of a single FIFO read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FifoReadError {
    /// The driver does not know this event code
    #[error("unknown event code {0}")]
    UnknownEventCode(u32),

    /// Nothing recorded for the event code
    #[error("no FIFO entries for event code {0}")]
    Empty(EventCode),

    /// Cursor already at the newest (forward) or oldest (backward) entry
    #[error("FIFO cursor at boundary for event code {0}")]
    AtBoundary(EventCode),

    /// No fiducial seen by the driver yet
    #[error("no fiducial received")]
    NoFiducial,
}

/// Sync failures; all are recoverable and leave the channel unsynced
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// No entries for the event code
    #[error("FIFO empty for event code {event_code}")]
    FifoEmpty { event_code: EventCode },

    /// Backward search ran out of entries
    #[error("FIFO exhausted after {steps} backward steps")]
    CursorExhausted { steps: u32 },

    /// Backward search passed the plausible window without a match
    #[error("backward search overshot after {steps} steps (diff {diff_ms:.3}ms)")]
    SearchOvershoot { steps: u32, diff_ms: f64 },

    /// Event code missing, non-positive or unknown to the driver
    #[error("invalid event code {code}")]
    InvalidEventCode { code: i64 },

    /// Timing configuration changed since the previous cycle
    #[error("generation changed {prior} -> {current}")]
    GenerationMismatch { prior: u32, current: u32 },

    /// Selected entry older than the staleness limit
    #[error("stale FIFO entry: diff {diff_ms:.3}ms")]
    StaleEntry { diff_ms: f64 },

    /// Internal correlator reference regressed, jumped, or no match was found
    #[error("external reference invalid: {reason}")]
    ExternalReferenceInvalid { reason: String },

    /// Strict policy refused an unsynced result
    #[error("channel unsynced")]
    Unsynced,
}

impl SyncError {
    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            SyncError::FifoEmpty { .. } => "fifo_empty",
            SyncError::CursorExhausted { .. } => "cursor_exhausted",
            SyncError::SearchOvershoot { .. } => "search_overshoot",
            SyncError::InvalidEventCode { .. } => "invalid_event_code",
            SyncError::GenerationMismatch { .. } => "generation_mismatch",
            SyncError::StaleEntry { .. } => "stale_entry",
            SyncError::ExternalReferenceInvalid { .. } => "external_reference_invalid",
            SyncError::Unsynced => "unsynced",
        }
    }

    /// Map a driver failure on a read for `event_code`.
    ///
    /// Stepping off either end of a non-empty queue is an exhausted cursor,
    /// not an empty FIFO.
    pub fn from_read(err: FifoReadError, event_code: EventCode) -> Self {
        match err {
            FifoReadError::UnknownEventCode(code) => SyncError::InvalidEventCode {
                code: code as i64,
            },
            FifoReadError::AtBoundary(_) => SyncError::CursorExhausted { steps: 0 },
            FifoReadError::Empty(_) | FifoReadError::NoFiducial => {
                SyncError::FifoEmpty { event_code }
            }
        }
    }
}

/// Failed timestamp request: the cause plus a best-effort fallback stamp
/// (wall clock with INVALID pulse id).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct TimeStampFailure {
    #[source]
    pub error: SyncError,
    pub fallback: TimeStamp,
}
