//! FIFO driver contract - hardware event FIFO abstraction
//!
//! The event-timing driver records every trigger into a per-event-code FIFO.
//! The sync engine only consumes it through [`FifoDriver`]; real hardware and
//! the synthetic pulse train implement the same trait.
//!
//! # Example
//!
//! ```ignore
//! let mut cursor = CursorIndex::default();
//! let newest = driver.read(code, &mut cursor, FifoStep::Reset)?;
//! let older = driver.read(code, &mut cursor, FifoStep::Backward)?;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{FifoReadError, PulseId, TimeStamp};

/// Number of event codes supported by the event receiver.
pub const MAX_EVENT_CODES: u32 = 256;

/// Physical trigger identifier, valid range `1..MAX_EVENT_CODES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct EventCode(u8);

impl EventCode {
    /// Accept a raw configuration value; non-positive or out-of-range codes yield `None`.
    pub fn from_raw(raw: i64) -> Option<Self> {
        if raw > 0 && raw < MAX_EVENT_CODES as i64 {
            Some(Self(raw as u8))
        } else {
            None
        }
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0 as u32
    }
}

impl TryFrom<u32> for EventCode {
    type Error = String;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::from_raw(raw as i64)
            .ok_or_else(|| format!("event code {raw} outside 1..{MAX_EVENT_CODES}"))
    }
}

impl From<EventCode> for u32 {
    fn from(code: EventCode) -> Self {
        code.get()
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cursor movement for one FIFO read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FifoStep {
    /// Fetch the most recent entry and rebase the cursor on it
    Reset,
    /// Advance one slot towards newer entries
    Forward,
    /// Retreat one slot towards older entries
    Backward,
}

/// Opaque FIFO read position carried between requests.
///
/// Only the driver interprets the value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorIndex(pub u64);

/// One FIFO entry as captured by the event receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoEntry {
    /// Pulse id of the fiducial the event fired on
    pub pulse_id: PulseId,
    /// Event time stamp (pulse id embedded in the low `nsec` bits)
    pub timestamp: TimeStamp,
    /// Hardware tick count latched at capture time
    pub capture_tick: u64,
}

/// Hardware event FIFO.
///
/// Implementations must be safe to share between the polling threads of
/// independent channels.
pub trait FifoDriver: Send + Sync {
    /// Read one entry for `event_code`, moving `cursor` according to `step`.
    ///
    /// `cursor` is only updated on success.
    ///
    /// # Errors
    /// - [`FifoReadError::UnknownEventCode`]
    /// - [`FifoReadError::Empty`] when nothing was recorded for the code
    /// - [`FifoReadError::AtBoundary`] when stepping past the newest or oldest entry
    fn read(
        &self,
        event_code: EventCode,
        cursor: &mut CursorIndex,
        step: FifoStep,
    ) -> Result<FifoEntry, FifoReadError>;

    /// Most recent fiducial pulse id seen by the driver.
    fn last_fiducial(&self) -> PulseId;

    /// Time stamp of the most recent fiducial.
    fn fiducial_timestamp(&self) -> Result<TimeStamp, FifoReadError>;

    /// Most recent entry for `event_code`, without touching any channel cursor.
    fn latest(&self, event_code: EventCode) -> Result<FifoEntry, FifoReadError> {
        let mut scratch = CursorIndex::default();
        self.read(event_code, &mut scratch, FifoStep::Reset)
    }
}

/// High resolution tick clock plus wall clock.
pub trait TimeSource: Send + Sync {
    /// Current hardware tick count
    fn now_ticks(&self) -> u64;

    /// Convert a tick interval to seconds
    fn ticks_to_seconds(&self, ticks: u64) -> f64;

    /// Current wall-clock time
    fn wall_clock(&self) -> TimeStamp;
}
