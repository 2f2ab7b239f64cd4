//! FifoCursor - per-channel read position over a [`FifoDriver`].
//!
//! Carries the opaque driver index between requests plus the step mode the
//! next primary fetch will use. Any successful read leaves the cursor in
//! `Forward` mode; [`FifoCursor::reset`] puts it back to `Reset`.

use contracts::{CursorIndex, EventCode, FifoDriver, FifoEntry, FifoReadError, FifoStep};
use tracing::trace;

/// A successful primary fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetched {
    pub entry: FifoEntry,
    /// Step actually used (a failed incremental read retries with `Reset`)
    pub step: FifoStep,
}

#[derive(Debug, Clone)]
pub struct FifoCursor {
    index: CursorIndex,
    mode: FifoStep,
    /// Driver reads issued since the last `take_reads`
    reads: u32,
}

impl Default for FifoCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl FifoCursor {
    pub fn new() -> Self {
        Self {
            index: CursorIndex::default(),
            mode: FifoStep::Reset,
            reads: 0,
        }
    }

    /// Step mode of the next primary fetch
    pub fn mode(&self) -> FifoStep {
        self.mode
    }

    pub fn is_reset(&self) -> bool {
        self.mode == FifoStep::Reset
    }

    /// Next primary fetch rebases on the newest entry.
    pub fn reset(&mut self) {
        self.mode = FifoStep::Reset;
    }

    /// Driver reads since the previous call; clears the counter.
    pub fn take_reads(&mut self) -> u32 {
        std::mem::take(&mut self.reads)
    }

    /// Read one entry with an explicit step.
    ///
    /// On success the cursor is left in `Forward` mode. On failure the mode
    /// is untouched; the caller decides whether to reset.
    pub fn step(
        &mut self,
        driver: &dyn FifoDriver,
        event_code: EventCode,
        step: FifoStep,
    ) -> Result<FifoEntry, FifoReadError> {
        self.reads += 1;
        let entry = driver.read(event_code, &mut self.index, step)?;
        self.mode = FifoStep::Forward;
        Ok(entry)
    }

    /// Primary fetch at the current mode.
    ///
    /// A failed incremental read is retried once with `Reset`; if that fails
    /// too the cursor is left in `Reset` mode and the last error is returned.
    pub fn fetch(
        &mut self,
        driver: &dyn FifoDriver,
        event_code: EventCode,
    ) -> Result<Fetched, FifoReadError> {
        let mode = self.mode;
        match self.step(driver, event_code, mode) {
            Ok(entry) => Ok(Fetched { entry, step: mode }),
            Err(err) if mode != FifoStep::Reset => {
                trace!(event_code = %event_code, error = %err, "incremental read failed, retrying with reset");
                self.reset();
                let entry = self.step(driver, event_code, FifoStep::Reset)?;
                Ok(Fetched {
                    entry,
                    step: FifoStep::Reset,
                })
            }
            Err(err) => Err(err),
        }
    }
}
