//! Bounded per-event-code FIFO implementing [`FifoDriver`].
//!
//! Every event code owns a `HeapRb` of fixed depth; a push into a full queue
//! overwrites the oldest entry. Entries are addressed by a monotonically
//! increasing sequence number, which is what the opaque cursor stores.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::{
    CursorIndex, EventCode, FifoDriver, FifoEntry, FifoReadError, FifoStep, PulseId, TimeStamp,
};
use ringbuf::{traits::*, HeapRb};

struct EventQueue {
    ring: HeapRb<FifoEntry>,
    /// Sequence number the next pushed entry will get
    next_seq: u64,
    overwritten: u64,
}

impl EventQueue {
    fn new(depth: usize) -> Self {
        Self {
            ring: HeapRb::new(depth),
            next_seq: 0,
            overwritten: 0,
        }
    }

    fn push(&mut self, entry: FifoEntry) {
        if self.ring.is_full() {
            self.overwritten += 1;
        }
        let _ = self.ring.push_overwrite(entry);
        self.next_seq += 1;
    }

    fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    /// `(oldest, newest)` sequence numbers, `None` when empty
    fn seq_range(&self) -> Option<(u64, u64)> {
        let len = self.len() as u64;
        (len > 0).then(|| (self.next_seq - len, self.next_seq - 1))
    }

    fn get(&self, seq: u64) -> Option<FifoEntry> {
        let (oldest, newest) = self.seq_range()?;
        if seq < oldest || seq > newest {
            return None;
        }
        self.ring.iter().nth((seq - oldest) as usize).copied()
    }
}

struct SimFifoState {
    queues: HashMap<EventCode, EventQueue>,
    last_fiducial: PulseId,
    last_fiducial_time: Option<TimeStamp>,
}

/// Synthetic event FIFO
pub struct SimFifo {
    depth: usize,
    state: Mutex<SimFifoState>,
}

impl fmt::Debug for SimFifo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SimFifo")
            .field("depth", &self.depth)
            .field("event_codes", &state.queues.len())
            .field("last_fiducial", &state.last_fiducial)
            .finish()
    }
}

impl SimFifo {
    /// Create an empty FIFO with `depth` slots per event code
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            state: Mutex::new(SimFifoState {
                queues: HashMap::new(),
                last_fiducial: PulseId::INVALID,
                last_fiducial_time: None,
            }),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn lock(&self) -> MutexGuard<'_, SimFifoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `code` known to the driver without recording anything
    pub fn enable(&self, code: EventCode) {
        let depth = self.depth;
        self.lock()
            .queues
            .entry(code)
            .or_insert_with(|| EventQueue::new(depth));
    }

    /// Record one event
    pub fn push(&self, code: EventCode, entry: FifoEntry) {
        let depth = self.depth;
        self.lock()
            .queues
            .entry(code)
            .or_insert_with(|| EventQueue::new(depth))
            .push(entry);
    }

    /// Record a fiducial
    pub fn set_last_fiducial(&self, pulse_id: PulseId, timestamp: TimeStamp) {
        let mut state = self.lock();
        state.last_fiducial = pulse_id;
        state.last_fiducial_time = Some(timestamp);
    }

    /// Entries currently queued for `code`
    pub fn len(&self, code: EventCode) -> usize {
        self.lock().queues.get(&code).map_or(0, EventQueue::len)
    }

    /// Entries lost to overwrite for `code`
    pub fn overwritten(&self, code: EventCode) -> u64 {
        self.lock().queues.get(&code).map_or(0, |q| q.overwritten)
    }

    /// Drop every queued entry for `code`
    pub fn clear(&self, code: EventCode) {
        if let Some(queue) = self.lock().queues.get_mut(&code) {
            queue.ring.clear();
        }
    }
}

impl FifoDriver for SimFifo {
    fn read(
        &self,
        event_code: EventCode,
        cursor: &mut CursorIndex,
        step: FifoStep,
    ) -> Result<FifoEntry, FifoReadError> {
        let state = self.lock();
        let queue = state
            .queues
            .get(&event_code)
            .ok_or(FifoReadError::UnknownEventCode(event_code.get()))?;
        let (oldest, newest) = queue.seq_range().ok_or(FifoReadError::Empty(event_code))?;

        let seq = match step {
            FifoStep::Reset => Some(newest),
            FifoStep::Forward => cursor.0.checked_add(1),
            FifoStep::Backward => cursor.0.checked_sub(1),
        }
        .filter(|seq| (oldest..=newest).contains(seq))
        .ok_or(FifoReadError::AtBoundary(event_code))?;

        let entry = queue
            .get(seq)
            .ok_or(FifoReadError::AtBoundary(event_code))?;
        cursor.0 = seq;
        Ok(entry)
    }

    fn last_fiducial(&self) -> PulseId {
        self.lock().last_fiducial
    }

    fn fiducial_timestamp(&self) -> Result<TimeStamp, FifoReadError> {
        let state = self.lock();
        state
            .last_fiducial_time
            .map(|ts| ts.with_pulse_id(state.last_fiducial))
            .ok_or(FifoReadError::NoFiducial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: i64) -> EventCode {
        EventCode::from_raw(raw).unwrap()
    }

    fn entry(pulse: u32) -> FifoEntry {
        FifoEntry {
            pulse_id: PulseId::new(pulse),
            timestamp: TimeStamp::new(100, 0).with_pulse_id(PulseId::new(pulse)),
            capture_tick: pulse as u64 * 1000,
        }
    }

    #[test]
    fn test_unknown_and_empty() {
        let fifo = SimFifo::new(4);
        let mut cursor = CursorIndex::default();
        assert_eq!(
            fifo.read(code(40), &mut cursor, FifoStep::Reset),
            Err(FifoReadError::UnknownEventCode(40))
        );
        fifo.enable(code(40));
        assert_eq!(
            fifo.read(code(40), &mut cursor, FifoStep::Reset),
            Err(FifoReadError::Empty(code(40)))
        );
    }

    #[test]
    fn test_reset_forward_backward() {
        let fifo = SimFifo::new(4);
        for p in 1..=3 {
            fifo.push(code(40), entry(p));
        }
        let mut cursor = CursorIndex::default();
        assert_eq!(fifo.read(code(40), &mut cursor, FifoStep::Reset).unwrap(), entry(3));
        assert_eq!(
            fifo.read(code(40), &mut cursor, FifoStep::Forward),
            Err(FifoReadError::AtBoundary(code(40)))
        );
        assert_eq!(fifo.read(code(40), &mut cursor, FifoStep::Backward).unwrap(), entry(2));
        fifo.push(code(40), entry(4));
        assert_eq!(fifo.read(code(40), &mut cursor, FifoStep::Forward).unwrap(), entry(3));
        assert_eq!(fifo.read(code(40), &mut cursor, FifoStep::Forward).unwrap(), entry(4));
    }

    #[test]
    fn test_overwrite_moves_oldest_boundary() {
        let fifo = SimFifo::new(3);
        for p in 1..=5 {
            fifo.push(code(40), entry(p));
        }
        assert_eq!(fifo.len(code(40)), 3);
        assert_eq!(fifo.overwritten(code(40)), 2);

        let mut cursor = CursorIndex::default();
        fifo.read(code(40), &mut cursor, FifoStep::Reset).unwrap();
        assert_eq!(fifo.read(code(40), &mut cursor, FifoStep::Backward).unwrap(), entry(4));
        assert_eq!(fifo.read(code(40), &mut cursor, FifoStep::Backward).unwrap(), entry(3));
        assert_eq!(
            fifo.read(code(40), &mut cursor, FifoStep::Backward),
            Err(FifoReadError::AtBoundary(code(40)))
        );
    }

    #[test]
    fn test_cursor_untouched_on_failure() {
        let fifo = SimFifo::new(2);
        fifo.push(code(9), entry(1));
        let mut cursor = CursorIndex::default();
        fifo.read(code(9), &mut cursor, FifoStep::Reset).unwrap();
        let before = cursor;
        assert!(fifo.read(code(9), &mut cursor, FifoStep::Backward).is_err());
        assert_eq!(cursor, before);
    }

    #[test]
    fn test_latest_does_not_need_cursor() {
        let fifo = SimFifo::new(4);
        fifo.push(code(40), entry(10));
        fifo.push(code(40), entry(11));
        assert_eq!(fifo.latest(code(40)).unwrap(), entry(11));
    }
}
