//! # FIFO Simulator
//!
//! Synthetic stand-in for the event receiver: a bounded per-event-code FIFO,
//! a manually driven tick clock and a fixed-rate fiducial pulse train.
//!
//! Used by the `simulate` command and by tests; real deployments plug their
//! own [`contracts::FifoDriver`] / [`contracts::TimeSource`] instead.
//!
//! ## Example
//!
//! ```ignore
//! use fifo_sim::{EventSchedule, PulseTrain, SimClock, SimFifo};
//!
//! let fifo = Arc::new(SimFifo::new(32));
//! let clock = Arc::new(SimClock::new(1.0e9, 0.0));
//! let mut train = PulseTrain::new(fifo.clone(), clock.clone(), PulseId::new(0));
//! train.add_schedule(EventSchedule::every(code, 1));
//! train.run(360);
//! ```

mod clock;
mod fifo;
mod pickup;
mod train;

pub use clock::SimClock;
pub use fifo::SimFifo;
pub use pickup::{Pickup, PickupScheduler, PollJitter};
pub use train::{EventSchedule, PulseTrain};
