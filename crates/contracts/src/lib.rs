//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the timestamp FIFO
//! workspace. Business crates depend on this crate only, never on each other
//! for types.
//!
//! ## Time Model
//! - Fiducials arrive at a fixed [`FIDUCIAL_RATE_HZ`]; each carries a wrapping [`PulseId`]
//! - FIFO entries carry the event [`TimeStamp`] plus the hardware tick count at capture
//! - Delays are expressed in seconds (`f64`); reports in milliseconds

mod blueprint;
mod channel;
mod channel_name;
mod error;
mod fifo;
mod policy;
mod pulse;
mod sync_engine_config;
mod timestamp;

pub use blueprint::*;
pub use channel::*;
pub use channel_name::{ChannelName, PLACEHOLDER_CHANNEL_NAME};
pub use error::*;
pub use fifo::*;
pub use policy::*;
pub use pulse::*;
pub use sync_engine_config::*;
pub use timestamp::*;
