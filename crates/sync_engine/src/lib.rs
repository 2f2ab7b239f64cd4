//! # Sync Engine
//!
//! 时间戳 FIFO 同步引擎。
//!
//! 负责：
//! - 按期望延迟在事件 FIFO 中定位对应条目（直接命中 / 节拍一致 / 向后回溯）
//! - 维护每个通道的同步状态与统计
//! - 内部相关器：锁定外部参考时钟
//! - 按策略输出时间戳，并管理通道注册表
//!
//! ## 使用示例
//!
//! ```ignore
//! use sync_engine::ChannelRegistry;
//!
//! let registry = ChannelRegistry::new(driver, clock, EngineConfig::default());
//! registry.process("CAM1", "CAM1:TSS", &ChannelConfig::new(140, 0.012, TimeStampPolicy::Best))?;
//!
//! let channel = registry.lookup("CAM1").unwrap();
//! let ts = channel.timestamp_or_fallback(&TimeStampRequest::at(clock.now_ticks()));
//! ```

mod channel;
mod correlator;
mod cursor;
mod engine;
mod policy;
mod registry;
mod stats;

pub use channel::TimeStampChannel;
pub use correlator::InternalCorrelator;
pub use cursor::{FifoCursor, Fetched};
pub use engine::{CycleOutcome, SyncEngine, SyncKind, SyncState};
pub use policy::{resolve, RequestContext};
pub use registry::ChannelRegistry;
pub use stats::DiffStats;

// Pulse arithmetic lives with the contracts
pub use contracts::{pulse_diff, PulseId, PULSE_ID_INVALID, PULSE_ID_MODULUS};
