//! 配置校验模块
//!
//! 校验规则：
//! - 字段级约束 (`validator` derive：取值范围、非空)
//! - channel name 唯一
//! - 同步阈值自洽 (接受带、stale、回溯上限)
//! - 每个通道必须给出期望延迟 (秒或 fiducial 数，二选一)
//! - 模拟事件表覆盖所有通道的 event_code

use std::collections::HashSet;

use contracts::{ChannelName, ContractError, FifoSyncBlueprint};
use validator::Validate;

/// 校验 FifoSyncBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &FifoSyncBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_channel_names(blueprint)?;
    validate_thresholds(blueprint)?;
    validate_channel_delays(blueprint)?;
    validate_simulation(blueprint)?;
    Ok(())
}

/// 字段级约束
fn validate_fields(blueprint: &FifoSyncBlueprint) -> Result<(), ContractError> {
    blueprint.validate().map_err(|errors| {
        // Report the first offending path; the full set is in the message
        let field = errors
            .errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "blueprint".to_string());
        ContractError::config_validation(field, errors.to_string())
    })
}

/// 校验 channel name：与注册表相同的命名规则，且唯一
fn validate_channel_names(blueprint: &FifoSyncBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for channel in &blueprint.channels {
        let name = ChannelName::parse(&channel.name).map_err(|e| {
            ContractError::config_validation("channels[].name", e.to_string())
        })?;
        if !seen.insert(name.clone()) {
            return Err(ContractError::config_validation(
                format!("channels[name={name}]"),
                "duplicate channel name",
            ));
        }
    }
    Ok(())
}

/// 校验同步阈值
fn validate_thresholds(blueprint: &FifoSyncBlueprint) -> Result<(), ContractError> {
    blueprint
        .engine
        .sync
        .check()
        .map_err(|message| ContractError::config_validation("engine.sync", message))
}

/// 校验期望延迟
fn validate_channel_delays(blueprint: &FifoSyncBlueprint) -> Result<(), ContractError> {
    for channel in &blueprint.channels {
        match (channel.expected_delay_s, channel.delay_fiducials) {
            (Some(_), Some(_)) => {
                return Err(ContractError::config_validation(
                    format!("channels[{}]", channel.name),
                    "set either expected_delay_s or delay_fiducials, not both",
                ));
            }
            (None, None) if channel.policy.uses_delay_model() && !channel.free_run => {
                return Err(ContractError::config_validation(
                    format!("channels[{}].expected_delay_s", channel.name),
                    format!("policy {} requires an expected delay", channel.policy),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// 校验模拟配置
fn validate_simulation(blueprint: &FifoSyncBlueprint) -> Result<(), ContractError> {
    let Some(sim) = &blueprint.simulation else {
        return Ok(());
    };

    let mut scheduled = HashSet::new();
    for event in &sim.events {
        if event.phase >= event.divisor {
            return Err(ContractError::config_validation(
                format!("simulation.events[event_code={}].phase", event.event_code),
                format!(
                    "phase ({}) must be < divisor ({})",
                    event.phase, event.divisor
                ),
            ));
        }
        if !scheduled.insert(event.event_code) {
            return Err(ContractError::config_validation(
                format!("simulation.events[event_code={}]", event.event_code),
                "duplicate event schedule",
            ));
        }
    }

    for channel in &blueprint.channels {
        if !channel.free_run && !scheduled.contains(&channel.event_code) {
            return Err(ContractError::config_validation(
                format!("channels[{}].event_code", channel.name),
                format!(
                    "event code {} not found in simulation.events",
                    channel.event_code
                ),
            ));
        }
    }

    Ok(())
}
