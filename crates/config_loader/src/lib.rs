//! # Config Loader
//!
//! 配置加载：读取 TOML/JSON，解析为 `FifoSyncBlueprint` 并校验。
//!
//! 负责：
//! - 按扩展名识别格式
//! - 解析并规范化通道名
//! - 字段级与跨字段校验（阈值自洽、延迟、模拟事件覆盖）
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("tsfifo.toml")).unwrap();
//! println!("Channels: {}", blueprint.channels.len());
//! ```

mod parser;
mod validator;

pub use contracts::FifoSyncBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate a config file; the format follows the extension.
    ///
    /// # Errors
    /// Unknown extension, I/O failure, parse or validation failure.
    pub fn load_from_path(path: &Path) -> Result<FifoSyncBlueprint, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let blueprint = Self::load_from_str(&content, format)?;
        debug!(
            path = %path.display(),
            ?format,
            channels = blueprint.channels.len(),
            simulation = blueprint.simulation.is_some(),
            "config loaded"
        );
        Ok(blueprint)
    }

    /// # Errors
    /// Parse or validation failure.
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<FifoSyncBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Render a blueprint back into `format`
    pub fn serialize(
        blueprint: &FifoSyncBlueprint,
        format: ConfigFormat,
    ) -> Result<String, ContractError> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(blueprint)
                .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}"))),
            ConfigFormat::Json => serde_json::to_string_pretty(blueprint)
                .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}"))),
        }
    }

    pub fn to_toml(blueprint: &FifoSyncBlueprint) -> Result<String, ContractError> {
        Self::serialize(blueprint, ConfigFormat::Toml)
    }

    pub fn to_json(blueprint: &FifoSyncBlueprint) -> Result<String, ContractError> {
        Self::serialize(blueprint, ConfigFormat::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
[engine.sync]
stale_ms = 80.0

[engine.correlator]
tolerance_ms = 2.0

[[channels]]
name = "CAM1"
owner = "CAM1:TSS"
event_code = 140
expected_delay_s = 0.012
policy = "synced"

[[channels]]
name = "BPM"
event_code = 40
delay_fiducials = 1.0
policy = "internal"

[simulation]
fifo_depth = 16
pickup_jitter_ms = 0.3
seed = 42

[[simulation.events]]
event_code = 140
divisor = 3

[[simulation.events]]
event_code = 40
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.channels.len(), 2);
        assert_eq!(bp.channels[0].owner(), "CAM1:TSS");
        assert_eq!(bp.engine.sync.stale_ms, 80.0);
        assert_eq!(bp.engine.sync.backtrack_limit_ms, 30.0);
        assert_eq!(bp.engine.correlator.tolerance_ms, 2.0);
        assert_eq!(bp.engine.correlator.step_budget, 8);
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.engine, bp2.engine);
        assert_eq!(bp.channels.len(), bp2.channels.len());
        assert_eq!(bp.channels[1].name, bp2.channels[1].name);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.channels[0].event_code, bp2.channels[0].event_code);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[[channels]]
name = "CAM1"
event_code = 140
expected_delay_s = 0.012

[[channels]]
name = "CAM1"
event_code = 141
expected_delay_s = 0.012
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(MINIMAL_TOML.as_bytes()).unwrap();
        let bp = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(bp.channels[1].name, "BPM");

        let unknown = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(unknown.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }
}
