//! Blueprint parsing.
//!
//! TOML is the primary format; JSON is accepted for generated configs.
//! Channel names and owners are trimmed on the way in so the validator and
//! the channel registry key on the same text.

use std::path::Path;

use contracts::{ContractError, FifoSyncBlueprint};

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Format for a file extension, case-insensitive
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("toml") {
            Some(Self::Toml)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else {
            None
        }
    }

    /// Format of a config file, from its extension
    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse(format!(
                "cannot determine config format of {}",
                path.display()
            ))
        })?;
        Self::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn label(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

pub fn parse_toml(content: &str) -> Result<FifoSyncBlueprint, ContractError> {
    toml::from_str(content)
        .map(normalize)
        .map_err(|e| syntax_error(ConfigFormat::Toml, e))
}

pub fn parse_json(content: &str) -> Result<FifoSyncBlueprint, ContractError> {
    serde_json::from_str(content)
        .map(normalize)
        .map_err(|e| syntax_error(ConfigFormat::Json, e))
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<FifoSyncBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

fn syntax_error<E>(format: ConfigFormat, err: E) -> ContractError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ContractError::ConfigParse {
        message: format!("{} parse error: {err}", format.label()),
        source: Some(Box::new(err)),
    }
}

/// Trim channel names; a blank owner falls back to the channel name.
fn normalize(mut blueprint: FifoSyncBlueprint) -> FifoSyncBlueprint {
    for channel in &mut blueprint.channels {
        channel.name = channel.name.trim().to_string();
        channel.owner = channel
            .owner
            .take()
            .map(|owner| owner.trim().to_string())
            .filter(|owner| !owner.is_empty());
    }
    blueprint
}
