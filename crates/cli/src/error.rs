//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// `simulate` needs a `[simulation]` section
    #[error("No [simulation] section in {path}")]
    MissingSimulation { path: String },

    /// Channel registration rejected
    #[error("Failed to register channel '{name}': {source}")]
    Registration {
        name: String,
        #[source]
        source: contracts::ContractError,
    },

    /// Invalid command-line override
    #[error("Invalid override --{flag}: {message}")]
    InvalidOverride { flag: &'static str, message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn missing_simulation(path: impl Into<String>) -> Self {
        Self::MissingSimulation { path: path.into() }
    }

    pub fn registration(name: impl Into<String>, source: contracts::ContractError) -> Self {
        Self::Registration {
            name: name.into(),
            source,
        }
    }

    pub fn invalid_override(flag: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidOverride {
            flag,
            message: message.into(),
        }
    }
}
