//! Configuration error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(toml::ser::Error),

    #[error("XDG directory error: {0}")]
    XdgError(String),
}
