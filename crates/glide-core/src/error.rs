//! Error types for glide-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value is out of its accepted range
    #[error("Invalid config value for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// A RON configuration document could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    /// A configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an InvalidConfig error
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
