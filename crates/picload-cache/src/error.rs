//! Cache-related error types

use thiserror::Error;

/// Cache operation errors
///
/// Only construction paths surface these to callers. Failures that happen
/// while serving `put`/`get` are logged inside the tier and turned into a
/// miss or a no-op.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid cache configuration: {message}")]
    Configuration { message: String },

    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    #[error("Failed to load configuration: {message}")]
    Config { message: String },

    #[error("Worker pool error: {message}")]
    Pool { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        CacheError::Configuration {
            message: message.into(),
        }
    }
}

impl From<serde_yaml::Error> for CacheError {
    fn from(err: serde_yaml::Error) -> Self {
        CacheError::Config {
            message: err.to_string(),
        }
    }
}
