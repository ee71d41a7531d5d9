//! Error types for configuration loading

use thiserror::Error;

/// Errors that can occur while loading the bridge configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Syntax error at line {line}: expected 'key = value', got '{text}'")]
    Syntax { line: usize, text: String },

    #[error("Missing required setting '{0}'")]
    Missing(&'static str),

    #[error("Invalid value for '{key}': '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("Setting '{0}' must be greater than zero")]
    NonPositive(&'static str),
}
