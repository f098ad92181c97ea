// src/error.rs

//! Unified error handling for the harvester.
//!
//! Fetch failures (rate limits, auth rejections, network hiccups) are not
//! errors here: they travel as [`FetchOutcome`](crate::services::FetchOutcome)
//! values so retry policy can match on them. `AppError` covers everything
//! that stops an operation outright.

use std::fmt;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built or a request could not be sent
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Header name or value rejected by the HTTP layer
    #[error("Invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A page or event body lacked the fields the parser expects
    #[error("Malformed page {context}: {message}")]
    MalformedPage { context: String, message: String },

    /// Checkpoint payload failed its checksum or could not be decoded
    #[error("Checkpoint corrupt: {0}")]
    CheckpointCorrupt(String),

    /// Persisting state failed even after retries
    #[error("Storage failure after {attempts} attempt(s): {message}")]
    Storage { attempts: u32, message: String },

    /// The output guard refused to overwrite a previous artifact
    #[error(
        "Output guard tripped: {previous_count} -> {current_count} entities ({drop_percent:.1}% drop > {threshold_percent}%)"
    )]
    OutputGuardTripped {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
        threshold_percent: u8,
    },
}

impl AppError {
    /// Create a header error.
    pub fn header(name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a malformed-page error with context.
    pub fn malformed(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::MalformedPage {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a corrupt-checkpoint error.
    pub fn corrupt(message: impl fmt::Display) -> Self {
        Self::CheckpointCorrupt(message.to_string())
    }

    /// Create a storage error after `attempts` tries.
    pub fn storage(attempts: u32, message: impl fmt::Display) -> Self {
        Self::Storage {
            attempts,
            message: message.to_string(),
        }
    }
}
