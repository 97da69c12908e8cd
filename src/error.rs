//! Engine Error Types
//!
//! Error taxonomy shared by every component. Per-item failures (one chunk,
//! one venue, one receipt) are counted in the component reports instead of
//! being raised; only these variants cross component boundaries.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Transient transport failure (timeout, connection reset, rate limit).
    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    /// Every configured volume provider failed for a venue.
    #[error("No volume data available for venue {venue}")]
    DataUnavailable { venue: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Only transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Network(_))
    }

    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::InvalidConfig(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
