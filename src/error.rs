//! Unified error type for the crawl analytics core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    // =========================================================================
    // === Stream / schema errors
    // =========================================================================
    #[error("Cannot cast value '{value}' of field '{field}' to {expected}")]
    Cast {
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error("Row has {found} columns, stream '{stream}' expects at least {expected}")]
    MissingColumn {
        stream: String,
        expected: usize,
        found: usize,
    },

    #[error("Unknown field '{field}' in stream '{stream}'")]
    UnknownStreamField { stream: String, field: String },

    // =========================================================================
    // === Query errors
    // =========================================================================
    /// Filter structure is neither a leaf nor a boolean node.
    #[error("Filter not well formatted: {0}")]
    MalformedFilter(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Table '{0}' not found in store")]
    MissingTable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // === External error wrappers
    // =========================================================================
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sink error: {0}")]
    Sink(#[from] crate::sinks::SinkError),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
