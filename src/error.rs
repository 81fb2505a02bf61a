//! Error types for FlowSense

use thiserror::Error;

/// Errors surfaced by the crate's fallible entry points (config loading,
/// event parsing, service handles).
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Failed to parse event: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Flow service is no longer running")]
    ServiceClosed,
}

/// Failures of the remote focus-scoring call. Every variant is recovered
/// locally by the fallback heuristic.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Scoring request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Scoring service returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Malformed scoring response: {0}")]
    MalformedResponse(String),

    #[error("Scoring call timed out after {0} ms")]
    Timeout(u64),

    #[error("Remote scoring is disabled")]
    Offline,
}

/// Failures of the snapshot persistence collaborator. Logged, never retried.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Persistence request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Persistence service returned HTTP {0}")]
    HttpStatus(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode session record: {0}")]
    Encoding(#[from] serde_json::Error),
}
