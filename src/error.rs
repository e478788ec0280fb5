//! Error types for the proctoring core

use thiserror::Error;

/// Errors that can occur while monitoring a session or building its report
#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("Landmark {index} missing from a set of {len} points")]
    MissingLandmark { index: usize, len: usize },

    #[error("Invalid candidate label: {0:?}")]
    InvalidCandidate(String),

    #[error("Session for {0} has already finished")]
    SessionFinished(String),

    #[error("Frame has no timestamp; replay requires timestamped frames")]
    MissingTimestamp,

    #[error("Event store error: {0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
