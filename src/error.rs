// src/error.rs
//! Error type shared by every collector component.
//!
//! Device-not-found is never an error here: correlation misses are `None`.

use std::io;

/// Result type alias using NvmeError
pub type Result<T> = std::result::Result<T, NvmeError>;

#[derive(thiserror::Error, Debug)]
pub enum NvmeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to open NVMe slot {slot}: {reason}")]
    Open { slot: u32, reason: String },

    #[error("NVMe {command} command failed: {reason}")]
    Command {
        command: &'static str,
        reason: String,
    },

    #[error("Malformed {structure} response: expected at least {expected} bytes, got {actual}")]
    Malformed {
        structure: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Inconsistent {structure} response: {reason}")]
    Inconsistent {
        structure: &'static str,
        reason: String,
    },

    #[error("Drive {0} has been closed")]
    Closed(String),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl NvmeError {
    /// Wraps a failed passthrough command.
    pub fn command(command: &'static str, reason: impl ToString) -> Self {
        NvmeError::Command {
            command,
            reason: reason.to_string(),
        }
    }
}
