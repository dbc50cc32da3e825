// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Ferry bridge.

use thiserror::Error;

/// The primary error type used across all Ferry crates.
#[derive(Debug, Error)]
pub enum FerryError {
    /// Configuration errors (missing required fields, invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database open, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Chat platform errors (REST call failure, bad payload, rate limiting).
    #[error("chat platform error: {message}")]
    Chat {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// AI backend sub-process errors (spawn failure, RPC error, stream loss).
    #[error("backend error: {message}")]
    Backend {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Relevance classifier errors. Callers treat these as "no response".
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// A turn is already in flight for this chat. Not retried, not queued.
    #[error("chat is already processing a request")]
    Busy,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FerryError {
    /// Shorthand for a chat platform error without an underlying source.
    pub fn chat(message: impl Into<String>) -> Self {
        FerryError::Chat {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a backend error without an underlying source.
    pub fn backend(message: impl Into<String>) -> Self {
        FerryError::Backend {
            message: message.into(),
            source: None,
        }
    }
}
