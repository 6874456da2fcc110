//! Centralized error handling for notecell
//!
//! This module provides a unified error type covering the failure paths of
//! the cell subsystem: markdown conversion, data-URI decoding, and persisted
//! JSON handling. Per the subsystem's contract, none of these are fatal to
//! the host — callers degrade to partial/best-effort rendering.

use log::warn;
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Custom Result Type Alias
// ─────────────────────────────────────────────────────────────────────────────

/// A specialized `Result` type for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The centralized error type for the crate.
#[derive(Debug)]
pub enum Error {
    /// The markdown engine reported a conversion failure.
    Markdown { message: String },

    /// A data URI could not be parsed into a MIME type and base64 payload.
    DataUri { message: String },

    /// Failed to encode or decode persisted cell JSON.
    Json(serde_json::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Markdown { message } => write!(f, "Markdown conversion failed: {}", message),
            Error::DataUri { message } => write!(f, "Invalid data URI: {}", message),
            Error::Json(err) => write!(f, "Invalid cell JSON: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Json(err) => Some(err),
            Error::Markdown { .. } | Error::DataUri { .. } => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Graceful Degradation Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Extension trait for Result to support graceful degradation.
pub trait ResultExt<T> {
    /// If the result is an error, log it at warning level and return the provided default.
    fn unwrap_or_warn_default(self, default: T, context: &str) -> T;
}

impl<T> ResultExt<T> for Result<T> {
    fn unwrap_or_warn_default(self, default: T, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                warn!("{}: {}. Using default.", context, err);
                default
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
