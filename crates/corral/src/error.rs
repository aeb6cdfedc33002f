// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error kinds shared across the HTTP and WebSocket transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Validation,
    ResourceExhausted,
    ToolFailure,
    Timeout,
    Unsupported,
    Internal,
}

impl ErrorKind {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::InvalidState => 400,
            Self::Validation => 400,
            Self::ResourceExhausted => 500,
            Self::ToolFailure => 500,
            Self::Timeout => 504,
            Self::Unsupported => 400,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidState => "INVALID_STATE",
            Self::Validation => "VALIDATION",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::ToolFailure => "TOOL_FAILURE",
            Self::Timeout => "TIMEOUT",
            Self::Unsupported => "UNSUPPORTED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed error carried across component boundaries.
///
/// Adapters attach the vendor serial to the message; the transport layer maps
/// the kind to an HTTP status or a WebSocket `error` message.
#[derive(Debug, Clone)]
pub struct LabError {
    pub kind: ErrorKind,
    pub message: String,
}

impl LabError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, message)
    }

    pub fn tool(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolFailure, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Whether this error signals local resource exhaustion (used by the
    /// mirror pump to shed load).
    pub fn is_exhaustion(&self) -> bool {
        matches!(self.kind, ErrorKind::ResourceExhausted | ErrorKind::Timeout)
            || self.message.contains("resource temporarily unavailable")
    }
}

impl fmt::Display for LabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for LabError {}

impl From<std::io::Error> for LabError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::tool(format!("tool not found: {e}")),
            std::io::ErrorKind::WouldBlock => {
                Self::exhausted(format!("resource temporarily unavailable: {e}"))
            }
            _ => Self::internal(e.to_string()),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LabError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
