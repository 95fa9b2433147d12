// src/core/error.rs

use std::time::Duration;
use thiserror::Error;

/// Problems with the submitted URL. Fatal to the request: no probe runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("URL is required")]
    MissingUrl,
    #[error("malformed URL: {0}")]
    Malformed(String),
    #[error("unsupported URL scheme '{0}', expected http or https")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("invalid domain name '{0}'")]
    InvalidDomain(String),
}

/// Ways a probe can fail at the orchestrator boundary.
///
/// These never escape the orchestrator; each one is turned into a
/// `failed = true` [`ProbeResult`](crate::core::models::ProbeResult).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("abandoned: request deadline exceeded")]
    DeadlineExceeded,
    #[error("crashed: {0}")]
    Crashed(String),
}

/// Error returned by the request-level operation.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalyzeError {
    /// True when the caller sent bad input (maps to a client error).
    pub fn is_client_error(&self) -> bool {
        matches!(self, AnalyzeError::Validation(_))
    }
}
