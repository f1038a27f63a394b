//! Error types for the evaluation pipeline.
//!
//! `ServiceError` covers failures of external AI services and is defined here
//! so the resilience layer can classify errors for retry decisions without
//! string matching. `PipelineError` is what the orchestrator, batch
//! coordinator and feedback workflow surface to their callers.

use thiserror::Error;

/// Errors returned by an external service call.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The service returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The service returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network or connection error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The response could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The circuit breaker for this dependency is open; no request was made.
    #[error("circuit open for '{dependency}'")]
    CircuitOpen { dependency: String },
}

impl ServiceError {
    /// Returns `true` if the call may succeed when attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::RateLimited { .. }
            | ServiceError::Timeout(_)
            | ServiceError::NetworkError(_) => true,
            ServiceError::ApiError { status, message } => {
                *status >= 500
                    || *status == 429
                    || message.to_lowercase().contains("too many requests")
            }
            ServiceError::AuthenticationFailed(_)
            | ServiceError::InvalidResponse(_)
            | ServiceError::CircuitOpen { .. } => false,
        }
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ServiceError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Errors surfaced by pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A submission, homework or feedback record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The requested transition is not allowed from the record's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The document store failed.
    #[error("storage error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        PipelineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// 404-class error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::NotFound { .. })
    }

    /// 4xx-class error: the caller asked for something the current state forbids.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, PipelineError::Store(_))
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
