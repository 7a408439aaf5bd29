//! Shared types for the Ensemble orchestration crates.
//!
//! This crate provides the foundational error taxonomy used across all other
//! Ensemble crates:
//! - `EnsembleError`: unified error taxonomy
//! - `Result<T>`: convenience alias

use std::time::Duration;

/// Unified error type for all Ensemble subsystems.
#[derive(Debug, thiserror::Error)]
pub enum EnsembleError {
    // === Caller Errors ===
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // === Selection Errors ===
    #[error("No eligible provider: {reason}")]
    ProviderUnavailable { reason: String },

    #[error("Provider {provider} is unhealthy")]
    Unhealthy { provider: String },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("All {attempted} providers failed")]
    AllProvidersFailed { attempted: usize },

    #[error("Operation cancelled")]
    Cancelled,

    // === Provider Errors ===
    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EnsembleError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EnsembleError::RateLimited { .. }
                | EnsembleError::Timeout { .. }
                | EnsembleError::ProviderError { retryable: true, .. }
        )
    }

    /// Returns `true` if the error was produced by a provider call and should
    /// count against that provider's health.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            EnsembleError::Timeout { .. }
                | EnsembleError::ProviderError { .. }
                | EnsembleError::AuthError { .. }
                | EnsembleError::MalformedResponse { .. }
                | EnsembleError::RateLimited { .. }
        )
    }

    /// The retry-after hint carried by a `RateLimited` error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            EnsembleError::RateLimited { retry_after_ms, .. } => {
                Some(Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, EnsembleError>`.
pub type Result<T> = std::result::Result<T, EnsembleError>;
