//! Failure taxonomy for the analysis pipeline.
//!
//! The router and the retry decorator make their decisions purely off these
//! variants, so adapters must classify carefully:
//! - `Provider`: transport/auth/server-side failure. Retryable by failing
//!   over to the next backend.
//! - `RateLimited`: quota exhausted (HTTP 429 and friends). Retryable with
//!   backoff before failover.
//! - `Validation`: the backend answered, but the payload does not match the
//!   expected shape. A caller-side contract bug, never a health signal.
//! - `Exhausted`: every backend was unhealthy or failed.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("provider failure: {0}")]
    Provider(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("schema validation failed: {0}")]
    Validation(String),

    #[error("all backends exhausted: {0}")]
    Exhausted(String),
}

impl AnalysisError {
    /// True for errors that should knock the serving backend into cooldown
    /// and let the router advance to the next one.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            AnalysisError::Provider(_) | AnalysisError::RateLimited(_)
        )
    }

    /// True only for rate-limit signals; the retry decorator backs off on
    /// these and nothing else.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AnalysisError::RateLimited(_))
    }
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
