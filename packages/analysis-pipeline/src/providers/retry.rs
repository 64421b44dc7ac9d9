//! Rate-limit retry decorator for a single backend.
//!
//! Backoff is linear (`base_delay * attempt`), not exponential: the quotas
//! being dodged are fixed per-minute windows, and a predictable wait lands
//! back inside the next window. Only rate-limit signals are retried here;
//! every other failure propagates to the router, which treats it as a
//! normal adapter failure and moves on. The decorator never crosses
//! adapters within one call.

use std::time::Duration;

use async_trait::async_trait;

use super::{AnalysisBackend, AnalysisRequest, BackendResponse};
use crate::error::AnalysisResult;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before re-attempting after attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Wraps one backend with rate-limit retry. Health and provenance pass
/// straight through to the inner backend.
pub struct RetryBackend<B> {
    inner: B,
    policy: RetryPolicy,
}

impl<B: AnalysisBackend> RetryBackend<B> {
    pub fn new(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<B: AnalysisBackend> AnalysisBackend for RetryBackend<B> {
    fn provider_name(&self) -> String {
        self.inner.provider_name()
    }

    fn model_name(&self) -> String {
        self.inner.model_name()
    }

    fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }

    fn mark_failed(&self) {
        self.inner.mark_failed();
    }

    async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult<BackendResponse> {
        let mut attempt = 1u32;
        loop {
            match self.inner.analyze(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_rate_limit() && attempt < self.policy.max_attempts => {
                    let wait = self.policy.delay_after(attempt);
                    tracing::warn!(
                        provider = %self.inner.provider_name(),
                        attempt,
                        wait_secs = wait.as_secs_f64(),
                        "rate limit hit, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
