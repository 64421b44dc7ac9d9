//! Priority-ordered failover across analysis backends.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{AnalysisBackend, AnalysisRequest, BackendResponse};
use crate::error::{AnalysisError, AnalysisResult};

#[derive(Debug, Clone)]
struct LastServed {
    provider: String,
    model: String,
}

/// Routes each request to the first healthy backend in a fixed priority
/// order. The same backend is preferred every time it is healthy (cache
/// and session locality on the preferred vendor); fallback guarantees
/// liveness.
///
/// A failed backend is never explicitly restored: it re-enters rotation
/// only once its own cooldown elapses.
pub struct FailoverRouter {
    backends: Vec<Arc<dyn AnalysisBackend>>,
    last_served: Mutex<Option<LastServed>>,
}

impl FailoverRouter {
    pub fn new(backends: Vec<Arc<dyn AnalysisBackend>>) -> Self {
        assert!(
            !backends.is_empty(),
            "FailoverRouter needs at least one backend"
        );
        Self {
            backends,
            last_served: Mutex::new(None),
        }
    }

    fn remember(&self, backend: &dyn AnalysisBackend) {
        let mut guard = self.last_served.lock().expect("last_served poisoned");
        *guard = Some(LastServed {
            provider: backend.provider_name(),
            model: backend.model_name(),
        });
    }

    fn last_served(&self) -> Option<LastServed> {
        self.last_served.lock().expect("last_served poisoned").clone()
    }
}

#[async_trait]
impl AnalysisBackend for FailoverRouter {
    /// Provenance of the backend that served the last successful request.
    fn provider_name(&self) -> String {
        match self.last_served() {
            Some(last) => last.provider,
            None => "chain-pending".to_string(),
        }
    }

    fn model_name(&self) -> String {
        match self.last_served() {
            Some(last) => last.model,
            None => "multi-model".to_string(),
        }
    }

    fn is_healthy(&self) -> bool {
        self.backends.iter().any(|b| b.is_healthy())
    }

    /// The chain cannot be killed from outside; individual backends mark
    /// themselves.
    fn mark_failed(&self) {}

    async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult<BackendResponse> {
        for backend in &self.backends {
            if !backend.is_healthy() {
                tracing::debug!(provider = %backend.provider_name(), "backend on cooldown, skipping");
                continue;
            }

            match backend.analyze(request).await {
                Ok(response) => {
                    self.remember(backend.as_ref());
                    return Ok(response);
                }
                Err(e) if e.is_backend_failure() => {
                    tracing::warn!(
                        provider = %backend.provider_name(),
                        error = %e,
                        "backend failed, switching to next"
                    );
                    // Covers failures the adapter did not classify as a
                    // quota hit (network errors, 5xx). Idempotent.
                    backend.mark_failed();
                }
                // A schema mismatch is a caller-side contract bug, not
                // backend unavailability. No failover, no health update.
                Err(e) => return Err(e),
            }
        }

        Err(AnalysisError::Exhausted(
            "all backends are dead or on cooldown".to_string(),
        ))
    }
}
