//! Interchangeable AI analysis backends.
//!
//! Every backend implements [`AnalysisBackend`]: a uniform
//! analyze-with-schema call plus advisory health state. The router holds a
//! priority list of this trait and fails over between implementations
//! without knowing which vendor sits behind each one.

pub mod gemini;
pub mod openai;
pub mod retry;
pub mod router;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AnalysisError, AnalysisResult};

pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;
pub use retry::{RetryBackend, RetryPolicy};
pub use router::FailoverRouter;

/// One analyze-with-schema call.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// The content to analyze.
    pub prompt: String,
    /// Persona/rules for this stage.
    pub instruction: String,
    /// JSON Schema the response payload must conform to.
    pub output_shape: Value,
    /// Name for the schema, required by some structured-output APIs.
    pub shape_name: String,
}

/// Validated backend output plus exact token usage.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub payload: Value,
    pub tokens_used: i64,
}

/// Capability contract for one AI analysis backend.
///
/// `is_healthy`/`mark_failed` are advisory and process-local: a brief
/// window where a dead backend is tried once more is tolerable, data
/// corruption is not possible through this path.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Backend vendor label for provenance ("openai", "google", ...).
    fn provider_name(&self) -> String;

    /// Model identifier for provenance.
    fn model_name(&self) -> String;

    /// False while the backend is cooling down after a failure.
    fn is_healthy(&self) -> bool;

    /// Put the backend into cooldown. Idempotent.
    fn mark_failed(&self);

    /// Run one structured analysis call.
    ///
    /// Errors are classified per the pipeline taxonomy: `RateLimited` for
    /// quota signals (the adapter also marks itself failed), `Provider`
    /// for transport/auth/server failures, `Validation` when the response
    /// body is not the requested shape.
    async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult<BackendResponse>;
}

/// Cooldown-based health state shared by all concrete adapters.
///
/// Lock-free: a failure stamps the current epoch millis; health is
/// time-since-last-failure exceeding the cooldown. Concurrent stamps race
/// benignly (latest-ish wins).
pub struct BackendHealth {
    last_failure_ms: AtomicU64,
    cooldown: Duration,
}

impl BackendHealth {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_failure_ms: AtomicU64::new(0),
            cooldown,
        }
    }

    pub fn mark_failed(&self) {
        self.last_failure_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn is_healthy(&self) -> bool {
        let last = self.last_failure_ms.load(Ordering::Relaxed);
        if last == 0 {
            return true;
        }
        now_ms().saturating_sub(last) > self.cooldown.as_millis() as u64
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Strict deserialize-and-validate step applied to a backend payload.
/// A mismatch is a `Validation` error: not retryable, not a health signal.
pub fn decode<T: DeserializeOwned>(payload: Value) -> AnalysisResult<T> {
    serde_json::from_value(payload)
        .map_err(|e| AnalysisError::Validation(format!("payload does not match schema: {e}")))
}

/// Build an [`AnalysisRequest`] for a type with a derived JSON Schema.
///
/// Subschemas are inlined: the structured-output endpoints receive the
/// shape without a definitions map, so a schema with `$ref`s into one
/// would be unresolvable on their side.
pub fn request_for<T: schemars::JsonSchema>(prompt: String, instruction: String) -> AnalysisRequest {
    let schema = schemars::gen::SchemaSettings::draft07()
        .with(|settings| settings.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<T>();
    AnalysisRequest {
        prompt,
        instruction,
        output_shape: serde_json::to_value(schema.schema).unwrap_or(Value::Null),
        shape_name: std::any::type_name::<T>()
            .rsplit("::")
            .next()
            .unwrap_or("output")
            .to_string(),
    }
}
