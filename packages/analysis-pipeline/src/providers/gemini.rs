//! Google Gemini backend adapter with native JSON-schema responses.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AnalysisBackend, AnalysisRequest, BackendHealth, BackendResponse};
use crate::error::{AnalysisError, AnalysisResult};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<i64>,
}

pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    health: BackendHealth,
}

impl GeminiBackend {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self::with_cooldown(api_key, model, DEFAULT_COOLDOWN)
    }

    pub fn with_cooldown(api_key: String, model: impl Into<String>, cooldown: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.into(),
            health: BackendHealth::new(cooldown),
        }
    }

    fn endpoint(&self) -> String {
        format!("{GEMINI_BASE_URL}/{}:generateContent", self.model)
    }
}

#[async_trait]
impl AnalysisBackend for GeminiBackend {
    fn provider_name(&self) -> String {
        "google".to_string()
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }

    fn mark_failed(&self) {
        tracing::warn!(provider = "google", model = %self.model, "backend marked failed, cooling down");
        self.health.mark_failed();
    }

    async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult<BackendResponse> {
        let body = json!({
            "system_instruction": {
                "parts": [{ "text": request.instruction }]
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }]
            }],
            "generationConfig": {
                "response_mime_type": "application/json",
                "response_json_schema": request.output_shape,
            }
        });

        tracing::debug!(
            model = %self.model,
            shape = %request.shape_name,
            prompt_length = request.prompt.len(),
            "calling Gemini API"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Provider(format!("Gemini connection error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            // 429 and quota-exceeded both signal the free-tier limit.
            if status.as_u16() == 429 || detail.contains("quota") || detail.contains("RESOURCE_EXHAUSTED") {
                self.mark_failed();
                return Err(AnalysisError::RateLimited(format!(
                    "Gemini rate limit: {detail}"
                )));
            }
            if status.is_server_error() {
                return Err(AnalysisError::Provider(format!(
                    "Gemini server failure ({status}): {detail}"
                )));
            }
            return Err(AnalysisError::Provider(format!(
                "Gemini client error ({status}): {detail}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Provider(format!("Gemini response unreadable: {e}")))?;

        let tokens_used = parsed
            .usage_metadata
            .and_then(|u| u.total_token_count)
            .unwrap_or(0);

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| AnalysisError::Provider("Gemini returned no candidates".to_string()))?;

        let payload: Value = serde_json::from_str(&text).map_err(|e| {
            AnalysisError::Validation(format!("Gemini output is not the requested shape: {e}"))
        })?;

        tracing::info!(
            model = %self.model,
            tokens = tokens_used,
            "Gemini analysis complete"
        );

        Ok(BackendResponse {
            payload,
            tokens_used,
        })
    }
}
