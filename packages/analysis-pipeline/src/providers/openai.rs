//! OpenAI backend adapter using Structured Outputs.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{AnalysisBackend, AnalysisRequest, BackendHealth, BackendResponse};
use crate::error::{AnalysisError, AnalysisResult};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: Value,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: i64,
}

pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    health: BackendHealth,
}

impl OpenAiBackend {
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
}

#[async_trait]
impl AnalysisBackend for OpenAiBackend {
    fn provider_name(&self) -> String {
        "openai".to_string()
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }

    fn mark_failed(&self) {
        tracing::warn!(provider = "openai", model = %self.model, "backend marked failed, cooling down");
        self.health.mark_failed();
    }

    async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult<BackendResponse> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.instruction.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt.clone(),
                },
            ],
            response_format: json!({
                "type": "json_schema",
                "json_schema": {
                    "name": request.shape_name,
                    "schema": request.output_shape,
                    "strict": false,
                }
            }),
        };

        tracing::debug!(
            model = %self.model,
            shape = %request.shape_name,
            prompt_length = request.prompt.len(),
            "calling OpenAI API"
        );

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Provider(format!("OpenAI connection error: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            self.mark_failed();
            let detail = response.text().await.unwrap_or_default();
            return Err(AnalysisError::RateLimited(format!(
                "OpenAI rate limit: {detail}"
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            if detail.contains("quota") || detail.contains("rate_limit") {
                self.mark_failed();
                return Err(AnalysisError::RateLimited(format!(
                    "OpenAI quota exceeded: {detail}"
                )));
            }
            return Err(AnalysisError::Provider(format!(
                "OpenAI API error ({status}): {detail}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Provider(format!("OpenAI response unreadable: {e}")))?;

        let tokens_used = parsed.usage.map(|u| u.total_tokens).unwrap_or(0);
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AnalysisError::Provider("OpenAI returned no choices".to_string()))?;

        if let Some(refusal) = choice.message.refusal {
            return Err(AnalysisError::Provider(format!("OpenAI refusal: {refusal}")));
        }

        let content = choice
            .message
            .content
            .ok_or_else(|| AnalysisError::Provider("OpenAI returned empty content".to_string()))?;

        let payload: Value = serde_json::from_str(&content).map_err(|e| {
            AnalysisError::Validation(format!("OpenAI output is not the requested shape: {e}"))
        })?;

        tracing::info!(
            model = %self.model,
            tokens = tokens_used,
            "OpenAI analysis complete"
        );

        Ok(BackendResponse {
            payload,
            tokens_used,
        })
    }
}
