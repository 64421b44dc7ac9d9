//! Two-stage vacancy analysis orchestration.
//!
//! Stage 1 extracts neutral facts; Stage 2 judges them against the
//! original text and the system-of-record compensation. Both stages go
//! through whatever [`AnalysisBackend`] the analyzer was built with - in
//! production that is the failover router over retry-decorated adapters.

pub mod prompts;
pub mod schemas;

use std::sync::Arc;

use crate::error::{AnalysisError, AnalysisResult};
use crate::providers::{decode, request_for, AnalysisBackend};
use crate::types::Vacancy;

use schemas::{AnalysisReport, Judgment, VacancyFacts, ANALYSIS_VERSION};

pub struct VacancyAnalyzer {
    backend: Arc<dyn AnalysisBackend>,
}

impl VacancyAnalyzer {
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self { backend }
    }

    /// Stage 1: extract structured facts from the raw posting.
    ///
    /// Returns the facts plus the exact token count of the call.
    pub async fn extract_facts(&self, vacancy: &Vacancy) -> AnalysisResult<(VacancyFacts, i64)> {
        tracing::info!(vacancy_id = %vacancy.id, "stage 1: extracting structured facts");

        let request = request_for::<VacancyFacts>(
            prompts::format_stage1_prompt(vacancy),
            prompts::STAGE1_SYSTEM_PROMPT.to_string(),
        );
        let response = self.backend.analyze(&request).await?;
        let facts: VacancyFacts = decode(response.payload)?;

        tracing::info!(
            vacancy_id = %vacancy.id,
            tech_items = facts.tech_stack.len(),
            red_flag_keywords = facts.red_flag_keywords.len(),
            tokens = response.tokens_used,
            "stage 1 complete"
        );
        Ok((facts, response.tokens_used))
    }

    /// Stage 2: judge the vacancy using the facts, the original text and
    /// the record's authoritative compensation.
    pub async fn judge(
        &self,
        vacancy: &Vacancy,
        facts: &VacancyFacts,
    ) -> AnalysisResult<(Judgment, i64)> {
        tracing::info!(vacancy_id = %vacancy.id, "stage 2: applying judgment");

        let request = request_for::<Judgment>(
            prompts::format_stage2_prompt(vacancy, facts),
            prompts::stage2_instruction(),
        );
        let response = self.backend.analyze(&request).await?;
        let mut judgment: Judgment = decode(response.payload)?;

        if judgment.trust_score > 10 {
            return Err(AnalysisError::Validation(format!(
                "trust score {} outside 0-10",
                judgment.trust_score
            )));
        }
        // Models are instructed to score 1-10; a stray 0 would masquerade
        // as the technical-failure sentinel.
        if judgment.trust_score == 0 {
            tracing::warn!(vacancy_id = %vacancy.id, "model produced reserved score 0, clamping to 1");
            judgment.trust_score = 1;
        }

        tracing::info!(
            vacancy_id = %vacancy.id,
            trust_score = judgment.trust_score,
            verdict = judgment.verdict.as_str(),
            tokens = response.tokens_used,
            "stage 2 complete"
        );
        Ok((judgment, response.tokens_used))
    }

    /// Assemble the final report with provenance from the serving backend.
    /// `tokens_used` must be the exact sum across both stages.
    pub fn assemble(
        &self,
        facts: VacancyFacts,
        judgment: Judgment,
        tokens_used: i64,
    ) -> AnalysisReport {
        AnalysisReport {
            facts,
            judgment,
            provider: self.backend.provider_name(),
            model_name: self.backend.model_name(),
            analysis_version: ANALYSIS_VERSION.to_string(),
            tokens_used,
            // Neither API exposes a usable logprob-based confidence yet.
            confidence: Some(0.9),
            error_message: None,
        }
    }

    /// Technical-failure report for this analyzer's backend. Facts already
    /// extracted are carried along so they are not lost with the failure.
    pub fn failed_report(
        &self,
        facts: VacancyFacts,
        error: &str,
        tokens_used: i64,
    ) -> AnalysisReport {
        AnalysisReport::failed(
            facts,
            error,
            &self.backend.provider_name(),
            &self.backend.model_name(),
            tokens_used,
        )
    }
}
