//! Structured output shapes for both analysis stages.
//!
//! These types are handed to the backends as JSON Schemas (via `schemars`)
//! and deserialized strictly afterwards. The pipeline treats their contents
//! as opaque judged data: it validates and persists, it does not interpret
//! the rubric.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version stamp written into every report's provenance. Bump when the
/// prompts or output shapes change in a way that affects comparability.
pub const ANALYSIS_VERSION: &str = "1.2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VacancyGrade {
    Intern,
    Junior,
    Middle,
    Senior,
    Lead,
    Principal,
}

/// Salary figures as written in the posting text. No currency conversion;
/// fields the model could not determine stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SalaryFacts {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub is_gross: bool,
}

/// Stage-1 output: neutral fact extraction, no judgment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VacancyFacts {
    /// Canonical technology names ("PostgreSQL", not "postgres").
    #[serde(default)]
    pub tech_stack: Vec<String>,
    pub grade: Option<VacancyGrade>,
    pub domain: Option<String>,
    pub salary: Option<SalaryFacts>,
    /// Tangible perks only; vague promises are filtered by the prompt.
    #[serde(default)]
    pub benefits: Vec<String>,
    /// Concerning phrases, listed without interpretation.
    #[serde(default)]
    pub red_flag_keywords: Vec<String>,
}

impl VacancyFacts {
    /// Additive union with a newer extraction. Lists union (order
    /// preserved, duplicates dropped), scalars fill in only when currently
    /// unset. A partial re-run never destroys previously captured facts.
    pub fn merge(&mut self, newer: VacancyFacts) {
        merge_list(&mut self.tech_stack, newer.tech_stack);
        merge_list(&mut self.benefits, newer.benefits);
        merge_list(&mut self.red_flag_keywords, newer.red_flag_keywords);
        if self.grade.is_none() {
            self.grade = newer.grade;
        }
        if self.domain.is_none() {
            self.domain = newer.domain;
        }
        if self.salary.is_none() {
            self.salary = newer.salary;
        }
    }

    pub fn salary_summary(&self) -> String {
        match &self.salary {
            None => "not specified".to_string(),
            Some(s) => {
                let currency = s.currency.as_deref().unwrap_or("USD");
                let tax = if s.is_gross { " (gross)" } else { "" };
                match (s.min, s.max) {
                    (Some(min), Some(max)) => format!("{min}-{max} {currency}{tax}"),
                    (Some(min), None) => format!("from {min} {currency}{tax}"),
                    (None, Some(max)) => format!("up to {max} {currency}{tax}"),
                    (None, None) => "not specified".to_string(),
                }
            }
        }
    }
}

fn merge_list(base: &mut Vec<String>, newer: Vec<String>) {
    for item in newer {
        if !base.iter().any(|existing| existing.eq_ignore_ascii_case(&item)) {
            base.push(item);
        }
    }
}

/// Final verdict labels. `AnalysisFailed` is the technical-failure
/// sentinel written by the pipeline itself, never by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Verdict {
    Safe,
    Risky,
    Avoid,
    #[serde(rename = "Analysis Failed")]
    AnalysisFailed,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Safe => "Safe",
            Verdict::Risky => "Risky",
            Verdict::Avoid => "Avoid",
            Verdict::AnalysisFailed => "Analysis Failed",
        }
    }
}

/// Stage-2 output: the judgment.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Judgment {
    /// 0-10. Models are instructed to score 1-10; 0 is reserved for
    /// technical failure and must stay distinguishable from a genuine 1.
    pub trust_score: u8,
    #[serde(default)]
    pub red_flags: Vec<String>,
    /// Verbatim quotes from the posting that triggered concerns.
    #[serde(default)]
    pub toxic_phrases: Vec<String>,
    /// Plain-language rewrite of what the posting really says.
    pub honest_summary: String,
    pub verdict: Verdict,
}

/// A complete, immutable analysis result with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub facts: VacancyFacts,
    pub judgment: Judgment,

    pub provider: String,
    pub model_name: String,
    pub analysis_version: String,
    /// Exact total across both stages, never estimated.
    pub tokens_used: i64,
    pub confidence: Option<f32>,
    pub error_message: Option<String>,
}

impl AnalysisReport {
    /// Technical-failure report: trust 0, explicit verdict, error recorded.
    /// Distinguishable from a genuinely awful posting (score 1) by the
    /// sentinel score plus the non-null error message.
    pub fn failed(
        facts: VacancyFacts,
        error: &str,
        provider: &str,
        model_name: &str,
        tokens_used: i64,
    ) -> Self {
        Self {
            facts,
            judgment: Judgment {
                trust_score: 0,
                red_flags: vec![format!("System error: {error}")],
                toxic_phrases: Vec::new(),
                honest_summary: "Analysis failed due to a technical issue.".to_string(),
                verdict: Verdict::AnalysisFailed,
            },
            provider: provider.to_string(),
            model_name: model_name.to_string(),
            analysis_version: ANALYSIS_VERSION.to_string(),
            tokens_used,
            confidence: None,
            error_message: Some(error.to_string()),
        }
    }

    pub fn is_technical_failure(&self) -> bool {
        self.judgment.trust_score == 0 && self.error_message.is_some()
    }
}

/// A persisted report row, as read back from storage.
#[derive(Debug, Clone)]
pub struct StoredReport {
    pub id: Uuid,
    pub vacancy_id: Uuid,
    pub report: AnalysisReport,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_additive_union() {
        let mut base = VacancyFacts {
            tech_stack: vec!["Python".into(), "Twisted".into()],
            grade: Some(VacancyGrade::Senior),
            domain: None,
            salary: None,
            benefits: vec!["health insurance".into()],
            red_flag_keywords: vec!["overtime".into()],
        };

        base.merge(VacancyFacts {
            tech_stack: vec!["python".into(), "PostgreSQL".into()],
            grade: Some(VacancyGrade::Junior),
            domain: Some("FinTech".into()),
            salary: Some(SalaryFacts {
                min: Some(7000),
                max: None,
                currency: Some("USD".into()),
                is_gross: false,
            }),
            benefits: vec![],
            red_flag_keywords: vec!["unpaid".into(), "overtime".into()],
        });

        // Lists unioned, case-insensitive dedupe, order preserved.
        assert_eq!(base.tech_stack, vec!["Python", "Twisted", "PostgreSQL"]);
        assert_eq!(base.red_flag_keywords, vec!["overtime", "unpaid"]);
        assert_eq!(base.benefits, vec!["health insurance"]);

        // Existing scalars never overwritten; missing ones filled in.
        assert_eq!(base.grade, Some(VacancyGrade::Senior));
        assert_eq!(base.domain.as_deref(), Some("FinTech"));
        assert_eq!(base.salary.as_ref().unwrap().min, Some(7000));
    }

    #[test]
    fn failed_report_carries_the_sentinel() {
        let report = AnalysisReport::failed(
            VacancyFacts::default(),
            "all backends exhausted",
            "chain",
            "multi-model",
            120,
        );

        assert_eq!(report.judgment.trust_score, 0);
        assert_eq!(report.judgment.verdict, Verdict::AnalysisFailed);
        assert!(report.is_technical_failure());
        assert_eq!(report.tokens_used, 120);

        // A genuine rock-bottom judgment is not a technical failure.
        let mut judged = report.clone();
        judged.judgment.trust_score = 1;
        judged.error_message = None;
        assert!(!judged.is_technical_failure());
    }

    #[test]
    fn verdict_serializes_to_fixed_labels() {
        assert_eq!(
            serde_json::to_string(&Verdict::AnalysisFailed).unwrap(),
            "\"Analysis Failed\""
        );
        assert_eq!(serde_json::to_string(&Verdict::Safe).unwrap(), "\"Safe\"");
        let parsed: Verdict = serde_json::from_str("\"Avoid\"").unwrap();
        assert_eq!(parsed, Verdict::Avoid);
    }

    #[test]
    fn salary_summary_formats() {
        let facts = VacancyFacts {
            salary: Some(SalaryFacts {
                min: Some(4000),
                max: Some(5000),
                currency: Some("EUR".into()),
                is_gross: true,
            }),
            ..Default::default()
        };
        assert_eq!(facts.salary_summary(), "4000-5000 EUR (gross)");
        assert_eq!(VacancyFacts::default().salary_summary(), "not specified");
    }
}
