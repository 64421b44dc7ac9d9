//! Core record model: the vacancy under analysis and its status machine.

use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::analyzer::schemas::VacancyFacts;

/// Pipeline position of a vacancy.
///
/// Transitions are monotonic forward along
/// `New -> Extracted -> Vectorized -> Structured -> Analyzed`,
/// with `Failed` and `Archived` as terminals. A closed enum on purpose:
/// adding a stage means extending this type and migrating in-flight rows,
/// never smuggling a new string through the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vacancy_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VacancyStatus {
    New,
    Extracted,
    Vectorized,
    Structured,
    Analyzed,
    Failed,
    Archived,
}

impl VacancyStatus {
    /// Position along the forward path. Terminals sit past the end so any
    /// forward transition into them is legal.
    fn ordinal(self) -> u8 {
        match self {
            VacancyStatus::New => 0,
            VacancyStatus::Extracted => 1,
            VacancyStatus::Vectorized => 2,
            VacancyStatus::Structured => 3,
            VacancyStatus::Analyzed => 4,
            VacancyStatus::Failed => 5,
            VacancyStatus::Archived => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            VacancyStatus::Analyzed | VacancyStatus::Failed | VacancyStatus::Archived
        )
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_advance_to(self, next: VacancyStatus) -> bool {
        // Any live or terminal row can be archived, once.
        if next == VacancyStatus::Archived {
            return self != VacancyStatus::Archived;
        }
        // Terminal rows never re-enter the pipeline.
        if self.is_terminal() {
            return false;
        }
        next.ordinal() > self.ordinal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VacancyStatus::New => "new",
            VacancyStatus::Extracted => "extracted",
            VacancyStatus::Vectorized => "vectorized",
            VacancyStatus::Structured => "structured",
            VacancyStatus::Analyzed => "analyzed",
            VacancyStatus::Failed => "failed",
            VacancyStatus::Archived => "archived",
        }
    }
}

/// Identity hash for duplicate detection: sha256 over normalized
/// `title|company`. Re-ingesting the same identity is a no-op upsert.
pub fn identity_hash(title: &str, company: &str) -> String {
    let raw = format!(
        "{}|{}",
        title.trim().to_lowercase(),
        company.trim().to_lowercase()
    );
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// A job posting tracked through the pipeline.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Vacancy {
    pub id: Uuid,
    pub external_id: String,
    pub identity_hash: String,

    pub title: String,
    pub company_name: String,
    pub description: String,
    pub source_url: Option<String>,

    // Authoritative compensation from the system of record. Takes
    // precedence over anything mentioned in free text during judgment.
    pub salary_from: Option<f64>,
    pub salary_to: Option<f64>,
    pub salary_currency: Option<String>,
    pub salary_is_gross: bool,

    pub status: VacancyStatus,

    /// Stage-1 facts, merged additively across runs.
    pub facts: Option<sqlx::types::Json<VacancyFacts>>,

    pub embedding: Option<Vector>,

    /// Pointer to the single current analysis report.
    pub current_analysis_id: Option<Uuid>,

    // Claim lease: which worker holds this row and until when.
    pub worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vacancy {
    pub fn facts(&self) -> Option<&VacancyFacts> {
        self.facts.as_ref().map(|j| &j.0)
    }

    /// Human-readable salary line for the judgment prompt, built from the
    /// authoritative columns rather than from prose.
    pub fn financial_summary(&self) -> String {
        let currency = self.salary_currency.as_deref().unwrap_or("USD");
        let tax = if self.salary_is_gross {
            " (gross)"
        } else {
            " (net)"
        };
        match (self.salary_from, self.salary_to) {
            (Some(from), Some(to)) => format!("{from} - {to} {currency}{tax}"),
            (Some(from), None) => format!("from {from} {currency}{tax}"),
            (None, Some(to)) => format!("up to {to} {currency}{tax}"),
            (None, None) => "NOT SPECIFIED (hidden)".to_string(),
        }
    }
}

/// Ingestion payload for a vacancy. The scraper collaborator supplies
/// these; the store turns them into `New` rows, skipping known identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVacancy {
    pub external_id: String,
    pub title: String,
    pub company_name: String,
    pub description: String,
    pub source_url: Option<String>,
    pub salary_from: Option<f64>,
    pub salary_to: Option<f64>,
    pub salary_currency: Option<String>,
    #[serde(default)]
    pub salary_is_gross: bool,
}

impl NewVacancy {
    pub fn identity_hash(&self) -> String {
        identity_hash(&self.title, &self.company_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotonic() {
        use VacancyStatus::*;

        assert!(New.can_advance_to(Extracted));
        assert!(Extracted.can_advance_to(Vectorized));
        assert!(Vectorized.can_advance_to(Structured));
        assert!(Structured.can_advance_to(Analyzed));
        assert!(Vectorized.can_advance_to(Failed));

        // No regressions, no self-loops.
        assert!(!Structured.can_advance_to(Vectorized));
        assert!(!Analyzed.can_advance_to(New));
        assert!(!Vectorized.can_advance_to(Vectorized));

        // Terminals stay terminal, except a one-way hop into Archived.
        assert!(!Failed.can_advance_to(Analyzed));
        assert!(!Archived.can_advance_to(New));
        assert!(Analyzed.can_advance_to(Archived));
        assert!(Failed.can_advance_to(Archived));
        assert!(!Archived.can_advance_to(Archived));
    }

    #[test]
    fn identity_hash_normalizes_case_and_whitespace() {
        let a = identity_hash("Senior Rust Engineer", "Acme Corp");
        let b = identity_hash("  senior rust engineer ", "ACME CORP");
        assert_eq!(a, b);

        let c = identity_hash("Senior Rust Engineer", "Other Corp");
        assert_ne!(a, c);
    }

    #[test]
    fn financial_summary_prefers_record_columns() {
        let mut v = crate::testing::sample_vacancy();
        v.salary_from = Some(5000.0);
        v.salary_to = Some(7000.0);
        v.salary_currency = Some("USD".into());
        assert_eq!(v.financial_summary(), "5000 - 7000 USD (net)");

        v.salary_to = None;
        v.salary_is_gross = true;
        assert_eq!(v.financial_summary(), "from 5000 USD (gross)");

        v.salary_from = None;
        assert_eq!(v.financial_summary(), "NOT SPECIFIED (hidden)");
    }
}
