//! Persistence boundary for vacancies and their analysis reports.

pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::analyzer::schemas::{AnalysisReport, StoredReport, VacancyFacts};
use crate::types::{NewVacancy, Vacancy, VacancyStatus};

pub use postgres::PostgresVacancyStore;

/// Field payload carried by a status advance. Fields and status always
/// change together in one transaction; a record can never hold a stage's
/// output while still sitting in the previous stage's status.
#[derive(Debug, Clone)]
pub enum StageFields {
    None,
    /// Full description captured by the extraction collaborator.
    Extraction { description: String },
    /// Embedding supplied by the vectorizer collaborator.
    Embedding(Vec<f32>),
    /// Stage-1 facts, merged additively into whatever is already stored.
    Facts(VacancyFacts),
}

/// Repository contract for the pipeline.
///
/// `claim_batch` is the concurrency-correctness primitive: concurrent
/// workers (or processes) claiming the same status must receive disjoint
/// sets. Everything else is conventional guarded mutation.
#[async_trait]
pub trait VacancyStore: Send + Sync {
    /// Insert-if-absent by identity hash. Returns the number of rows
    /// actually inserted; re-ingesting a known identity changes nothing.
    async fn upsert_batch(&self, batch: &[NewVacancy]) -> Result<u64>;

    /// Claim up to `limit` vacancies currently in one of `statuses`,
    /// skipping rows locked or leased by other workers, and stamp them
    /// with this worker's lease.
    async fn claim_batch(
        &self,
        worker_id: &str,
        statuses: &[VacancyStatus],
        limit: i64,
    ) -> Result<Vec<Vacancy>>;

    /// Atomically apply `fields` and move `expected -> to`. Fails when the
    /// record is not in `expected` status or the transition is not a legal
    /// forward step. Advancing into a terminal status releases the lease.
    async fn advance(
        &self,
        id: Uuid,
        expected: VacancyStatus,
        fields: StageFields,
        to: VacancyStatus,
    ) -> Result<()>;

    /// Demote all prior reports for the vacancy, insert `report` as
    /// current and repoint the record - one transaction, all or nothing.
    async fn append_result(&self, vacancy_id: Uuid, report: &AnalysisReport) -> Result<Uuid>;

    async fn get(&self, id: Uuid) -> Result<Option<Vacancy>>;

    async fn current_report(&self, vacancy_id: Uuid) -> Result<Option<StoredReport>>;

    /// Full report history, newest first. Superseded reports are retained
    /// for audit.
    async fn report_history(&self, vacancy_id: Uuid) -> Result<Vec<StoredReport>>;

    /// Terminal archive from any live status.
    async fn archive(&self, id: Uuid) -> Result<()>;

    /// Extraction collaborator write: full text captured, `New -> Extracted`.
    async fn record_extraction(&self, id: Uuid, description: String) -> Result<()> {
        self.advance(
            id,
            VacancyStatus::New,
            StageFields::Extraction { description },
            VacancyStatus::Extracted,
        )
        .await
    }

    /// Vectorizer collaborator write: `Extracted -> Vectorized`.
    async fn record_embedding(&self, id: Uuid, embedding: Vec<f32>) -> Result<()> {
        self.advance(
            id,
            VacancyStatus::Extracted,
            StageFields::Embedding(embedding),
            VacancyStatus::Vectorized,
        )
        .await
    }
}

/// The "ready for judgment" queue view: any worker process may claim from
/// these statuses.
pub const READY_FOR_JUDGMENT: &[VacancyStatus] =
    &[VacancyStatus::Vectorized, VacancyStatus::Structured];
