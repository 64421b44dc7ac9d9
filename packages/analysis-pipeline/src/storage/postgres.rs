//! PostgreSQL-backed vacancy store.
//!
//! Claiming uses a `FOR UPDATE SKIP LOCKED` CTE plus a lease stamp, so a
//! claim stays visible to other workers after the claiming transaction
//! commits and is recovered automatically once the lease expires.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{StageFields, VacancyStore};
use crate::analyzer::schemas::{AnalysisReport, Judgment, StoredReport, VacancyFacts, Verdict};
use crate::types::{NewVacancy, Vacancy, VacancyStatus};

const VACANCY_COLUMNS: &str = "id, external_id, identity_hash, title, company_name, description, \
     source_url, salary_from, salary_to, salary_currency, salary_is_gross, \
     status, facts, embedding, current_analysis_id, worker_id, \
     lease_expires_at, created_at, updated_at";

pub struct PostgresVacancyStore {
    pool: PgPool,
    lease_ms: i64,
}

impl PostgresVacancyStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease_ms: 300_000, // 5 minutes; two LLM calls can be slow
        }
    }

    pub fn with_lease_ms(pool: PgPool, lease_ms: i64) -> Self {
        Self { pool, lease_ms }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn decode_report_row(row: &sqlx::postgres::PgRow) -> Result<StoredReport> {
        let verdict_label: String = row.try_get("verdict")?;
        let verdict: Verdict =
            serde_json::from_value(serde_json::Value::String(verdict_label.clone()))
                .with_context(|| format!("unknown verdict label '{verdict_label}'"))?;

        let facts: sqlx::types::Json<VacancyFacts> = row.try_get("facts")?;
        let red_flags: sqlx::types::Json<Vec<String>> = row.try_get("red_flags")?;
        let toxic_phrases: sqlx::types::Json<Vec<String>> = row.try_get("toxic_phrases")?;
        let trust_score: i16 = row.try_get("trust_score")?;

        Ok(StoredReport {
            id: row.try_get("id")?,
            vacancy_id: row.try_get("vacancy_id")?,
            report: AnalysisReport {
                facts: facts.0,
                judgment: Judgment {
                    trust_score: trust_score as u8,
                    red_flags: red_flags.0,
                    toxic_phrases: toxic_phrases.0,
                    honest_summary: row.try_get("honest_summary")?,
                    verdict,
                },
                provider: row.try_get("provider")?,
                model_name: row.try_get("model_name")?,
                analysis_version: row.try_get("analysis_version")?,
                tokens_used: row.try_get("tokens_used")?,
                confidence: row.try_get("confidence")?,
                error_message: row.try_get("error_message")?,
            },
            is_current: row.try_get("is_current")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl VacancyStore for PostgresVacancyStore {
    async fn upsert_batch(&self, batch: &[NewVacancy]) -> Result<u64> {
        let mut inserted = 0u64;
        for vacancy in batch {
            let result = sqlx::query(
                r#"
                INSERT INTO vacancies (
                    id, external_id, identity_hash, title, company_name,
                    description, source_url, salary_from, salary_to,
                    salary_currency, salary_is_gross, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'new')
                ON CONFLICT (identity_hash) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&vacancy.external_id)
            .bind(vacancy.identity_hash())
            .bind(&vacancy.title)
            .bind(&vacancy.company_name)
            .bind(&vacancy.description)
            .bind(&vacancy.source_url)
            .bind(vacancy.salary_from)
            .bind(vacancy.salary_to)
            .bind(&vacancy.salary_currency)
            .bind(vacancy.salary_is_gross)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn claim_batch(
        &self,
        worker_id: &str,
        statuses: &[VacancyStatus],
        limit: i64,
    ) -> Result<Vec<Vacancy>> {
        let status_labels: Vec<String> =
            statuses.iter().map(|s| s.as_str().to_string()).collect();

        let sql = format!(
            r#"
            WITH ready AS (
                SELECT id
                FROM vacancies
                WHERE status::text = ANY($1)
                  AND (lease_expires_at IS NULL OR lease_expires_at < NOW())
                ORDER BY created_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE vacancies v
            SET worker_id = $3,
                lease_expires_at = NOW() + ($4 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            FROM ready
            WHERE v.id = ready.id
            RETURNING {VACANCY_COLUMNS}
            "#
        );

        let claimed = sqlx::query_as::<_, Vacancy>(&sql)
            .bind(&status_labels)
            .bind(limit)
            .bind(worker_id)
            .bind(self.lease_ms.to_string())
            .fetch_all(&self.pool)
            .await?;

        Ok(claimed)
    }

    async fn advance(
        &self,
        id: Uuid,
        expected: VacancyStatus,
        fields: StageFields,
        to: VacancyStatus,
    ) -> Result<()> {
        if !expected.can_advance_to(to) {
            bail!(
                "illegal transition {} -> {} for vacancy {id}",
                expected.as_str(),
                to.as_str()
            );
        }

        // Terminal advances release the claim lease; mid-pipeline ones keep
        // it, so the same worker can continue into the next stage without
        // the record becoming claimable in between.
        let lease_clause = if to.is_terminal() {
            ", worker_id = NULL, lease_expires_at = NULL"
        } else {
            ""
        };

        let rows_affected = match fields {
            StageFields::None => {
                let sql = format!(
                    "UPDATE vacancies SET status = $1, updated_at = NOW(){lease_clause} \
                     WHERE id = $2 AND status = $3"
                );
                sqlx::query(&sql)
                    .bind(to)
                    .bind(id)
                    .bind(expected)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
            }
            StageFields::Extraction { description } => {
                let sql = format!(
                    "UPDATE vacancies SET status = $1, description = $2, updated_at = NOW(){lease_clause} \
                     WHERE id = $3 AND status = $4"
                );
                sqlx::query(&sql)
                    .bind(to)
                    .bind(description)
                    .bind(id)
                    .bind(expected)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
            }
            StageFields::Embedding(embedding) => {
                let sql = format!(
                    "UPDATE vacancies SET status = $1, embedding = $2, updated_at = NOW(){lease_clause} \
                     WHERE id = $3 AND status = $4"
                );
                sqlx::query(&sql)
                    .bind(to)
                    .bind(Vector::from(embedding))
                    .bind(id)
                    .bind(expected)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
            }
            StageFields::Facts(new_facts) => {
                // Read-merge-write under a row lock: the stored facts are
                // an additive union across extraction runs.
                let mut tx = self.pool.begin().await?;

                let existing = sqlx::query(
                    "SELECT facts FROM vacancies WHERE id = $1 AND status = $2 FOR UPDATE",
                )
                .bind(id)
                .bind(expected)
                .fetch_optional(&mut *tx)
                .await?;

                let Some(row) = existing else {
                    bail!(
                        "vacancy {id} is not in status {} (stale claim?)",
                        expected.as_str()
                    );
                };

                let mut merged = row
                    .try_get::<Option<sqlx::types::Json<VacancyFacts>>, _>("facts")?
                    .map(|j| j.0)
                    .unwrap_or_default();
                merged.merge(new_facts);

                let sql = format!(
                    "UPDATE vacancies SET status = $1, facts = $2, updated_at = NOW(){lease_clause} \
                     WHERE id = $3 AND status = $4"
                );
                let affected = sqlx::query(&sql)
                    .bind(to)
                    .bind(sqlx::types::Json(merged))
                    .bind(id)
                    .bind(expected)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();

                tx.commit().await?;
                affected
            }
        };

        if rows_affected != 1 {
            bail!(
                "vacancy {id} is not in status {} (stale claim?)",
                expected.as_str()
            );
        }

        tracing::debug!(
            vacancy_id = %id,
            from = expected.as_str(),
            to = to.as_str(),
            "status advanced"
        );
        Ok(())
    }

    async fn append_result(&self, vacancy_id: Uuid, report: &AnalysisReport) -> Result<Uuid> {
        let verdict_label = report.judgment.verdict.as_str();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE vacancy_analyses SET is_current = FALSE WHERE vacancy_id = $1 AND is_current",
        )
        .bind(vacancy_id)
        .execute(&mut *tx)
        .await?;

        let report_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO vacancy_analyses (
                id, vacancy_id, facts, trust_score, red_flags, toxic_phrases,
                honest_summary, verdict, provider, model_name,
                analysis_version, tokens_used, confidence, error_message,
                is_current
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, TRUE)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(vacancy_id)
        .bind(sqlx::types::Json(&report.facts))
        .bind(report.judgment.trust_score as i16)
        .bind(sqlx::types::Json(&report.judgment.red_flags))
        .bind(sqlx::types::Json(&report.judgment.toxic_phrases))
        .bind(&report.judgment.honest_summary)
        .bind(verdict_label)
        .bind(&report.provider)
        .bind(&report.model_name)
        .bind(&report.analysis_version)
        .bind(report.tokens_used)
        .bind(report.confidence)
        .bind(&report.error_message)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE vacancies SET current_analysis_id = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(report_id)
        .bind(vacancy_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            vacancy_id = %vacancy_id,
            report_id = %report_id,
            trust_score = report.judgment.trust_score,
            "analysis result persisted as current"
        );
        Ok(report_id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Vacancy>> {
        let sql = format!("SELECT {VACANCY_COLUMNS} FROM vacancies WHERE id = $1");
        let vacancy = sqlx::query_as::<_, Vacancy>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(vacancy)
    }

    async fn current_report(&self, vacancy_id: Uuid) -> Result<Option<StoredReport>> {
        let row = sqlx::query(
            "SELECT * FROM vacancy_analyses WHERE vacancy_id = $1 AND is_current LIMIT 1",
        )
        .bind(vacancy_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::decode_report_row).transpose()
    }

    async fn report_history(&self, vacancy_id: Uuid) -> Result<Vec<StoredReport>> {
        let rows = sqlx::query(
            "SELECT * FROM vacancy_analyses WHERE vacancy_id = $1 ORDER BY created_at DESC",
        )
        .bind(vacancy_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode_report_row).collect()
    }

    async fn archive(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE vacancies SET status = 'archived', worker_id = NULL, \
             lease_expires_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND status <> 'archived'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            bail!("vacancy {id} not found or already archived");
        }
        Ok(())
    }
}
