//! Polling worker that drives claimed vacancies through both analysis
//! stages.
//!
//! The worker claims a batch of ready vacancies, runs stage 1 (skipped for
//! records already `Structured`), advances the record, runs stage 2 and
//! persists the report. Stage boundaries are durable: a crash between
//! stages loses at most the in-flight model call, never extracted facts.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analyzer::schemas::VacancyFacts;
use crate::analyzer::VacancyAnalyzer;
use crate::error::AnalysisError;
use crate::notify::Notifier;
use crate::storage::{StageFields, VacancyStore, READY_FOR_JUDGMENT};
use crate::types::{Vacancy, VacancyStatus};

/// Configuration for the analysis worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of vacancies to claim at once
    pub batch_size: i64,
    /// How long to wait when nothing is ready
    pub poll_interval: Duration,
    /// Pause after each vacancy, to stay under per-minute quotas
    pub pace_delay: Duration,
    /// Vacancies analyzed concurrently within a batch
    pub concurrency: usize,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(30),
            pace_delay: Duration::from_secs(1),
            concurrency: 2,
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

/// The analysis worker.
///
/// Claims from the ready-for-judgment queue, so it picks up both fresh
/// `Vectorized` records and `Structured` records left behind by an
/// earlier stage-2 failure or crash.
pub struct AnalysisWorker<S: VacancyStore> {
    store: Arc<S>,
    analyzer: Arc<VacancyAnalyzer>,
    notifier: Arc<dyn Notifier>,
    config: WorkerConfig,
}

impl<S: VacancyStore + 'static> AnalysisWorker<S> {
    pub fn new(
        store: Arc<S>,
        analyzer: Arc<VacancyAnalyzer>,
        notifier: Arc<dyn Notifier>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            analyzer,
            notifier,
            config,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            "analysis worker starting"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let batch = match self
                .store
                .claim_batch(
                    &self.config.worker_id,
                    READY_FOR_JUDGMENT,
                    self.config.batch_size,
                )
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "failed to claim vacancies");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if batch.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
                continue;
            }

            debug!(count = batch.len(), "claimed vacancies");

            let mut handles = Vec::with_capacity(batch.len());
            for vacancy in batch {
                let worker = &self;
                let semaphore = semaphore.clone();
                let shutdown = &shutdown;

                handles.push(async move {
                    let _permit = semaphore.acquire().await.expect("semaphore closed");

                    // Stop between records on shutdown; skipped rows keep
                    // their lease and return to the queue when it expires.
                    if shutdown.is_cancelled() {
                        return;
                    }
                    worker.process_vacancy(vacancy).await;

                    // Pace while still holding the permit, so the request
                    // rate per concurrency slot stays bounded.
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(worker.config.pace_delay) => {}
                    }
                });
            }
            futures::future::join_all(handles).await;
        }

        info!(worker_id = %self.config.worker_id, "analysis worker stopped");
        Ok(())
    }

    /// Drive one claimed vacancy to a terminal or resumable state.
    pub async fn process_vacancy(&self, vacancy: Vacancy) {
        let vacancy_id = vacancy.id;
        let mut tokens_total = 0i64;
        let mut current_status = vacancy.status;

        // Stage 1, unless an earlier run already structured this record.
        let facts = if vacancy.status == VacancyStatus::Vectorized {
            match self.analyzer.extract_facts(&vacancy).await {
                Ok((extracted, tokens)) => {
                    tokens_total += tokens;
                    if let Err(e) = self
                        .store
                        .advance(
                            vacancy_id,
                            VacancyStatus::Vectorized,
                            StageFields::Facts(extracted.clone()),
                            VacancyStatus::Structured,
                        )
                        .await
                    {
                        // Leave the record as-is; the claim lease expires
                        // and another worker retries from Vectorized.
                        error!(vacancy_id = %vacancy_id, error = %e, "failed to persist stage-1 facts");
                        return;
                    }
                    current_status = VacancyStatus::Structured;

                    // Same merge the store applied, so stage 2 sees the
                    // stored state without a re-read.
                    let mut merged = vacancy.facts().cloned().unwrap_or_default();
                    merged.merge(extracted);
                    merged
                }
                Err(e) => {
                    let prior = vacancy.facts().cloned().unwrap_or_default();
                    self.record_failure(vacancy_id, current_status, prior, &e, tokens_total)
                        .await;
                    return;
                }
            }
        } else {
            vacancy.facts().cloned().unwrap_or_default()
        };

        // Stage 2.
        match self.analyzer.judge(&vacancy, &facts).await {
            Ok((judgment, tokens)) => {
                tokens_total += tokens;
                let report = self.analyzer.assemble(facts, judgment, tokens_total);

                if let Err(e) = self.store.append_result(vacancy_id, &report).await {
                    error!(vacancy_id = %vacancy_id, error = %e, "failed to persist report");
                    return;
                }
                if let Err(e) = self
                    .store
                    .advance(
                        vacancy_id,
                        current_status,
                        StageFields::None,
                        VacancyStatus::Analyzed,
                    )
                    .await
                {
                    error!(vacancy_id = %vacancy_id, error = %e, "failed to finalize vacancy");
                    return;
                }

                info!(
                    vacancy_id = %vacancy_id,
                    trust_score = report.judgment.trust_score,
                    tokens = tokens_total,
                    "vacancy analyzed"
                );

                // Notification failures never fail the pipeline.
                if let Err(e) = self.notifier.analysis_complete(&vacancy, &report).await {
                    warn!(vacancy_id = %vacancy_id, error = %e, "notification failed");
                }
            }
            Err(e) => {
                self.record_failure(vacancy_id, current_status, facts, &e, tokens_total)
                    .await;
            }
        }
    }

    /// Write the sentinel failure report and move the record to `Failed`.
    /// Facts extracted before the failure travel with the report.
    async fn record_failure(
        &self,
        vacancy_id: Uuid,
        from: VacancyStatus,
        facts: VacancyFacts,
        error: &AnalysisError,
        tokens_used: i64,
    ) {
        warn!(vacancy_id = %vacancy_id, error = %error, "analysis failed");

        let report = self
            .analyzer
            .failed_report(facts, &error.to_string(), tokens_used);
        if let Err(e) = self.store.append_result(vacancy_id, &report).await {
            error!(vacancy_id = %vacancy_id, error = %e, "failed to persist failure report");
            return;
        }
        if let Err(e) = self
            .store
            .advance(vacancy_id, from, StageFields::None, VacancyStatus::Failed)
            .await
        {
            error!(vacancy_id = %vacancy_id, error = %e, "failed to mark vacancy failed");
        }
    }
}
