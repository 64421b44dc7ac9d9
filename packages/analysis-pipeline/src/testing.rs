//! Shared test fixtures: scripted backends and an in-memory store.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::analyzer::schemas::{AnalysisReport, StoredReport, ANALYSIS_VERSION};
use crate::error::{AnalysisError, AnalysisResult};
use crate::providers::{AnalysisBackend, AnalysisRequest, BackendResponse};
use crate::storage::{StageFields, VacancyStore};
use crate::types::{identity_hash, NewVacancy, Vacancy, VacancyStatus};

pub fn sample_vacancy() -> Vacancy {
    let now = Utc::now();
    Vacancy {
        id: Uuid::new_v4(),
        external_id: "ext-1".to_string(),
        identity_hash: identity_hash("Backend Engineer", "Acme"),
        title: "Backend Engineer".to_string(),
        company_name: "Acme".to_string(),
        description: "Build backends.".to_string(),
        source_url: Some("https://jobs.example.com/1".to_string()),
        salary_from: None,
        salary_to: None,
        salary_currency: None,
        salary_is_gross: false,
        status: VacancyStatus::Vectorized,
        facts: None,
        embedding: None,
        current_analysis_id: None,
        worker_id: None,
        lease_expires_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_new_vacancy(label: &str) -> NewVacancy {
    NewVacancy {
        external_id: format!("ext-{label}"),
        title: format!("{label} Engineer"),
        company_name: "Acme".to_string(),
        description: "Build things.".to_string(),
        source_url: None,
        salary_from: None,
        salary_to: None,
        salary_currency: None,
        salary_is_gross: false,
    }
}

pub fn sample_request() -> AnalysisRequest {
    AnalysisRequest {
        prompt: "analyze this".to_string(),
        instruction: "be precise".to_string(),
        output_shape: json!({"type": "object"}),
        shape_name: "Output".to_string(),
    }
}

pub fn canned_response(payload: Value, tokens_used: i64) -> BackendResponse {
    BackendResponse {
        payload,
        tokens_used,
    }
}

/// Stage-1 payload that deserializes cleanly into [`VacancyFacts`].
pub fn stage1_payload() -> Value {
    json!({
        "tech_stack": ["Python", "Twisted", "PostgreSQL"],
        "grade": "senior",
        "domain": "FinTech",
        "salary": {"min": 7000, "max": null, "currency": "USD", "is_gross": false},
        "benefits": ["health insurance"],
        "red_flag_keywords": ["legacy codebase"]
    })
}

/// Stage-2 payload with the given trust score, otherwise a fixed judgment.
pub fn stage2_payload(trust_score: u8) -> Value {
    json!({
        "trust_score": trust_score,
        "red_flags": ["Legacy Python 2.7 stack"],
        "toxic_phrases": ["we work hard and play hard"],
        "honest_summary": "Legacy maintenance role with premium pay.",
        "verdict": "Risky"
    })
}

pub fn sample_report(trust_score: u8) -> AnalysisReport {
    AnalysisReport {
        facts: serde_json::from_value(stage1_payload()).unwrap(),
        judgment: serde_json::from_value(stage2_payload(trust_score)).unwrap(),
        provider: "mock".to_string(),
        model_name: "mock-model".to_string(),
        analysis_version: ANALYSIS_VERSION.to_string(),
        tokens_used: 360,
        confidence: Some(0.9),
        error_message: None,
    }
}

/// Backend that plays back a fixed script of results, one per call, and
/// records the requests it saw. Calls past the end of the script fail.
pub struct ScriptedBackend {
    provider: String,
    model: String,
    script: Mutex<VecDeque<AnalysisResult<BackendResponse>>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<AnalysisRequest>>,
}

impl ScriptedBackend {
    pub fn new(
        provider: &str,
        model: &str,
        script: Vec<AnalysisResult<BackendResponse>>,
    ) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<AnalysisRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    fn provider_name(&self) -> String {
        self.provider.clone()
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn mark_failed(&self) {}

    async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult<BackendResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AnalysisError::Provider("script exhausted".to_string())))
    }
}

/// Backend that returns the same result on every call and tracks health
/// as a plain flag, for router tests.
pub struct CountingBackend {
    name: String,
    fixed: AnalysisResult<BackendResponse>,
    healthy: AtomicBool,
    calls: AtomicUsize,
}

impl CountingBackend {
    pub fn healthy(name: &str, fixed: AnalysisResult<BackendResponse>) -> Self {
        Self {
            name: name.to_string(),
            fixed,
            healthy: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unhealthy(name: &str) -> Self {
        let backend = Self::healthy(name, Err(AnalysisError::Provider("dead".to_string())));
        backend.healthy.store(false, Ordering::SeqCst);
        backend
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisBackend for CountingBackend {
    fn provider_name(&self) -> String {
        self.name.clone()
    }

    fn model_name(&self) -> String {
        format!("{}-model", self.name)
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn mark_failed(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }

    async fn analyze(&self, _request: &AnalysisRequest) -> AnalysisResult<BackendResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fixed.clone()
    }
}

/// In-memory [`VacancyStore`] with the same guarded-transition semantics
/// as the Postgres implementation, for worker tests.
#[derive(Default)]
pub struct MemoryVacancyStore {
    vacancies: Mutex<HashMap<Uuid, Vacancy>>,
    reports: Mutex<Vec<StoredReport>>,
}

impl MemoryVacancyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row directly, bypassing ingestion.
    pub fn insert(&self, vacancy: Vacancy) {
        self.vacancies.lock().unwrap().insert(vacancy.id, vacancy);
    }

    pub fn status_of(&self, id: Uuid) -> Option<VacancyStatus> {
        self.vacancies.lock().unwrap().get(&id).map(|v| v.status)
    }
}

#[async_trait]
impl VacancyStore for MemoryVacancyStore {
    async fn upsert_batch(&self, batch: &[NewVacancy]) -> Result<u64> {
        let mut vacancies = self.vacancies.lock().unwrap();
        let mut inserted = 0u64;
        for item in batch {
            let hash = item.identity_hash();
            if vacancies.values().any(|v| v.identity_hash == hash) {
                continue;
            }
            let now = Utc::now();
            let id = Uuid::new_v4();
            vacancies.insert(
                id,
                Vacancy {
                    id,
                    external_id: item.external_id.clone(),
                    identity_hash: hash,
                    title: item.title.clone(),
                    company_name: item.company_name.clone(),
                    description: item.description.clone(),
                    source_url: item.source_url.clone(),
                    salary_from: item.salary_from,
                    salary_to: item.salary_to,
                    salary_currency: item.salary_currency.clone(),
                    salary_is_gross: item.salary_is_gross,
                    status: VacancyStatus::New,
                    facts: None,
                    embedding: None,
                    current_analysis_id: None,
                    worker_id: None,
                    lease_expires_at: None,
                    created_at: now,
                    updated_at: now,
                },
            );
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn claim_batch(
        &self,
        worker_id: &str,
        statuses: &[VacancyStatus],
        limit: i64,
    ) -> Result<Vec<Vacancy>> {
        let mut vacancies = self.vacancies.lock().unwrap();
        let now = Utc::now();

        let mut ready: Vec<Uuid> = vacancies
            .values()
            .filter(|v| {
                statuses.contains(&v.status)
                    && v.lease_expires_at.map_or(true, |until| until < now)
            })
            .map(|v| v.id)
            .collect();
        ready.sort_by_key(|id| vacancies[id].created_at);
        ready.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(ready.len());
        for id in ready {
            let v = vacancies.get_mut(&id).unwrap();
            v.worker_id = Some(worker_id.to_string());
            v.lease_expires_at = Some(now + Duration::minutes(5));
            v.updated_at = now;
            claimed.push(v.clone());
        }
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
                "illegal transition {} -> {}",
                expected.as_str(),
                to.as_str()
            );
        }

        let mut vacancies = self.vacancies.lock().unwrap();
        let v = match vacancies.get_mut(&id) {
            Some(v) if v.status == expected => v,
            Some(_) => bail!("vacancy {id} not in status {} (stale claim?)", expected.as_str()),
            None => bail!("vacancy {id} not found"),
        };

        match fields {
            StageFields::None => {}
            StageFields::Extraction { description } => v.description = description,
            StageFields::Embedding(values) => v.embedding = Some(values.into()),
            StageFields::Facts(newer) => match v.facts.as_mut() {
                Some(existing) => existing.0.merge(newer),
                None => v.facts = Some(sqlx::types::Json(newer)),
            },
        }

        v.status = to;
        if to.is_terminal() {
            v.worker_id = None;
            v.lease_expires_at = None;
        }
        v.updated_at = Utc::now();
        Ok(())
    }

    async fn append_result(&self, vacancy_id: Uuid, report: &AnalysisReport) -> Result<Uuid> {
        let mut reports = self.reports.lock().unwrap();
        for stored in reports.iter_mut() {
            if stored.vacancy_id == vacancy_id {
                stored.is_current = false;
            }
        }
        let id = Uuid::new_v4();
        reports.push(StoredReport {
            id,
            vacancy_id,
            report: report.clone(),
            is_current: true,
            created_at: Utc::now(),
        });
        drop(reports);

        let mut vacancies = self.vacancies.lock().unwrap();
        match vacancies.get_mut(&vacancy_id) {
            Some(v) => v.current_analysis_id = Some(id),
            None => bail!("vacancy {vacancy_id} not found"),
        }
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Vacancy>> {
        Ok(self.vacancies.lock().unwrap().get(&id).cloned())
    }

    async fn current_report(&self, vacancy_id: Uuid) -> Result<Option<StoredReport>> {
        Ok(self
            .reports
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.vacancy_id == vacancy_id && r.is_current)
            .cloned())
    }

    async fn report_history(&self, vacancy_id: Uuid) -> Result<Vec<StoredReport>> {
        let mut history: Vec<StoredReport> = self
            .reports
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.vacancy_id == vacancy_id)
            .cloned()
            .collect();
        history.reverse();
        Ok(history)
    }

    async fn archive(&self, id: Uuid) -> Result<()> {
        let mut vacancies = self.vacancies.lock().unwrap();
        let v = match vacancies.get_mut(&id) {
            Some(v) => v,
            None => bail!("vacancy {id} not found"),
        };
        if !v.status.can_advance_to(VacancyStatus::Archived) {
            bail!("vacancy {id} not found or already archived");
        }
        v.status = VacancyStatus::Archived;
        v.worker_id = None;
        v.lease_expires_at = None;
        v.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn memory_claims_are_disjoint_and_leased() {
        let store = Arc::new(MemoryVacancyStore::new());
        let batch: Vec<_> = (0..20)
            .map(|i| sample_new_vacancy(&format!("memory claim {i}")))
            .collect();
        assert_eq!(store.upsert_batch(&batch).await.unwrap(), 20);

        let mut handles = Vec::new();
        for worker in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .claim_batch(&format!("w-{worker}"), &[VacancyStatus::New], 5)
                    .await
                    .unwrap()
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            for claimed in handle.await.unwrap() {
                assert!(seen.insert(claimed.id), "vacancy {} claimed twice", claimed.id);
                assert!(claimed.worker_id.is_some());
                assert!(claimed.lease_expires_at.is_some());
            }
        }
        assert_eq!(seen.len(), 20);

        // Everything is leased now; a late claimer gets nothing.
        let leftovers = store
            .claim_batch("w-late", &[VacancyStatus::New], 5)
            .await
            .unwrap();
        assert!(leftovers.is_empty());
    }
}
