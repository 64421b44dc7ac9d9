pub mod analyzer;
pub mod config;
pub mod error;
pub mod notify;
pub mod providers;
pub mod storage;
pub mod types;
pub mod worker;

#[cfg(test)]
pub mod testing;

// Re-exports for clean API
pub use analyzer::schemas::{AnalysisReport, Judgment, StoredReport, VacancyFacts, Verdict};
pub use analyzer::VacancyAnalyzer;
pub use config::PipelineConfig;
pub use error::{AnalysisError, AnalysisResult};
pub use notify::{Notifier, NullNotifier, TelegramNotifier};
pub use providers::{
    AnalysisBackend, FailoverRouter, GeminiBackend, OpenAiBackend, RetryBackend, RetryPolicy,
};
pub use storage::{PostgresVacancyStore, StageFields, VacancyStore, READY_FOR_JUDGMENT};
pub use types::{NewVacancy, Vacancy, VacancyStatus};
pub use worker::{AnalysisWorker, WorkerConfig};
