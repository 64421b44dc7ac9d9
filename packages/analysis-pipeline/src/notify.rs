//! Completion notifications for finished analyses.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use crate::analyzer::schemas::AnalysisReport;
use crate::types::Vacancy;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn analysis_complete(&self, vacancy: &Vacancy, report: &AnalysisReport) -> Result<()>;
}

/// Drops every notification. Used when no channel is configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn analysis_complete(&self, _vacancy: &Vacancy, _report: &AnalysisReport) -> Result<()> {
        Ok(())
    }
}

/// Telegram Bot API notifier. Only postings at or above `min_score` are
/// forwarded; everything else is logged and dropped.
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
    min_score: u8,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String, min_score: u8) -> Self {
        Self {
            client: Client::new(),
            bot_token,
            chat_id,
            min_score,
        }
    }

    fn format_message(vacancy: &Vacancy, report: &AnalysisReport) -> String {
        let mut text = format!(
            "<b>{}</b> at <b>{}</b>\n\
             Trust: {}/10 - {}\n\
             Salary: {}\n\n{}",
            escape_html(&vacancy.title),
            escape_html(&vacancy.company_name),
            report.judgment.trust_score,
            escape_html(report.judgment.verdict.as_str()),
            escape_html(&vacancy.financial_summary()),
            escape_html(&report.judgment.honest_summary),
        );
        if let Some(url) = &vacancy.source_url {
            text.push_str(&format!("\n\n{}", escape_html(url)));
        }
        text
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn analysis_complete(&self, vacancy: &Vacancy, report: &AnalysisReport) -> Result<()> {
        if report.judgment.trust_score < self.min_score {
            info!(
                vacancy_id = %vacancy.id,
                trust_score = report.judgment.trust_score,
                "below notification threshold, skipping"
            );
            return Ok(());
        }

        let message = SendMessage {
            chat_id: &self.chat_id,
            text: Self::format_message(vacancy, report),
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(format!(
                "https://api.telegram.org/bot{}/sendMessage",
                self.bot_token
            ))
            .json(&message)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            error!("Telegram send failed {}: {}", status, body);
            anyhow::bail!("Telegram API error {}: {}", status, body);
        }

        info!(vacancy_id = %vacancy.id, "Telegram notification sent");
        Ok(())
    }
}

/// HTML parse mode requires escaping in message text.
fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
