//! Pipeline driver: fetch news → summarize → format → deliver.
//!
//! Every run is recorded in the state database with its current stage and
//! the value each stage handed to the next. A failed stage ends the run;
//! nothing after it executes, so a broken summary is never mailed.

pub mod format;
pub mod mailer;

pub use format::{EmailContent, FormatRejection};
pub use mailer::{Mailer, OutboxMailer};

use crate::agent::{build_summary_prompt, OrchestrationError, Orchestrator, NO_NEWS_SUMMARY};
use crate::config::schema::PipelineConfig;
use crate::llm::ChatModel;
use crate::state::Database;
use crate::tools::ToolRegistry;
use crate::types::*;
use chrono::Local;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("news fetch failed: {0}")]
    News(String),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error("summary rejected before formatting: {0}")]
    Rejected(String),

    #[error("delivery failed: {0:#}")]
    Delivery(anyhow::Error),

    #[error("state storage failed: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub headline_count: usize,
    pub summary: String,
    pub email: EmailContent,
    /// Reference returned by the mailer.
    pub delivery: String,
}

pub struct PipelineDriver {
    registry: Arc<ToolRegistry>,
    model: Arc<dyn ChatModel>,
    mailer: Arc<dyn Mailer>,
    db: Arc<Mutex<Database>>,
    settings: PipelineConfig,
}

impl PipelineDriver {
    pub fn new(
        registry: Arc<ToolRegistry>,
        model: Arc<dyn ChatModel>,
        mailer: Arc<dyn Mailer>,
        db: Arc<Mutex<Database>>,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            model,
            mailer,
            db,
            settings,
        }
    }

    /// Execute one full run and record its outcome.
    pub async fn run(&self) -> Result<RunOutcome, PipelineError> {
        let run_id = self.db.lock().await.start_run()?;
        info!("Pipeline run {} started", run_id);

        let result = self.execute(&run_id).await;

        let db = self.db.lock().await;
        match &result {
            Ok(outcome) => {
                db.finish_run(&run_id, RunStatus::Succeeded, None)?;
                db.kv_set("last_success", &run_id)?;
                info!(
                    "Pipeline run {} delivered ({} headlines)",
                    run_id, outcome.headline_count
                );
            }
            Err(e) => {
                let message = e.to_string();
                error!("Pipeline run {} failed: {}", run_id, message);
                // A storage failure here is only logged; the stage error is returned.
                if let Err(storage) = db.finish_run(&run_id, RunStatus::Failed, Some(&message)) {
                    error!("Could not record failure of run {}: {:#}", run_id, storage);
                }
            }
        }
        result
    }

    async fn execute(&self, run_id: &str) -> Result<RunOutcome, PipelineError> {
        // Fetch
        self.enter(run_id, PipelineStage::FetchNews).await?;
        let digest = self.fetch_news().await?;
        let news_json = serde_json::to_string(&digest).map_err(anyhow::Error::from)?;
        self.save(run_id, "news_data", &news_json).await?;
        info!("Fetched {} headlines", digest.total_count);

        // Summarize
        self.enter(run_id, PipelineStage::Summarize).await?;
        let summary = if digest.titles.is_empty() {
            warn!("No headlines returned, skipping the model");
            NO_NEWS_SUMMARY.to_string()
        } else {
            self.summarize(run_id, &digest).await?
        };
        self.save(run_id, "summary", &summary).await?;

        // Format
        self.enter(run_id, PipelineStage::Format).await?;
        let email = format::compose(
            &digest,
            &summary,
            &self.settings.subject_prefix,
            self.settings.max_listed_titles,
            Local::now(),
        )
        .map_err(|rejection| match rejection {
            FormatRejection::Empty => PipelineError::Rejected("summary is empty".into()),
            FormatRejection::Flagged { marker, excerpt } => {
                PipelineError::Rejected(format!("matched '{marker}': {excerpt}"))
            }
        })?;
        let email_json = serde_json::to_string(&email).map_err(anyhow::Error::from)?;
        self.save(run_id, "email", &email_json).await?;

        // Deliver
        self.enter(run_id, PipelineStage::Deliver).await?;
        let delivery = self
            .mailer
            .send(&self.settings.recipients, &email)
            .await
            .map_err(PipelineError::Delivery)?;

        Ok(RunOutcome {
            run_id: run_id.to_string(),
            headline_count: digest.total_count,
            summary,
            email,
            delivery,
        })
    }

    async fn fetch_news(&self) -> Result<NewsDigest, PipelineError> {
        let call = ToolCallRequest::new("news", RawArguments::default());
        let result = self.registry.dispatch(&call).await;
        if let Some(message) = result.error_message() {
            return Err(PipelineError::News(message));
        }
        serde_json::from_value(result.into_value())
            .map_err(|e| PipelineError::News(format!("unexpected news payload: {e}")))
    }

    async fn summarize(&self, run_id: &str, digest: &NewsDigest) -> Result<String, PipelineError> {
        let prompt = build_summary_prompt(digest, &self.settings.summary_language);
        let orchestrator = Orchestrator::new(self.model.as_ref(), &self.registry);
        let outcome = orchestrator.run(&prompt).await?;

        let db = self.db.lock().await;
        for invocation in &outcome.invocations {
            db.log_tool_call(run_id, &invocation.call, &invocation.result)?;
        }
        Ok(outcome.answer)
    }

    async fn enter(&self, run_id: &str, stage: PipelineStage) -> Result<(), PipelineError> {
        info!("Run {}: {}", run_id, stage);
        self.db.lock().await.set_stage(run_id, stage)?;
        Ok(())
    }

    async fn save(&self, run_id: &str, name: &str, value: &str) -> Result<(), PipelineError> {
        self.db.lock().await.save_artifact(run_id, name, value)?;
        Ok(())
    }
}
