//! Cron-driven daemon that runs the pipeline on schedule.
//!
//! Runs are strictly sequential: the next fire time is computed only after
//! the previous run (and its retries) has finished, so two runs never overlap
//! and a slow run simply skips the fire times it missed.

use crate::config::schema::ScheduleConfig;
use crate::pipeline::{PipelineDriver, PipelineError, RunOutcome};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Background pipeline scheduler.
pub struct PipelineScheduler {
    driver: Arc<PipelineDriver>,
    schedule: Schedule,
    retries: u32,
    retry_delay: Duration,
}

impl PipelineScheduler {
    pub fn new(driver: Arc<PipelineDriver>, config: &ScheduleConfig) -> Result<Self> {
        let schedule = Schedule::from_str(&config.cron)
            .with_context(|| format!("Invalid cron schedule '{}'", config.cron))?;
        Ok(Self {
            driver,
            schedule,
            retries: config.retries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        })
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Run the scheduling loop (call from a tokio::spawn).
    ///
    /// The loop exits cooperatively when `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!("Pipeline scheduler started");

        loop {
            let now = Utc::now();
            let Some(next) = self.next_after(now) else {
                warn!("Cron schedule has no upcoming fire times, stopping");
                return Ok(());
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!("Next pipeline run at {} (in {:?})", next, wait);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if self.run_with_retries(&cancel).await.is_none() {
                        info!("Pipeline scheduler shutting down");
                        return Ok(());
                    }
                }
                _ = cancel.cancelled() => {
                    info!("Pipeline scheduler shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// One scheduled slot: the run plus up to `retries` further attempts.
    ///
    /// Returns `None` if cancelled while waiting to retry.
    pub async fn run_with_retries(
        &self,
        cancel: &CancellationToken,
    ) -> Option<Result<RunOutcome, PipelineError>> {
        let mut attempt = 0;
        loop {
            let result = self.driver.run().await;
            match &result {
                Ok(outcome) => {
                    info!("Scheduled run {} succeeded", outcome.run_id);
                    return Some(result);
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "Scheduled run failed ({}), retry {}/{} in {:?}",
                        e, attempt, self.retries, self.retry_delay
                    );
                }
                Err(e) => {
                    error!("Scheduled run failed after {} attempts: {}", attempt + 1, e);
                    return Some(result);
                }
            }

            if cancel.is_cancelled() {
                return None;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.retry_delay) => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }
}
