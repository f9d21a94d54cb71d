//! Mail delivery.
//!
//! The shipped mailer drops each message into an outbox directory where an
//! external MTA (or a human) picks it up.

use super::format::EmailContent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Hand one message over for delivery. Returns a delivery reference.
    async fn send(&self, recipients: &[String], email: &EmailContent) -> Result<String>;
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: &'a str,
    to: &'a [String],
    subject: &'a str,
    html_file: String,
    text_file: String,
    queued_at: String,
}

/// Writes `<id>.html`, `<id>.txt` and an `<id>.json` envelope per message.
pub struct OutboxMailer {
    dir: PathBuf,
}

impl OutboxMailer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, recipients: &[String], email: &EmailContent) -> Result<String> {
        anyhow::ensure!(
            !recipients.is_empty(),
            "no recipients configured (set NEWS_SUMMARY_EMAIL)"
        );

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create outbox {}", self.dir.display()))?;

        let id = ulid::Ulid::new().to_string();
        let html_file = format!("{id}.html");
        let text_file = format!("{id}.txt");

        tokio::fs::write(self.dir.join(&html_file), &email.html)
            .await
            .context("Failed to write HTML body")?;
        tokio::fs::write(self.dir.join(&text_file), &email.text)
            .await
            .context("Failed to write text body")?;

        // Envelope last: its presence marks the message complete.
        let envelope = Envelope {
            id: &id,
            to: recipients,
            subject: &email.subject,
            html_file,
            text_file,
            queued_at: chrono::Utc::now().to_rfc3339(),
        };
        tokio::fs::write(
            self.dir.join(format!("{id}.json")),
            serde_json::to_vec_pretty(&envelope)?,
        )
        .await
        .context("Failed to write envelope")?;

        info!(
            "Queued '{}' for {} in {}",
            email.subject,
            recipients.join(", "),
            self.dir.display()
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> EmailContent {
        EmailContent {
            subject: "Digest".into(),
            text: "plain".into(),
            html: "<p>html</p>".into(),
        }
    }

    #[tokio::test]
    async fn message_lands_in_outbox() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = OutboxMailer::new(dir.path().join("outbox"));

        let id = mailer
            .send(&["ops@example.com".to_string()], &email())
            .await
            .unwrap();

        let outbox = dir.path().join("outbox");
        assert_eq!(std::fs::read_to_string(outbox.join(format!("{id}.txt"))).unwrap(), "plain");
        let envelope: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(outbox.join(format!("{id}.json"))).unwrap(),
        )
        .unwrap();
        assert_eq!(envelope["to"][0], "ops@example.com");
        assert_eq!(envelope["subject"], "Digest");
    }

    #[tokio::test]
    async fn empty_recipient_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = OutboxMailer::new(dir.path());
        assert!(mailer.send(&[], &email()).await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
