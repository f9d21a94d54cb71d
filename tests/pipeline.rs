use async_trait::async_trait;
use newsbrief::agent::OrchestrationError;
use newsbrief::config::schema::{LlmConfig, PipelineConfig};
use newsbrief::config::ToolWireFormat;
use newsbrief::llm::{ChatClient, ChatModel, LlmError};
use newsbrief::pipeline::{EmailContent, Mailer, OutboxMailer, PipelineDriver, PipelineError};
use newsbrief::providers::{http_client, NewsSource, WeatherSource};
use newsbrief::state::Database;
use newsbrief::tools::{self, ToolDescriptor, ToolRegistry};
use newsbrief::types::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Answers every request with the same text and counts calls.
struct FixedModel {
    answer: &'static str,
    calls: AtomicUsize,
}

impl FixedModel {
    fn new(answer: &'static str) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChatModel for FixedModel {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _tools: &[&ToolDescriptor],
    ) -> Result<ModelReply, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModelReply::PlainAnswer {
            content: Some(self.answer.into()),
        })
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: std::sync::Mutex<Vec<EmailContent>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, _recipients: &[String], email: &EmailContent) -> anyhow::Result<String> {
        self.sent.lock().unwrap().push(email.clone());
        Ok("recorded".into())
    }
}

fn registry_for(upstream: &MockServer) -> Arc<ToolRegistry> {
    let http = http_client(Duration::from_secs(5)).unwrap();
    let news = Arc::new(NewsSource::new(
        &format!("{}/api/1/latest", upstream.uri()),
        Some("news-key".into()),
        "bitcoin",
        http.clone(),
    ));
    let weather = Arc::new(WeatherSource::new(
        &format!("{}/v2/forecast", upstream.uri()),
        None,
        http,
    ));
    Arc::new(tools::local_registry(news, weather))
}

fn settings() -> PipelineConfig {
    PipelineConfig {
        recipients: vec!["ops@example.com".into()],
        ..PipelineConfig::default()
    }
}

async fn mount_news(upstream: &MockServer, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/1/latest"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(upstream)
        .await;
}

fn driver(
    upstream: &MockServer,
    model: Arc<dyn ChatModel>,
    mailer: Arc<dyn Mailer>,
) -> (PipelineDriver, Arc<Mutex<Database>>) {
    let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
    let driver = PipelineDriver::new(registry_for(upstream), model, mailer, db.clone(), settings());
    (driver, db)
}

#[tokio::test]
async fn full_run_resolves_a_function_call_and_queues_the_email() {
    let upstream = MockServer::start().await;
    mount_news(
        &upstream,
        200,
        json!({"results": [{"title": "ETF inflows slow"}, {"title": "Hashrate at record"}]}),
    )
    .await;

    // Resend: the conversation now carries the tool result.
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(body_string_contains(r#""role":"function""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Bitcoin is down."}}]
        })))
        .with_priority(1)
        .expect(1)
        .mount(&upstream)
        .await;
    // First request: the model asks for fresher headlines.
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("Authorization", "Bearer static-token"))
        .and(body_string_contains(r#""functions""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": "",
                "function_call": {"name": "news", "arguments": {}}
            }}]
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let llm = LlmConfig {
        base_url: format!("{}/api/v1", upstream.uri()),
        access_token: "static-token".into(),
        tool_format: ToolWireFormat::Functions,
        accept_invalid_certs: false,
        ..LlmConfig::default()
    };
    let model = ChatClient::from_config(&llm, Duration::from_secs(5)).unwrap();

    let outbox = tempfile::tempdir().unwrap();
    let (driver, db) = driver(
        &upstream,
        Arc::new(model),
        Arc::new(OutboxMailer::new(outbox.path())),
    );

    let outcome = driver.run().await.unwrap();

    assert_eq!(outcome.summary, "Bitcoin is down.");
    assert_eq!(outcome.headline_count, 2);
    assert!(outcome.email.text.contains("1. ETF inflows slow"));
    assert!(outbox.path().join(format!("{}.json", outcome.delivery)).exists());

    let db = db.lock().await;
    let runs = db.recent_runs(5).unwrap();
    assert_eq!(runs[0].status, RunStatus::Succeeded);
    assert_eq!(runs[0].stage, "deliver");
    assert_eq!(
        db.load_artifact(&outcome.run_id, "summary").unwrap().as_deref(),
        Some("Bitcoin is down.")
    );
    assert_eq!(db.tool_call_count(&outcome.run_id).unwrap(), 1);
    assert_eq!(db.kv_get("last_success").unwrap(), Some(outcome.run_id));
}

#[tokio::test]
async fn flagged_summary_is_never_delivered() {
    let upstream = MockServer::start().await;
    mount_news(&upstream, 200, json!({"results": [{"title": "A"}]})).await;
    let mailer = Arc::new(RecordingMailer::default());
    let (driver, db) = driver(
        &upstream,
        FixedModel::new("Error 401: Authorization required"),
        mailer.clone(),
    );

    let err = driver.run().await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Orchestration(OrchestrationError::FlaggedContent { .. })
    ));
    assert!(mailer.sent.lock().unwrap().is_empty());
    let db = db.lock().await;
    let run = &db.recent_runs(1).unwrap()[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.stage, "summarize");
    assert_eq!(db.load_artifact(&run.id, "email").unwrap(), None);
}

#[tokio::test]
async fn email_guard_catches_what_the_summary_gate_lets_through() {
    let upstream = MockServer::start().await;
    mount_news(&upstream, 200, json!({"results": [{"title": "A"}]})).await;
    let mailer = Arc::new(RecordingMailer::default());
    let (driver, db) = driver(
        &upstream,
        FixedModel::new("The rally failed to hold above 70k."),
        mailer.clone(),
    );

    let err = driver.run().await.unwrap_err();

    assert!(matches!(err, PipelineError::Rejected(_)));
    assert!(mailer.sent.lock().unwrap().is_empty());
    assert_eq!(db.lock().await.recent_runs(1).unwrap()[0].stage, "format");
}

#[tokio::test]
async fn no_headlines_skips_the_model() {
    let upstream = MockServer::start().await;
    mount_news(&upstream, 200, json!({"results": []})).await;
    let model = FixedModel::new("unused");
    let mailer = Arc::new(RecordingMailer::default());
    let (driver, _db) = driver(&upstream, model.clone(), mailer.clone());

    let outcome = driver.run().await.unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.summary, newsbrief::agent::NO_NEWS_SUMMARY);
    assert_eq!(mailer.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn news_failure_stops_before_the_model() {
    let upstream = MockServer::start().await;
    mount_news(&upstream, 500, json!({"message": "down"})).await;
    let model = FixedModel::new("unused");
    let mailer = Arc::new(RecordingMailer::default());
    let (driver, db) = driver(&upstream, model.clone(), mailer.clone());

    let err = driver.run().await.unwrap_err();

    assert!(matches!(err, PipelineError::News(ref m) if m.contains("500")), "{err}");
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    assert!(mailer.sent.lock().unwrap().is_empty());
    let run = &db.lock().await.recent_runs(1).unwrap()[0];
    assert_eq!(run.stage, "fetch_news");
    assert!(run.error.as_deref().unwrap().contains("news fetch failed"));
}

/// Drops the `runs` table behind the driver's back, then answers with an
/// error report so the run fails in the summarize stage.
struct TableDroppingModel {
    db_path: std::path::PathBuf,
}

#[async_trait]
impl ChatModel for TableDroppingModel {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _tools: &[&ToolDescriptor],
    ) -> Result<ModelReply, LlmError> {
        let conn = rusqlite::Connection::open(&self.db_path).unwrap();
        conn.execute_batch("DROP TABLE runs;").unwrap();
        Ok(ModelReply::PlainAnswer {
            content: Some("Error 401: Authorization required".into()),
        })
    }
}

#[tokio::test]
async fn stage_error_survives_a_failed_run_record() {
    let upstream = MockServer::start().await;
    mount_news(&upstream, 200, json!({"results": [{"title": "A"}]})).await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.db");
    let db = Arc::new(Mutex::new(Database::open(&db_path).unwrap()));
    let mailer = Arc::new(RecordingMailer::default());
    let driver = PipelineDriver::new(
        registry_for(&upstream),
        Arc::new(TableDroppingModel { db_path }),
        mailer.clone(),
        db,
        settings(),
    );

    let err = driver.run().await.unwrap_err();

    assert!(
        matches!(
            err,
            PipelineError::Orchestration(OrchestrationError::FlaggedContent { .. })
        ),
        "{err}"
    );
    assert!(mailer.sent.lock().unwrap().is_empty());
}
