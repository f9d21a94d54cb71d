//! Configuration schema for newsbrief.toml.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsbriefConfig {
    /// Timeout applied to every upstream HTTP call, in seconds.
    pub request_timeout_secs: u64,

    /// Path to the SQLite database holding runs and artifacts.
    pub db_path: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,

    pub server: ServerConfig,
    pub news: NewsConfig,
    pub weather: WeatherConfig,
    pub llm: LlmConfig,
    pub tools: ToolsConfig,
    pub pipeline: PipelineConfig,
    pub schedule: ScheduleConfig,
}

/// Tool provider server listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Upstream news API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub api_url: String,
    pub api_key: String,
    /// Fixed search query sent with every request.
    pub query: String,
}

/// Upstream weather API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_url: String,
    pub api_key: String,
}

/// How tools are advertised to and decoded from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolWireFormat {
    /// `tools` / `tool_calls` (OpenAI-compatible).
    Openai,
    /// `functions` / `function_call` (GigaChat dialect).
    Functions,
}

/// Remote conversational model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat API base URL (the client appends `/chat/completions`).
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    /// Authorization key exchanged for a bearer token at `auth_url`.
    pub credentials: String,
    pub auth_url: String,
    pub scope: String,
    /// Pre-issued bearer token; skips the exchange when set.
    pub access_token: String,
    pub tool_format: ToolWireFormat,
    /// Skip TLS verification (the GigaChat endpoints use a private CA).
    pub accept_invalid_certs: bool,
}

/// Where tool handlers execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    /// Call the upstream APIs in-process.
    Local,
    /// Forward calls to a running tool provider server.
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub mode: ToolMode,
    pub news_server_url: String,
    pub weather_server_url: String,
}

/// Digest formatting and delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub recipients: Vec<String>,
    pub subject_prefix: String,
    /// Maximum number of headlines listed in the email body.
    pub max_listed_titles: usize,
    /// Directory the outbox mailer writes messages into.
    pub outbox_dir: String,
    /// Language the model is asked to summarize in.
    pub summary_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Cron expression (with seconds field).
    pub cron: String,
    /// Extra attempts after a failed run.
    pub retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for NewsbriefConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            db_path: "~/.newsbrief/state.db".into(),
            log_level: "info".into(),
            server: ServerConfig::default(),
            news: NewsConfig::default(),
            weather: WeatherConfig::default(),
            llm: LlmConfig::default(),
            tools: ToolsConfig::default(),
            pipeline: PipelineConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8082,
        }
    }
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://newsdata.io/api/1/latest".into(),
            api_key: String::new(),
            query: "bitcoin".into(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.weather.yandex.ru/v2/forecast".into(),
            api_key: String::new(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gigachat.devices.sberbank.ru/api/v1".into(),
            model: "GigaChat-Pro".into(),
            temperature: 0.7,
            credentials: String::new(),
            auth_url: "https://ngw.devices.sberbank.ru:9443/api/v2/oauth".into(),
            scope: "GIGACHAT_API_PERS".into(),
            access_token: String::new(),
            tool_format: ToolWireFormat::Functions,
            accept_invalid_certs: true,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mode: ToolMode::Local,
            news_server_url: "http://127.0.0.1:8082/news".into(),
            weather_server_url: "http://127.0.0.1:8082/weather".into(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            subject_prefix: "Bitcoin news digest".into(),
            max_listed_titles: 20,
            outbox_dir: "~/.newsbrief/outbox".into(),
            summary_language: "Russian".into(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 * * * *".into(),
            retries: 1,
            retry_delay_secs: 300,
        }
    }
}

impl NewsbriefConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved database path.
    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }

    /// Resolved outbox directory.
    pub fn resolved_outbox_dir(&self) -> String {
        self.resolve_path(&self.pipeline.outbox_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Socket address the tool provider server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
