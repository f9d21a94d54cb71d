//! Upstream data sources behind the news and weather tools.

pub mod news;
pub mod weather;

pub use news::NewsSource;
pub use weather::WeatherSource;

use crate::config::{sanitize_credential, NewsbriefConfig};
use crate::types::ToolResult;
use anyhow::Context;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure while serving a tool from an upstream API.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Caller input rejected before any upstream call.
    #[error("{0}")]
    Validation(String),

    /// Required configuration (e.g. a credential) is missing.
    #[error("{0}")]
    Config(String),

    #[error("{service} request timed out")]
    Timeout { service: &'static str },

    #[error("connection to {service} failed: {detail}")]
    Transport {
        service: &'static str,
        detail: String,
    },

    /// Upstream answered with a non-success status.
    #[error("{message}")]
    Upstream {
        message: String,
        status: u16,
        body: String,
    },

    /// Upstream body was not the JSON document we expected.
    #[error("unexpected response format from {service}: {detail}")]
    Malformed {
        service: &'static str,
        detail: String,
    },

    /// Upstream answered 200 but the fields we need are absent.
    #[error("could not extract {what} from {service} response")]
    Extraction {
        service: &'static str,
        what: &'static str,
        raw: Value,
    },
}

impl ProviderError {
    /// Classify a reqwest failure; timeouts are reported on their own.
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { service }
        } else {
            Self::Transport {
                service,
                detail: err.to_string(),
            }
        }
    }

    /// HTTP status the tool provider server answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Malformed { .. } | Self::Extraction { .. } => 500,
            _ => 400,
        }
    }

    /// Render as an error-shaped tool result.
    pub fn into_tool_result(self) -> ToolResult {
        let message = self.to_string();
        match self {
            Self::Upstream { body, .. } => {
                let details = if body.is_empty() {
                    "Unknown error".to_string()
                } else {
                    body
                };
                ToolResult::error(message).with_context("details", Value::String(details))
            }
            Self::Transport { detail, .. } | Self::Malformed { detail, .. } => {
                ToolResult::error(message).with_context("details", Value::String(detail))
            }
            Self::Extraction { raw, .. } => {
                ToolResult::error(message).with_context("raw_response", raw)
            }
            _ => ToolResult::error(message),
        }
    }
}

impl From<ProviderError> for ToolResult {
    fn from(err: ProviderError) -> Self {
        err.into_tool_result()
    }
}

/// Shared HTTP client for upstream calls; a timeout counts as a transport failure.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Build both upstream sources from config, sharing one HTTP client.
pub fn sources_from_config(
    config: &NewsbriefConfig,
) -> anyhow::Result<(Arc<NewsSource>, Arc<WeatherSource>)> {
    let http = http_client(config.request_timeout()).context("Failed to build HTTP client")?;
    let news = NewsSource::new(
        &config.news.api_url,
        sanitize_credential(&config.news.api_key),
        &config.news.query,
        http.clone(),
    );
    let weather = WeatherSource::new(
        &config.weather.api_url,
        sanitize_credential(&config.weather.api_key),
        http,
    );
    Ok((Arc::new(news), Arc::new(weather)))
}

/// Read a response body as JSON, keeping the raw text for diagnostics.
pub(crate) async fn read_json(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<Value, ProviderError> {
    let text = resp
        .text()
        .await
        .map_err(|e| ProviderError::from_reqwest(service, e))?;
    serde_json::from_str(&text).map_err(|e| ProviderError::Malformed {
        service,
        detail: format!("{e}; body: {}", truncate(&text, 500)),
    })
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
