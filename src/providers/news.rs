//! Headline source backed by the newsdata.io `latest` endpoint.

use super::{read_json, ProviderError};
use crate::types::NewsDigest;
use serde_json::Value;
use tracing::{debug, error, info};

const SERVICE: &str = "news API";

/// Client for the upstream news API.
#[derive(Debug, Clone)]
pub struct NewsSource {
    api_url: String,
    api_key: Option<String>,
    query: String,
    http: reqwest::Client,
}

impl NewsSource {
    pub fn new(api_url: &str, api_key: Option<String>, query: &str, http: reqwest::Client) -> Self {
        Self {
            api_url: api_url.to_string(),
            api_key,
            query: query.to_string(),
            http,
        }
    }

    /// Fetch the latest headlines for the configured query.
    ///
    /// Either every title is returned or an error is; partial lists never are.
    pub async fn fetch_titles(&self) -> Result<NewsDigest, ProviderError> {
        info!("Requesting headlines for '{}'", self.query);

        let mut params: Vec<(&str, &str)> = vec![("q", self.query.as_str())];
        if let Some(key) = &self.api_key {
            params.push(("apikey", key.as_str()));
        }

        let resp = self
            .http
            .get(&self.api_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                error!("News API request failed: {}", e);
                ProviderError::from_reqwest(SERVICE, e)
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("News API returned {}: {}", status, body);
            return Err(ProviderError::Upstream {
                message: format!("news API returned status {}", status.as_u16()),
                status: status.as_u16(),
                body,
            });
        }

        let body = read_json(SERVICE, resp).await?;
        let digest = extract_titles(&body)?;
        info!("Extracted {} headlines", digest.total_count);
        Ok(digest)
    }
}

/// Pull `title` out of every article in `results`, skipping articles without one.
pub fn extract_titles(body: &Value) -> Result<NewsDigest, ProviderError> {
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Extraction {
            service: SERVICE,
            what: "results",
            raw: body.clone(),
        })?;

    let titles: Vec<String> = results
        .iter()
        .filter_map(|article| article.get("title").and_then(Value::as_str))
        .map(String::from)
        .collect();

    debug!("{} of {} articles carried a title", titles.len(), results.len());
    Ok(NewsDigest::new(titles))
}
