//! Bearer credential exchange for the model API.
//!
//! An authorization key is traded once for a short-lived access token,
//! which is cached until shortly before it expires.

use super::LlmError;
use crate::config::schema::LlmConfig;
use crate::config::sanitize_credential;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Refresh this long before the upstream expiry.
const EXPIRY_MARGIN_MS: i64 = 60_000;

/// How the client authenticates.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Token is used as-is.
    Bearer(String),
    /// Key exchanged at `auth_url` for an access token.
    AuthorizationKey {
        key: String,
        auth_url: String,
        scope: String,
    },
}

impl Credential {
    /// Pick the credential from config; a pre-issued token wins over a key.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if let Some(token) = sanitize_credential(&config.access_token) {
            return Ok(Self::Bearer(token));
        }
        match sanitize_credential(&config.credentials) {
            Some(key) => Ok(Self::AuthorizationKey {
                key,
                auth_url: config.auth_url.clone(),
                scope: config.scope.clone(),
            }),
            None => Err(LlmError::Auth(
                "no model credentials configured (set GIGACHAT_CREDENTIALS)".into(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Expiry as milliseconds since the epoch.
    expires_at: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at_ms: i64,
}

/// Supplies bearer tokens, exchanging the credential when needed.
#[derive(Debug)]
pub struct TokenProvider {
    credential: Credential,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(credential: Credential, http: reqwest::Client) -> Self {
        Self {
            credential,
            http,
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token.
    pub async fn bearer(&self) -> Result<String, LlmError> {
        let (key, auth_url, scope) = match &self.credential {
            Credential::Bearer(token) => return Ok(token.clone()),
            Credential::AuthorizationKey {
                key,
                auth_url,
                scope,
            } => (key, auth_url, scope),
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at_ms - EXPIRY_MARGIN_MS > Utc::now().timestamp_millis() {
                return Ok(token.value.clone());
            }
            debug!("Cached access token expired, exchanging again");
        }

        let token = self.exchange(key, auth_url, scope).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn exchange(
        &self,
        key: &str,
        auth_url: &str,
        scope: &str,
    ) -> Result<CachedToken, LlmError> {
        info!("Exchanging authorization key for access token");

        let resp = self
            .http
            .post(auth_url)
            .header("Authorization", format!("Basic {key}"))
            .header("RqUID", uuid::Uuid::new_v4().to_string())
            .header("Accept", "application/json")
            .form(&[("scope", scope)])
            .send()
            .await
            .map_err(|e| LlmError::Auth(format!("token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Auth(format!("could not parse token response: {e}")))?;

        Ok(CachedToken {
            value: body.access_token,
            expires_at_ms: body.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn token_beats_key_and_blank_is_rejected() {
        let mut config = LlmConfig::default();
        config.credentials = " key\n".into();
        assert!(matches!(
            Credential::from_config(&config),
            Ok(Credential::AuthorizationKey { ref key, .. }) if key == "key"
        ));

        config.access_token = "tok".into();
        assert!(matches!(Credential::from_config(&config), Ok(Credential::Bearer(_))));

        let blank = LlmConfig {
            credentials: "\r\n\t ".into(),
            ..LlmConfig::default()
        };
        assert!(matches!(Credential::from_config(&blank), Err(LlmError::Auth(_))));
    }

    #[tokio::test]
    async fn exchange_happens_once_while_token_is_fresh() {
        let server = MockServer::start().await;
        let expires_at = Utc::now().timestamp_millis() + 30 * 60_000;
        Mock::given(method("POST"))
            .and(path("/oauth"))
            .and(header("Authorization", "Basic c2VjcmV0"))
            .and(header_exists("RqUID"))
            .and(body_string_contains("scope=GIGACHAT_API_PERS"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_at": expires_at,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = TokenProvider::new(
            Credential::AuthorizationKey {
                key: "c2VjcmV0".into(),
                auth_url: format!("{}/oauth", server.uri()),
                scope: "GIGACHAT_API_PERS".into(),
            },
            reqwest::Client::new(),
        );

        assert_eq!(provider.bearer().await.unwrap(), "tok-1");
        assert_eq!(provider.bearer().await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn rejected_exchange_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let provider = TokenProvider::new(
            Credential::AuthorizationKey {
                key: "nope".into(),
                auth_url: format!("{}/oauth", server.uri()),
                scope: "GIGACHAT_API_PERS".into(),
            },
            reqwest::Client::new(),
        );

        let err = provider.bearer().await.unwrap_err();
        assert!(err.to_string().contains("401"), "{err}");
    }
}
