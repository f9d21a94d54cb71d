pub mod schema;

pub use schema::{NewsbriefConfig, ToolMode, ToolWireFormat};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default newsbrief home directory (~/.newsbrief).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".newsbrief"))
        .unwrap_or_else(|| PathBuf::from(".newsbrief"))
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<NewsbriefConfig> {
    if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read newsbrief config file")?;
        let config: NewsbriefConfig =
            toml::from_str(&contents).context("Failed to parse newsbrief config (TOML)")?;
        Ok(config)
    } else {
        debug!("No config at {:?}, using defaults", path);
        Ok(NewsbriefConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &NewsbriefConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}

/// Load config from `path`, then layer `.env` and process environment on top.
pub fn load_runtime_config(path: &Path) -> Result<NewsbriefConfig> {
    let _ = dotenvy::dotenv();
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Override config fields from environment variables.
///
/// `lookup` is injected so tests don't have to touch the process environment.
pub fn apply_env_overrides<F>(config: &mut NewsbriefConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let set = |target: &mut String, key: &str| {
        if let Some(value) = lookup(key) {
            if !value.trim().is_empty() {
                *target = value;
            }
        }
    };

    set(&mut config.news.api_key, "NEWSDATA_API_KEY");
    set(&mut config.news.api_url, "NEWS_API_URL");
    set(&mut config.weather.api_key, "YANDEX_WEATHER_API_KEY");
    set(&mut config.weather.api_url, "WEATHER_API_URL");
    set(&mut config.llm.credentials, "GIGACHAT_CREDENTIALS");
    set(&mut config.llm.model, "GIGACHAT_MODEL");
    set(&mut config.llm.access_token, "LLM_ACCESS_TOKEN");
    set(&mut config.tools.news_server_url, "NEWS_SERVER_URL");
    set(&mut config.tools.weather_server_url, "WEATHER_SERVER_URL");

    if let Some(recipients) = lookup("NEWS_SUMMARY_EMAIL") {
        let parsed: Vec<String> = recipients
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if !parsed.is_empty() {
            config.pipeline.recipients = parsed;
        }
    }
}

/// Log filter used when `RUST_LOG` is unset: the CLI flag, else the config
/// file's `log_level`, else `info`. An unreadable config file falls back too.
pub fn log_level(flag: Option<&str>, path: &Path) -> String {
    if let Some(level) = flag {
        return level.to_string();
    }
    load_config(path)
        .map(|config| config.log_level)
        .ok()
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Strip whitespace and control characters from a credential.
///
/// Returns `None` when nothing usable is left.
pub fn sanitize_credential(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
