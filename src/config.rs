use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

/// Runtime configuration, read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` runs the server on the in-process store.
    pub database_url: Option<String>,
    pub inference_base_url: String,
    pub connect_retries: u32,
    pub retry_backoff: Duration,
    pub auth_header: String,
    pub cors_origin: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            inference_base_url: "http://localhost:8000".to_string(),
            connect_retries: 1,
            retry_backoff: Duration::from_millis(250),
            auth_header: "x-user-id".to_string(),
            cors_origin: "http://localhost:8080".to_string(),
            port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url: var("DATABASE_URL"),
            inference_base_url: var("INFERENCE_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.inference_base_url),
            connect_retries: parse_or(var("INFERENCE_CONNECT_RETRIES"), "INFERENCE_CONNECT_RETRIES")?
                .unwrap_or(defaults.connect_retries),
            retry_backoff: parse_or(var("INFERENCE_RETRY_BACKOFF_MS"), "INFERENCE_RETRY_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            auth_header: var("AUTH_HEADER")
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or(defaults.auth_header),
            cors_origin: var("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            port: parse_or(var("PORT"), "PORT")?.unwrap_or(defaults.port),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|v| v.trim().parse::<T>().with_context(|| format!("{key} has an invalid value '{v}'")))
        .transpose()
}
