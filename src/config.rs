use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::TransitionPolicy;
use crate::services::sessions::DEFAULT_MAX_SESSIONS;
use crate::services::EngineSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub gateway_base_url: String,
    pub gateway_token: Option<String>,
    pub gateway_timeout_secs: u64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_reset_secs: u64,
    pub redis_url: Option<String>,
    pub cache_ttl_secs: u64,
    pub transition_policy: TransitionPolicy,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub log_format: LogFormat,
    pub max_sessions: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Config {
            server_port: parse_or(&var, "SERVER_PORT", 3000)?,
            gateway_base_url: var("GATEWAY_BASE_URL").context("GATEWAY_BASE_URL is required")?,
            gateway_token: var("GATEWAY_TOKEN"),
            gateway_timeout_secs: parse_or(&var, "GATEWAY_TIMEOUT_SECS", 15)?,
            circuit_breaker_threshold: parse_or(&var, "CIRCUIT_BREAKER_THRESHOLD", 3)?,
            circuit_breaker_reset_secs: parse_or(&var, "CIRCUIT_BREAKER_RESET_SECS", 60)?,
            redis_url: var("REDIS_URL"),
            cache_ttl_secs: parse_or(&var, "CACHE_TTL_SECS", 30)?,
            transition_policy: match var("ORDER_TRANSITION_POLICY") {
                Some(raw) => raw
                    .parse::<TransitionPolicy>()
                    .map_err(anyhow::Error::msg)?,
                None => TransitionPolicy::Permissive,
            },
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS").map(|raw| parse_origins(&raw)),
            log_format: match var("LOG_FORMAT") {
                Some(raw) => raw.parse::<LogFormat>()?,
                None => LogFormat::Pretty,
            },
            max_sessions: parse_or(&var, "MAX_SESSIONS", DEFAULT_MAX_SESSIONS)?,
        };

        anyhow::ensure!(
            config.gateway_timeout_secs > 0,
            "GATEWAY_TIMEOUT_SECS must be greater than 0"
        );
        anyhow::ensure!(
            config.circuit_breaker_threshold > 0,
            "CIRCUIT_BREAKER_THRESHOLD must be greater than 0"
        );
        anyhow::ensure!(config.max_sessions > 0, "MAX_SESSIONS must be greater than 0");

        Ok(config)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            call_timeout: self.gateway_timeout(),
            transition_policy: self.transition_policy,
        }
    }

    /// Token shown as its last four characters only.
    pub fn masked_token(&self) -> String {
        match &self.gateway_token {
            Some(token) if token.chars().count() > 4 => {
                let skip = token.chars().count() - 4;
                format!("****{}", token.chars().skip(skip).collect::<String>())
            }
            Some(_) => "****".to_string(),
            None => "(none)".to_string(),
        }
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
