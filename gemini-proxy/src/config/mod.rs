use crate::services::providers::gemini::{GeminiConfig, DEFAULT_MODEL, GEMINI_API_BASE};
use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

/// Default upstream timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub gemini: GeminiSettings,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiSettings {
    /// Absent keys are reported per request, not at startup.
    pub api_key: Option<Secret<String>>,
    pub model: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl GeminiSettings {
    pub fn client_config(&self) -> GeminiConfig {
        GeminiConfig {
            api_base: self.api_base.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl ProxyConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(ProxyConfig {
            common,
            gemini: GeminiSettings {
                api_key: env::var("GEMINI_API_KEY")
                    .ok()
                    .filter(|k| !k.trim().is_empty())
                    .map(Secret::new),
                model: get_env("GEMINI_MODEL", DEFAULT_MODEL),
                api_base: get_env("GEMINI_API_BASE", GEMINI_API_BASE),
                timeout_secs: parse_timeout(env::var("GEMINI_TIMEOUT_SECS").ok())?,
            },
            environment: get_env("ENVIRONMENT", "production"),
        })
    }

    /// Error details carry full error chains only in development.
    pub fn diagnostics_enabled(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_timeout(raw: Option<String>) -> Result<u64, AppError> {
    match raw {
        None => Ok(DEFAULT_TIMEOUT_SECS),
        Some(v) => match v.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(secs),
            _ => Err(AppError::ConfigError(anyhow::anyhow!(
                "GEMINI_TIMEOUT_SECS must be a positive integer, got '{}'",
                v
            ))),
        },
    }
}
