use crate::ai::{AIConfig, AIProvider, DEFAULT_TEMPERATURE};
use crate::db::{SslMode, DEFAULT_SLOW_QUERY_THRESHOLD_MS};
use crate::error::{AssistantError, Result};
use std::path::PathBuf;

pub const DEFAULT_HISTORY_DB: &str = "sqlpilot.db";

/// Runtime settings, read from the environment (and a `.env` file loaded by
/// the binary) and then overridden by command-line flags.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub dsn: String,
    pub ssl_mode: SslMode,
    pub provider: AIProvider,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub slow_query_threshold_ms: f64,
    pub history_db: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let dsn = get("DATABASE_DSN").ok_or_else(|| {
            AssistantError::Config("DATABASE_DSN is not set (expected host:port/service_name)".into())
        })?;

        let ssl_mode = match get("SQLPILOT_SSL_MODE") {
            Some(raw) => raw.parse()?,
            None => SslMode::default(),
        };

        let provider = match get("SQLPILOT_AI_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => AIProvider::Groq,
        };

        let api_key = get("SQLPILOT_AI_API_KEY").or_else(|| get(provider.key_var()));
        let model = get("SQLPILOT_AI_MODEL").unwrap_or_else(|| provider.default_model().into());

        let temperature = match get("SQLPILOT_AI_TEMPERATURE") {
            Some(raw) => parse_number::<f32>("SQLPILOT_AI_TEMPERATURE", &raw)?,
            None => DEFAULT_TEMPERATURE,
        };
        if !(0.0..=2.0).contains(&temperature) {
            return Err(AssistantError::Config(format!(
                "SQLPILOT_AI_TEMPERATURE must be between 0 and 2, got {}",
                temperature
            )));
        }

        let slow_query_threshold_ms = match get("SQLPILOT_SLOW_QUERY_MS") {
            Some(raw) => parse_number::<f64>("SQLPILOT_SLOW_QUERY_MS", &raw)?,
            None => DEFAULT_SLOW_QUERY_THRESHOLD_MS,
        };

        let history_db = match get("SQLPILOT_HISTORY_DB") {
            Some(raw) if raw.eq_ignore_ascii_case("off") => None,
            Some(raw) => Some(PathBuf::from(raw)),
            None => Some(PathBuf::from(DEFAULT_HISTORY_DB)),
        };

        Ok(Self {
            dsn,
            ssl_mode,
            provider,
            api_key,
            model,
            temperature,
            slow_query_threshold_ms,
            history_db,
        })
    }

    /// Completion backend settings, or `None` when no API key is available.
    pub fn ai_config(&self) -> Option<AIConfig> {
        self.api_key.as_ref().map(|api_key| AIConfig {
            provider: self.provider,
            api_key: api_key.clone(),
            model: self.model.clone(),
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AssistantError::Config(format!("{} must be a number, got '{}'", key, raw)))
}
