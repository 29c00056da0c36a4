use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIConfig {
    pub provider: AIProvider,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AIProvider {
    Groq,
    OpenAI,
    Anthropic,
}

impl AIProvider {
    pub fn default_model(self) -> &'static str {
        match self {
            AIProvider::Groq => "llama-3.3-70b-versatile",
            AIProvider::OpenAI => "gpt-4.1",
            AIProvider::Anthropic => "claude-sonnet-4-6",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn key_var(self) -> &'static str {
        match self {
            AIProvider::Groq => "GROQ_API_KEY",
            AIProvider::OpenAI => "OPENAI_API_KEY",
            AIProvider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn chat_completions_url(self) -> &'static str {
        match self {
            AIProvider::Groq => "https://api.groq.com/openai/v1/chat/completions",
            _ => "https://api.openai.com/v1/chat/completions",
        }
    }
}

impl FromStr for AIProvider {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(AIProvider::Groq),
            "openai" => Ok(AIProvider::OpenAI),
            "anthropic" => Ok(AIProvider::Anthropic),
            _ => Err(AssistantError::Config(
                "Invalid provider. Use 'groq', 'openai', or 'anthropic'.".into(),
            )),
        }
    }
}

/// One system + user exchange sent to a completion backend.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

/// Text-in, text-out completion service. An empty string means the backend
/// answered without content.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// HTTP client for the hosted chat APIs.
pub struct AIService {
    config: RwLock<Option<AIConfig>>,
    http_client: reqwest::Client,
}

impl AIService {
    pub fn new() -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            config: RwLock::new(None),
            http_client,
        }
    }

    pub async fn configure(&self, config: AIConfig) {
        *self.config.write().await = Some(config);
    }

    pub async fn is_configured(&self) -> bool {
        self.config.read().await.is_some()
    }

    async fn call_anthropic(&self, config: &AIConfig, request: &CompletionRequest) -> Result<String> {
        let body = serde_json::json!({
            "model": config.model,
            "max_tokens": MAX_TOKENS,
            "temperature": request.temperature,
            "system": request.system,
            "messages": [
                {"role": "user", "content": request.user}
            ]
        });

        let resp = self
            .http_client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let json = read_json(resp, "Anthropic").await?;
        Ok(anthropic_content(&json))
    }

    async fn call_chat_completions(
        &self,
        config: &AIConfig,
        request: &CompletionRequest,
    ) -> Result<String> {
        let body = serde_json::json!({
            "model": config.model,
            "max_tokens": MAX_TOKENS,
            "temperature": request.temperature,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user}
            ]
        });

        let resp = self
            .http_client
            .post(config.provider.chat_completions_url())
            .header("Authorization", format!("Bearer {}", config.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let label = match config.provider {
            AIProvider::Groq => "Groq",
            _ => "OpenAI",
        };
        let json = read_json(resp, label).await?;
        Ok(chat_completion_content(&json))
    }
}

impl Default for AIService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionBackend for AIService {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let config = self.config.read().await;
        let config = config.as_ref().ok_or_else(|| {
            AssistantError::Backend("AI not configured. Set an API key in the environment.".into())
        })?;

        debug!(
            "Completion request to {:?} ({}), temperature {}",
            config.provider, config.model, request.temperature
        );
        match config.provider {
            AIProvider::Anthropic => self.call_anthropic(config, request).await,
            AIProvider::Groq | AIProvider::OpenAI => {
                self.call_chat_completions(config, request).await
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> AssistantError {
    AssistantError::Backend(e.to_string())
}

async fn read_json(resp: reqwest::Response, label: &str) -> Result<serde_json::Value> {
    let status = resp.status();
    let text = resp.text().await.map_err(transport_error)?;

    if !status.is_success() {
        return Err(AssistantError::Backend(format!(
            "{} API error ({}): {}",
            label, status, text
        )));
    }

    serde_json::from_str(&text)
        .map_err(|e| AssistantError::Backend(format!("{} API returned invalid JSON: {}", label, e)))
}

fn anthropic_content(json: &serde_json::Value) -> String {
    json["content"][0]["text"].as_str().unwrap_or("").to_string()
}

fn chat_completion_content(json: &serde_json::Value) -> String {
    json["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string()
}
