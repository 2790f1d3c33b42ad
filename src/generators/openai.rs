//! OpenAI-compatible chat-completions generator adapter.
//!
//! Works against any endpoint speaking the `/chat/completions` wire format
//! (OpenAI, OpenRouter, LiteLLM proxies, local servers). The API key is
//! resolved from configuration or an environment variable at construction
//! time so a missing credential fails the scan setup, not the first probe.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::context::ScanContext;
use crate::conversation::{Conversation, Message};
use crate::error::GeneratorError;
use crate::registry::Config;

use super::Generator;

/// Default API endpoint.
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default model identifier.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Environment variable consulted when no key is configured.
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Typed configuration for [`OpenAiGenerator`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL for the API.
    pub api_base: String,
    /// Explicit API key; when `None`, `api_key_env` is consulted.
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: Option<f64>,
    /// Maximum tokens per completion.
    pub max_tokens: Option<u32>,
    /// Nucleus sampling parameter.
    pub top_p: Option<f64>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
            top_p: None,
        }
    }
}

impl OpenAiConfig {
    /// Sets the API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Sets an explicit API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the max tokens per completion.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Parses a config bag into a typed config.
    pub fn from_bag(bag: &Config) -> Result<Self, anyhow::Error> {
        let defaults = Self::default();
        let mut cfg = Self {
            api_base: bag.get_string("api_base", &defaults.api_base),
            api_key: bag.raw("api_key").and_then(|v| v.as_str()).map(String::from),
            api_key_env: bag.get_string("api_key_env", &defaults.api_key_env),
            model: bag.get_string("model", &defaults.model),
            temperature: None,
            max_tokens: None,
            top_p: None,
        };
        if bag.raw("temperature").is_some() {
            cfg.temperature = Some(bag.get_f64("temperature", 0.7));
        }
        if bag.raw("max_tokens").is_some() {
            cfg.max_tokens = Some(bag.get_i64("max_tokens", 1024).max(1) as u32);
        }
        if bag.raw("top_p").is_some() {
            cfg.top_p = Some(bag.get_f64("top_p", 1.0));
        }
        Ok(cfg)
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    n: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Generator speaking the OpenAI chat-completions wire format.
pub struct OpenAiGenerator {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiGenerator {
    /// Creates a generator from its typed config.
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// Resolves the API key from config or environment.
    fn api_key(&self) -> Result<String, GeneratorError> {
        if let Some(key) = &self.config.api_key {
            return Ok(key.clone());
        }
        std::env::var(&self.config.api_key_env)
            .map_err(|_| GeneratorError::MissingApiKey(self.config.api_key_env.clone()))
    }

    fn wire_messages(&self, conversation: &Conversation) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(conversation.turns.len() + 1);
        if let Some(system) = &conversation.system {
            messages.push(ApiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        for turn in &conversation.turns {
            messages.push(ApiMessage {
                role: turn.role.clone(),
                content: turn.content.clone(),
            });
        }
        messages
    }

    async fn execute(
        &self,
        conversation: &Conversation,
        n: usize,
    ) -> Result<Vec<Message>, GeneratorError> {
        let api_key = self.api_key()?;
        let url = format!("{}/chat/completions", self.config.api_base);
        let request = ApiRequest {
            model: &self.config.model,
            messages: self.wire_messages(conversation),
            n,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
        };

        let http_response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| GeneratorError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body = http_response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error response".to_string());
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(match code {
                401 | 403 => GeneratorError::Auth(message),
                429 => GeneratorError::RateLimited(message),
                _ => GeneratorError::Api { code, message },
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| GeneratorError::ParseError(e.to_string()))?;

        Ok(api_response
            .choices
            .into_iter()
            .map(|choice| Message {
                role: choice.message.role,
                content: choice.message.content,
            })
            .collect())
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai.OpenAI"
    }

    fn description(&self) -> &str {
        "OpenAI-compatible chat completions API"
    }

    async fn generate(
        &self,
        ctx: &ScanContext,
        conversation: &Conversation,
        n: usize,
    ) -> Result<Vec<Message>, GeneratorError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        match ctx.run(self.execute(conversation, n)).await {
            Some(result) => result,
            None => Err(GeneratorError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = OpenAiConfig::default();
        assert_eq!(cfg.api_base, DEFAULT_API_BASE);
        assert_eq!(cfg.model, DEFAULT_MODEL);
        assert_eq!(cfg.api_key_env, DEFAULT_API_KEY_ENV);
        assert!(cfg.api_key.is_none());
        assert!(cfg.temperature.is_none());
    }

    #[test]
    fn test_config_builder() {
        let cfg = OpenAiConfig::default()
            .with_api_base("http://localhost:4000/v1")
            .with_api_key("sk-test")
            .with_model("local-model")
            .with_temperature(0.2)
            .with_max_tokens(64);

        assert_eq!(cfg.api_base, "http://localhost:4000/v1");
        assert_eq!(cfg.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.model, "local-model");
        assert_eq!(cfg.temperature, Some(0.2));
        assert_eq!(cfg.max_tokens, Some(64));
    }

    #[test]
    fn test_config_from_bag() {
        let mut bag = Config::new();
        bag.set("model", "claude-like");
        bag.set("temperature", 1.5);
        bag.set("max_tokens", 256.0); // JSON float for a whole number

        let cfg = OpenAiConfig::from_bag(&bag).unwrap();
        assert_eq!(cfg.model, "claude-like");
        assert_eq!(cfg.temperature, Some(1.5));
        assert_eq!(cfg.max_tokens, Some(256));
        assert_eq!(cfg.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_wire_messages_include_system() {
        let generator = OpenAiGenerator::new(OpenAiConfig::default());
        let conv = Conversation::from_prompt("hi").with_system("be terse");
        let messages = generator.wire_messages(&conv);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "be terse");
        assert_eq!(messages[1].role, "user");
    }

    #[tokio::test]
    async fn test_zero_completions_short_circuits() {
        // No key configured, but n == 0 never reaches the backend.
        let generator = OpenAiGenerator::new(
            OpenAiConfig::default().with_api_base("http://127.0.0.1:1/v1"),
        );
        let conv = Conversation::from_prompt("p");
        let ctx = ScanContext::new();

        let out = generator.generate(&ctx, &conv, 0).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let cfg = OpenAiConfig {
            api_key_env: "AUGUSTUS_TEST_NO_SUCH_KEY".to_string(),
            ..OpenAiConfig::default()
        };
        let generator = OpenAiGenerator::new(cfg);
        let conv = Conversation::from_prompt("p");
        let ctx = ScanContext::new();

        let err = generator.generate(&ctx, &conv, 1).await.unwrap_err();
        assert!(matches!(err, GeneratorError::MissingApiKey(_)));
        assert!(err.to_string().contains("AUGUSTUS_TEST_NO_SUCH_KEY"));
    }
}
