//! Text generation backends.
//!
//! A [`Generator`] turns a finished prompt into a text continuation. The
//! answer gate owns prompting and the refusal policy; generators only talk
//! to a model.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::embedding::{http_client, send_with_retry};
use crate::error::GenerationError;

/// Request envelope shared by every backend.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: usize,
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, GenerationError>;
}

/// Always fails with [`GenerationError::Disabled`].
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &GenerationRequest<'_>) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

// ============ OpenAI ============

/// OpenAI chat completions. Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            client: http_client(config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: request.prompt,
            }],
        };
        let endpoint = format!("{}/chat/completions", self.url.trim_end_matches('/'));

        let json = send_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key.trim()))
                .json(&body)
        })
        .await
        .map_err(|e| GenerationError::Backend(format!("{:#}", e)))?;

        parse_chat_response(json).map_err(|e| GenerationError::Backend(e.to_string()))
    }
}

fn parse_chat_response(json: serde_json::Value) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_value(json)?;
    Ok(parsed
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .unwrap_or_default())
}

// ============ Ollama ============

/// Ollama `/api/generate`, non-streaming.
pub struct OllamaGenerator {
    model: String,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "llama3.2".to_string()),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client: http_client(config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });
        let endpoint = format!("{}/api/generate", self.url.trim_end_matches('/'));

        let json = send_with_retry("Ollama", self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await
        .map_err(|e| {
            GenerationError::Backend(format!("{:#} (is Ollama running at {}?)", e, self.url))
        })?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GenerationError::Backend("Invalid Ollama response: missing response".into())
            })
    }
}

/// Create the [`Generator`] named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_generator_fails_distinctly() {
        let generator = create_generator(&GenerationConfig::default()).unwrap();
        assert_eq!(generator.name(), "disabled");
        let request = GenerationRequest {
            prompt: "anything",
            temperature: 0.0,
            max_tokens: 16,
        };
        assert!(matches!(
            generator.generate(&request).await,
            Err(GenerationError::Disabled)
        ));
    }

    #[test]
    fn chat_response_takes_first_content() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "content": null } },
                { "message": { "content": "Momentum is measured over twelve months." } }
            ]
        });
        assert_eq!(
            parse_chat_response(json).unwrap(),
            "Momentum is measured over twelve months."
        );
        assert!(parse_chat_response(serde_json::json!({ "error": "x" })).is_err());
    }

    #[test]
    fn ollama_generator_uses_defaults() {
        let cfg = GenerationConfig {
            provider: "ollama".into(),
            ..Default::default()
        };
        let generator = create_generator(&cfg).unwrap();
        assert_eq!(generator.name(), "ollama");
        assert!(create_generator(&GenerationConfig {
            provider: "magic".into(),
            ..Default::default()
        })
        .is_err());
    }
}
