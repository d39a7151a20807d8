//! Answer generators backed by a chat-completions API.
//!
//! [`ChatCompletionsGenerator`] speaks the OpenAI-compatible
//! `POST {base_url}/chat/completions` protocol, which Groq, OpenAI, and
//! most self-hosted gateways expose. It makes exactly one attempt per
//! question; failures surface as [`GenerationError`] and retry policy is
//! left to the caller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use studymate_core::error::GenerationError;
use studymate_core::generation::{AnswerGenerator, ExtractiveGenerator, GenerationRequest};

use crate::config::GenerationConfig;

/// Create the [`AnswerGenerator`] named by `config.provider`.
///
/// | Config Value | Generator |
/// |-------------|-----------|
/// | `"chat-completions"` | [`ChatCompletionsGenerator`] |
/// | `"extractive"` | [`ExtractiveGenerator`] (offline, returns the best passage) |
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn AnswerGenerator>> {
    match config.provider.as_str() {
        "chat-completions" => Ok(Arc::new(ChatCompletionsGenerator::new(config)?)),
        "extractive" => Ok(Arc::new(ExtractiveGenerator)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client.
pub struct ChatCompletionsGenerator {
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl ChatCompletionsGenerator {
    /// Build a client; the API key is read from `config.api_key_env`.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow!("{} environment variable not set", config.api_key_env))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &GenerationConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    fn body<'a>(
        &'a self,
        request: &'a GenerationRequest,
        user_message: &'a str,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl AnswerGenerator for ChatCompletionsGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let user_message = request.user_message();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.body(request, &user_message))
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(format!("invalid response body: {}", e)))?;
        extract_answer(parsed)
    }
}

fn extract_answer(response: ChatResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(GenerationError::EmptyResponse)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GenerationConfig {
        GenerationConfig::default()
    }

    #[test]
    fn request_body_carries_prompt_and_sampling() {
        let generator = ChatCompletionsGenerator::with_api_key(&config(), "test-key").unwrap();
        let request = GenerationRequest::new("ctx", "What is X?");
        let user_message = request.user_message();
        let body = serde_json::to_value(generator.body(&request, &user_message)).unwrap();

        assert_eq!(body["model"], "llama-3.1-70b-versatile");
        assert_eq!(body["max_tokens"], 500);
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], request.system);
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("Question: What is X?"));
        assert_eq!(generator.endpoint, "https://api.groq.com/openai/v1/chat/completions");
    }

    #[test]
    fn empty_choices_are_an_error() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(extract_answer(parsed), Err(GenerationError::EmptyResponse)));

        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "  Answer.  "}}]}"#).unwrap();
        assert_eq!(extract_answer(parsed).unwrap(), "Answer.");
    }

    #[test]
    fn missing_api_key_is_reported() {
        let mut cfg = config();
        cfg.api_key_env = "STUDYMATE_TEST_UNSET_KEY_VAR".into();
        let err = ChatCompletionsGenerator::new(&cfg).err().unwrap();
        assert!(err.to_string().contains("STUDYMATE_TEST_UNSET_KEY_VAR"));
    }

    #[test]
    fn factory_selects_extractive() {
        let mut cfg = config();
        cfg.provider = "extractive".into();
        assert_eq!(create_generator(&cfg).unwrap().model_name(), "extractive");
    }
}
