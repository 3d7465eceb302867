//! # Chat Completions Generator
//!
//! [`ResponseGenerator`] backed by an OpenAI-compatible `/chat/completions`
//! endpoint. Groq is the default provider; any compatible API works by changing
//! `generator.api_base` and `generator.model`.

use super::prompt::{build_messages, ChatMessage};
use super::{GenerationRequest, GeneratorError, ResponseGenerator};
use crate::config::GeneratorConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for one language model deployment. Cheap to share behind an `Arc`;
/// `reqwest::Client` pools connections internally.
pub struct ChatCompletionsGenerator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionsGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: completions_url(&config.api_base),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn completions_url(api_base: &str) -> String {
    format!("{}/chat/completions", api_base.trim_end_matches('/'))
}

/// First non-blank completion in the response.
fn extract_reply(response: CompletionResponse) -> Result<String, GeneratorError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(GeneratorError::EmptyCompletion)
}

#[async_trait]
impl ResponseGenerator for ChatCompletionsGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GeneratorError> {
        let api_key = self.api_key.as_deref().ok_or(GeneratorError::MissingApiKey)?;

        let body = CompletionRequest {
            model: &self.model,
            messages: build_messages(&request),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(
            model = %self.model,
            messages = body.messages.len(),
            "Requesting chat completion"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        extract_reply(response.json::<CompletionResponse>().await?)
    }
}
