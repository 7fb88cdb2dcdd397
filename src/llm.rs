//! Generation model abstraction.
//!
//! Defines the [`GenerationModel`] trait and the Hugging Face router
//! chat-completions implementation. One text prompt in, one text completion
//! out; no streaming.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{GenerationConfig, HF_TOKEN_VAR};

/// Seam between the QA pipeline and the hosted LLM.
#[async_trait]
pub trait GenerationModel: Send + Sync {
    /// Produce a completion for the prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Generation provider backed by the Hugging Face router's OpenAI-compatible
/// chat-completions endpoint.
///
/// Requires the `HF_TOKEN` environment variable. Transient errors (429, 5xx,
/// network) are retried with exponential backoff; other client errors fail
/// immediately.
pub struct HfGenerationModel {
    model: String,
    temperature: f32,
    max_tokens: usize,
    base_url: String,
    api_token: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl HfGenerationModel {
    /// Create a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `HF_TOKEN` is not in the environment, so a
    /// missing credential is fatal at startup.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_token = std::env::var(HF_TOKEN_VAR)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", HF_TOKEN_VAR))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token,
            max_retries: config.max_retries,
            client,
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

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: String,
}

#[async_trait]
impl GenerationModel for HfGenerationModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_token))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: ChatResponse = response
                            .json()
                            .await
                            .context("failed to parse chat completion response")?;
                        let content = parsed
                            .choices
                            .into_iter()
                            .next()
                            .map(|c| c.message.content)
                            .ok_or_else(|| anyhow::anyhow!("chat completion had no choices"))?;
                        return Ok(content);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Generation API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Generation API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Generation failed after retries")))
    }
}
