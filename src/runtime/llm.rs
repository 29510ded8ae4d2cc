//! Remote LLM client speaking the OpenAI-compatible chat-completions API.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
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
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Client for remote model steps. Configured from `OPENAI_API_KEY`,
/// `OPENAI_BASE_URL` and `OPENAI_MODEL`.
pub struct LlmRuntime {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl Default for LlmRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmRuntime {
    pub fn new() -> Self {
        let cfg = config::get();
        if cfg.openai_api_key.is_empty() {
            println!("⚠️ OPENAI_API_KEY not set, LLM won't work");
        }
        Self {
            client: reqwest::Client::new(),
            api_key: cfg.openai_api_key.clone(),
            base_url: cfg.openai_base_url.trim_end_matches('/').to_string(),
            default_model: cfg.openai_model.clone(),
        }
    }

    /// Generates a completion for `prompt`. An empty `model` falls back to
    /// the configured default; `max_tokens` of zero leaves the cap to the
    /// backend.
    pub async fn generate(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String> {
        let model = if model.is_empty() {
            self.default_model.as_str()
        } else {
            model
        };

        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: (max_tokens > 0).then_some(max_tokens),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("LLM request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("LLM request failed with {}: {}", status, body);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to decode LLM response")?;
        match parsed.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content),
            None => bail!("LLM response contained no choices"),
        }
    }
}
