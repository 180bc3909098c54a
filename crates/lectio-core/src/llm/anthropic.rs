//! Anthropic Messages API backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CompletionRequest, LlmError, TextGenerator};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Upper bound on a single HTTP exchange. Pipeline timeouts are shorter and
/// take precedence.
const HTTP_TIMEOUT: Duration = Duration::from_secs(600);

pub struct AnthropicGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicGenerator {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Misconfiguration("Anthropic API key is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Misconfiguration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model,
        })
    }

    /// Read the API key from `api_key_env`.
    pub fn from_env(api_key_env: &str, model: String, base_url: Option<String>) -> Result<Self, LlmError> {
        let api_key = std::env::var(api_key_env).map_err(|_| {
            LlmError::Misconfiguration(format!(
                "Anthropic API key not found in environment variable '{api_key_env}'"
            ))
        })?;
        Self::new(api_key, model, base_url)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        }
    }
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        tracing::debug!(
            model = %self.model,
            max_tokens = request.max_tokens,
            temperature = request.temperature,
            prompt_chars = request.prompt.len(),
            "invoking Anthropic backend"
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(HTTP_TIMEOUT)
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Transport(format!(
                "Anthropic returned {status}: {}",
                detail.chars().take(500).collect::<String>()
            )));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("failed to parse Anthropic response: {e}")))?;

        let text = body.text();
        if text.is_empty() {
            return Err(LlmError::Transport(
                "Anthropic response missing text content".to_string(),
            ));
        }
        if let Some(usage) = &body.usage {
            tracing::debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                stop_reason = body.stop_reason.as_deref().unwrap_or("unknown"),
                "Anthropic invocation completed"
            );
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}
