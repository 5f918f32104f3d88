//! Anthropic Messages API client.

use super::{HttpTimeouts, LlmProvider};
use crate::config::LlmConfig;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

const API_VERSION: &str = "2023-06-01";

/// Intent labels are short; a small cap keeps the call fast.
const MAX_TOKENS: u32 = 256;

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    api_key: SecretString,
    base_url: String,
    model: String,
    http: reqwest::blocking::Client,
}

impl AnthropicClient {
    /// Default API base URL.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com/v1";

    /// Default model, a fast one suited to labeling.
    pub const DEFAULT_MODEL: &'static str = "claude-3-5-haiku-latest";

    /// Builds a client from the `[llm]` settings.
    ///
    /// The key comes from the settings, else `ANTHROPIC_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when no key is available or the key
    /// does not look like an Anthropic key, and an operation error when the
    /// HTTP client cannot be built.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok().map(SecretString::from))
            .ok_or_else(|| Error::InvalidInput("no Anthropic API key configured".to_string()))?;
        if !looks_like_key(api_key.expose_secret()) {
            return Err(Error::InvalidInput(
                "Anthropic API key must start with 'sk-ant-'".to_string(),
            ));
        }

        Ok(Self {
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            http: HttpTimeouts::from_env().client()?,
        })
    }

    /// The model requests go to.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.base_url.trim_end_matches('/'))
    }
}

/// Keys are `sk-ant-` followed by URL-safe characters.
fn looks_like_key(key: &str) -> bool {
    key.strip_prefix("sk-ant-").is_some_and(|rest| {
        rest.len() >= 20 && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// Short label for a transport failure.
fn failure_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_decode() {
        "decode"
    } else {
        "request"
    }
}

impl LlmProvider for AnthropicClient {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    #[instrument(skip_all, fields(provider = "anthropic", model = %self.model))]
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages: [Message {
                role: "user",
                content: user,
            }],
        };

        let response = self
            .http
            .post(self.messages_url())
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .map_err(|e| {
                let kind = failure_kind(&e);
                tracing::warn!(error = %e, kind, "LLM request failed");
                Error::operation("anthropic_request", format!("{kind}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "LLM API returned an error status");
            return Err(Error::operation(
                "anthropic_request",
                format!("status {status}"),
            ));
        }

        let parsed: MessagesResponse = response
            .json()
            .map_err(|e| Error::operation("anthropic_response", e))?;
        parsed
            .into_text()
            .ok_or_else(|| Error::operation("anthropic_response", "no text content"))
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl MessagesResponse {
    /// Concatenated text blocks, `None` if there are none.
    fn into_text(self) -> Option<String> {
        let text: String = self
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();
        (!text.is_empty()).then_some(text)
    }
}
