//! LLM agent module: the model provider behind every topic prompt.
//!
//! Talks to the Perplexity chat completions API with fixed decoding
//! parameters and returns the text of the top completion.

use crate::config::{AgentConfig, Config, ConfigError};
use crate::extract::ExtractError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// User-Agent string sent to upstream providers
pub(crate) const USER_AGENT: &str = concat!("politiko/", env!("CARGO_PKG_VERSION"));

/// How much of an error body to keep
const ERROR_BODY_LEN: usize = 500;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("model request failed: {0}")]
    Upstream(String),
    #[error("model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model request timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to parse response: {0}")]
    Parse(#[from] ExtractError),
    #[error("response does not match the {topic} schema: {source}")]
    Schema {
        topic: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

impl AgentError {
    /// Failures worth another attempt: transport errors, rate limits, 5xx, timeouts.
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Upstream(_) | AgentError::Timeout(_) => true,
            AgentError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// The model answered but its answer could not be used.
    pub fn is_parse(&self) -> bool {
        matches!(self, AgentError::Parse(_) | AgentError::Schema { .. })
    }
}

/// A model that turns a prompt into free text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AgentError>;
}

/// Bounded retry with linear backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        is_transient: impl Fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    attempt += 1;
                    tracing::warn!(call = label, attempt, error = %e, "upstream call failed, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Message<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// Request body for the chat completions endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: [Message<'a>; 2],
    pub temperature: f32,
    pub top_p: f32,
    pub search_domain_filter: &'a [String],
    pub return_images: bool,
    pub return_related_questions: bool,
    pub search_recency_filter: &'a str,
    pub top_k: u32,
    pub stream: bool,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

/// Perplexity chat completions client.
pub struct PerplexityClient {
    http: Client,
    api_key: String,
    settings: AgentConfig,
    timeout: Duration,
    retry: RetryPolicy,
}

impl PerplexityClient {
    pub fn new(config: &Config) -> Result<Self, AgentError> {
        let api_key = config.perplexity_key()?.to_string();
        let settings = config.agent.clone();
        let timeout = Duration::from_secs(settings.timeout_secs);

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AgentError::Upstream(e.to_string()))?;

        let retry = RetryPolicy {
            max_retries: settings.max_retries,
            backoff: Duration::from_millis(settings.retry_backoff_ms),
        };

        Ok(Self {
            http,
            api_key,
            settings,
            timeout,
            retry,
        })
    }

    pub(crate) fn request_body<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        build_request(&self.settings, prompt)
    }

    /// One attempt, bounded as a whole (connect, send and body read) by the timeout.
    async fn send_once(&self, body: &ChatRequest<'_>) -> Result<String, AgentError> {
        tokio::time::timeout(self.timeout, self.post(body))
            .await
            .map_err(|_| AgentError::Timeout(self.timeout))?
    }

    async fn post(&self, body: &ChatRequest<'_>) -> Result<String, AgentError> {
        let response = self
            .http
            .post(&self.settings.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::Status {
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_LEN).collect(),
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Upstream(format!("invalid completion payload: {}", e)))?;

        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AgentError::Upstream("completion has no choices".to_string()))
    }
}

#[async_trait]
impl ChatModel for PerplexityClient {
    async fn complete(&self, prompt: &str) -> Result<String, AgentError> {
        let body = self.request_body(prompt);
        let text = self
            .retry
            .run("completion", AgentError::is_transient, || self.send_once(&body))
            .await?;
        tracing::debug!(model = %self.settings.model, chars = text.len(), "completion received");
        Ok(text)
    }
}

pub(crate) fn build_request<'a>(settings: &'a AgentConfig, prompt: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model: &settings.model,
        messages: [
            Message {
                role: "system",
                content: &settings.system_prompt,
            },
            Message {
                role: "user",
                content: prompt,
            },
        ],
        temperature: settings.temperature,
        top_p: settings.top_p,
        search_domain_filter: &settings.domains,
        return_images: false,
        return_related_questions: false,
        search_recency_filter: &settings.recency_filter,
        top_k: 0,
        stream: false,
        presence_penalty: 0.0,
        frequency_penalty: 1.0,
    }
}
