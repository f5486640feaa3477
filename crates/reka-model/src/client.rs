// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP chat-completion client for OpenAI-compatible endpoints.
//!
//! One client is constructed per resolved model configuration; the API key is
//! resolved once at construction (literal value or named environment
//! variable).  Requests are plain POSTs expecting `choices[0].message` in the
//! response — no streaming.
//!
//! # Retry policy
//! - HTTP 429: honour `Retry-After` (integer or float seconds) when present,
//!   otherwise exponential backoff starting at 2s, doubling, capped at 60s.
//! - HTTP 5xx and transport errors (timeout, connection): same backoff.
//! - Other HTTP errors (4xx): fatal, surfaced immediately.
//! - At most 10 attempts.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use reka_config::ModelConfig;

use crate::{estimate_tokens, ChatMessage, ToolSchema, Usage};

const MAX_RETRIES: u32 = 10;
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// One completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSchema>,
    /// When false, no tool schemas are sent (summarization calls).
    pub use_tools: bool,
}

/// The assistant message plus the usage attributed to the call.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub message: ChatMessage,
    pub usage: Usage,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, req: ChatRequest) -> anyhow::Result<ChatOutcome>;
}

pub struct HttpChatClient {
    model_id: String,
    url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpChatClient {
    /// Build a client from a hydrated model configuration.
    ///
    /// A model without a `base_url` is a configuration error.  A configured
    /// `api_key_env` that is absent from the environment is only a warning:
    /// local servers accept unauthenticated requests.
    pub fn new(model: &ModelConfig, timeout_secs: u64, user_agent: &str) -> anyhow::Result<Self> {
        let url = model
            .base_url
            .clone()
            .with_context(|| format!("model '{}' has no base_url configured", model.alias))?;

        let api_key = match (&model.api_key, &model.api_key_env) {
            (Some(key), _) => Some(key.clone()),
            (None, Some(env_var)) => {
                let key = std::env::var(env_var).ok().filter(|k| !k.is_empty());
                if key.is_none() {
                    info!("Warning: {env_var} not found in environment variables.");
                }
                key
            }
            (None, None) => None,
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent.to_string())
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            model_id: model.id.clone(),
            url,
            api_key,
            http,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn try_once(&self, payload: &Value, tokens_sent: usize) -> Result<ChatOutcome, Failure> {
        let mut req = self.http.post(&self.url).json(payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| {
            Failure::Transient(anyhow::Error::new(e).context("chat request failed"))
        })?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = resp.text().await.unwrap_or_default();
            return Err(match classify_status(status.as_u16()) {
                RetryClass::RateLimited => Failure::RateLimited(retry_after),
                RetryClass::Transient => {
                    Failure::Transient(anyhow::anyhow!("chat endpoint error {status}: {body}"))
                }
                RetryClass::Fatal => {
                    Failure::Fatal(anyhow::anyhow!("chat endpoint error {status}: {body}"))
                }
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| Failure::Fatal(anyhow::Error::new(e).context("decoding response")))?;

        let raw_message = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .cloned()
            .ok_or_else(|| Failure::Fatal(anyhow::anyhow!("response has no choices[0].message")))?;
        let message: ChatMessage = serde_json::from_value(raw_message.clone())
            .map_err(|e| Failure::Fatal(anyhow::Error::new(e).context("decoding message")))?;

        // Prefer reported usage; fall back to the chars/4 estimate.
        let usage_obj = body.get("usage").cloned().unwrap_or(Value::Null);
        let prompt_tokens = usage_obj
            .get("prompt_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(tokens_sent as u64);
        let completion_tokens = usage_obj
            .get("completion_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or_else(|| {
                (serde_json::to_string(&raw_message)
                    .map(|s| s.len())
                    .unwrap_or(0)
                    / 4) as u64
            });

        Ok(ChatOutcome {
            message,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
            },
        })
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn complete(&self, req: ChatRequest) -> anyhow::Result<ChatOutcome> {
        let mut payload = json!({
            "model": self.model_id,
            "messages": req.messages,
        });
        if req.use_tools {
            payload["tools"] = Value::Array(req.tools.iter().map(|t| t.to_payload()).collect());
            payload["tool_choice"] = json!("auto");
        }

        let tokens_sent = estimate_tokens(&req.messages);
        info!(model = %self.model_id, tokens_sent, "sending completion request");
        debug!(message_count = req.messages.len(), tool_count = req.tools.len());

        let mut backoff = INITIAL_BACKOFF;
        for attempt in 0..MAX_RETRIES {
            match self.try_once(&payload, tokens_sent).await {
                Ok(outcome) => return Ok(outcome),
                Err(Failure::Fatal(e)) => return Err(e),
                Err(failure) if attempt + 1 < MAX_RETRIES => {
                    let wait = match &failure {
                        Failure::RateLimited(Some(retry_after)) => *retry_after,
                        _ => {
                            let w = backoff;
                            backoff = next_backoff(backoff);
                            w
                        }
                    };
                    match failure {
                        Failure::RateLimited(_) => warn!(
                            "Rate limit exceeded (429). Retrying in {} seconds...",
                            wait.as_secs_f64()
                        ),
                        Failure::Transient(e) => {
                            warn!("Request error: {e:#}. Retrying in {} seconds...", wait.as_secs())
                        }
                        Failure::Fatal(_) => unreachable!("handled above"),
                    }
                    tokio::time::sleep(wait).await;
                }
                Err(Failure::RateLimited(_)) => anyhow::bail!("rate limited after {MAX_RETRIES} attempts"),
                Err(Failure::Transient(e)) => return Err(e.context("max retries exceeded")),
            }
        }
        anyhow::bail!("max retries exceeded")
    }
}

enum Failure {
    /// 429; the payload is the parsed Retry-After duration, when present.
    RateLimited(Option<Duration>),
    Transient(anyhow::Error),
    Fatal(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryClass {
    RateLimited,
    Transient,
    Fatal,
}

/// 429 → rate limited, 5xx → transient, anything else non-success → fatal.
fn classify_status(status: u16) -> RetryClass {
    match status {
        429 => RetryClass::RateLimited,
        500..=599 => RetryClass::Transient,
        _ => RetryClass::Fatal,
    }
}

/// Parse a `Retry-After` value in seconds.  Accepts integers and floating
/// point strings ("5", "5.0"); HTTP-date forms are not supported and yield
/// `None` so the caller falls back to the backoff schedule.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}

/// Double the delay, capped at [`MAX_BACKOFF`].
fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── classify_status ───────────────────────────────────────────────────────

    #[test]
    fn status_429_is_rate_limited() {
        assert_eq!(classify_status(429), RetryClass::RateLimited);
    }

    #[test]
    fn status_5xx_is_transient() {
        assert_eq!(classify_status(500), RetryClass::Transient);
        assert_eq!(classify_status(502), RetryClass::Transient);
        assert_eq!(classify_status(599), RetryClass::Transient);
    }

    #[test]
    fn status_4xx_is_fatal() {
        assert_eq!(classify_status(400), RetryClass::Fatal);
        assert_eq!(classify_status(401), RetryClass::Fatal);
        assert_eq!(classify_status(404), RetryClass::Fatal);
    }

    // ── parse_retry_after ─────────────────────────────────────────────────────

    #[test]
    fn retry_after_integer_seconds() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn retry_after_float_seconds() {
        assert_eq!(parse_retry_after("5.0"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("0.5"), Some(Duration::from_millis(500)));
    }

    #[test]
    fn retry_after_zero_is_valid() {
        // Servers may ask for an immediate retry; "0" must not fall back to
        // the backoff schedule.
        assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
    }

    #[test]
    fn retry_after_garbage_is_none() {
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("-3"), None);
    }

    // ── next_backoff ──────────────────────────────────────────────────────────

    #[test]
    fn backoff_doubles_from_initial() {
        let schedule: Vec<u64> = std::iter::successors(Some(INITIAL_BACKOFF), |d| {
            Some(next_backoff(*d))
        })
        .take(7)
        .map(|d| d.as_secs())
        .collect();
        assert_eq!(schedule, vec![2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn backoff_never_exceeds_cap() {
        let mut d = INITIAL_BACKOFF;
        for _ in 0..20 {
            d = next_backoff(d);
            assert!(d <= MAX_BACKOFF);
        }
    }

    // ── construction ──────────────────────────────────────────────────────────

    #[test]
    fn client_requires_base_url() {
        let model = ModelConfig {
            id: "m".into(),
            alias: "m".into(),
            ..Default::default()
        };
        assert!(HttpChatClient::new(&model, 30, "reka-test").is_err());
    }

    #[test]
    fn client_uses_literal_api_key() {
        let model = ModelConfig {
            id: "m".into(),
            alias: "m".into(),
            base_url: Some("http://localhost:1234/v1/chat/completions".into()),
            api_key: Some("secret".into()),
            ..Default::default()
        };
        let client = HttpChatClient::new(&model, 30, "reka-test").unwrap();
        assert_eq!(client.api_key.as_deref(), Some("secret"));
        assert_eq!(client.model_id(), "m");
    }

    #[test]
    fn client_missing_env_key_is_not_fatal() {
        let model = ModelConfig {
            id: "m".into(),
            alias: "m".into(),
            base_url: Some("http://localhost:1234/v1/chat/completions".into()),
            api_key_env: Some("REKA_TEST_KEY_THAT_DOES_NOT_EXIST".into()),
            ..Default::default()
        };
        let client = HttpChatClient::new(&model, 30, "reka-test").unwrap();
        assert!(client.api_key.is_none());
    }
}
