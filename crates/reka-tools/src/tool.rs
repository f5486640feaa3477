// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use reka_model::{Summarizer, UsageTracker};

/// Per-dispatch context handed to every executor.
///
/// One uniform signature instead of per-executor optional parameters: tools
/// that do not care about a field simply ignore it.  Argument values supplied
/// by the model always take precedence over these defaults (e.g. a per-call
/// `summarize` flag overrides [`ToolContext::summarize`]).
#[derive(Clone, Default)]
pub struct ToolContext {
    /// Global summarize flag (`--summarize`).
    pub summarize: bool,
    /// Shared token accounting.
    pub usage: UsageTracker,
    /// Alias of the conversation model, for `${model}` templating.
    pub model_alias: String,
    /// The user query driving this conversation, for `${query}` templating.
    pub query: Option<String>,
    /// The final answer; only set for dispatches made after the turn loop.
    pub answer: Option<String>,
    /// Summarization service; absent in minimal wiring, in which case
    /// summarize requests degrade to raw content.
    pub summarizer: Option<Arc<Summarizer>>,
}

/// Trait every built-in and user-defined tool implements.
///
/// Executors return `Err` for failures; the registry wraps errors into the
/// `{"error": …}` result object the model sees, so a failing tool can never
/// abort the conversation loop.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the parameters object.
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value>;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
