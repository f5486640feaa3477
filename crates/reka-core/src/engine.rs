// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The conversation engine: a bounded multi-turn loop over one chat model
//! with tool dispatch.
//!
//! Each turn sends the full message list (with a freshly recomputed status
//! suffix on the system prompt), extracts tool calls from the reply —
//! structured `tool_calls` first, a textual fallback otherwise — dispatches
//! them in order, and appends one `tool` message per call.  A reply without
//! tool calls is the final answer.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use serde_json::json;
use tracing::{debug, error, info};

use reka_model::{
    estimate_tokens, strip_think_tags, ChatClient, ChatMessage, ChatRequest, FunctionCall, Role,
    ToolCallPayload,
};
use reka_tools::{ToolContext, ToolRegistry};

const STATUS_MARKER: &str = "\n\n[SYSTEM UPDATE]:";

pub struct ConversationEngine {
    client: Arc<dyn ChatClient>,
    registry: Arc<ToolRegistry>,
    tool_ctx: ToolContext,
    max_turns: u32,
    context_size: usize,
    model_alias: String,
}

impl ConversationEngine {
    pub fn new(
        client: Arc<dyn ChatClient>,
        registry: Arc<ToolRegistry>,
        tool_ctx: ToolContext,
        max_turns: u32,
        context_size: usize,
        model_alias: impl Into<String>,
    ) -> Self {
        Self {
            client,
            registry,
            tool_ctx,
            max_turns,
            context_size,
            model_alias: model_alias.into(),
        }
    }

    /// Run the multi-turn loop and return the final answer (possibly empty
    /// when the turn budget runs out or the model endpoint fails).
    pub async fn run(&self, mut messages: Vec<ChatMessage>) -> String {
        let started = Instant::now();
        let mut final_answer = String::new();
        let mut turn = 0u32;

        let original_system_prompt = messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.text().to_string());

        while turn < self.max_turns {
            turn += 1;
            info!("Starting turn {turn}/{}", self.max_turns);

            // The suffix is always derived from the original prompt captured
            // above, never from the previous turn's suffixed version.
            let total_tokens = estimate_tokens(&messages);
            if let Some(original) = &original_system_prompt {
                let status = status_suffix(total_tokens, self.context_size, turn, self.max_turns);
                messages[0].content = Some(format!("{original}{status}"));
            }

            let outcome = match self
                .client
                .complete(ChatRequest {
                    messages: messages.clone(),
                    tools: self.registry.schemas(),
                    use_tools: true,
                })
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Engine failure: {e:#}");
                    break;
                }
            };

            self.tool_ctx
                .usage
                .add(&self.model_alias, outcome.usage.total());

            let calls = extract_calls(&outcome.message, turn);
            if calls.is_empty() {
                final_answer = strip_think_tags(outcome.message.text());
                break;
            }

            messages.push(outcome.message);
            for call in &calls {
                debug!(tool = %call.function.name, id = %call.id, "dispatching tool call");
                let result = self.registry.dispatch(call, &self.tool_ctx).await;
                debug!(tool = %call.function.name, bytes = result.to_string().len(), "tool result");
                let content =
                    serde_json::to_string(&result).unwrap_or_else(|_| json!({}).to_string());
                messages.push(ChatMessage::tool_result(&call.id, content));
            }
        }

        if final_answer.is_empty() && turn >= self.max_turns {
            info!("Error: Max turns reached.");
        }
        info!(
            "Query completed in {:.2} seconds",
            started.elapsed().as_secs_f64()
        );
        final_answer
    }
}

/// The per-turn status block appended to the system prompt.
///
/// Kept byte-compatible with the historical format, including the missing
/// separator between the percentage and the turn counter.
pub fn status_suffix(total_tokens: usize, context_size: usize, turn: u32, max_turns: u32) -> String {
    let context_size = context_size.max(1);
    let turns_left = max_turns - turn + 1;
    format!(
        "{STATUS_MARKER}\n- Context Used: {:.2}%- Turns Remaining: {turns_left} (out of {max_turns})\n\
         Please manage your context usage efficiently.",
        total_tokens as f64 / context_size as f64 * 100.0
    )
}

/// Recover the original system prompt from a suffixed one.
pub fn strip_status_suffix(content: &str) -> &str {
    match content.find(STATUS_MARKER) {
        Some(pos) => &content[..pos],
        None => content,
    }
}

/// Extract tool calls from an assistant message.
///
/// Structured `tool_calls` win.  Otherwise a textual fallback recognises
/// `to=functions.<name>` plus a JSON-object argument blob in the content and
/// synthesises a call with id `textual_call_<turn>`.
pub fn extract_calls(msg: &ChatMessage, turn: u32) -> Vec<ToolCallPayload> {
    if let Some(calls) = &msg.tool_calls {
        if !calls.is_empty() {
            return calls.clone();
        }
    }
    match parse_textual_tool_call(msg.text()) {
        Some((name, arguments)) => vec![ToolCallPayload {
            id: format!("textual_call_{turn}"),
            call_type: "function".into(),
            function: FunctionCall { name, arguments },
        }],
        None => Vec::new(),
    }
}

fn parse_textual_tool_call(text: &str) -> Option<(String, String)> {
    if text.is_empty() {
        return None;
    }
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    static ARGS_RE: OnceLock<Regex> = OnceLock::new();
    let name_re = NAME_RE
        .get_or_init(|| Regex::new(r"to=functions\.([a-zA-Z0-9_]+)").expect("valid regex"));
    let args_re = ARGS_RE.get_or_init(|| Regex::new(r"(?s)(\{.*\})").expect("valid regex"));

    let name = name_re.captures(text)?.get(1)?.as_str().to_string();
    let blob = args_re.captures(text)?.get(1)?.as_str();
    // Only a blob that parses as JSON counts as arguments.
    serde_json::from_str::<serde_json::Value>(blob).ok()?;
    Some((name, blob.to_string()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
