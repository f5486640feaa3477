// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use tracing::warn;

use crate::{strip_think_tags, ChatClient, ChatMessage, ChatRequest, UsageTracker};

/// Prompt for bounding a single document/answer summary.
pub const SUMMARIZE_CONTENT_PROMPT: &str = "Summarize the following content in at most \
{max_chars} characters. Keep key facts, names, numbers and conclusions. Respond with the \
summary only.\n\n{content}";

/// Prompt for whole-session compaction summaries.
pub const SUMMARIZE_SESSION_PROMPT: &str = "Summarize the following conversation so it can \
replace the full history in future turns. Preserve the user's goals, every decision and \
answer given, and any facts, URLs or numbers that were established.\n\n{content}";

/// Bounded-input summarization service.
///
/// Routes all summary generation (page summaries, query/answer summaries,
/// session compaction) through one smaller model.  Input is truncated to the
/// model's configured `max_chars` before the call; output is asked to stay
/// under the caller's character bound.
pub struct Summarizer {
    client: Arc<dyn ChatClient>,
    model_alias: String,
    max_input_chars: usize,
    usage: UsageTracker,
}

impl Summarizer {
    pub fn new(
        client: Arc<dyn ChatClient>,
        model_alias: impl Into<String>,
        max_input_chars: usize,
        usage: UsageTracker,
    ) -> Self {
        Self {
            client,
            model_alias: model_alias.into(),
            max_input_chars,
            usage,
        }
    }

    /// Summarize `content` using `prompt_template` (placeholders `{content}`
    /// and `{max_chars}`), bounding the output at `max_output_chars`.
    pub async fn summarize_content(
        &self,
        content: &str,
        prompt_template: &str,
        max_output_chars: usize,
    ) -> anyhow::Result<String> {
        let bounded = truncate_chars(content, self.max_input_chars);
        let prompt = prompt_template
            .replace("{max_chars}", &max_output_chars.to_string())
            .replace("{content}", bounded);

        let outcome = self
            .client
            .complete(ChatRequest {
                messages: vec![ChatMessage::user(prompt)],
                tools: vec![],
                use_tools: false,
            })
            .await?;

        self.usage.add(&self.model_alias, outcome.usage.total());
        Ok(strip_think_tags(outcome.message.text()).trim().to_string())
    }

    /// Produce `(query_summary, answer_summary)` for the interaction log.
    ///
    /// Best-effort: when the summarization model is unavailable the summaries
    /// degrade to plain character truncation rather than failing the turn.
    pub async fn generate_summaries(
        &self,
        query: &str,
        answer: &str,
        query_max_chars: usize,
        answer_max_chars: usize,
    ) -> (String, String) {
        let q = if query.len() <= query_max_chars {
            query.to_string()
        } else {
            match self
                .summarize_content(query, SUMMARIZE_CONTENT_PROMPT, query_max_chars)
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    warn!("query summarization failed, truncating: {e:#}");
                    truncate_chars(query, query_max_chars).to_string()
                }
            }
        };
        let a = if answer.len() <= answer_max_chars {
            answer.to_string()
        } else {
            match self
                .summarize_content(answer, SUMMARIZE_CONTENT_PROMPT, answer_max_chars)
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    warn!("answer summarization failed, truncating: {e:#}");
                    truncate_chars(answer, answer_max_chars).to_string()
                }
            }
        };
        (q, a)
    }
}

/// Truncate at a character boundary without splitting a UTF-8 code point.
fn truncate_chars(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
