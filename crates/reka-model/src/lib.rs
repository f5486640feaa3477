// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod client;
mod mock;
mod summarize;
mod types;
mod usage;

pub use client::{ChatClient, ChatOutcome, ChatRequest, HttpChatClient};
pub use mock::{tool_call_message, ScriptedChatClient};
pub use summarize::{Summarizer, SUMMARIZE_CONTENT_PROMPT, SUMMARIZE_SESSION_PROMPT};
pub use types::{
    estimate_text_tokens, estimate_tokens, strip_think_tags, ChatMessage, FunctionCall, Role,
    ToolCallPayload, ToolSchema, Usage,
};
pub use usage::UsageTracker;
