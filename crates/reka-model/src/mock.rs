// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    ChatClient, ChatMessage, ChatOutcome, ChatRequest, FunctionCall, ToolCallPayload, Usage,
};

enum Fallback {
    Message(ChatMessage),
    Error(String),
}

/// A pre-scripted chat client.  Each `complete` call pops the next scripted
/// result from the front of the queue, letting tests specify exact response
/// sequences — including tool calls — without network access.
pub struct ScriptedChatClient {
    scripts: Mutex<Vec<anyhow::Result<ChatMessage>>>,
    /// Behaviour once the scripts are exhausted.
    fallback: Mutex<Option<Fallback>>,
    last_request: Mutex<Option<ChatRequest>>,
    calls: Mutex<u32>,
}

impl ScriptedChatClient {
    pub fn new(scripts: Vec<anyhow::Result<ChatMessage>>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            fallback: Mutex::new(None),
            last_request: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }

    /// Client that always returns the same text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let client = Self::new(Vec::new());
        *client.fallback.lock().unwrap() =
            Some(Fallback::Message(ChatMessage::assistant(reply.into())));
        client
    }

    /// Client whose every call fails with the given message.
    pub fn always_error(msg: impl Into<String>) -> Self {
        let client = Self::new(Vec::new());
        *client.fallback.lock().unwrap() = Some(Fallback::Error(msg.into()));
        client
    }

    /// Convenience: a tool call on the first turn, a text reply on the second.
    pub fn tool_then_text(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            Ok(tool_call_message(call_id, tool_name, args_json)),
            Ok(ChatMessage::assistant(final_text.into())),
        ])
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    /// The most recent request seen, for assertions on what was sent.
    pub fn last_request(&self) -> Option<ChatRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

/// Build an assistant message carrying one structured tool call.
pub fn tool_call_message(
    call_id: impl Into<String>,
    tool_name: impl Into<String>,
    args_json: impl Into<String>,
) -> ChatMessage {
    ChatMessage {
        role: crate::Role::Assistant,
        content: None,
        tool_calls: Some(vec![ToolCallPayload {
            id: call_id.into(),
            call_type: "function".into(),
            function: FunctionCall {
                name: tool_name.into(),
                arguments: args_json.into(),
            },
        }]),
        tool_call_id: None,
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn complete(&self, req: ChatRequest) -> anyhow::Result<ChatOutcome> {
        *self.last_request.lock().unwrap() = Some(req);
        *self.calls.lock().unwrap() += 1;

        let next = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                None
            } else {
                Some(scripts.remove(0))
            }
        };

        let message = match next {
            Some(Ok(m)) => m,
            Some(Err(e)) => return Err(e),
            None => match &*self.fallback.lock().unwrap() {
                Some(Fallback::Message(m)) => m.clone(),
                Some(Fallback::Error(text)) => anyhow::bail!("{text}"),
                None => ChatMessage::assistant("[no more scripts]"),
            },
        };

        Ok(ChatOutcome {
            message,
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 10,
            },
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
