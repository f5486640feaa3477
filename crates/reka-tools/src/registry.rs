// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::error;

use reka_model::{ToolCallPayload, ToolSchema};

use crate::{Tool, ToolContext};

/// Central registry holding all available tools.
///
/// Dispatch never raises: malformed arguments, unknown names and executor
/// failures all come back as `{"error": …}` result objects so the model can
/// see what went wrong and self-correct.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Schemas for the completion payload, sorted by name for a stable wire
    /// order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn dispatch(&self, call: &ToolCallPayload, ctx: &ToolContext) -> Value {
        let name = &call.function.name;
        let args_str = call.function.arguments.trim();

        let args: Value = if args_str.is_empty() {
            json!({})
        } else {
            match serde_json::from_str(args_str) {
                Ok(v) => v,
                Err(_) => {
                    return json!({ "error": format!("Invalid JSON arguments for tool: {name}") })
                }
            }
        };

        let Some(tool) = self.tools.get(name) else {
            return json!({ "error": format!("Unknown tool: {name}") });
        };

        match tool.execute(args, ctx).await {
            Ok(v) => v,
            Err(e) => {
                error!("Error executing tool '{name}': {e:#}");
                json!({ "error": format!("Tool execution failed: {e}") })
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
