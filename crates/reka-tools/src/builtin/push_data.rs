// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Push-data tools: outbound HTTP requests templated from configuration.
//!
//! Field resolution is two-phase:
//! 1. keys ending in `_env` name an environment variable; the suffix is
//!    stripped and the variable's value used (missing → definite error);
//! 2. `${name}` placeholder values resolve against the special variables
//!    (`query`, `answer`, `timestamp`, `model`) first, then against the
//!    dynamic arguments supplied by the model (missing → definite error).
//!
//! Anything else is a static literal.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info};

use reka_config::PushEndpointConfig;

use crate::tool::{Tool, ToolContext};

const SPECIAL_VARIABLES: [&str; 4] = ["query", "answer", "timestamp", "model"];
const PUSH_TIMEOUT_SECS: u64 = 30;

pub struct PushDataTool {
    name: String,
    description: String,
    config: PushEndpointConfig,
}

impl PushDataTool {
    pub fn new(name: impl Into<String>, config: PushEndpointConfig) -> Self {
        let name = name.into();
        let description = config
            .description
            .clone()
            .unwrap_or_else(|| format!("Push data to the '{name}' endpoint."));
        Self {
            name,
            description,
            config,
        }
    }

    /// Placeholder names used in fields that are neither special variables
    /// nor env-resolved; these become the tool's string parameters.
    fn dynamic_parameters(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .config
            .fields
            .iter()
            .filter(|(k, _)| !k.ends_with("_env"))
            .filter_map(|(_, v)| placeholder_name(v))
            .filter(|n| !SPECIAL_VARIABLES.contains(&n.as_str()))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[async_trait]
impl Tool for PushDataTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        let params = self.dynamic_parameters();
        let properties: serde_json::Map<String, Value> = params
            .iter()
            .map(|n| (n.clone(), json!({ "type": "string" })))
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": params,
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let dynamic: HashMap<String, String> = args
            .as_object()
            .map(|o| {
                o.iter()
                    .map(|(k, v)| {
                        let s = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), s)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut special = HashMap::new();
        if let Some(q) = &ctx.query {
            special.insert("query".to_string(), q.clone());
        }
        if let Some(a) = &ctx.answer {
            special.insert("answer".to_string(), a.clone());
        }
        if !ctx.model_alias.is_empty() {
            special.insert("model".to_string(), ctx.model_alias.clone());
        }
        special.insert(
            "timestamp".to_string(),
            chrono::Utc::now().to_rfc3339(),
        );

        Ok(execute_push(&self.name, &self.config, &dynamic, &special).await)
    }
}

/// Execute a push request; failures come back as `{success: false, error}`
/// result objects rather than errors so the model can react to them.
pub async fn execute_push(
    endpoint_name: &str,
    config: &PushEndpointConfig,
    dynamic_args: &HashMap<String, String>,
    special_vars: &HashMap<String, String>,
) -> Value {
    let method = config.method.to_lowercase();
    if method != "get" && method != "post" {
        return json!({
            "success": false,
            "error": format!("Endpoint '{endpoint_name}' has invalid method: {method}"),
            "endpoint": endpoint_name,
        });
    }

    let headers = match resolve_headers(&config.headers) {
        Ok(h) => h,
        Err(e) => {
            error!("Failed to resolve headers for endpoint '{endpoint_name}': {e}");
            return json!({ "success": false, "error": e.to_string(), "endpoint": endpoint_name });
        }
    };

    let payload = match build_payload(&config.fields, dynamic_args, special_vars) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to build payload for endpoint '{endpoint_name}': {e}");
            return json!({ "success": false, "error": e.to_string(), "endpoint": endpoint_name });
        }
    };

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(PUSH_TIMEOUT_SECS))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            return json!({ "success": false, "error": e.to_string(), "endpoint": endpoint_name })
        }
    };

    let mut req = if method == "get" {
        client.get(&config.url).query(&payload)
    } else {
        client.post(&config.url).json(&payload)
    };
    for (name, value) in &headers {
        req = req.header(name.as_str(), value.as_str());
    }

    match req.send().await {
        Ok(resp) if resp.status().is_success() => {
            info!(
                "Successfully pushed data to '{endpoint_name}': {}",
                resp.status()
            );
            json!({
                "success": true,
                "endpoint": endpoint_name,
                "status_code": resp.status().as_u16(),
                "url": config.url,
            })
        }
        Ok(resp) => json!({
            "success": false,
            "error": format!("endpoint returned {}", resp.status()),
            "endpoint": endpoint_name,
            "url": config.url,
        }),
        Err(e) => {
            error!("Failed to push data to '{endpoint_name}': {e}");
            json!({
                "success": false,
                "error": e.to_string(),
                "endpoint": endpoint_name,
                "url": config.url,
            })
        }
    }
}

/// Phase 1: `_env`-suffixed keys become headers named without the suffix,
/// valued from the environment.
pub fn resolve_headers(
    headers_config: &HashMap<String, String>,
) -> anyhow::Result<HashMap<String, String>> {
    let mut resolved = HashMap::new();
    for (key, value) in headers_config {
        if let Some(header_name) = key.strip_suffix("_env") {
            let env_value = std::env::var(value)
                .map_err(|_| anyhow::anyhow!("Environment variable '{value}' not found"))?;
            resolved.insert(header_name.to_string(), env_value);
        } else {
            resolved.insert(key.clone(), value.clone());
        }
    }
    Ok(resolved)
}

/// Phase 2: resolve every field against env / special / dynamic variables.
pub fn build_payload(
    fields_config: &HashMap<String, String>,
    dynamic_args: &HashMap<String, String>,
    special_vars: &HashMap<String, String>,
) -> anyhow::Result<HashMap<String, String>> {
    let mut payload = HashMap::new();
    for (key, value) in fields_config {
        let resolved = resolve_field_value(key, value, dynamic_args, special_vars)?;
        let key = key.strip_suffix("_env").unwrap_or(key);
        payload.insert(key.to_string(), resolved);
    }
    Ok(payload)
}

fn resolve_field_value(
    key: &str,
    value: &str,
    dynamic_args: &HashMap<String, String>,
    special_vars: &HashMap<String, String>,
) -> anyhow::Result<String> {
    if key.ends_with("_env") {
        return std::env::var(value)
            .map_err(|_| anyhow::anyhow!("Environment variable '{value}' not found"));
    }

    if let Some(name) = placeholder_name(value) {
        if SPECIAL_VARIABLES.contains(&name.as_str()) {
            return special_vars
                .get(&name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Special variable '{name}' not available"));
        }
        return dynamic_args
            .get(&name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {name}"));
    }

    Ok(value.to_string())
}

/// `"${name}"` → `Some("name")`, anything else → `None`.
fn placeholder_name(value: &str) -> Option<String> {
    value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .map(str::to_string)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
