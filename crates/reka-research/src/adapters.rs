// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Source adapters: routing of URI-like research targets to custom tools.
//!
//! A configured adapter maps a prefix (`local://`, `intranet://`) to the
//! custom tools that discover and read targets in that family.  Adapter
//! output is normalized into the same `{title, content, links}` shape the
//! HTTP fetch path produces, so everything downstream is agnostic.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use reka_config::{CustomToolConfig, SourceAdapterConfig};
use reka_tools::builtin::custom::run_custom_command;
use reka_tools::Link;

const DEFAULT_ADAPTER_MAX_LINKS: usize = 50;

const LINK_HREF_FIELDS: [&str; 5] = ["href", "url", "target", "id", "path"];
const LINK_TEXT_FIELDS: [&str; 4] = ["text", "title", "name", "label"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterOperation {
    Discover,
    Read,
}

impl AdapterOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Read => "read",
        }
    }
}

/// One resolved adapter definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAdapter {
    pub name: String,
    pub prefix: String,
    pub discover_tool: String,
    pub read_tool: String,
}

/// Adapter payload normalized to the fetch contract.
#[derive(Debug, Clone)]
pub struct AdapterFetch {
    pub content: String,
    pub title: String,
    pub links: Vec<Link>,
    pub error: Option<String>,
}

impl AdapterFetch {
    fn error(target: &str, message: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            title: target.to_string(),
            links: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// All enabled adapters plus the custom-tool definitions they dispatch to.
pub struct AdapterSet {
    adapters: Vec<SourceAdapter>,
    custom_tools: HashMap<String, CustomToolConfig>,
}

impl AdapterSet {
    pub fn new(
        adapter_config: &HashMap<String, SourceAdapterConfig>,
        custom_tools: &HashMap<String, CustomToolConfig>,
    ) -> Self {
        Self {
            adapters: enabled_adapters(adapter_config),
            custom_tools: custom_tools.clone(),
        }
    }

    /// Adapter whose prefix is the longest match for `target`.
    pub fn get(&self, target: &str) -> Option<&SourceAdapter> {
        if target.is_empty() {
            return None;
        }
        self.adapters.iter().find(|a| target.starts_with(&a.prefix))
    }

    pub fn has(&self, target: &str) -> bool {
        self.get(target).is_some()
    }

    /// Fetch a target via its adapter.  `None` when no adapter matches.
    pub async fn fetch(
        &self,
        target: &str,
        query: Option<&str>,
        max_links: Option<usize>,
        operation: AdapterOperation,
    ) -> Option<AdapterFetch> {
        let adapter = self.get(target)?;
        let link_limit = max_links.filter(|n| *n > 0).unwrap_or(DEFAULT_ADAPTER_MAX_LINKS);
        let tool_name = match operation {
            AdapterOperation::Read => &adapter.read_tool,
            AdapterOperation::Discover => &adapter.discover_tool,
        };

        let Some(tool) = self.custom_tools.get(tool_name) else {
            return Some(AdapterFetch::error(
                target,
                format!("Custom tool '{tool_name}' is not configured."),
            ));
        };

        let mut args = serde_json::json!({
            "target": target,
            "max_links": link_limit,
            "operation": operation.as_str(),
        });
        if let Some(q) = query {
            args["query"] = Value::String(q.to_string());
        }

        let result = match run_custom_command(&tool.command, &args, tool.timeout_secs).await {
            Ok(r) => r,
            Err(e) => return Some(AdapterFetch::error(target, e.to_string())),
        };

        let stdout = result.get("stdout").and_then(|v| v.as_str()).unwrap_or("");
        let payload = match parse_adapter_stdout(stdout) {
            Ok(p) => p,
            Err(e) => return Some(AdapterFetch::error(target, e)),
        };
        Some(normalize_payload(&payload, target, link_limit))
    }
}

/// Build enabled adapter definitions, longest prefix first so that the most
/// specific adapter wins when prefixes nest.
fn enabled_adapters(config: &HashMap<String, SourceAdapterConfig>) -> Vec<SourceAdapter> {
    let mut adapters: Vec<SourceAdapter> = Vec::new();
    for (name, cfg) in config {
        if !cfg.enabled {
            continue;
        }
        let default_tool = cfg.tool.clone().unwrap_or_default();
        let mut discover_tool = cfg
            .discover_tool
            .clone()
            .unwrap_or_else(|| default_tool.clone());
        let mut read_tool = cfg.read_tool.clone().unwrap_or_else(|| default_tool.clone());
        if discover_tool.is_empty() && read_tool.is_empty() {
            warn!("Research source adapter '{name}' has no tool configured.");
            continue;
        }
        if discover_tool.is_empty() {
            discover_tool = read_tool.clone();
        }
        if read_tool.is_empty() {
            read_tool = discover_tool.clone();
        }

        let prefix = cfg
            .prefix
            .clone()
            .unwrap_or_else(|| format!("{name}://"));
        if prefix.is_empty() {
            warn!("Research source adapter '{name}' has an empty prefix.");
            continue;
        }

        adapters.push(SourceAdapter {
            name: name.clone(),
            prefix,
            discover_tool,
            read_tool,
        });
    }
    adapters.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    adapters
}

fn parse_adapter_stdout(stdout: &str) -> Result<serde_json::Map<String, Value>, String> {
    if stdout.trim().is_empty() {
        return Err("Adapter tool returned empty stdout.".to_string());
    }
    let value: Value = serde_json::from_str(stdout)
        .map_err(|e| format!("Adapter tool returned invalid JSON: {e}"))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err("Adapter tool JSON output must be an object.".to_string()),
    }
}

fn normalize_payload(
    payload: &serde_json::Map<String, Value>,
    target: &str,
    max_links: usize,
) -> AdapterFetch {
    if let Some(err) = payload.get("error").filter(|v| !v.is_null()) {
        return AdapterFetch::error(target, coerce_text(err));
    }

    let title = payload
        .get("title")
        .or_else(|| payload.get("name"))
        .map(coerce_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| target.to_string());
    let content = payload.get("content").map(coerce_text).unwrap_or_default();
    let raw_links = payload
        .get("links")
        .or_else(|| payload.get("items"))
        .cloned()
        .unwrap_or(Value::Array(Vec::new()));

    AdapterFetch {
        content,
        title,
        links: normalize_links(&raw_links, max_links),
        error: None,
    }
}

fn normalize_links(raw: &Value, max_links: usize) -> Vec<Link> {
    let Value::Array(items) = raw else {
        return Vec::new();
    };
    let mut links = Vec::new();
    for item in items {
        if let Some(link) = normalize_link(item) {
            links.push(link);
        }
        if links.len() >= max_links {
            break;
        }
    }
    links
}

/// Normalize a link-like item: a bare string, or an object whose href comes
/// from the first non-empty of `href,url,target,id,path` and whose text from
/// `text,title,name,label` (falling back to the href).
fn normalize_link(item: &Value) -> Option<Link> {
    if let Value::String(s) = item {
        let text = s.trim();
        if text.is_empty() {
            return None;
        }
        return Some(Link {
            text: text.to_string(),
            href: text.to_string(),
        });
    }

    let obj = item.as_object()?;

    let href = LINK_HREF_FIELDS
        .iter()
        .filter_map(|f| obj.get(*f))
        .map(coerce_text)
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())?;

    let text = LINK_TEXT_FIELDS
        .iter()
        .filter_map(|f| obj.get(*f))
        .map(coerce_text)
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| href.clone());

    Some(Link { text, href })
}

fn coerce_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
