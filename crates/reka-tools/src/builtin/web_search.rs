// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolContext};

pub struct WebSearchTool {
    /// SearXNG-compatible instance, e.g. `http://localhost:8888`.
    pub search_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return top results."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "q": { "type": "string" },
                "count": { "type": "integer", "default": 5 }
            },
            "required": ["q"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let query = args
            .get("q")
            .and_then(|v| v.as_str())
            .context("missing 'q'")?;
        let count = args.get("count").and_then(|v| v.as_u64()).unwrap_or(5) as usize;

        debug!(query, count, "web_search tool");
        search(&self.search_url, query, count, self.timeout_secs, &self.user_agent).await
    }
}

async fn search(
    base: &str,
    query: &str,
    count: usize,
    timeout_secs: u64,
    user_agent: &str,
) -> anyhow::Result<Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent.to_string())
        .build()?;

    let url = format!("{}/search", base.trim_end_matches('/'));
    let resp = client
        .get(&url)
        .query(&[("q", query), ("format", "json")])
        .send()
        .await
        .context("search request failed")?;
    anyhow::ensure!(
        resp.status().is_success(),
        "search endpoint returned {}",
        resp.status()
    );

    let body: Value = resp.json().await.context("decoding search response")?;
    Ok(trim_results(&body, count))
}

/// Keep only the fields the model needs from the first `count` results.
fn trim_results(body: &Value, count: usize) -> Value {
    let results: Vec<Value> = body
        .get("results")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .take(count)
                .map(|r| {
                    json!({
                        "title": r.get("title").and_then(|v| v.as_str()).unwrap_or(""),
                        "url": r.get("url").and_then(|v| v.as_str()).unwrap_or(""),
                        "content": r.get("content").and_then(|v| v.as_str()).unwrap_or(""),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    json!({ "results": results })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
