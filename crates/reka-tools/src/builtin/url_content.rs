// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use reka_model::SUMMARIZE_CONTENT_PROMPT;

use crate::fetch::{fetch_and_parse, sanitize_url};
use crate::tool::{Tool, ToolContext};

pub struct GetUrlContentTool {
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    /// Output bound for per-page summaries.
    pub summary_max_chars: usize,
}

/// Collect URLs from the `urls` array and/or the legacy single `url` field.
pub fn collect_urls(args: &Value) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    match args.get("urls") {
        Some(Value::Array(items)) => {
            urls.extend(items.iter().filter_map(|v| v.as_str()).map(String::from))
        }
        Some(Value::String(s)) => urls.push(s.clone()),
        _ => {}
    }
    if let Some(u) = args.get("url").and_then(|v| v.as_str()) {
        urls.push(u.to_string());
    }
    // Deduplicate, preserving first-seen order.
    let mut seen = std::collections::HashSet::new();
    urls.into_iter()
        .map(|u| sanitize_url(&u))
        .filter(|u| !u.is_empty() && seen.insert(u.clone()))
        .collect()
}

#[async_trait]
impl Tool for GetUrlContentTool {
    fn name(&self) -> &str {
        "get_url_content"
    }

    fn description(&self) -> &str {
        "Fetch the content of one or more URLs and return their text content (HTML stripped)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "urls": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "List of URLs to fetch content from."
                },
                "url": {
                    "type": "string",
                    "description": "Single URL (deprecated, use 'urls' instead)."
                },
                "summarize": {
                    "type": "boolean",
                    "description": "If true, summarize the content of the page using an LLM."
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let urls = collect_urls(&args);
        if urls.is_empty() {
            return Ok(json!({
                "error": "No URLs provided. Please specify 'urls' or 'url' parameter."
            }));
        }

        // The model can override the global flag per call.
        let summarize = args
            .get("summarize")
            .and_then(|v| v.as_bool())
            .unwrap_or(ctx.summarize);

        let mut results = Map::new();
        for url in urls {
            debug!(url, "get_url_content");
            let text = match fetch_and_parse(&url, self.fetch_timeout_secs, &self.user_agent).await
            {
                Ok(page) => page.content,
                Err(e) => {
                    results.insert(url, Value::String(format!("Error: {e:#}")));
                    continue;
                }
            };

            let rendered = match (&ctx.summarizer, summarize) {
                (Some(summarizer), true) => {
                    match summarizer
                        .summarize_content(&text, SUMMARIZE_CONTENT_PROMPT, self.summary_max_chars)
                        .await
                    {
                        Ok(summary) => format!("Summary of {url}:\n{summary}"),
                        Err(e) => {
                            debug!(url, "summarization failed, returning full content: {e:#}");
                            text
                        }
                    }
                }
                _ => text,
            };
            results.insert(url, Value::String(rendered));
        }

        Ok(Value::Object(results))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_urls_merges_and_dedupes() {
        let args = json!({
            "urls": ["https://a", "https://b", "https://a"],
            "url": "https://c"
        });
        assert_eq!(collect_urls(&args), vec!["https://a", "https://b", "https://c"]);
    }

    #[test]
    fn collect_urls_accepts_string_urls_field() {
        // Some models pass `urls` as a plain string instead of an array.
        let args = json!({ "urls": "https://a" });
        assert_eq!(collect_urls(&args), vec!["https://a"]);
    }

    #[test]
    fn collect_urls_sanitizes() {
        let args = json!({ "url": "https:\\/\\/a.com" });
        assert_eq!(collect_urls(&args), vec!["https://a.com"]);
    }

    #[tokio::test]
    async fn empty_args_return_error_object() {
        let tool = GetUrlContentTool {
            fetch_timeout_secs: 5,
            user_agent: "reka-test".into(),
            summary_max_chars: 200,
        };
        let out = tool.execute(json!({}), &ToolContext::default()).await.unwrap();
        assert!(out["error"].as_str().unwrap().contains("No URLs provided"));
    }
}
