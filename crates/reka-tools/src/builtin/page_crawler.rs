// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Page crawler: link-id bookkeeping for multi-page exploration.
//!
//! Instead of echoing full URLs back and forth, discovered links get stable
//! integer ids.  The model fetches a page (`url` mode), receives `id:text`
//! pairs, and follows up with `link_ids` to read the pages behind them.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use reka_model::SUMMARIZE_CONTENT_PROMPT;

use crate::fetch::{fetch_and_parse, Link};
use crate::tool::{Tool, ToolContext};

/// Link-id mapping that persists across calls within one conversation.
#[derive(Debug, Default)]
pub struct PageCrawlerState {
    url_to_id: HashMap<String, u32>,
    id_to_url: HashMap<u32, String>,
    next_id: u32,
}

impl PageCrawlerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register links, assigning new ids and reusing existing ones for hrefs
    /// seen before.  Returns `(id, text)` pairs in input order.
    pub fn add_links(&mut self, links: &[Link]) -> Vec<(u32, String)> {
        links
            .iter()
            .map(|link| {
                let id = match self.url_to_id.get(&link.href) {
                    Some(id) => *id,
                    None => {
                        self.next_id += 1;
                        self.url_to_id.insert(link.href.clone(), self.next_id);
                        self.id_to_url.insert(self.next_id, link.href.clone());
                        self.next_id
                    }
                };
                (id, link.text.clone())
            })
            .collect()
    }

    /// Resolve ids back to URLs; unknown ids are skipped.
    pub fn get_urls_by_ids(&self, ids: &[u32]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.id_to_url.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.id_to_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_url.is_empty()
    }
}

pub struct PageCrawlerTool {
    state: Mutex<PageCrawlerState>,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub summary_max_chars: usize,
}

impl PageCrawlerTool {
    pub fn new(fetch_timeout_secs: u64, user_agent: impl Into<String>, summary_max_chars: usize) -> Self {
        Self {
            state: Mutex::new(PageCrawlerState::new()),
            fetch_timeout_secs,
            user_agent: user_agent.into(),
            summary_max_chars,
        }
    }
}

/// Accepts `3`, `"3"`, `"1,2,3"` or `[1, "2"]`.
fn parse_link_ids(value: &Value) -> Vec<u32> {
    match value {
        Value::Number(n) => n.as_u64().map(|v| vec![v as u32]).unwrap_or_default(),
        Value::String(s) => s
            .split(',')
            .filter_map(|p| p.trim().parse().ok())
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::Number(n) => n.as_u64().map(|v| v as u32),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl Tool for PageCrawlerTool {
    fn name(&self) -> &str {
        "page_crawler"
    }

    fn description(&self) -> &str {
        "Crawl pages by link id. Pass 'url' to fetch a page and register its links \
         (returned as 'id:text' lines), then pass 'link_ids' to fetch the pages behind \
         previously returned ids. Provide either 'url' OR 'link_ids', never both."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Page to fetch and extract links from."
                },
                "link_ids": {
                    "type": "string",
                    "description": "Comma-separated link ids from a previous call."
                },
                "summarize": {
                    "type": "boolean",
                    "description": "If true, summarize fetched pages."
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let url = args.get("url").and_then(|v| v.as_str());
        let link_ids = args.get("link_ids").filter(|v| !v.is_null());

        match (url, link_ids) {
            (Some(_), Some(_)) => Ok(json!({
                "error": "Provide either 'url' OR 'link_ids', not both."
            })),
            (None, None) => Ok(json!({
                "error": "Provide 'url' to explore a page or 'link_ids' to follow links."
            })),
            (Some(url), None) => self.crawl_url(url).await,
            (None, Some(ids)) => self.follow_links(ids, &args, ctx).await,
        }
    }
}

impl PageCrawlerTool {
    async fn crawl_url(&self, url: &str) -> anyhow::Result<Value> {
        debug!(url, "page_crawler fetching");
        let page = fetch_and_parse(url, self.fetch_timeout_secs, &self.user_agent).await?;
        let simplified = self.state.lock().expect("crawler lock").add_links(&page.links);
        let rendered = simplified
            .iter()
            .map(|(id, text)| format!("{id}:{text}"))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(json!({
            "content": page.content,
            "links": rendered,
        }))
    }

    async fn follow_links(
        &self,
        ids: &Value,
        args: &Value,
        ctx: &ToolContext,
    ) -> anyhow::Result<Value> {
        let ids = parse_link_ids(ids);
        let urls = self.state.lock().expect("crawler lock").get_urls_by_ids(&ids);
        if urls.is_empty() {
            return Ok(json!({
                "error": "No valid URLs found for the given link_ids."
            }));
        }

        let summarize = args
            .get("summarize")
            .and_then(|v| v.as_bool())
            .unwrap_or(ctx.summarize);

        let mut results = Map::new();
        for url in urls {
            let text = match fetch_and_parse(&url, self.fetch_timeout_secs, &self.user_agent).await
            {
                Ok(page) => page.content,
                Err(e) => {
                    results.insert(url, Value::String(format!("Error: {e:#}")));
                    continue;
                }
            };
            let rendered = match (&ctx.summarizer, summarize) {
                (Some(summarizer), true) => match summarizer
                    .summarize_content(&text, SUMMARIZE_CONTENT_PROMPT, self.summary_max_chars)
                    .await
                {
                    Ok(summary) => format!("Summary of {url}:\n{summary}"),
                    Err(_) => text,
                },
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

    fn link(text: &str, href: &str) -> Link {
        Link {
            text: text.into(),
            href: href.into(),
        }
    }

    #[test]
    fn add_links_assigns_sequential_ids() {
        let mut state = PageCrawlerState::new();
        let simplified = state.add_links(&[
            link("Goog", "http://google.com"),
            link("Bing", "http://bing.com"),
        ]);
        assert_eq!(simplified, vec![(1, "Goog".into()), (2, "Bing".into())]);
    }

    #[test]
    fn known_href_reuses_its_id() {
        let mut state = PageCrawlerState::new();
        state.add_links(&[
            link("Goog", "http://google.com"),
            link("Bing", "http://bing.com"),
        ]);
        let second = state.add_links(&[
            link("Goog Again", "http://google.com"),
            link("Yahoo", "http://yahoo.com"),
        ]);
        assert_eq!(second[0], (1, "Goog Again".into()));
        assert_eq!(second[1], (3, "Yahoo".into()));
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn resolve_ids_skips_unknown() {
        let mut state = PageCrawlerState::new();
        state.add_links(&[link("A", "http://a.com"), link("B", "http://b.com")]);
        let urls = state.get_urls_by_ids(&[1, 2, 3]);
        assert_eq!(urls, vec!["http://a.com", "http://b.com"]);
    }

    #[test]
    fn link_ids_parse_all_shapes() {
        assert_eq!(parse_link_ids(&json!(1)), vec![1]);
        assert_eq!(parse_link_ids(&json!("1")), vec![1]);
        assert_eq!(parse_link_ids(&json!("1, 2,3")), vec![1, 2, 3]);
        assert_eq!(parse_link_ids(&json!([1, "2"])), vec![1, 2]);
        assert!(parse_link_ids(&json!(null)).is_empty());
    }

    #[tokio::test]
    async fn url_and_link_ids_are_mutually_exclusive() {
        let tool = PageCrawlerTool::new(5, "reka-test", 200);
        let out = tool
            .execute(
                json!({"url": "http://a.com", "link_ids": "1"}),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        assert!(out["error"]
            .as_str()
            .unwrap()
            .contains("Provide either 'url' OR 'link_ids'"));
    }

    #[tokio::test]
    async fn missing_both_is_an_error_object() {
        let tool = PageCrawlerTool::new(5, "reka-test", 200);
        let out = tool.execute(json!({}), &ToolContext::default()).await.unwrap();
        assert!(out.get("error").is_some());
    }

    #[tokio::test]
    async fn unknown_ids_report_no_valid_urls() {
        let tool = PageCrawlerTool::new(5, "reka-test", 200);
        let out = tool
            .execute(json!({"link_ids": "99"}), &ToolContext::default())
            .await
            .unwrap();
        assert!(out["error"].as_str().unwrap().contains("No valid URLs found"));
    }
}
