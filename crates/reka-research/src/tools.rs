// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The research tool set: link extraction, cached summaries, RAG retrieval,
//! full content, and persistent findings.
//!
//! Every tool degrades gracefully when embeddings are unavailable — unranked
//! links, content previews, recent findings — so research keeps working
//! without a vector model.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use reka_store::UrlCacheRow;
use reka_tools::fetch::fetch_and_parse;
use reka_tools::{collect_urls, Link, Tool, ToolContext, ToolRegistry};

use crate::adapters::{AdapterOperation, AdapterSet};
use crate::cache::ResearchCache;
use crate::chunker::chunk_text;
use crate::vector::VectorStore;

/// Shared wiring for all research tools.
pub struct ResearchContext {
    pub cache: Arc<ResearchCache>,
    pub vectors: Arc<VectorStore>,
    pub adapters: Arc<AdapterSet>,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub max_links_per_url: usize,
    pub max_relevant_links: usize,
    pub memory_max_results: usize,
}

/// Register all six research tools on a registry.
pub fn register_research_tools(registry: &mut ToolRegistry, ctx: Arc<ResearchContext>) {
    registry.register(ExtractLinksTool { ctx: Arc::clone(&ctx) });
    registry.register(GetLinkSummariesTool { ctx: Arc::clone(&ctx) });
    registry.register(GetRelevantContentTool { ctx: Arc::clone(&ctx) });
    registry.register(GetFullContentTool { ctx: Arc::clone(&ctx) });
    registry.register(SaveFindingTool { ctx: Arc::clone(&ctx) });
    registry.register(QueryResearchMemoryTool { ctx });
}

enum Hydration {
    Row(UrlCacheRow),
    NotCached,
    Failed(String),
}

impl ResearchContext {
    /// Load a row from the cache, hydrating adapter-prefixed targets that
    /// have not been cached yet via the adapter's `read` operation.
    async fn cached_or_hydrated(&self, url: &str) -> anyhow::Result<Hydration> {
        if let Some(row) = self.cache.get_cached(url)? {
            return Ok(Hydration::Row(row));
        }
        let Some(fetched) = self
            .adapters
            .fetch(url, None, None, AdapterOperation::Read)
            .await
        else {
            return Ok(Hydration::NotCached);
        };
        if let Some(err) = fetched.error {
            return Ok(Hydration::Failed(err));
        }
        self.cache
            .cache_url(url, &fetched.content, &fetched.title, &fetched.links, true)?;
        match self.cache.get_cached(url)? {
            Some(row) => Ok(Hydration::Row(row)),
            None => Ok(Hydration::NotCached),
        }
    }

    /// Embed a page's links unless already indexed.  Failure only disables
    /// ranking, so it is logged and swallowed.
    async fn try_embed_links(&self, cache_id: i64, links: &[Link]) {
        match self.vectors.has_link_embeddings(cache_id) {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = self.vectors.store_link_embeddings(cache_id, links).await {
                    warn!("Link embedding failed (will use unranked links): {e:#}");
                }
            }
            Err(e) => warn!("link embedding lookup failed: {e:#}"),
        }
    }
}

fn not_cached_error() -> Value {
    json!({ "error": "Not cached. Use extract_links first to cache this URL." })
}

fn preview(content: &str, max: usize) -> String {
    let mut end = max.min(content.len());
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    let mut p = content[..end].to_string();
    if content.len() > end {
        p.push_str("...");
    }
    p
}

fn round3(score: f32) -> f64 {
    (score as f64 * 1000.0).round() / 1000.0
}

fn truncate_error(e: &anyhow::Error, max: usize) -> String {
    let s = e.to_string();
    s.chars().take(max).collect()
}

// ─── extract_links ────────────────────────────────────────────────────────────

struct ExtractLinksTool {
    ctx: Arc<ResearchContext>,
}

#[async_trait]
impl Tool for ExtractLinksTool {
    fn name(&self) -> &str {
        "extract_links"
    }

    fn description(&self) -> &str {
        "Extract and discover links from web pages for research exploration.\n\
         Returns ONLY link labels and URLs - the actual page content is cached for later \
         retrieval.\n\
         Use this to explore what information is available before deciding what to read \
         in depth.\n\
         Optionally provide a research query to rank links by semantic relevance \
         (requires embedding model)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "urls": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "URLs to extract links from"
                },
                "url": {
                    "type": "string",
                    "description": "Single URL (alternative to urls array)"
                },
                "query": {
                    "type": "string",
                    "description": "Optional: research query to rank links by relevance"
                },
                "max_links": {
                    "type": "integer",
                    "default": 30,
                    "description": "Maximum links to return per URL"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let urls = collect_urls(&args);
        if urls.is_empty() {
            return Ok(json!({
                "error": "No URLs provided. Please specify 'urls' or 'url' parameter."
            }));
        }
        let query = args.get("query").and_then(|v| v.as_str());
        let max_links = args
            .get("max_links")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(self.ctx.max_links_per_url);

        let mut results = Map::new();
        for url in urls {
            match self.extract_one(&url, query, max_links).await {
                Ok(entry) => results.insert(url, entry),
                Err(e) => results.insert(url, json!({ "error": e.to_string() })),
            };
        }
        Ok(Value::Object(results))
    }
}

impl ExtractLinksTool {
    async fn extract_one(
        &self,
        url: &str,
        query: Option<&str>,
        max_links: usize,
    ) -> anyhow::Result<Value> {
        let ctx = &self.ctx;

        // Cache first; fetch (adapter discover or plain HTTP) on a miss.
        let (cache_id, links, from_cache) = match ctx.cache.get_cached(url)? {
            Some(row) => {
                debug!(url, "cache hit");
                let links: Vec<Link> = serde_json::from_str(&row.links_json).unwrap_or_default();
                (row.id, links, true)
            }
            None => {
                debug!(url, "fetching");
                let fetched = match ctx
                    .adapters
                    .fetch(url, query, Some(max_links), AdapterOperation::Discover)
                    .await
                {
                    Some(adapter_fetch) => adapter_fetch,
                    None => {
                        let page =
                            fetch_and_parse(url, ctx.fetch_timeout_secs, &ctx.user_agent).await?;
                        crate::adapters::AdapterFetch {
                            content: page.content,
                            title: page.title,
                            links: page.links,
                            error: None,
                        }
                    }
                };
                if let Some(err) = fetched.error {
                    return Ok(json!({ "error": err }));
                }
                let id = ctx.cache.cache_url(
                    url,
                    &fetched.content,
                    &fetched.title,
                    &fetched.links,
                    true,
                )?;
                (id, fetched.links, false)
            }
        };

        if !links.is_empty() {
            ctx.try_embed_links(cache_id, &links).await;
        }

        // Relevance ranking when a query is given; unranked prefix otherwise
        // (and as the fallback when ranking fails).
        let rendered: Vec<Value> = if let Some(query) = query.filter(|_| !links.is_empty()) {
            let top_k = max_links.min(ctx.max_relevant_links);
            match ctx.vectors.rank_links_by_relevance(cache_id, query, top_k).await {
                Ok(ranked) if !ranked.is_empty() => ranked
                    .into_iter()
                    .map(|(link, score)| {
                        json!({ "text": link.text, "href": link.href, "relevance": round3(score) })
                    })
                    .collect(),
                Ok(_) => links.iter().take(max_links).map(|l| json!(l)).collect(),
                Err(e) => {
                    warn!("Relevance ranking failed, using unranked: {e:#}");
                    links.iter().take(max_links).map(|l| json!(l)).collect()
                }
            }
        } else {
            links.iter().take(max_links).map(|l| json!(l)).collect()
        };

        Ok(json!({
            "links": rendered,
            "cached": from_cache,
            "link_count": rendered.len(),
            "note": "Content cached. Use get_link_summaries or get_relevant_content to read.",
        }))
    }
}

// ─── get_link_summaries ───────────────────────────────────────────────────────

struct GetLinkSummariesTool {
    ctx: Arc<ResearchContext>,
}

#[async_trait]
impl Tool for GetLinkSummariesTool {
    fn name(&self) -> &str {
        "get_link_summaries"
    }

    fn description(&self) -> &str {
        "Get AI-generated summaries of previously cached pages.\n\
         Use after extract_links to preview page contents before requesting full content.\n\
         Summaries are generated in the background - status may show 'processing' if not \
         ready yet.\n\
         This is efficient for deciding which pages are worth reading in full."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "urls": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "URLs to get summaries for (must be previously cached via extract_links)"
                }
            },
            "required": ["urls"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let urls = collect_urls(&args);
        if urls.is_empty() {
            return Ok(json!({ "error": "No URLs provided." }));
        }

        let mut results = Map::new();
        for url in urls {
            let entry = match self.ctx.cache.get_summary(&url)? {
                None => not_cached_error(),
                Some(info) => match (info.summary_status.as_str(), &info.summary) {
                    ("completed", Some(summary)) => json!({
                        "title": info.title,
                        "summary": summary,
                    }),
                    ("processing", _) => json!({
                        "title": info.title,
                        "summary": "(Summary is being generated... try again in a moment)",
                        "status": "processing",
                    }),
                    ("failed", _) => json!({
                        "title": info.title,
                        "summary": "(Summary generation failed)",
                        "status": "failed",
                    }),
                    (status, _) => json!({
                        "title": info.title,
                        "summary": "(Summary pending)",
                        "status": status,
                    }),
                },
            };
            results.insert(url, entry);
        }
        Ok(Value::Object(results))
    }
}

// ─── get_relevant_content ─────────────────────────────────────────────────────

struct GetRelevantContentTool {
    ctx: Arc<ResearchContext>,
}

#[async_trait]
impl Tool for GetRelevantContentTool {
    fn name(&self) -> &str {
        "get_relevant_content"
    }

    fn description(&self) -> &str {
        "Retrieve only the most relevant content sections from cached pages using RAG.\n\
         Uses semantic search to find sections matching your specific query - much more \
         efficient than full content.\n\
         Best for extracting specific information without loading entire pages.\n\
         Requires embedding model to be available."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "urls": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "URLs to retrieve content from (must be cached)"
                },
                "query": {
                    "type": "string",
                    "description": "What specific information are you looking for?"
                },
                "max_chunks": {
                    "type": "integer",
                    "default": 5,
                    "description": "Maximum content sections to return per URL"
                }
            },
            "required": ["urls", "query"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let urls = collect_urls(&args);
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
        let max_chunks = args
            .get("max_chunks")
            .and_then(|v| v.as_u64())
            .unwrap_or(5) as usize;

        if urls.is_empty() {
            return Ok(json!({ "error": "No URLs provided." }));
        }
        if query.is_empty() {
            return Ok(json!({ "error": "Query is required for relevant content retrieval." }));
        }

        let mut results = Map::new();
        for url in urls {
            let row = match self.ctx.cached_or_hydrated(&url).await? {
                Hydration::Row(row) => row,
                Hydration::NotCached => {
                    results.insert(url, not_cached_error());
                    continue;
                }
                Hydration::Failed(err) => {
                    results.insert(url, json!({ "error": err }));
                    continue;
                }
            };
            if row.content.is_empty() {
                results.insert(url, json!({ "error": "Cached content is empty." }));
                continue;
            }

            let entry = match self.relevant_chunks(row.id, &row.content, query, max_chunks).await {
                Ok(relevant) if !relevant.is_empty() => json!({
                    "title": row.title,
                    "chunks": relevant
                        .iter()
                        .map(|(text, score)| json!({ "text": text, "relevance": round3(*score) }))
                        .collect::<Vec<_>>(),
                    "chunk_count": relevant.len(),
                }),
                Ok(_) => json!({
                    "title": row.title,
                    "note": "No highly relevant sections found. Returning content preview.",
                    "content_preview": preview(&row.content, 2000),
                }),
                Err(e) => {
                    warn!("RAG retrieval failed for {url}: {e:#}");
                    json!({
                        "title": row.title,
                        "fallback": true,
                        "note": format!(
                            "Semantic search unavailable ({}). Returning content preview.",
                            truncate_error(&e, 50)
                        ),
                        "content_preview": preview(&row.content, 3000),
                    })
                }
            };
            results.insert(url, entry);
        }
        Ok(Value::Object(results))
    }
}

impl GetRelevantContentTool {
    /// Lazily chunk-embed, then search.  Any error here routes the caller to
    /// the preview fallback.
    async fn relevant_chunks(
        &self,
        cache_id: i64,
        content: &str,
        query: &str,
        max_chunks: usize,
    ) -> anyhow::Result<Vec<(String, f32)>> {
        if !self.ctx.vectors.has_chunk_embeddings(cache_id)? {
            debug!(cache_id, "generating chunk embeddings");
            let chunks = chunk_text(content);
            let stored = self
                .ctx
                .vectors
                .store_chunk_embeddings(cache_id, &chunks)
                .await?;
            anyhow::ensure!(stored > 0, "failed to store chunk embeddings");
        }
        self.ctx.vectors.search_chunks(cache_id, query, max_chunks).await
    }
}

// ─── get_full_content ─────────────────────────────────────────────────────────

struct GetFullContentTool {
    ctx: Arc<ResearchContext>,
}

#[async_trait]
impl Tool for GetFullContentTool {
    fn name(&self) -> &str {
        "get_full_content"
    }

    fn description(&self) -> &str {
        "Retrieve the complete cached content from pages.\n\
         Use when you need comprehensive understanding of a page, not just specific \
         sections.\n\
         More token-intensive than get_relevant_content - use sparingly.\n\
         Content must have been cached previously via extract_links."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "urls": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "URLs to get full content from (must be cached)"
                }
            },
            "required": ["urls"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let urls = collect_urls(&args);
        if urls.is_empty() {
            return Ok(json!({ "error": "No URLs provided." }));
        }

        let mut results = Map::new();
        for url in urls {
            let entry = match self.ctx.cached_or_hydrated(&url).await? {
                Hydration::NotCached => not_cached_error(),
                Hydration::Failed(err) => json!({ "error": err }),
                Hydration::Row(row) if row.content.is_empty() => {
                    json!({ "error": "Cached content is empty." })
                }
                Hydration::Row(row) => json!({
                    "title": row.title,
                    "content": row.content,
                    "content_length": row.content.len(),
                }),
            };
            results.insert(url, entry);
        }
        Ok(Value::Object(results))
    }
}

// ─── save_finding ─────────────────────────────────────────────────────────────

struct SaveFindingTool {
    ctx: Arc<ResearchContext>,
}

#[async_trait]
impl Tool for SaveFindingTool {
    fn name(&self) -> &str {
        "save_finding"
    }

    fn description(&self) -> &str {
        "Save a discovered fact or insight to research memory for future reference.\n\
         Use this to persist important findings that may be useful in future research \
         sessions.\n\
         Findings are stored with embeddings for semantic retrieval.\n\
         Include source URL and tags for better organization and retrieval."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "finding": {
                    "type": "string",
                    "description": "The fact, insight, or piece of information to save"
                },
                "source_url": {
                    "type": "string",
                    "description": "URL where this information was found"
                },
                "source_title": {
                    "type": "string",
                    "description": "Title of the source page"
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Tags for categorization (e.g., ['climate', 'statistics', '2024'])"
                }
            },
            "required": ["finding"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let finding = args
            .get("finding")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        if finding.is_empty() {
            return Ok(json!({ "error": "Finding text is required." }));
        }

        let source_url = args.get("source_url").and_then(|v| v.as_str());
        let source_title = args.get("source_title").and_then(|v| v.as_str());
        let tags: Vec<String> = match args.get("tags") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        };

        let finding_id = self
            .ctx
            .cache
            .save_finding(finding, source_url, source_title, &tags)?;

        // Best effort: the finding is durable either way.
        let embedded = match self
            .ctx
            .vectors
            .store_finding_embedding(finding_id, finding)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Finding embedding failed (will still be saved): {e:#}");
                false
            }
        };

        Ok(json!({
            "status": "saved",
            "finding_id": finding_id,
            "embedded": embedded,
            "note": if embedded {
                "Finding saved to research memory with embedding"
            } else {
                "Finding saved to research memory (without embedding - API unavailable)"
            },
        }))
    }
}

// ─── query_research_memory ────────────────────────────────────────────────────

struct QueryResearchMemoryTool {
    ctx: Arc<ResearchContext>,
}

#[async_trait]
impl Tool for QueryResearchMemoryTool {
    fn name(&self) -> &str {
        "query_research_memory"
    }

    fn description(&self) -> &str {
        "Search your research memory for previously saved findings.\n\
         Uses semantic search to find relevant information from past research sessions.\n\
         Useful for recalling facts, statistics, or insights you've discovered before."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to search for in research memory"
                },
                "limit": {
                    "type": "integer",
                    "default": 10,
                    "description": "Maximum number of findings to return"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        if query.is_empty() {
            return Ok(json!({ "error": "Query is required." }));
        }
        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(self.ctx.memory_max_results);

        match self.ctx.vectors.search_findings(query, limit).await {
            Ok(results) if !results.is_empty() => Ok(json!({
                "findings": results
                    .iter()
                    .map(|(f, score)| json!({
                        "finding": f.finding_text,
                        "source_url": f.source_url,
                        "source_title": f.source_title,
                        "tags": f.tags(),
                        "relevance": round3(*score),
                        "saved_at": f.created_at,
                    }))
                    .collect::<Vec<_>>(),
                "count": results.len(),
                "search_type": "semantic",
            })),
            Ok(_) => {
                let findings = self.ctx.cache.get_all_findings(limit)?;
                if findings.is_empty() {
                    Ok(json!({
                        "findings": [],
                        "note": "No findings in research memory yet. Use save_finding to store discoveries.",
                    }))
                } else {
                    Ok(json!({
                        "findings": render_findings(&findings),
                        "count": findings.len(),
                        "note": "No semantically relevant findings. Showing recent findings.",
                        "search_type": "recent",
                    }))
                }
            }
            Err(e) => {
                warn!("Semantic search unavailable: {e:#}");
                let findings = self.ctx.cache.get_all_findings(limit)?;
                Ok(json!({
                    "findings": render_findings(&findings),
                    "count": findings.len(),
                    "note": format!(
                        "Semantic search unavailable ({}). Showing recent findings.",
                        truncate_error(&e, 30)
                    ),
                    "search_type": "fallback",
                }))
            }
        }
    }
}

fn render_findings(findings: &[reka_store::Finding]) -> Vec<Value> {
    findings
        .iter()
        .map(|f| {
            json!({
                "finding": f.finding_text,
                "source_url": f.source_url,
                "source_title": f.source_title,
                "tags": f.tags(),
                "saved_at": f.created_at,
            })
        })
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
