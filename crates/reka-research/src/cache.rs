// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Content-addressed page cache with background summarization.
//!
//! `cache_url` is the single write path: idempotent on the URL, and when
//! summarization is requested for a fresh row, a job is queued for the worker
//! pool.  Producers never wait for summaries; consumers poll `get_summary`
//! and observe the `pending → processing → completed|failed` sequence.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use reka_model::{Summarizer, SUMMARIZE_CONTENT_PROMPT};
use reka_store::{Store, SummaryInfo, UrlCacheRow};
use reka_tools::Link;

/// Queue depth for pending summarization jobs.  When full, the row simply
/// stays `pending`; a later fetch of the same URL can re-trigger it.
const SUMMARY_QUEUE_DEPTH: usize = 64;

#[derive(Debug)]
struct SummaryJob {
    cache_id: i64,
}

pub struct ResearchCache {
    store: Arc<Store>,
    summary_tx: Mutex<Option<mpsc::Sender<SummaryJob>>>,
}

impl ResearchCache {
    /// Cache without background summarization (summaries stay `pending`).
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            summary_tx: Mutex::new(None),
        }
    }

    /// Cache with a bounded summarization worker pool.
    pub fn with_workers(
        store: Arc<Store>,
        summarizer: Arc<Summarizer>,
        workers: usize,
        summary_max_chars: usize,
    ) -> (Self, SummaryWorkerPool) {
        let (tx, rx) = mpsc::channel::<SummaryJob>(SUMMARY_QUEUE_DEPTH);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut handles = Vec::with_capacity(workers.max(1));
        for worker in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let store = Arc::clone(&store);
            let summarizer = Arc::clone(&summarizer);
            handles.push(tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    run_summary_job(&store, &summarizer, job.cache_id, summary_max_chars, worker)
                        .await;
                }
            }));
        }

        (
            Self {
                store,
                summary_tx: Mutex::new(Some(tx)),
            },
            SummaryWorkerPool { handles },
        )
    }

    /// Insert or refresh a page.  Returns the cache row id.
    ///
    /// Summarization is only queued for newly inserted rows; an update keeps
    /// whatever summary state the row already has.
    pub fn cache_url(
        &self,
        url: &str,
        content: &str,
        title: &str,
        links: &[Link],
        trigger_summarization: bool,
    ) -> anyhow::Result<i64> {
        let links_json = serde_json::to_string(links)?;
        let (cache_id, inserted) = self.store.upsert_url(url, title, content, &links_json)?;
        if inserted && trigger_summarization {
            let tx = self.summary_tx.lock().expect("summary tx lock").clone();
            match tx {
                Some(tx) => {
                    if tx.try_send(SummaryJob { cache_id }).is_err() {
                        warn!(url, "summary queue full; leaving row pending");
                    }
                }
                None => debug!(url, "no summary workers; leaving row pending"),
            }
        }
        Ok(cache_id)
    }

    pub fn get_cached(&self, url: &str) -> anyhow::Result<Option<UrlCacheRow>> {
        self.store.get_cached(url)
    }

    pub fn get_summary(&self, url: &str) -> anyhow::Result<Option<SummaryInfo>> {
        self.store.get_summary(url)
    }

    pub fn save_finding(
        &self,
        finding_text: &str,
        source_url: Option<&str>,
        source_title: Option<&str>,
        tags: &[String],
    ) -> anyhow::Result<i64> {
        let tags_json = serde_json::to_string(tags)?;
        self.store
            .save_finding(finding_text, source_url, source_title, &tags_json)
    }

    pub fn get_all_findings(&self, limit: usize) -> anyhow::Result<Vec<reka_store::Finding>> {
        self.store.get_recent_findings(limit)
    }

    /// Close the summarization queue so the worker pool can drain and exit.
    pub fn close_summary_queue(&self) {
        self.summary_tx.lock().expect("summary tx lock").take();
    }
}

async fn run_summary_job(
    store: &Store,
    summarizer: &Summarizer,
    cache_id: i64,
    summary_max_chars: usize,
    worker: usize,
) {
    // The conditional claim makes double-processing impossible even if the
    // same id was queued twice.
    match store.claim_summary(cache_id) {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            warn!(cache_id, "claim failed: {e:#}");
            return;
        }
    }

    let content = match store.get_content_by_id(cache_id) {
        Ok(Some(c)) if !c.trim().is_empty() => c,
        _ => {
            let _ = store.fail_summary(cache_id);
            return;
        }
    };

    debug!(cache_id, worker, "summarizing cached page");
    match summarizer
        .summarize_content(&content, SUMMARIZE_CONTENT_PROMPT, summary_max_chars)
        .await
    {
        Ok(summary) if !summary.is_empty() => {
            if let Err(e) = store.complete_summary(cache_id, &summary) {
                warn!(cache_id, "storing summary failed: {e:#}");
            }
        }
        Ok(_) => {
            let _ = store.fail_summary(cache_id);
        }
        Err(e) => {
            warn!(cache_id, "summarization failed: {e:#}");
            let _ = store.fail_summary(cache_id);
        }
    }
}

/// Handles to the running summary workers; `drain` after closing the queue.
pub struct SummaryWorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl SummaryWorkerPool {
    /// Wait for all in-flight summaries to finish.  Call after
    /// [`ResearchCache::close_summary_queue`]; pending rows left behind are
    /// picked up the next time their URL is fetched.
    pub async fn drain(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use reka_model::{ScriptedChatClient, UsageTracker};

    fn links(n: usize) -> Vec<Link> {
        (0..n)
            .map(|i| Link {
                text: format!("link {i}"),
                href: format!("https://x/{i}"),
            })
            .collect()
    }

    #[test]
    fn cache_url_is_idempotent_on_url() {
        let cache = ResearchCache::new(Arc::new(Store::open_in_memory().unwrap()));
        let a = cache
            .cache_url("https://x", "content", "Title", &links(2), false)
            .unwrap();
        let b = cache
            .cache_url("https://x", "content v2", "Title v2", &links(3), false)
            .unwrap();
        assert_eq!(a, b);
        let row = cache.get_cached("https://x").unwrap().unwrap();
        assert_eq!(row.title, "Title v2");
        let stored: Vec<Link> = serde_json::from_str(&row.links_json).unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[test]
    fn without_workers_summary_stays_pending() {
        let cache = ResearchCache::new(Arc::new(Store::open_in_memory().unwrap()));
        cache
            .cache_url("https://x", "content", "Title", &[], true)
            .unwrap();
        let info = cache.get_summary("https://x").unwrap().unwrap();
        assert_eq!(info.summary_status, "pending");
        assert!(info.summary.is_none());
    }

    #[tokio::test]
    async fn worker_completes_summary_in_background() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let client = Arc::new(ScriptedChatClient::always_text("A crisp page summary."));
        let summarizer = Arc::new(Summarizer::new(client, "lfm", 10_000, UsageTracker::new()));
        let (cache, pool) = ResearchCache::with_workers(Arc::clone(&store), summarizer, 2, 200);

        cache
            .cache_url("https://x", "page content to summarize", "Title", &[], true)
            .unwrap();

        cache.close_summary_queue();
        pool.drain().await;

        let info = cache.get_summary("https://x").unwrap().unwrap();
        assert_eq!(info.summary_status, "completed");
        assert_eq!(info.summary.as_deref(), Some("A crisp page summary."));
    }

    #[tokio::test]
    async fn failing_model_marks_row_failed() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let client = Arc::new(ScriptedChatClient::always_error("model offline"));
        let summarizer = Arc::new(Summarizer::new(client, "lfm", 10_000, UsageTracker::new()));
        let (cache, pool) = ResearchCache::with_workers(Arc::clone(&store), summarizer, 1, 200);

        cache
            .cache_url("https://x", "content", "Title", &[], true)
            .unwrap();
        cache.close_summary_queue();
        pool.drain().await;

        let info = cache.get_summary("https://x").unwrap().unwrap();
        assert_eq!(info.summary_status, "failed");
    }

    #[tokio::test]
    async fn empty_content_fails_fast_without_model_call() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let client = Arc::new(ScriptedChatClient::always_text("unused"));
        let summarizer = Arc::new(Summarizer::new(client, "lfm", 10_000, UsageTracker::new()));
        let (cache, pool) = ResearchCache::with_workers(Arc::clone(&store), summarizer, 1, 200);

        cache.cache_url("https://x", "", "Title", &[], true).unwrap();
        cache.close_summary_queue();
        pool.drain().await;

        let info = cache.get_summary("https://x").unwrap().unwrap();
        assert_eq!(info.summary_status, "failed");
    }

    #[test]
    fn findings_round_trip_through_cache() {
        let cache = ResearchCache::new(Arc::new(Store::open_in_memory().unwrap()));
        let id = cache
            .save_finding("a fact", Some("https://src"), None, &["tag".to_string()])
            .unwrap();
        let all = cache.get_all_findings(10).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].tags(), vec!["tag"]);
    }
}
