// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::Context;
use rusqlite::{params, OptionalExtension};

use crate::Store;

/// Lifecycle of a page's background summary.  Transitions only ever move
/// forward: `pending → processing → completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One cached page; `url` is the canonical identity.
#[derive(Debug, Clone)]
pub struct UrlCacheRow {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub content: String,
    /// JSON array of `{text, href}` objects, exactly as extracted.
    pub links_json: String,
    pub summary: Option<String>,
    pub summary_status: String,
    pub created_at: String,
}

/// Subset served to `get_link_summaries`.
#[derive(Debug, Clone)]
pub struct SummaryInfo {
    pub title: String,
    pub summary: Option<String>,
    pub summary_status: String,
}

impl Store {
    /// Insert or update a cached page.  Idempotent on `url`: a conflict
    /// refreshes title/content/links but leaves the summary columns alone.
    /// Returns `(cache_id, inserted)`.
    pub fn upsert_url(
        &self,
        url: &str,
        title: &str,
        content: &str,
        links_json: &str,
    ) -> anyhow::Result<(i64, bool)> {
        self.with_conn(|conn| {
            let existing: Option<i64> = conn
                .query_row("SELECT id FROM url_cache WHERE url = ?1", [url], |row| {
                    row.get(0)
                })
                .optional()?;
            match existing {
                Some(id) => {
                    conn.execute(
                        "UPDATE url_cache SET title = ?2, content = ?3, links = ?4 WHERE id = ?1",
                        params![id, title, content, links_json],
                    )?;
                    Ok((id, false))
                }
                None => {
                    conn.execute(
                        "INSERT INTO url_cache (url, title, content, links) VALUES (?1, ?2, ?3, ?4)",
                        params![url, title, content, links_json],
                    )
                    .context("caching url")?;
                    Ok((conn.last_insert_rowid(), true))
                }
            }
        })
    }

    pub fn get_cached(&self, url: &str) -> anyhow::Result<Option<UrlCacheRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, url, title, content, links, summary, summary_status, created_at
                 FROM url_cache WHERE url = ?1",
                [url],
                |row| {
                    Ok(UrlCacheRow {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        title: row.get(2)?,
                        content: row.get(3)?,
                        links_json: row.get(4)?,
                        summary: row.get(5)?,
                        summary_status: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                },
            )
            .optional()
            .context("loading cached url")
        })
    }

    pub fn get_summary(&self, url: &str) -> anyhow::Result<Option<SummaryInfo>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT title, summary, summary_status FROM url_cache WHERE url = ?1",
                [url],
                |row| {
                    Ok(SummaryInfo {
                        title: row.get(0)?,
                        summary: row.get(1)?,
                        summary_status: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("loading summary")
        })
    }

    /// The content of a cache row by id, for summarization workers.
    pub fn get_content_by_id(&self, cache_id: i64) -> anyhow::Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT content FROM url_cache WHERE id = ?1",
                [cache_id],
                |row| row.get(0),
            )
            .optional()
            .context("loading cached content")
        })
    }

    /// The raw links JSON of a cache row, for ordinal-based lookups.
    pub fn get_links_json_by_id(&self, cache_id: i64) -> anyhow::Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT links FROM url_cache WHERE id = ?1",
                [cache_id],
                |row| row.get(0),
            )
            .optional()
            .context("loading cached links")
        })
    }

    /// Claim a row for summarization.  Only one worker can win the
    /// `pending → processing` transition; the conditional update is the guard.
    pub fn claim_summary(&self, cache_id: i64) -> anyhow::Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE url_cache SET summary_status = 'processing'
                 WHERE id = ?1 AND summary_status = 'pending'",
                [cache_id],
            )?;
            Ok(changed == 1)
        })
    }

    /// Store the finished summary.  A no-op unless the row is still
    /// `processing` (so a stale worker cannot clobber a newer outcome).
    pub fn complete_summary(&self, cache_id: i64, summary: &str) -> anyhow::Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE url_cache SET summary = ?2, summary_status = 'completed'
                 WHERE id = ?1 AND summary_status = 'processing'",
                params![cache_id, summary],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn fail_summary(&self, cache_id: i64) -> anyhow::Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE url_cache SET summary_status = 'failed'
                 WHERE id = ?1 AND summary_status = 'processing'",
                [cache_id],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn delete_url(&self, url: &str) -> anyhow::Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM url_cache WHERE url = ?1", [url])?))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_inserts_then_updates() {
        let store = Store::open_in_memory().unwrap();
        let (id1, inserted1) = store
            .upsert_url("https://example.com", "Example", "body", "[]")
            .unwrap();
        assert!(inserted1);
        let (id2, inserted2) = store
            .upsert_url("https://example.com", "Example v2", "body2", "[]")
            .unwrap();
        assert!(!inserted2);
        assert_eq!(id1, id2);
        let row = store.get_cached("https://example.com").unwrap().unwrap();
        assert_eq!(row.title, "Example v2");
    }

    #[test]
    fn new_row_starts_pending() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_url("u", "t", "c", "[]").unwrap();
        let row = store.get_cached("u").unwrap().unwrap();
        assert_eq!(row.summary_status, "pending");
        assert!(row.summary.is_none());
    }

    #[test]
    fn update_preserves_summary_columns() {
        let store = Store::open_in_memory().unwrap();
        let (id, _) = store.upsert_url("u", "t", "c", "[]").unwrap();
        assert!(store.claim_summary(id).unwrap());
        assert!(store.complete_summary(id, "the summary").unwrap());
        store.upsert_url("u", "t2", "c2", "[]").unwrap();
        let row = store.get_cached("u").unwrap().unwrap();
        assert_eq!(row.summary.as_deref(), Some("the summary"));
        assert_eq!(row.summary_status, "completed");
    }

    #[test]
    fn status_transitions_are_guarded() {
        let store = Store::open_in_memory().unwrap();
        let (id, _) = store.upsert_url("u", "t", "c", "[]").unwrap();

        // completing without claiming is a no-op
        assert!(!store.complete_summary(id, "early").unwrap());
        let row = store.get_cached("u").unwrap().unwrap();
        assert_eq!(row.summary_status, "pending");

        // only one claim wins
        assert!(store.claim_summary(id).unwrap());
        assert!(!store.claim_summary(id).unwrap());

        assert!(store.complete_summary(id, "done").unwrap());
        // terminal: neither fail nor a second completion applies
        assert!(!store.fail_summary(id).unwrap());
        assert!(!store.complete_summary(id, "other").unwrap());
        let row = store.get_cached("u").unwrap().unwrap();
        assert_eq!(row.summary.as_deref(), Some("done"));
    }

    #[test]
    fn failed_is_terminal_too() {
        let store = Store::open_in_memory().unwrap();
        let (id, _) = store.upsert_url("u", "t", "c", "[]").unwrap();
        assert!(store.claim_summary(id).unwrap());
        assert!(store.fail_summary(id).unwrap());
        assert!(!store.claim_summary(id).unwrap());
        let info = store.get_summary("u").unwrap().unwrap();
        assert_eq!(info.summary_status, "failed");
    }

    #[test]
    fn get_summary_missing_url_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_summary("nope").unwrap().is_none());
    }

    #[test]
    fn summary_status_parse_round_trip() {
        for s in [
            SummaryStatus::Pending,
            SummaryStatus::Processing,
            SummaryStatus::Completed,
            SummaryStatus::Failed,
        ] {
            assert_eq!(SummaryStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(SummaryStatus::parse("unknown"), None);
    }
}
