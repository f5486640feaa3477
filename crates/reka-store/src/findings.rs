// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::Context;
use rusqlite::{params, OptionalExtension, Row};

use crate::Store;

/// A durable research fact with optional source attribution.
#[derive(Debug, Clone)]
pub struct Finding {
    pub id: i64,
    pub finding_text: String,
    pub source_url: Option<String>,
    pub source_title: Option<String>,
    /// JSON array of tag strings.
    pub tags_json: String,
    pub created_at: String,
}

impl Finding {
    pub fn tags(&self) -> Vec<String> {
        serde_json::from_str(&self.tags_json).unwrap_or_default()
    }
}

fn finding_from_row(row: &Row) -> rusqlite::Result<Finding> {
    Ok(Finding {
        id: row.get(0)?,
        finding_text: row.get(1)?,
        source_url: row.get(2)?,
        source_title: row.get(3)?,
        tags_json: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const FINDING_COLUMNS: &str = "id, finding_text, source_url, source_title, tags, created_at";

impl Store {
    pub fn save_finding(
        &self,
        finding_text: &str,
        source_url: Option<&str>,
        source_title: Option<&str>,
        tags_json: &str,
    ) -> anyhow::Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO findings (finding_text, source_url, source_title, tags)
                 VALUES (?1, ?2, ?3, ?4)",
                params![finding_text, source_url, source_title, tags_json],
            )
            .context("saving finding")?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_finding(&self, id: i64) -> anyhow::Result<Option<Finding>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {FINDING_COLUMNS} FROM findings WHERE id = ?1"),
                [id],
                finding_from_row,
            )
            .optional()
            .context("loading finding")
        })
    }

    /// Newest findings first; the fallback path when semantic search yields
    /// nothing or embeddings are unavailable.
    pub fn get_recent_findings(&self, limit: usize) -> anyhow::Result<Vec<Finding>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FINDING_COLUMNS} FROM findings ORDER BY id DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map([limit as i64], finding_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
