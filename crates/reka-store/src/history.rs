// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::Context;
use rusqlite::params;

use crate::Store;

/// One query/answer interaction in the global log (distinct from session
/// messages: every query lands here regardless of session).
#[derive(Debug, Clone)]
pub struct InteractionRecord {
    pub id: i64,
    pub timestamp: String,
    pub query: String,
    pub query_summary: String,
    pub answer_summary: String,
    pub answer: String,
    pub model: String,
}

/// Row selector for history cleanup: a single id, a comma list, an inclusive
/// range (either direction), or everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistorySelector {
    Ids(Vec<i64>),
    All,
}

impl HistorySelector {
    /// Parse `"7"`, `"1,3,9"` or `"4-2"`.
    pub fn parse(spec: &str) -> anyhow::Result<Self> {
        let spec = spec.trim();
        if let Some((a, b)) = spec.split_once('-') {
            let start: i64 = a.trim().parse().context("Invalid range format")?;
            let end: i64 = b.trim().parse().context("Invalid range format")?;
            let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
            return Ok(Self::Ids((lo..=hi).collect()));
        }
        if spec.contains(',') {
            let ids = spec
                .split(',')
                .map(|p| p.trim().parse::<i64>())
                .collect::<Result<Vec<_>, _>>()
                .context("Invalid list format")?;
            return Ok(Self::Ids(ids));
        }
        let id: i64 = spec.parse().context("Invalid ID format")?;
        Ok(Self::Ids(vec![id]))
    }
}

impl Store {
    pub fn save_interaction(
        &self,
        query: &str,
        answer: &str,
        model: &str,
        query_summary: &str,
        answer_summary: &str,
    ) -> anyhow::Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO history (query, query_summary, answer_summary, answer, model)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![query, query_summary, answer_summary, answer, model],
            )
            .context("saving interaction")?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Most recent interactions first.
    pub fn get_history(&self, limit: usize) -> anyhow::Result<Vec<InteractionRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, query, query_summary, answer_summary, answer, model
                 FROM history ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit as i64], |row| {
                    Ok(InteractionRecord {
                        id: row.get(0)?,
                        timestamp: row.get(1)?,
                        query: row.get(2)?,
                        query_summary: row.get(3)?,
                        answer_summary: row.get(4)?,
                        answer: row.get(5)?,
                        model: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_history(&self, selector: &HistorySelector) -> anyhow::Result<usize> {
        self.with_conn(|conn| match selector {
            HistorySelector::All => Ok(conn.execute("DELETE FROM history", [])?),
            HistorySelector::Ids(ids) => {
                let mut deleted = 0;
                for id in ids {
                    deleted += conn.execute("DELETE FROM history WHERE id = ?1", [id])?;
                }
                Ok(deleted)
            }
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_list_round_trip() {
        let store = Store::open_in_memory().unwrap();
        store
            .save_interaction("test query", "test answer", "test_model", "q sum", "a sum")
            .unwrap();
        let rows = store.get_history(1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].query, "test query");
        assert_eq!(rows[0].query_summary, "q sum");
        assert_eq!(rows[0].answer_summary, "a sum");
        assert_eq!(rows[0].answer, "test answer");
        assert_eq!(rows[0].model, "test_model");
    }

    #[test]
    fn history_is_newest_first() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .save_interaction(&format!("q{i}"), &format!("a{i}"), "m", "", "")
                .unwrap();
        }
        let rows = store.get_history(10).unwrap();
        assert_eq!(rows[0].query, "q2");
        assert_eq!(rows[2].query, "q0");
    }

    #[test]
    fn delete_single_id() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .save_interaction(&format!("q{i}"), "a", "m", "", "")
                .unwrap();
        }
        let target = store.get_history(10).unwrap()[0].id;
        store
            .delete_history(&HistorySelector::Ids(vec![target]))
            .unwrap();
        assert_eq!(store.get_history(10).unwrap().len(), 2);
    }

    #[test]
    fn delete_all() {
        let store = Store::open_in_memory().unwrap();
        for _ in 0..3 {
            store.save_interaction("q", "a", "m", "", "").unwrap();
        }
        store.delete_history(&HistorySelector::All).unwrap();
        assert!(store.get_history(10).unwrap().is_empty());
    }

    #[test]
    fn selector_parses_reverse_range() {
        // "4-2" deletes 2, 3 and 4.
        assert_eq!(
            HistorySelector::parse("4-2").unwrap(),
            HistorySelector::Ids(vec![2, 3, 4])
        );
    }

    #[test]
    fn selector_parses_list() {
        assert_eq!(
            HistorySelector::parse("1, 3, 9").unwrap(),
            HistorySelector::Ids(vec![1, 3, 9])
        );
    }

    #[test]
    fn selector_rejects_garbage() {
        assert!(HistorySelector::parse("a-b").unwrap_err().to_string().contains("Invalid range"));
        assert!(HistorySelector::parse("1,a").unwrap_err().to_string().contains("Invalid list"));
        assert!(HistorySelector::parse("abc").unwrap_err().to_string().contains("Invalid ID"));
    }

    #[test]
    fn delete_range_keeps_rest() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .save_interaction(&format!("q{i}"), "a", "m", "", "")
                .unwrap();
        }
        store
            .delete_history(&HistorySelector::parse("4-2").unwrap())
            .unwrap();
        let remaining = store.get_history(10).unwrap();
        assert_eq!(remaining.len(), 2);
    }
}
