// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::Context;
use rusqlite::{params, OptionalExtension, Row};

use crate::Store;

/// A persistent conversation thread.  Names are advisory and non-unique;
/// the `id` is the stable handle.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: i64,
    pub name: String,
    pub model_alias: String,
    pub created_at: String,
    pub compacted_summary: Option<String>,
    pub compaction_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionMessage {
    pub id: i64,
    pub session_id: i64,
    pub role: String,
    pub content: String,
    pub summary: String,
    pub tokens: i64,
    pub created_at: String,
}

fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        model_alias: row.get(2)?,
        created_at: row.get(3)?,
        compacted_summary: row.get(4)?,
        compaction_at: row.get(5)?,
    })
}

const SESSION_COLUMNS: &str =
    "id, name, model_alias, created_at, compacted_summary, compaction_at";

impl Store {
    pub fn create_session(&self, model_alias: &str, name: Option<&str>) -> anyhow::Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (name, model_alias) VALUES (?1, ?2)",
                params![name, model_alias],
            )
            .context("creating session")?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_session_by_id(&self, id: i64) -> anyhow::Result<Option<Session>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                [id],
                session_from_row,
            )
            .optional()
            .context("loading session")
        })
    }

    /// All sessions carrying `name`, oldest first.  Multiple rows are normal:
    /// names are non-unique.
    pub fn get_sessions_by_name(&self, name: &str) -> anyhow::Result<Vec<Session>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE name = ?1 ORDER BY id"
            ))?;
            let rows = stmt
                .query_map([name], session_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// First user message of a session, truncated, for duplicate-name
    /// disambiguation listings.
    pub fn get_first_message_preview(&self, session_id: i64) -> anyhow::Result<String> {
        self.with_conn(|conn| {
            let content: Option<String> = conn
                .query_row(
                    "SELECT content FROM session_messages
                     WHERE session_id = ?1 AND role = 'user' ORDER BY id LIMIT 1",
                    [session_id],
                    |row| row.get(0),
                )
                .optional()?;
            let mut preview = content.unwrap_or_default();
            if preview.len() > 80 {
                let mut end = 80;
                while end > 0 && !preview.is_char_boundary(end) {
                    end -= 1;
                }
                preview.truncate(end);
                preview.push_str("...");
            }
            Ok(preview)
        })
    }

    pub fn save_session_message(
        &self,
        session_id: i64,
        role: &str,
        content: &str,
        summary: &str,
        tokens: i64,
    ) -> anyhow::Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session_messages (session_id, role, content, summary, tokens)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![session_id, role, content, summary, tokens],
            )
            .context("saving session message")?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// All messages of a session in insertion order.
    pub fn get_session_messages(&self, session_id: i64) -> anyhow::Result<Vec<SessionMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, role, content, summary, tokens, created_at
                 FROM session_messages WHERE session_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([session_id], |row| {
                    Ok(SessionMessage {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        role: row.get(2)?,
                        content: row.get(3)?,
                        summary: row.get(4)?,
                        tokens: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Messages created strictly after `after` (an ISO timestamp, typically
    /// the session's `compaction_at`).  The effective context of a compacted
    /// session is its summary plus these messages.
    pub fn get_session_messages_after(
        &self,
        session_id: i64,
        after: &str,
    ) -> anyhow::Result<Vec<SessionMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, role, content, summary, tokens, created_at
                 FROM session_messages
                 WHERE session_id = ?1 AND created_at > ?2 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![session_id, after], |row| {
                    Ok(SessionMessage {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        role: row.get(2)?,
                        content: row.get(3)?,
                        summary: row.get(4)?,
                        tokens: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Record a compaction result.  Replaces any earlier summary; once set it
    /// is never cleared.
    pub fn set_compacted_summary(&self, session_id: i64, summary: &str) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions
                 SET compacted_summary = ?2, compaction_at = datetime('now')
                 WHERE id = ?1",
                params![session_id, summary],
            )?;
            anyhow::ensure!(changed == 1, "session {session_id} not found");
            Ok(())
        })
    }

    pub fn delete_session(&self, session_id: i64) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", [session_id])?;
            Ok(())
        })
    }

    pub fn delete_all_sessions(&self) -> anyhow::Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM sessions", [])?))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn create_and_load_session() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_session("gf", Some("research")).unwrap();
        let s = store.get_session_by_id(id).unwrap().unwrap();
        assert_eq!(s.name, "research");
        assert_eq!(s.model_alias, "gf");
        assert!(s.compacted_summary.is_none());
    }

    #[test]
    fn missing_session_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_session_by_id(42).unwrap().is_none());
    }

    #[test]
    fn names_are_non_unique() {
        let store = Store::open_in_memory().unwrap();
        let a = store.create_session("gf", Some("research")).unwrap();
        let b = store.create_session("gf", Some("research")).unwrap();
        let matches = store.get_sessions_by_name("research").unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, a);
        assert_eq!(matches[1].id, b);
    }

    #[test]
    fn messages_keep_insertion_order() {
        let store = Store::open_in_memory().unwrap();
        let sid = store.create_session("gf", None).unwrap();
        store
            .save_session_message(sid, "user", "first", "", 2)
            .unwrap();
        store
            .save_session_message(sid, "assistant", "second", "sum", 3)
            .unwrap();
        let msgs = store.get_session_messages(sid).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "first");
        assert_eq!(msgs[1].role, "assistant");
        assert_eq!(msgs[1].summary, "sum");
    }

    #[test]
    fn first_message_preview_truncates() {
        let store = Store::open_in_memory().unwrap();
        let sid = store.create_session("gf", None).unwrap();
        let long = "q".repeat(200);
        store.save_session_message(sid, "user", &long, "", 50).unwrap();
        let preview = store.get_first_message_preview(sid).unwrap();
        assert!(preview.len() < 90);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn preview_of_empty_session_is_empty() {
        let store = Store::open_in_memory().unwrap();
        let sid = store.create_session("gf", None).unwrap();
        assert_eq!(store.get_first_message_preview(sid).unwrap(), "");
    }

    #[test]
    fn compacted_summary_replaces_but_never_unsets() {
        let store = Store::open_in_memory().unwrap();
        let sid = store.create_session("gf", None).unwrap();
        store.set_compacted_summary(sid, "first summary").unwrap();
        store.set_compacted_summary(sid, "second summary").unwrap();
        let s = store.get_session_by_id(sid).unwrap().unwrap();
        assert_eq!(s.compacted_summary.as_deref(), Some("second summary"));
        assert!(s.compaction_at.is_some());
    }

    #[test]
    fn deleting_session_cascades_messages() {
        let store = Store::open_in_memory().unwrap();
        let sid = store.create_session("gf", None).unwrap();
        store.save_session_message(sid, "user", "hi", "", 1).unwrap();
        store.delete_session(sid).unwrap();
        assert!(store.get_session_by_id(sid).unwrap().is_none());
        assert!(store.get_session_messages(sid).unwrap().is_empty());
    }
}
