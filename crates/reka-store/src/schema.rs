// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::Connection;

/// Create all tables and indexes.  Statements are idempotent; this runs on
/// every open.
pub(crate) fn migrate(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            name              TEXT,
            model_alias       TEXT NOT NULL,
            created_at        TEXT NOT NULL DEFAULT (datetime('now')),
            compacted_summary TEXT,
            compaction_at     TEXT
        );

        CREATE TABLE IF NOT EXISTS session_messages (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            role       TEXT NOT NULL,
            content    TEXT NOT NULL,
            summary    TEXT NOT NULL DEFAULT '',
            tokens     INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_session_messages_session
            ON session_messages(session_id);

        CREATE TABLE IF NOT EXISTS history (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp      TEXT NOT NULL DEFAULT (datetime('now')),
            query          TEXT NOT NULL,
            query_summary  TEXT NOT NULL DEFAULT '',
            answer_summary TEXT NOT NULL DEFAULT '',
            answer         TEXT NOT NULL,
            model          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS url_cache (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            url            TEXT NOT NULL UNIQUE,
            title          TEXT NOT NULL DEFAULT '',
            content        TEXT NOT NULL DEFAULT '',
            links          TEXT NOT NULL DEFAULT '[]',
            summary        TEXT,
            summary_status TEXT NOT NULL DEFAULT 'pending',
            created_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS chunk_embeddings (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            cache_id      INTEGER NOT NULL REFERENCES url_cache(id) ON DELETE CASCADE,
            ordinal       INTEGER NOT NULL,
            original_text TEXT NOT NULL,
            vector        BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chunk_embeddings_cache
            ON chunk_embeddings(cache_id);

        CREATE TABLE IF NOT EXISTS link_embeddings (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            cache_id      INTEGER NOT NULL REFERENCES url_cache(id) ON DELETE CASCADE,
            ordinal       INTEGER NOT NULL,
            original_text TEXT NOT NULL,
            vector        BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_link_embeddings_cache
            ON link_embeddings(cache_id);

        CREATE TABLE IF NOT EXISTS findings (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            finding_text TEXT NOT NULL,
            source_url   TEXT,
            source_title TEXT,
            tags         TEXT NOT NULL DEFAULT '[]',
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS finding_embeddings (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            finding_id    INTEGER NOT NULL REFERENCES findings(id) ON DELETE CASCADE,
            ordinal       INTEGER NOT NULL DEFAULT 0,
            original_text TEXT NOT NULL,
            vector        BLOB NOT NULL
        );
        "#,
    )?;
    Ok(())
}
