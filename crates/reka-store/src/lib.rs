// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! SQLite persistence layer.
//!
//! One [`Store`] wraps a single connection behind a mutex: SQLite wants one
//! writer at a time, and the mutex is exactly that serialization.  All
//! methods are synchronous and fast; async callers hold the lock only for
//! the duration of a statement.

mod embeddings;
mod findings;
mod history;
mod schema;
mod sessions;
mod url_cache;

use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use rusqlite::Connection;

pub use embeddings::EmbeddingRow;
pub use findings::Finding;
pub use history::{HistorySelector, InteractionRecord};
pub use sessions::{Session, SessionMessage};
pub use url_cache::{SummaryInfo, SummaryStatus, UrlCacheRow};

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (and migrate) the database at `path`, creating parent directories
    /// as needed.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory().context("opening in-memory database")?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("enabling foreign keys")?;
        schema::migrate(&conn).context("migrating schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let conn = self.conn.lock().expect("store lock");
        f(&conn)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
