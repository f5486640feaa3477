// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::Context;
use rusqlite::params;

use crate::Store;

/// One stored vector with the text it was computed from.
#[derive(Debug, Clone)]
pub struct EmbeddingRow {
    pub ordinal: i64,
    pub original_text: String,
    /// Packed float32 little-endian.
    pub vector: Vec<u8>,
}

macro_rules! per_cache_embedding_ops {
    ($has:ident, $insert:ident, $load:ident, $table:literal) => {
        pub fn $has(&self, cache_id: i64) -> anyhow::Result<bool> {
            self.with_conn(|conn| {
                let count: i64 = conn.query_row(
                    concat!("SELECT COUNT(*) FROM ", $table, " WHERE cache_id = ?1"),
                    [cache_id],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
        }

        /// Insert all rows in one transaction; all-or-nothing.
        pub fn $insert(
            &self,
            cache_id: i64,
            rows: &[(i64, String, Vec<u8>)],
        ) -> anyhow::Result<usize> {
            self.with_conn(|conn| {
                conn.execute_batch("BEGIN")?;
                let result = (|| -> anyhow::Result<usize> {
                    let mut stmt = conn.prepare(concat!(
                        "INSERT INTO ",
                        $table,
                        " (cache_id, ordinal, original_text, vector) VALUES (?1, ?2, ?3, ?4)"
                    ))?;
                    for (ordinal, text, vector) in rows {
                        stmt.execute(params![cache_id, ordinal, text, vector])?;
                    }
                    Ok(rows.len())
                })();
                match result {
                    Ok(n) => {
                        conn.execute_batch("COMMIT")?;
                        Ok(n)
                    }
                    Err(e) => {
                        let _ = conn.execute_batch("ROLLBACK");
                        Err(e).context(concat!("inserting into ", $table))
                    }
                }
            })
        }

        pub fn $load(&self, cache_id: i64) -> anyhow::Result<Vec<EmbeddingRow>> {
            self.with_conn(|conn| {
                let mut stmt = conn.prepare(concat!(
                    "SELECT ordinal, original_text, vector FROM ",
                    $table,
                    " WHERE cache_id = ?1 ORDER BY ordinal"
                ))?;
                let rows = stmt
                    .query_map([cache_id], |row| {
                        Ok(EmbeddingRow {
                            ordinal: row.get(0)?,
                            original_text: row.get(1)?,
                            vector: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
        }
    };
}

impl Store {
    per_cache_embedding_ops!(
        has_chunk_embeddings,
        insert_chunk_embeddings,
        load_chunk_embeddings,
        "chunk_embeddings"
    );
    per_cache_embedding_ops!(
        has_link_embeddings,
        insert_link_embeddings,
        load_link_embeddings,
        "link_embeddings"
    );

    pub fn insert_finding_embedding(
        &self,
        finding_id: i64,
        text: &str,
        vector: &[u8],
    ) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO finding_embeddings (finding_id, ordinal, original_text, vector)
                 VALUES (?1, 0, ?2, ?3)",
                params![finding_id, text, vector],
            )
            .context("inserting finding embedding")?;
            Ok(())
        })
    }

    /// All finding vectors, as `(finding_id, vector)` pairs.
    pub fn load_finding_embeddings(&self) -> anyhow::Result<Vec<(i64, Vec<u8>)>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT finding_id, vector FROM finding_embeddings ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
