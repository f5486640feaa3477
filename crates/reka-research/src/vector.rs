// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cosine-ranked retrieval over stored embeddings.
//!
//! Three indexes, all keyed back to their parent rows: page chunks and link
//! labels per `url_cache` row, and one vector per saved finding.

use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use reka_store::{Finding, Store};
use reka_tools::Link;

use crate::embeddings::{cosine_similarity, deserialize_embedding, serialize_embedding, Embedder};

pub struct VectorStore {
    store: Arc<Store>,
    embedder: Arc<dyn Embedder>,
}

impl VectorStore {
    pub fn new(store: Arc<Store>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub fn has_chunk_embeddings(&self, cache_id: i64) -> anyhow::Result<bool> {
        self.store.has_chunk_embeddings(cache_id)
    }

    pub fn has_link_embeddings(&self, cache_id: i64) -> anyhow::Result<bool> {
        self.store.has_link_embeddings(cache_id)
    }

    /// Embed and store page chunks; returns how many were stored.
    pub async fn store_chunk_embeddings(
        &self,
        cache_id: i64,
        chunks: &[String],
    ) -> anyhow::Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let vectors = self.embedder.embed(chunks).await?;
        let rows: Vec<(i64, String, Vec<u8>)> = chunks
            .iter()
            .zip(&vectors)
            .enumerate()
            .map(|(i, (text, vec))| (i as i64, text.clone(), serialize_embedding(vec)))
            .collect();
        debug!(cache_id, count = rows.len(), "storing chunk embeddings");
        self.store.insert_chunk_embeddings(cache_id, &rows)
    }

    /// Embed link labels.  The ordinal mirrors the link's position in the
    /// cache row's link list, which is how hrefs are recovered at ranking
    /// time.
    pub async fn store_link_embeddings(
        &self,
        cache_id: i64,
        links: &[Link],
    ) -> anyhow::Result<usize> {
        if links.is_empty() {
            return Ok(0);
        }
        let labels: Vec<String> = links.iter().map(|l| l.text.clone()).collect();
        let vectors = self.embedder.embed(&labels).await?;
        let rows: Vec<(i64, String, Vec<u8>)> = labels
            .iter()
            .zip(&vectors)
            .enumerate()
            .map(|(i, (text, vec))| (i as i64, text.clone(), serialize_embedding(vec)))
            .collect();
        debug!(cache_id, count = rows.len(), "storing link embeddings");
        self.store.insert_link_embeddings(cache_id, &rows)
    }

    pub async fn store_finding_embedding(
        &self,
        finding_id: i64,
        text: &str,
    ) -> anyhow::Result<()> {
        let vector = self.embedder.embed_single(text).await?;
        self.store
            .insert_finding_embedding(finding_id, text, &serialize_embedding(&vector))
    }

    /// Top-k chunks of one page by similarity to `query`.
    pub async fn search_chunks(
        &self,
        cache_id: i64,
        query: &str,
        top_k: usize,
    ) -> anyhow::Result<Vec<(String, f32)>> {
        let query_vec = self.embedder.embed_single(query).await?;
        let rows = self.store.load_chunk_embeddings(cache_id)?;
        let mut scored: Vec<(String, f32)> = rows
            .into_iter()
            .map(|row| {
                let vec = deserialize_embedding(&row.vector);
                (row.original_text, cosine_similarity(&query_vec, &vec))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Top-k links of one page by label similarity to `query`.
    pub async fn rank_links_by_relevance(
        &self,
        cache_id: i64,
        query: &str,
        top_k: usize,
    ) -> anyhow::Result<Vec<(Link, f32)>> {
        let query_vec = self.embedder.embed_single(query).await?;
        let rows = self.store.load_link_embeddings(cache_id)?;

        // Ordinals index into the cache row's link list; that is where the
        // hrefs live (embedding rows carry only the labels).
        let links_json = self
            .store
            .get_links_json_by_id(cache_id)?
            .context("cache row is gone")?;
        let cached_links: Vec<Link> = serde_json::from_str(&links_json).unwrap_or_default();

        let mut scored: Vec<(Link, f32)> = rows
            .into_iter()
            .filter_map(|row| {
                let href = cached_links.get(row.ordinal as usize)?.href.clone();
                let vec = deserialize_embedding(&row.vector);
                Some((
                    Link {
                        text: row.original_text,
                        href,
                    },
                    cosine_similarity(&query_vec, &vec),
                ))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Top-k findings across all sessions by similarity to `query`.
    pub async fn search_findings(
        &self,
        query: &str,
        top_k: usize,
    ) -> anyhow::Result<Vec<(Finding, f32)>> {
        let query_vec = self.embedder.embed_single(query).await?;
        let rows = self.store.load_finding_embeddings()?;
        let mut scored: Vec<(i64, f32)> = rows
            .into_iter()
            .map(|(finding_id, vector)| {
                let vec = deserialize_embedding(&vector);
                (finding_id, cosine_similarity(&query_vec, &vec))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        let mut results = Vec::with_capacity(scored.len());
        for (finding_id, score) in scored {
            if let Some(finding) = self.store.get_finding(finding_id)? {
                results.push((finding, score));
            }
        }
        Ok(results)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Deterministic embedder: a few fixed directions keyed by substring, so
    /// similarity behaves predictably without a model server.
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("rust") {
                        vec![1.0, 0.0, 0.0]
                    } else if t.contains("python") {
                        vec![0.0, 1.0, 0.0]
                    } else {
                        vec![0.0, 0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("embedding endpoint unreachable")
        }
    }

    fn vector_store() -> (Arc<Store>, VectorStore) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let vs = VectorStore::new(Arc::clone(&store), Arc::new(StubEmbedder));
        (store, vs)
    }

    #[tokio::test]
    async fn chunk_search_ranks_by_similarity() {
        let (store, vs) = vector_store();
        let (id, _) = store.upsert_url("https://x", "t", "content", "[]").unwrap();
        vs.store_chunk_embeddings(
            id,
            &[
                "all about rust ownership".to_string(),
                "python has a gil".to_string(),
                "gardening tips".to_string(),
            ],
        )
        .await
        .unwrap();

        let hits = vs.search_chunks(id, "rust borrow checker", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "all about rust ownership");
        assert!(hits[0].1 > hits[1].1);
    }

    #[tokio::test]
    async fn link_ranking_recovers_hrefs_by_ordinal() {
        let (store, vs) = vector_store();
        let links = vec![
            Link { text: "rust guide".into(), href: "https://x/rust".into() },
            Link { text: "python guide".into(), href: "https://x/python".into() },
        ];
        let links_json = serde_json::to_string(&links).unwrap();
        let (id, _) = store.upsert_url("https://x", "t", "c", &links_json).unwrap();
        vs.store_link_embeddings(id, &links).await.unwrap();

        let ranked = vs.rank_links_by_relevance(id, "rust", 1).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0.href, "https://x/rust");
        assert_eq!(ranked[0].0.text, "rust guide");
    }

    #[tokio::test]
    async fn finding_search_returns_parent_rows() {
        let (store, vs) = vector_store();
        let rust_id = store
            .save_finding("rust is memory safe", None, None, "[]")
            .unwrap();
        let other_id = store
            .save_finding("python ships batteries", None, None, "[]")
            .unwrap();
        vs.store_finding_embedding(rust_id, "rust is memory safe")
            .await
            .unwrap();
        vs.store_finding_embedding(other_id, "python ships batteries")
            .await
            .unwrap();

        let hits = vs.search_findings("rust", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, rust_id);
    }

    #[tokio::test]
    async fn empty_inputs_store_nothing() {
        let (store, vs) = vector_store();
        let (id, _) = store.upsert_url("https://x", "t", "c", "[]").unwrap();
        assert_eq!(vs.store_chunk_embeddings(id, &[]).await.unwrap(), 0);
        assert_eq!(vs.store_link_embeddings(id, &[]).await.unwrap(), 0);
        assert!(!vs.has_chunk_embeddings(id).unwrap());
    }

    #[tokio::test]
    async fn embedder_failure_propagates() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let vs = VectorStore::new(Arc::clone(&store), Arc::new(FailingEmbedder));
        let (id, _) = store.upsert_url("https://x", "t", "c", "[]").unwrap();
        assert!(vs
            .store_chunk_embeddings(id, &["text".to_string()])
            .await
            .is_err());
        assert!(vs.search_chunks(id, "q", 3).await.is_err());
    }
}
