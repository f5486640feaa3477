// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Embedding client for OpenAI-compatible embedding endpoints.
//!
//! Failures propagate: every caller has a non-embedding fallback path
//! (unranked links, content previews, recent findings) and decides for
//! itself how to degrade.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use reka_config::ResearchConfig;

/// Seam over the embedding endpoint so the vector store can be exercised
/// without a live model server.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    async fn embed_single(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::ensure!(!text.trim().is_empty(), "cannot embed empty text");
        let mut result = self.embed(&[text.to_string()]).await?;
        anyhow::ensure!(!result.is_empty(), "embedding endpoint returned no vectors");
        Ok(result.remove(0))
    }
}

/// Process-wide embedding handle; construct once and share.
pub struct EmbeddingClient {
    api_url: String,
    model: String,
    batch_size: usize,
    http: reqwest::Client,
}

impl EmbeddingClient {
    pub fn new(config: &ResearchConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.embedding_timeout_secs))
            .build()
            .context("building embedding client")?;
        Ok(Self {
            api_url: config.embedding_api_url.clone(),
            model: config.embedding_model.clone(),
            batch_size: config.embedding_batch_size.max(1),
            http,
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        debug!(count = batch.len(), model = %self.model, "embedding batch");
        let resp = self
            .http
            .post(&self.api_url)
            .json(&json!({ "input": batch, "model": self.model }))
            .send()
            .await
            .with_context(|| format!("embedding request to {} failed", self.api_url))?;
        anyhow::ensure!(
            resp.status().is_success(),
            "embedding endpoint returned {}",
            resp.status()
        );
        let body: Value = resp.json().await.context("decoding embedding response")?;
        parse_embedding_response(&body)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = texts
            .iter()
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect();
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            all.extend(self.embed_batch(batch).await?);
        }
        Ok(all)
    }
}

/// Accepts both `{data: [{embedding: […]}]}` (OpenAI) and `{embeddings: […]}`.
pub(crate) fn parse_embedding_response(body: &Value) -> anyhow::Result<Vec<Vec<f32>>> {
    let vectors: Vec<Vec<f32>> = if let Some(data) = body.get("data").and_then(|d| d.as_array()) {
        data.iter()
            .map(|item| {
                item.get("embedding")
                    .and_then(|e| e.as_array())
                    .map(values_to_f32)
                    .context("data item has no embedding array")
            })
            .collect::<anyhow::Result<_>>()?
    } else if let Some(embeddings) = body.get("embeddings").and_then(|e| e.as_array()) {
        embeddings
            .iter()
            .map(|e| {
                e.as_array()
                    .map(values_to_f32)
                    .context("embeddings item is not an array")
            })
            .collect::<anyhow::Result<_>>()?
    } else {
        anyhow::bail!(
            "unexpected embedding response format: keys {:?}",
            body.as_object()
                .map(|o| o.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        );
    };
    Ok(vectors)
}

fn values_to_f32(values: &Vec<Value>) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

// ─── Vector serialization ─────────────────────────────────────────────────────

/// Pack a vector as float32 little-endian bytes for BLOB storage.
pub fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Inverse of [`serialize_embedding`]; trailing partial floats are dropped.
pub fn deserialize_embedding(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Serialization ─────────────────────────────────────────────────────────

    #[test]
    fn serialize_round_trip_is_bit_exact() {
        let v = vec![0.0f32, 1.5, -2.25, f32::MIN_POSITIVE, 1e30, -0.0];
        let bytes = serialize_embedding(&v);
        assert_eq!(bytes.len(), v.len() * 4);
        let back = deserialize_embedding(&bytes);
        assert_eq!(back.len(), v.len());
        for (a, b) in v.iter().zip(&back) {
            assert_eq!(a.to_bits(), b.to_bits(), "round-trip must be bit-exact");
        }
    }

    #[test]
    fn deserialize_empty_is_empty() {
        assert!(deserialize_embedding(&[]).is_empty());
    }

    #[test]
    fn deserialize_drops_trailing_partial_float() {
        let mut bytes = serialize_embedding(&[1.0, 2.0]);
        bytes.push(0xFF);
        assert_eq!(deserialize_embedding(&bytes), vec![1.0, 2.0]);
    }

    // ── Cosine ────────────────────────────────────────────────────────────────

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_opposite_vectors_is_minus_one() {
        assert!((cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    // ── Response parsing ──────────────────────────────────────────────────────

    #[test]
    fn parses_openai_data_format() {
        let body = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2] },
                { "embedding": [0.3, 0.4] },
            ]
        });
        let vectors = parse_embedding_response(&body).unwrap();
        assert_eq!(vectors.len(), 2);
        assert!((vectors[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn parses_plain_embeddings_format() {
        let body = serde_json::json!({ "embeddings": [[1.0, 0.0], [0.0, 1.0]] });
        let vectors = parse_embedding_response(&body).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![1.0, 0.0]);
    }

    #[test]
    fn unknown_format_is_an_error() {
        let body = serde_json::json!({ "vectors": [] });
        let err = parse_embedding_response(&body).unwrap_err();
        assert!(err.to_string().contains("unexpected embedding response"));
    }

    // ── Embedder trait ────────────────────────────────────────────────────────

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[tokio::test]
    async fn embed_single_rejects_empty_text() {
        assert!(StubEmbedder.embed_single("   ").await.is_err());
    }

    #[tokio::test]
    async fn embed_single_returns_first_vector() {
        let v = StubEmbedder.embed_single("abc").await.unwrap();
        assert_eq!(v, vec![3.0, 1.0]);
    }
}
