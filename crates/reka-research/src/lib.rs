// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod adapters;
pub mod cache;
pub mod chunker;
pub mod embeddings;
pub mod tools;
pub mod vector;

pub use adapters::{AdapterFetch, AdapterOperation, AdapterSet, SourceAdapter};
pub use cache::{ResearchCache, SummaryWorkerPool};
pub use chunker::chunk_text;
pub use embeddings::{
    cosine_similarity, deserialize_embedding, serialize_embedding, Embedder, EmbeddingClient,
};
pub use tools::{register_research_tools, ResearchContext};
pub use vector::VectorStore;
