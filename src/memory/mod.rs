//! Persistent key/value memory with optional semantic search.
//!
//! Memories live in a single `memories.json` file rewritten atomically on
//! every mutation. The store enforces a configurable cap with
//! least-frequently-used eviction (ties broken by least-recently-accessed).
//! Semantic search runs over remote dense embeddings when an embedding
//! provider is configured; without one, search returns nothing and direct
//! key lookup keeps working.

mod embedding;
mod store;

pub use embedding::{EmbeddingProvider, RemoteEmbeddingClient, cosine_similarity};
pub use store::{MemoryStats, MemoryStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One remembered fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub key: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed_at: DateTime<Utc>,
    /// Dense embedding of the content, when an embedding provider was
    /// available at write time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryItem {
    pub fn new(key: String, content: String, embedding: Option<Vec<f32>>) -> Self {
        let now = Utc::now();
        Self {
            key,
            content,
            created_at: now,
            updated_at: now,
            access_count: 0,
            last_accessed_at: now,
            embedding,
        }
    }
}

/// Errors from the memory subsystem.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("failed to persist memories: {0}")]
    Persist(String),
    #[error("failed to load memories: {0}")]
    Load(String),
    #[error("embedding request failed: {0}")]
    Embedding(String),
}
