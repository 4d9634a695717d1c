//! The `memories.json` store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::embedding::{EmbeddingProvider, cosine_similarity};
use super::{MemoryError, MemoryItem};

/// Aggregate counters for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub count: usize,
    pub capacity: usize,
    pub total_accesses: u64,
    pub with_embeddings: usize,
}

/// Capped, persistent memory store.
///
/// All mutations rewrite `memories.json` atomically (temp file + rename), so
/// a crash mid-write can never leave a torn file behind.
pub struct MemoryStore {
    path: PathBuf,
    capacity: usize,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    items: RwLock<HashMap<String, MemoryItem>>,
}

impl MemoryStore {
    /// Load the store from `path`, creating an empty one when the file does
    /// not exist yet.
    pub async fn load(
        path: PathBuf,
        capacity: usize,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self, MemoryError> {
        let items = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<MemoryItem> = serde_json::from_slice(&bytes)
                    .map_err(|e| MemoryError::Load(format!("{}: {e}", path.display())))?;
                info!(count = list.len(), path = %path.display(), "loaded memories");
                list.into_iter().map(|item| (item.key.clone(), item)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(MemoryError::Load(format!("{}: {e}", path.display()))),
        };

        Ok(Self {
            path,
            capacity,
            embedder,
            items: RwLock::new(items),
        })
    }

    /// Insert or overwrite a memory. Evicts (least-frequently-used, then
    /// least-recently-accessed) until the new item fits the cap.
    pub async fn save(&self, key: &str, content: &str) -> Result<MemoryItem, MemoryError> {
        // Embedding is best effort: the memory is kept even when the remote
        // embedding service is down.
        let embedding = match &self.embedder {
            Some(embedder) => match embedder.embed(content).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!("embedding failed, storing without vector: {}", e);
                    None
                }
            },
            None => None,
        };

        let item = {
            let mut items = self.items.write().await;
            let item = match items.get_mut(key) {
                Some(existing) => {
                    existing.content = content.to_string();
                    existing.updated_at = Utc::now();
                    existing.embedding = embedding;
                    existing.clone()
                }
                None => {
                    while items.len() >= self.capacity {
                        evict_one(&mut items);
                    }
                    let item = MemoryItem::new(key.to_string(), content.to_string(), embedding);
                    items.insert(key.to_string(), item.clone());
                    item
                }
            };
            self.persist(&items).await?;
            item
        };

        debug!(key, "memory saved");
        Ok(item)
    }

    /// Direct lookup. Bumps the access counters (and persists them) on hit.
    pub async fn recall(&self, key: &str) -> Result<Option<MemoryItem>, MemoryError> {
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(key) else {
            return Ok(None);
        };
        item.access_count += 1;
        item.last_accessed_at = Utc::now();
        let found = item.clone();
        self.persist(&items).await?;
        Ok(Some(found))
    }

    /// Semantic search over stored embeddings. Returns an empty list when no
    /// embedding provider is configured.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<(MemoryItem, f32)>, MemoryError> {
        let Some(embedder) = &self.embedder else {
            return Ok(Vec::new());
        };
        let query_vector = embedder.embed(query).await?;

        let items = self.items.read().await;
        let mut scored: Vec<(MemoryItem, f32)> = items
            .values()
            .filter_map(|item| {
                item.embedding
                    .as_ref()
                    .map(|vector| (item.clone(), cosine_similarity(&query_vector, vector)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(max_results);
        Ok(scored)
    }

    /// Remove one memory; returns whether it existed.
    pub async fn forget(&self, key: &str) -> Result<bool, MemoryError> {
        let mut items = self.items.write().await;
        let existed = items.remove(key).is_some();
        if existed {
            self.persist(&items).await?;
        }
        Ok(existed)
    }

    /// Remove everything.
    pub async fn clear(&self) -> Result<(), MemoryError> {
        let mut items = self.items.write().await;
        items.clear();
        self.persist(&items).await
    }

    /// All memories, sorted by key, access counters untouched.
    pub async fn list(&self) -> Vec<MemoryItem> {
        let items = self.items.read().await;
        let mut list: Vec<MemoryItem> = items.values().cloned().collect();
        list.sort_by(|a, b| a.key.cmp(&b.key));
        list
    }

    pub async fn stats(&self) -> MemoryStats {
        let items = self.items.read().await;
        MemoryStats {
            count: items.len(),
            capacity: self.capacity,
            total_accesses: items.values().map(|i| i.access_count).sum(),
            with_embeddings: items.values().filter(|i| i.embedding.is_some()).count(),
        }
    }

    async fn persist(&self, items: &HashMap<String, MemoryItem>) -> Result<(), MemoryError> {
        let mut list: Vec<&MemoryItem> = items.values().collect();
        list.sort_by(|a, b| a.key.cmp(&b.key));
        let json = serde_json::to_vec_pretty(&list)
            .map_err(|e| MemoryError::Persist(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| MemoryError::Persist(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| MemoryError::Persist(format!("{}: {e}", self.path.display())))
    }
}

/// Drop the least valuable memory: lowest access count, oldest access as the
/// tie breaker.
fn evict_one(items: &mut HashMap<String, MemoryItem>) {
    let victim = items
        .values()
        .min_by(|a, b| {
            a.access_count
                .cmp(&b.access_count)
                .then(a.last_accessed_at.cmp(&b.last_accessed_at))
        })
        .map(|item| item.key.clone());
    if let Some(key) = victim {
        debug!(%key, "evicting memory");
        items.remove(&key);
    }
}
