//! Chunk store for the knowledge base.
//!
//! Every FAQ chunk is kept with its embedding and metadata in one map and
//! scanned in full per query; support-desk knowledge bases stay in the low
//! thousands of chunks. The whole store round-trips through a JSON snapshot.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use unibot_core::error::UnibotError;

/// One scored chunk from [`VectorIndex::search`].
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: Uuid,
    /// Cosine similarity to the query embedding, in `[-1, 1]`.
    pub score: f64,
    /// Chunk metadata: source question, category, interface, chunk index.
    pub metadata: Value,
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    embedding: Vec<f32>,
    metadata: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    id: Uuid,
    embedding: Vec<f32>,
    metadata: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: Vec<SnapshotEntry>,
}

const SNAPSHOT_VERSION: u32 = 1;

/// `(id, embedding, metadata)` for one chunk.
pub type ChunkEntry = (Uuid, Vec<f32>, Value);

/// Shared chunk store. Clones share the same contents; writers take the
/// lock once per batch, so a search never sees half of an ingest.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    chunks: Arc<RwLock<HashMap<Uuid, IndexedChunk>>>,
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> UnibotError {
    UnibotError::Retrieval(format!("Index lock poisoned: {}", e))
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add chunks, overwriting any with the same id.
    pub fn insert_batch(&self, batch: Vec<ChunkEntry>) -> Result<(), UnibotError> {
        let mut chunks = self.chunks.write().map_err(poisoned)?;
        chunks.extend(
            batch
                .into_iter()
                .map(|(id, embedding, metadata)| (id, IndexedChunk { embedding, metadata })),
        );
        Ok(())
    }

    /// Swap the whole contents for `batch` under one write lock.
    pub fn replace_all(&self, batch: Vec<ChunkEntry>) -> Result<(), UnibotError> {
        let fresh: HashMap<Uuid, IndexedChunk> = batch
            .into_iter()
            .map(|(id, embedding, metadata)| (id, IndexedChunk { embedding, metadata }))
            .collect();
        *self.chunks.write().map_err(poisoned)? = fresh;
        Ok(())
    }

    /// The `k` chunks closest to `query`, best first. Ties break on id so
    /// the same query against the same contents returns the same list.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, UnibotError> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        let mut hits: Vec<SearchHit> = chunks
            .iter()
            .map(|(id, chunk)| SearchHit {
                id: *id,
                score: cosine_similarity(query, &chunk.embedding),
                metadata: chunk.metadata.clone(),
            })
            .collect();
        drop(chunks);

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the snapshot to a sibling temp file, then rename it over `path`.
    pub fn save(&self, path: &Path) -> Result<(), UnibotError> {
        let snapshot = {
            let chunks = self.chunks.read().map_err(poisoned)?;
            let mut entries: Vec<SnapshotEntry> = chunks
                .iter()
                .map(|(id, c)| SnapshotEntry {
                    id: *id,
                    embedding: c.embedding.clone(),
                    metadata: c.metadata.clone(),
                })
                .collect();
            entries.sort_by_key(|e| e.id);
            Snapshot {
                version: SNAPSHOT_VERSION,
                entries,
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&snapshot)?)?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), chunks = snapshot.entries.len(), "Knowledge index saved");
        Ok(())
    }

    /// Replace the contents with a snapshot written by [`save`](Self::save).
    /// Returns the number of chunks loaded.
    pub fn load(&self, path: &Path) -> Result<usize, UnibotError> {
        let snapshot: Snapshot = serde_json::from_slice(&std::fs::read(path)?)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(UnibotError::Retrieval(format!(
                "Unsupported index snapshot version {}",
                snapshot.version
            )));
        }
        let count = snapshot.entries.len();
        self.replace_all(
            snapshot
                .entries
                .into_iter()
                .map(|e| (e.id, e.embedding, e.metadata))
                .collect(),
        )?;
        info!(path = %path.display(), chunks = count, "Knowledge index loaded");
        Ok(count)
    }
}

/// Cosine of the angle between two embeddings, accumulated in `f64`.
///
/// Embeddings from different models (mismatched lengths) and all-zero
/// vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = a.iter().zip(b).fold((0.0f64, 0.0f64, 0.0f64), |acc, (&x, &y)| {
        let (x, y) = (f64::from(x), f64::from(y));
        (acc.0 + x * y, acc.1 + x * x, acc.2 + y * y)
    });
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Unit embedding pointing along one dimension, standing in for a chunk
    /// about a single topic.
    fn topic(dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 16];
        v[dim] = 1.0;
        v
    }

    fn chunk(question: &str, embedding: Vec<f32>) -> ChunkEntry {
        (Uuid::new_v4(), embedding, json!({ "question": question }))
    }

    #[test]
    fn test_search_ranks_matching_topic_first() {
        let index = VectorIndex::new();
        index
            .insert_batch(vec![
                chunk("How do I pay my fees?", topic(0)),
                chunk("When is graduation?", topic(1)),
                chunk("Where is the library?", topic(2)),
            ])
            .unwrap();

        let mut query = topic(1);
        query[0] = 0.2;
        let hits = index.search(&query, 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata["question"], "When is graduation?");
        assert_eq!(hits[1].metadata["question"], "How do I pay my fees?");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_equal_scores_come_back_in_id_order() {
        let index = VectorIndex::new();
        let batch: Vec<ChunkEntry> = (0..6)
            .map(|i| chunk(&format!("Duplicate FAQ {i}"), topic(3)))
            .collect();
        let mut ids: Vec<Uuid> = batch.iter().map(|(id, _, _)| *id).collect();
        ids.sort();
        index.insert_batch(batch).unwrap();

        let first: Vec<Uuid> = index.search(&topic(3), 4).unwrap().iter().map(|h| h.id).collect();
        let again: Vec<Uuid> = index.search(&topic(3), 4).unwrap().iter().map(|h| h.id).collect();
        assert_eq!(first, ids[..4].to_vec());
        assert_eq!(first, again);
    }

    #[test]
    fn test_empty_index_has_no_hits() {
        let index = VectorIndex::new();
        assert!(index.is_empty());
        assert!(index.search(&topic(0), 4).unwrap().is_empty());
    }

    #[test]
    fn test_reingest_drops_previous_chunks() {
        let index = VectorIndex::new();
        index
            .insert_batch(vec![chunk("Old refund policy", topic(0))])
            .unwrap();
        index
            .replace_all(vec![
                chunk("New refund policy", topic(0)),
                chunk("Exam schedule", topic(4)),
            ])
            .unwrap();

        assert_eq!(index.len(), 2);
        let hits = index.search(&topic(0), 4).unwrap();
        assert!(hits
            .iter()
            .all(|h| h.metadata["question"] != "Old refund policy"));
    }

    #[test]
    fn test_clones_share_contents() {
        let index = VectorIndex::new();
        let reader = index.clone();
        index
            .insert_batch(vec![chunk("How do I reset my LMS password?", topic(5))])
            .unwrap();
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn test_snapshot_round_trip_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index").join("knowledge.json");

        let index = VectorIndex::new();
        let (id, embedding, metadata) = chunk("When are exams?", topic(6));
        index.insert_batch(vec![(id, embedding, metadata)]).unwrap();
        index.save(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let restored = VectorIndex::new();
        restored
            .insert_batch(vec![chunk("Stale chunk", topic(0))])
            .unwrap();
        assert_eq!(restored.load(&path).unwrap(), 1);

        let hits = restored.search(&topic(6), 1).unwrap();
        assert_eq!(hits[0].id, id);
        assert_eq!(hits[0].metadata["question"], "When are exams?");
    }

    #[test]
    fn test_load_rejects_unknown_snapshot_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        std::fs::write(&path, r#"{"version": 99, "entries": []}"#).unwrap();
        let err = VectorIndex::new().load(&path).unwrap_err();
        assert!(matches!(err, UnibotError::Retrieval(_)));
    }

    #[test]
    fn test_load_missing_snapshot_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = VectorIndex::new()
            .load(&dir.path().join("absent.json"))
            .unwrap_err();
        assert!(matches!(err, UnibotError::Io(_)));
    }

    #[test]
    fn test_cosine_scores_for_chunk_embeddings() {
        let fees = [0.6f32, 0.8, 0.0];
        let scaled_fees = [3.0f32, 4.0, 0.0];
        let library = [0.0f32, 0.0, 1.0];
        let opposite = [-0.6f32, -0.8, 0.0];

        assert!((cosine_similarity(&fees, &scaled_fees) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&fees, &library).abs() < 1e-9);
        assert!((cosine_similarity(&fees, &opposite) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[0.0; 3], &[0.6, 0.8, 0.0]), 0.0);
        // A 384-dim query against a 1536-dim chunk from another model.
        assert_eq!(cosine_similarity(&[1.0; 384], &[1.0; 1536]), 0.0);
    }
}
