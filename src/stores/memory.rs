//! In-process vector store for tests and ephemeral knowledge bases.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::stores::{
    DocumentLocks, DocumentSummary, IndexEntry, SearchHit, VectorStore, validate_document_entries,
    validate_entries, validate_top_k,
};
use crate::types::KbError;

struct StoredEntry {
    entry: IndexEntry,
    insert_seq: u64,
}

struct MemoryState {
    entries: HashMap<String, StoredEntry>,
    next_seq: u64,
}

/// HashMap-backed [`VectorStore`] with cosine scoring computed in Rust.
///
/// Semantics mirror the durable backend: writes are all-or-nothing (every
/// mutation happens under one state write lock), deletes are idempotent,
/// and searches read a consistent snapshot.
pub struct MemoryVectorStore {
    dimension: usize,
    state: RwLock<MemoryState>,
    locks: DocumentLocks,
}

impl MemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            state: RwLock::new(MemoryState {
                entries: HashMap::new(),
                next_seq: 0,
            }),
            locks: DocumentLocks::new(),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), KbError> {
        validate_entries(self.dimension, &entries)?;
        if entries.is_empty() {
            return Ok(());
        }
        let _guards = self
            .locks
            .lock_many(entries.iter().map(|e| e.document_id.as_str()))
            .await;
        let mut state = self.state.write();
        for entry in entries {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.insert(
                entry.chunk_id.clone(),
                StoredEntry {
                    entry,
                    insert_seq: seq,
                },
            );
        }
        Ok(())
    }

    async fn replace_document(
        &self,
        document_id: &str,
        entries: Vec<IndexEntry>,
    ) -> Result<(), KbError> {
        validate_document_entries(document_id, &entries)?;
        validate_entries(self.dimension, &entries)?;
        let _guard = self.locks.lock(document_id).await;
        let mut state = self.state.write();
        state
            .entries
            .retain(|_, stored| stored.entry.document_id != document_id);
        for entry in entries {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.insert(
                entry.chunk_id.clone(),
                StoredEntry {
                    entry,
                    insert_seq: seq,
                },
            );
        }
        Ok(())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize, KbError> {
        let _guard = self.locks.lock(document_id).await;
        let mut state = self.state.write();
        let before = state.entries.len();
        state
            .entries
            .retain(|_, stored| stored.entry.document_id != document_id);
        Ok(before - state.entries.len())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, KbError> {
        validate_top_k(top_k)?;
        crate::embeddings::ensure_dimension(self.dimension, query)?;

        let state = self.state.read();
        let mut scored: Vec<(f32, u64, &IndexEntry)> = state
            .entries
            .values()
            .map(|stored| {
                (
                    cosine_similarity(query, &stored.entry.embedding),
                    stored.insert_seq,
                    &stored.entry,
                )
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.cmp(&a.1))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, _, entry)| SearchHit {
                chunk_id: entry.chunk_id.clone(),
                document_id: entry.document_id.clone(),
                sequence_index: entry.sequence_index,
                text: entry.text.clone(),
                score,
                metadata: entry.metadata.clone(),
            })
            .collect())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, KbError> {
        let state = self.state.read();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for stored in state.entries.values() {
            *counts.entry(stored.entry.document_id.as_str()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(document_id, chunk_count)| DocumentSummary {
                document_id: document_id.to_string(),
                chunk_count,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, KbError> {
        Ok(self.state.read().entries.len())
    }
}
