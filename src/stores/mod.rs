//! Storage backends for chunk embeddings.
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │ VectorStore trait│
//!                  │   (async CRUD)   │
//!                  └────────┬─────────┘
//!                           │
//!              ┌────────────┴────────────┐
//!              ▼                         ▼
//!      ┌───────────────┐        ┌───────────────┐
//!      │    SQLite     │        │    Memory     │
//!      │  sqlite-vec   │        │  (tests, dev) │
//!      └───────────────┘        └───────────────┘
//! ```
//!
//! The store is the single shared mutable resource of the system. Both
//! backends uphold the same contract: batched writes are atomic, deletes
//! are idempotent, mutations of one document are serialized against each
//! other while different documents proceed in parallel, and a reader never
//! observes a half-replaced document.

pub mod memory;
pub mod sqlite;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::KbError;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// The persisted unit: one chunk with its vector and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub sequence_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// One row of a similarity search result; higher `score` is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_id: String,
    pub sequence_index: usize,
    pub text: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

/// Document-level view for the management surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub chunk_count: usize,
}

/// Unified contract for vector storage backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embedding dimension D, declared once at construction. Entries and
    /// query vectors of any other length are rejected.
    fn dimension(&self) -> usize;

    /// Inserts or replaces entries keyed by `chunk_id`. Atomic per call:
    /// either every entry in the batch becomes visible or none does.
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), KbError>;

    /// Replaces all entries of `document_id` with `entries` in one atomic
    /// step, deleting rows the new set no longer contains. Every entry must
    /// belong to `document_id`.
    async fn replace_document(
        &self,
        document_id: &str,
        entries: Vec<IndexEntry>,
    ) -> Result<(), KbError>;

    /// Removes every entry of `document_id`, returning how many were
    /// removed. Idempotent: unknown documents delete zero rows, not an
    /// error.
    async fn delete_by_document(&self, document_id: &str) -> Result<usize, KbError>;

    /// Returns the `top_k` entries ranked by cosine similarity to `query`,
    /// ties broken by insertion recency (most recently written wins).
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, KbError>;

    /// Distinct documents currently present with their chunk counts,
    /// sorted by `document_id`.
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, KbError>;

    /// Total number of stored entries.
    async fn count(&self) -> Result<usize, KbError>;
}

/// Per-document mutual exclusion shared by the backends.
///
/// Mutations acquire the lock of every document they touch, in sorted
/// order, so add/delete of the same document serialize while unrelated
/// documents proceed fully in parallel. Searches take no locks.
#[derive(Debug, Default)]
pub(crate) struct DocumentLocks {
    inner: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, document_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock();
        map.entry(document_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn lock(&self, document_id: &str) -> OwnedMutexGuard<()> {
        self.handle(document_id).lock_owned().await
    }

    /// Locks several documents in sorted order (sorted acquisition keeps
    /// concurrent multi-document writers deadlock-free).
    pub async fn lock_many<'a, I>(&self, document_ids: I) -> Vec<OwnedMutexGuard<()>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ordered: BTreeSet<&str> = document_ids.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for id in ordered {
            guards.push(self.lock(id).await);
        }
        guards
    }
}

pub(crate) fn validate_top_k(top_k: usize) -> Result<(), KbError> {
    if top_k == 0 {
        return Err(KbError::InvalidArgument(
            "top_k must be positive".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_entries(dimension: usize, entries: &[IndexEntry]) -> Result<(), KbError> {
    for entry in entries {
        crate::embeddings::ensure_dimension(dimension, &entry.embedding)?;
    }
    Ok(())
}

pub(crate) fn validate_document_entries(
    document_id: &str,
    entries: &[IndexEntry],
) -> Result<(), KbError> {
    if let Some(stray) = entries.iter().find(|e| e.document_id != document_id) {
        return Err(KbError::InvalidArgument(format!(
            "entry '{}' belongs to document '{}', not '{}'",
            stray.chunk_id, stray.document_id, document_id
        )));
    }
    Ok(())
}
