//! Orchestration of chunker, embedder, and store.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chunking::{self, Chunk, ChunkingConfig};
use crate::embeddings::EmbeddingProvider;
use crate::stores::{DocumentSummary, IndexEntry, VectorStore};
use crate::types::KbError;

/// Outcome of a successful ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunk_count: usize,
    pub duration_ms: u64,
}

/// Manages the document lifecycle: chunk, embed, and index on add; drop
/// all derived vectors on delete.
///
/// Adding is all-or-nothing. Chunking and embedding run before the store
/// is touched, and the write itself is a single atomic document swap, so a
/// failure at any point leaves the store exactly as it was: the document
/// stays absent, or keeps its prior indexed version on a re-add.
pub struct KnowledgeBase {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunking: ChunkingConfig,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("chunking", &self.chunking)
            .finish_non_exhaustive()
    }
}

impl KnowledgeBase {
    /// Wires the components together, validating the chunking config and
    /// that embedder and store agree on the vector dimension.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
    ) -> Result<Self, KbError> {
        chunking.validate()?;
        if embedder.dimension() != store.dimension() {
            return Err(KbError::DimensionMismatch {
                expected: store.dimension(),
                actual: embedder.dimension(),
            });
        }
        Ok(Self {
            store,
            embedder,
            chunking,
        })
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        Arc::clone(&self.store)
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embedder)
    }

    /// Ingests `text` under `document_id`, replacing any prior version.
    ///
    /// Re-adding byte-identical content is a no-op at the vector level:
    /// chunk ids are deterministic and the write replaces rather than
    /// appends.
    pub async fn add_document(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<IngestReport, KbError> {
        self.add_document_with_metadata(document_id, text, serde_json::Value::Null)
            .await
    }

    /// Like [`add_document`](Self::add_document), attaching caller metadata
    /// (source name and the like) to every stored chunk alongside the
    /// ingestion timestamp.
    pub async fn add_document_with_metadata(
        &self,
        document_id: &str,
        text: &str,
        metadata: serde_json::Value,
    ) -> Result<IngestReport, KbError> {
        if document_id.trim().is_empty() {
            return Err(KbError::InvalidArgument(
                "document_id must not be empty".to_string(),
            ));
        }

        let started = Instant::now();
        match self.ingest(document_id, text, metadata).await {
            Ok(chunk_count) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(document_id, chunk_count, duration_ms, "indexed document");
                Ok(IngestReport {
                    document_id: document_id.to_string(),
                    chunk_count,
                    duration_ms,
                })
            }
            Err(err) => {
                warn!(document_id, error = %err, "ingestion failed, store unchanged");
                Err(KbError::ingestion(document_id, err))
            }
        }
    }

    async fn ingest(
        &self,
        document_id: &str,
        text: &str,
        metadata: serde_json::Value,
    ) -> Result<usize, KbError> {
        let chunks = chunking::chunk_document(document_id, text, &self.chunking)?;

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(KbError::EmbeddingUnavailable(format!(
                "provider returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let chunk_metadata = stamp_metadata(metadata);
        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| to_entry(chunk, embedding, chunk_metadata.clone()))
            .collect();

        let chunk_count = entries.len();
        self.store.replace_document(document_id, entries).await?;
        Ok(chunk_count)
    }

    /// Removes the document and every derived vector. Deleting a document
    /// that was never indexed succeeds with zero effect.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize, KbError> {
        let removed = self.store.delete_by_document(document_id).await?;
        info!(document_id, removed, "deleted document");
        Ok(removed)
    }

    /// Document-level view of the store: each id with its chunk count.
    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>, KbError> {
        self.store.list_documents().await
    }
}

fn to_entry(chunk: Chunk, embedding: Vec<f32>, metadata: serde_json::Value) -> IndexEntry {
    IndexEntry {
        chunk_id: chunk.chunk_id,
        document_id: chunk.document_id,
        sequence_index: chunk.sequence_index,
        start_offset: chunk.start_offset,
        end_offset: chunk.end_offset,
        text: chunk.text,
        embedding,
        metadata,
    }
}

/// Merges caller metadata with the ingestion timestamp. Non-object values
/// are preserved under an `"extra"` key.
fn stamp_metadata(metadata: serde_json::Value) -> serde_json::Value {
    let mut map = match metadata {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("extra".to_string(), other);
            map
        }
    };
    map.insert(
        "ingested_at".to_string(),
        serde_json::Value::String(Utc::now().to_rfc3339()),
    );
    serde_json::Value::Object(map)
}
