//! Query-time retrieval: embed the question, search the store, assemble a
//! ranked context with citations for the external generation step.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embeddings::EmbeddingProvider;
use crate::stores::{SearchHit, VectorStore};
use crate::types::KbError;

/// One retrieved passage, rank-ordered within a [`RetrievalResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub score: f32,
}

/// A source document backing part of the retrieved context. `score` is the
/// strongest (first-seen) similarity among the document's retrieved chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: String,
    pub score: f32,
}

/// Ordered retrieval outcome handed to the generation boundary.
///
/// An empty result is a valid, non-error outcome: the caller decides how to
/// respond when no context is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub hits: Vec<RetrievedChunk>,
    /// Distinct source documents in order of first (strongest) appearance.
    pub citations: Vec<Citation>,
}

impl RetrievalResult {
    fn from_hits(query: &str, hits: Vec<SearchHit>) -> Self {
        let mut citations: Vec<Citation> = Vec::new();
        let mut retrieved = Vec::with_capacity(hits.len());
        for hit in hits {
            if !citations.iter().any(|c| c.document_id == hit.document_id) {
                citations.push(Citation {
                    document_id: hit.document_id.clone(),
                    score: hit.score,
                });
            }
            retrieved.push(RetrievedChunk {
                chunk_id: hit.chunk_id,
                document_id: hit.document_id,
                text: hit.text,
                score: hit.score,
            });
        }
        Self {
            query: query.to_string(),
            hits: retrieved,
            citations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Concatenates the retrieved passages, rank order preserved, into the
    /// context block for the generation prompt.
    pub fn context_text(&self) -> String {
        self.hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Embeds queries and searches the store. Stateless; shares the store and
/// embedder handles with the rest of the system.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Retrieves the `top_k` most relevant chunks for `query_text`.
    ///
    /// Embedding failures propagate unchanged; an empty knowledge base (or
    /// no match at all) yields an empty result, not an error.
    pub async fn retrieve(
        &self,
        query_text: &str,
        top_k: usize,
    ) -> Result<RetrievalResult, KbError> {
        if top_k == 0 {
            return Err(KbError::InvalidArgument(
                "top_k must be positive".to_string(),
            ));
        }
        let query_vector = self.embedder.embed(query_text).await?;
        let hits = self.store.search(&query_vector, top_k).await?;
        debug!(top_k, hits = hits.len(), "retrieval complete");
        Ok(RetrievalResult::from_hits(query_text, hits))
    }
}
