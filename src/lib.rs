//! ```text
//! Documents ──► ingestion::ingest_directory ──┐
//!                                             │
//! add_document ──► chunking::chunk_document ──► embeddings::EmbeddingProvider
//!                                             │
//!                                             ▼
//!                      manager::KnowledgeBase ──► stores::VectorStore
//!                                                   ├─ SqliteVectorStore (sqlite-vec)
//!                                                   └─ MemoryVectorStore
//!
//! Query ──► retrieval::Retriever ──► {ranked chunks, citations} ──► external generation
//! ```
//!
//! The store is the single shared mutable resource; every other component is
//! stateless and injected with `Arc` handles, so independent callers can add,
//! delete, and query concurrently.

pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod ingestion;
pub mod manager;
pub mod retrieval;
pub mod stores;
pub mod types;

pub use chunking::{Chunk, ChunkingConfig};
pub use config::KbSettings;
pub use embeddings::{EmbeddingProvider, HttpEmbeddingProvider, MockEmbeddingProvider};
pub use manager::{IngestReport, KnowledgeBase};
pub use retrieval::{Citation, RetrievalResult, RetrievedChunk, Retriever};
pub use stores::{DocumentSummary, IndexEntry, SearchHit, VectorStore};
pub use types::KbError;
