//! Deterministic splitting of documents into overlapping, retrievable chunks.
//!
//! Chunk identifiers are a pure function of `(document_id, sequence_index)`,
//! so re-chunking unchanged text always reproduces the same ids and byte
//! offsets. That determinism is what makes re-ingestion idempotent at the
//! vector level.

pub mod config;
pub mod splitter;

pub use config::ChunkingConfig;
pub use splitter::{Chunk, chunk_document};
