//! Error taxonomy shared by every component of the knowledge base.

use thiserror::Error;

/// Errors surfaced by the knowledge-base core.
///
/// Every failure propagates to the immediate caller; nothing is retried
/// inside the core. Retry and timeout policy belong to external callers.
#[derive(Debug, Error)]
pub enum KbError {
    /// Invalid chunking or runtime configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The embedding capability is unreachable or returned an error.
    #[error("embedding capability unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A vector's length does not match the declared embedding dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A malformed argument such as an empty identifier or `top_k == 0`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A document failed to ingest; the store was left untouched.
    #[error("ingestion of document '{document_id}' failed")]
    Ingestion {
        document_id: String,
        #[source]
        source: Box<KbError>,
    },

    /// The backing store rejected or failed an operation.
    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl KbError {
    /// Wraps any error as an ingestion failure for `document_id`.
    pub fn ingestion(document_id: impl Into<String>, source: KbError) -> Self {
        KbError::Ingestion {
            document_id: document_id.into(),
            source: Box::new(source),
        }
    }
}
