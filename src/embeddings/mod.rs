//! The embedding capability boundary.
//!
//! Embedding is an external capability consumed through a narrow trait: the
//! provider declares one fixed output dimension at construction and every
//! vector it returns is validated against it. An unreachable or erroring
//! provider surfaces as [`KbError::EmbeddingUnavailable`] and propagates to
//! the caller unchanged; a document is never indexed with a missing vector.

pub mod http;
pub mod mock;

use async_trait::async_trait;

use crate::types::KbError;

pub use http::HttpEmbeddingProvider;
pub use mock::MockEmbeddingProvider;

/// Capability interface for mapping text into a fixed-dimension vector space.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short human-readable provider name, used in logs.
    fn name(&self) -> &str;

    /// Output dimension D, fixed for the lifetime of the provider.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError>;

    /// Embeds many texts, returning vectors in input order with the same
    /// length as the input. Exists purely as a throughput optimization;
    /// the default implementation embeds one text at a time.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KbError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Rejects vectors whose length differs from the declared dimension.
pub(crate) fn ensure_dimension(expected: usize, vector: &[f32]) -> Result<(), KbError> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(KbError::DimensionMismatch {
            expected,
            actual: vector.len(),
        })
    }
}
