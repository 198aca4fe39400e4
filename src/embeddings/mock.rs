//! Deterministic in-process embedding provider for tests and wiring demos.

use async_trait::async_trait;

use crate::embeddings::EmbeddingProvider;
use crate::types::KbError;

/// Default output dimension of the mock provider.
pub const MOCK_DIMENSION: usize = 8;

/// Hash-derived embeddings: identical text always maps to the identical
/// unit-length vector, different texts almost surely differ. No semantic
/// meaning, which is exactly what deterministic tests want.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self {
            dimension: MOCK_DIMENSION,
        }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    fn hash_to_vec(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        let mut vector: Vec<f32> = (0..self.dimension)
            .map(|i| {
                let bits = seed.rotate_left(((i * 8) % 64) as u32) ^ ((i as u64) << 24);
                ((bits % 2003) as f32 / 1001.5) - 1.0
            })
            .collect();

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for value in &mut vector {
                *value /= norm;
            }
        } else if let Some(first) = vector.first_mut() {
            *first = 1.0;
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError> {
        Ok(self.hash_to_vec(text))
    }
}
