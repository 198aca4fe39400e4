use serde::{Deserialize, Serialize};

use crate::types::KbError;

/// Default window width in words, matching common sentence-splitter setups.
pub const DEFAULT_CHUNK_SIZE: usize = 512;
/// Default number of words shared between adjacent chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 20;

/// Window parameters for the chunker, denominated in words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum number of words per chunk.
    pub chunk_size: usize,
    /// Trailing words of each chunk repeated at the start of the next one.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Checks the `overlap < chunk_size` invariant.
    pub fn validate(&self) -> Result<(), KbError> {
        if self.chunk_size == 0 {
            return Err(KbError::Configuration(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(KbError::Configuration(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}
