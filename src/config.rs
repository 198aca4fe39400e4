//! Environment-driven settings.
//!
//! Configuration lives in the process environment (optionally seeded from a
//! `.env` file); defaults match a small local setup with a 384-dimension
//! sentence-embedding model.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::chunking::ChunkingConfig;
use crate::types::KbError;

pub const DEFAULT_DB_PATH: &str = "./lorekeep.sqlite";
pub const DEFAULT_TOP_K: usize = 2;
pub const DEFAULT_EMBED_MODEL: &str = "bge-small-en-v1.5";
pub const DEFAULT_EMBED_DIMENSION: usize = 384;

/// Connection details of the embedding capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingSettings {
    /// Full URL of an OpenAI-compatible `/embeddings` route. When unset,
    /// callers typically fall back to the mock provider.
    pub endpoint: Option<String>,
    pub model: String,
    pub dimension: usize,
}

/// Runtime settings for stores, chunking, and retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KbSettings {
    pub database_path: PathBuf,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub embedding: EmbeddingSettings,
}

impl KbSettings {
    /// Reads settings from the environment, after loading `.env` if one is
    /// present. Unset variables fall back to defaults; unparsable values
    /// fail with [`KbError::Configuration`].
    pub fn from_env() -> Result<Self, KbError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, KbError> {
        let chunking = ChunkingConfig {
            chunk_size: parse_or(&lookup, "LOREKEEP_CHUNK_SIZE", ChunkingConfig::default().chunk_size)?,
            overlap: parse_or(&lookup, "LOREKEEP_CHUNK_OVERLAP", ChunkingConfig::default().overlap)?,
        };
        chunking.validate()?;

        Ok(Self {
            database_path: PathBuf::from(
                lookup("LOREKEEP_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            ),
            chunking,
            top_k: parse_or(&lookup, "LOREKEEP_TOP_K", DEFAULT_TOP_K)?,
            embedding: EmbeddingSettings {
                endpoint: lookup("LOREKEEP_EMBED_URL"),
                model: lookup("LOREKEEP_EMBED_MODEL")
                    .unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string()),
                dimension: parse_or(&lookup, "LOREKEEP_EMBED_DIM", DEFAULT_EMBED_DIMENSION)?,
            },
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, KbError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| KbError::Configuration(format!("{key} has invalid value '{raw}'"))),
    }
}
