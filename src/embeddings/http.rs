//! Remote embedding provider speaking the OpenAI-compatible wire format.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::embeddings::{EmbeddingProvider, ensure_dimension};
use crate::types::KbError;

/// Maximum number of inputs sent in a single request. Larger batches are
/// chopped into sequential sub-batches so output order matches input order.
pub const MAX_BATCH: usize = 64;

/// Embedding provider backed by an HTTP `/embeddings` endpoint
/// (OpenAI-compatible: Ollama, vLLM, text-embeddings-inference, ...).
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    /// Creates a provider for `endpoint` (the full URL of the embeddings
    /// route) declaring output dimension `dimension`.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, KbError> {
        let client = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|err| KbError::Configuration(err.to_string()))?;
        Ok(Self::with_client(client, endpoint, model, dimension))
    }

    /// Creates a provider reusing an existing [`Client`].
    pub fn with_client(
        client: Client,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            dimension,
        }
    }

    async fn request_batch(&self, input: &[String]) -> Result<Vec<Vec<f32>>, KbError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingsRequest {
                model: &self.model,
                input,
            })
            .send()
            .await
            .map_err(|err| KbError::EmbeddingUnavailable(err.to_string()))?
            .error_for_status()
            .map_err(|err| KbError::EmbeddingUnavailable(err.to_string()))?;

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|err| KbError::EmbeddingUnavailable(format!("malformed response: {err}")))?;

        if body.data.len() != input.len() {
            return Err(KbError::EmbeddingUnavailable(format!(
                "provider returned {} vectors for {} inputs",
                body.data.len(),
                input.len()
            )));
        }

        // Rows may arrive in any order; `index` restores input order.
        let mut slots: Vec<Option<Vec<f32>>> = vec![None; input.len()];
        for row in body.data {
            let slot = slots.get_mut(row.index).ok_or_else(|| {
                KbError::EmbeddingUnavailable(format!("vector index {} out of range", row.index))
            })?;
            if slot.is_some() {
                return Err(KbError::EmbeddingUnavailable(format!(
                    "duplicate vector index {}",
                    row.index
                )));
            }
            ensure_dimension(self.dimension, &row.embedding)?;
            *slot = Some(row.embedding);
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError> {
        let input = [text.to_string()];
        let mut vectors = self.request_batch(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| KbError::EmbeddingUnavailable("empty response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KbError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for window in texts.chunks(MAX_BATCH) {
            vectors.extend(self.request_batch(window).await?);
        }
        Ok(vectors)
    }
}
