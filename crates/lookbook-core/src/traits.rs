use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EmbeddingVector, IndexHit, Modality, ProductId, ProductMetadata};

/// Converts text or image input into vectors in one shared space.
///
/// Byte-identical inputs must embed to the same vector within a session.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identity of the producing model; vectors from different ids are not comparable.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed_text(&self, text: &str) -> Result<EmbeddingVector>;
    async fn embed_image(&self, image: &[u8]) -> Result<EmbeddingVector>;
}

/// Nearest-neighbor lookup over the vectors of one modality.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn modality(&self) -> Modality;
    /// Returns at most `k` hits, best first.
    async fn query(&self, vector: &EmbeddingVector, k: usize) -> Result<Vec<IndexHit>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// LLM-capable text generation. Output is untrusted free-form text.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<String>;
}

/// Product metadata lookup. Ids without a record are simply absent from the map.
#[async_trait]
pub trait ProductMetadataStore: Send + Sync {
    async fn get_many(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, ProductMetadata>>;
}
