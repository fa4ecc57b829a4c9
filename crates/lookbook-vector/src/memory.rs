use async_trait::async_trait;

use lookbook_core::traits::VectorIndex;
use lookbook_core::types::{EmbeddingVector, IndexHit, Modality, ProductId};
use lookbook_core::{Error, Result};

/// Brute-force cosine index held in memory. Used for small catalogs and tests.
pub struct InMemoryVectorIndex {
    modality: Modality,
    entries: Vec<(ProductId, Vec<f32>)>,
}

impl InMemoryVectorIndex {
    pub fn new(modality: Modality) -> Self {
        Self { modality, entries: Vec::new() }
    }

    pub fn insert(&mut self, product_id: impl Into<ProductId>, vector: Vec<f32>) {
        self.entries.push((product_id.into(), vector));
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn modality(&self) -> Modality { self.modality }

    async fn query(&self, vector: &EmbeddingVector, k: usize) -> Result<Vec<IndexHit>> {
        let mut hits = Vec::with_capacity(self.entries.len());
        for (id, v) in &self.entries {
            if v.len() != vector.dim() {
                return Err(Error::Index(format!("query dim {} does not match stored dim {} for {}", vector.dim(), v.len(), id)));
            }
            hits.push(IndexHit { product_id: id.clone(), score: cosine(&vector.values, v) });
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.product_id.cmp(&b.product_id)));
        hits.truncate(k);
        Ok(hits)
    }
}
