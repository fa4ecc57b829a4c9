use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use twox_hash::XxHash64;

use lookbook_core::config::{expand_path, EmbeddingConfig};
use lookbook_core::traits::EmbeddingProvider;
use lookbook_core::types::{EmbeddingVector, Modality};

pub mod clip;
pub mod pool;
pub mod preprocess;
pub mod tokenize;

pub use clip::{ClipEmbedder, CLIP_EMBEDDING_DIM};
pub use pool::l2_normalize;
pub use preprocess::ImageProcessor;

/// Deterministic hashing embedder for tests and development.
///
/// Text is hashed token by token, images window by window; both land in the
/// same `dim`-wide space and are L2-normalized.
pub struct FakeEmbedder { dim: usize, id: String }

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, id: format!("fake-hash:d{}", dim) } }

    fn hashed<I, T>(&self, items: I) -> Vec<f32>
    where
        I: IntoIterator<Item = T>,
        T: Hash,
    {
        let mut v = vec![0f32; self.dim];
        for (i, item) in items.into_iter().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            item.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn model_id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { self.dim }

    async fn embed_text(&self, text: &str) -> lookbook_core::Result<EmbeddingVector> {
        if text.trim().is_empty() { return Err(lookbook_core::Error::Embedding("text cannot be empty".into())); }
        let lowered = text.to_lowercase();
        let values = self.hashed(lowered.split_whitespace());
        Ok(EmbeddingVector::new(values, Modality::Text, self.id.clone()))
    }

    async fn embed_image(&self, image: &[u8]) -> lookbook_core::Result<EmbeddingVector> {
        preprocess::sniff_image(image).map_err(|e| lookbook_core::Error::Embedding(format!("{e:#}")))?;
        let values = self.hashed(image.chunks(64));
        Ok(EmbeddingVector::new(values, Modality::Image, self.id.clone()))
    }
}

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    if use_fake_embeddings() { info!("using FakeEmbedder"); return Ok(Arc::new(FakeEmbedder::new(CLIP_EMBEDDING_DIM))); }
    let model_dir = resolve_model_dir(config.model_dir.as_deref())?;
    Ok(Arc::new(ClipEmbedder::load(&model_dir, &config.model_id)?))
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured { let p = expand_path(dir); if p.exists() { info!(dir = %p.display(), "using configured model dir"); return Ok(p); } }
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") { let p = PathBuf::from(&dir); if p.exists() { info!(dir = %p.display(), "using APP_MODEL_DIR"); return Ok(p); } }
    if let Ok(dir) = std::env::var("MODEL_DIR") { let p = PathBuf::from(&dir); if p.exists() { info!(dir = %p.display(), "using MODEL_DIR"); return Ok(p); } }
    let root = Path::new("../models/clip-vit-base-patch32"); if root.exists() { return Ok(root.to_path_buf()); }
    let local = Path::new("models/clip-vit-base-patch32"); if local.exists() { return Ok(local.to_path_buf()); }
    Err(anyhow!("Could not locate CLIP model directory"))
}
