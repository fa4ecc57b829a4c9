use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use lookbook_core::traits::EmbeddingProvider;
use lookbook_core::types::{EmbeddingVector, Modality};

use crate::pool::to_unit_vec;
use crate::preprocess::ImageProcessor;
use crate::tokenize::{eos_token_id, tokenize_clip, CLIP_MAX_LEN};

/// ViT-B/32 projection width.
pub const CLIP_EMBEDDING_DIM: usize = 512;

/// Metal when built with the `metal` feature and a GPU is present, CPU otherwise.
fn clip_device() -> Device {
    #[cfg(feature = "metal")]
    match Device::new_metal(0) {
        Ok(dev) => return dev,
        Err(e) => warn!(error = %e, "metal unavailable, falling back to CPU"),
    }
    Device::Cpu
}

struct ClipInner { model: ClipModel, tokenizer: Tokenizer, device: Device, processor: ImageProcessor, eos_id: u32 }

/// CLIP text and image towers sharing one embedding space.
pub struct ClipEmbedder { inner: Arc<ClipInner>, model_id: String }

impl ClipEmbedder {
    pub fn load(model_dir: &Path, model_id: &str) -> Result<Self> {
        let device = clip_device();
        info!(model = model_id, dir = %model_dir.display(), device = ?device, "loading CLIP model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let eos_id = eos_token_id(&tokenizer)?;
        let config = ClipConfig::vit_base_patch32();
        let safetensors = model_dir.join("model.safetensors");
        let vb = if safetensors.exists() {
            // SAFETY: the weights file is not modified while mapped.
            unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, &device)? }
        } else {
            let weights_path = model_dir.join("pytorch_model.bin");
            let weights = candle_core::pickle::read_all(&weights_path)?;
            let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
            VarBuilder::from_tensors(weights_map, DType::F32, &device)
        };
        let model = ClipModel::new(vb, &config)?;
        info!(model = model_id, "CLIP model loaded");
        let inner = ClipInner { model, tokenizer, device, processor: ImageProcessor::new(), eos_id };
        Ok(Self { inner: Arc::new(inner), model_id: model_id.to_string() })
    }
}

impl ClipInner {
    fn text_features(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let ids = tokenize_clip(&self.tokenizer, text, CLIP_MAX_LEN, self.eos_id)?;
        let input_ids = Tensor::new(ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let features = self.model.get_text_features(&input_ids)?;
        let v = to_unit_vec(&features)?;
        if start.elapsed().as_millis() > 100 { warn!(elapsed_ms = start.elapsed().as_millis() as u64, "slow text embedding"); }
        Ok(v)
    }

    fn image_features(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        let start = Instant::now();
        let size = self.processor.target_size() as usize;
        let pixels = self.processor.preprocess(bytes)?;
        let pixel_values = Tensor::from_vec(pixels, (1, 3, size, size), &self.device)?;
        let features = self.model.get_image_features(&pixel_values)?;
        let v = to_unit_vec(&features)?;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "image embedded");
        Ok(v)
    }
}

fn embedding_error(e: impl std::fmt::Display) -> lookbook_core::Error {
    lookbook_core::Error::Embedding(e.to_string())
}

#[async_trait]
impl EmbeddingProvider for ClipEmbedder {
    fn model_id(&self) -> &str { &self.model_id }

    fn dim(&self) -> usize { CLIP_EMBEDDING_DIM }

    async fn embed_text(&self, text: &str) -> lookbook_core::Result<EmbeddingVector> {
        if text.trim().is_empty() { return Err(embedding_error("text cannot be empty")); }
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        let values = tokio::task::spawn_blocking(move || inner.text_features(&text))
            .await
            .map_err(embedding_error)?
            .map_err(|e| embedding_error(format!("{e:#}")))?;
        Ok(EmbeddingVector::new(values, Modality::Text, self.model_id.clone()))
    }

    async fn embed_image(&self, image: &[u8]) -> lookbook_core::Result<EmbeddingVector> {
        let inner = Arc::clone(&self.inner);
        let bytes = image.to_vec();
        let values = tokio::task::spawn_blocking(move || inner.image_features(&bytes))
            .await
            .map_err(embedding_error)?
            .map_err(|e| embedding_error(format!("{e:#}")))?;
        Ok(EmbeddingVector::new(values, Modality::Image, self.model_id.clone()))
    }
}
