use anyhow::Result;
use candle_core::{DType, Tensor};

/// Row-wise L2 normalization of a `[B, D]` feature tensor.
pub fn l2_normalize(features: &Tensor) -> Result<Tensor> {
    let dims = features.dims();
    assert_eq!(dims.len(), 2, "features shape must be [B,D]");
    let eps_val = match features.dtype() { DType::F16 => 1e-6f32, _ => 1e-12f32 };
    let eps = Tensor::new(&[eps_val], features.device())?.to_dtype(features.dtype())?.unsqueeze(0)?;
    let norm = features.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = norm.broadcast_add(&eps)?;
    let out = features.broadcast_div(&norm)?;
    Ok(out)
}

/// Flatten a single-row feature tensor into a unit-length host vector.
pub fn to_unit_vec(features: &Tensor) -> Result<Vec<f32>> {
    let normalized = l2_normalize(features)?;
    let host = normalized.to_device(&candle_core::Device::Cpu)?.to_dtype(DType::F32)?;
    Ok(host.squeeze(0)?.to_vec1::<f32>()?)
}
