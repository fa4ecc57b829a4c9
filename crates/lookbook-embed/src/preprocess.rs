//! CLIP image preprocessing: decode, resize to 224x224, normalize with the
//! CLIP channel mean/std, and lay out as a planar `[3, H, W]` buffer.

use anyhow::{Result, anyhow};
use image::imageops::FilterType;

pub const CLIP_IMAGE_SIZE: u32 = 224;
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_1];

pub struct ImageProcessor {
    target_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Default for ImageProcessor {
    fn default() -> Self { Self::new() }
}

impl ImageProcessor {
    pub fn new() -> Self { Self { target_size: CLIP_IMAGE_SIZE, mean: CLIP_MEAN, std: CLIP_STD } }

    pub fn target_size(&self) -> u32 { self.target_size }

    /// Returns `3 * size * size` values, channel-major.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        if bytes.is_empty() { return Err(anyhow!("image is empty")); }
        let img = image::load_from_memory(bytes).map_err(|e| anyhow!("failed to decode image: {}", e))?;
        let size = self.target_size;
        let rgb = img.resize_exact(size, size, FilterType::Triangle).to_rgb8();
        let plane = (size * size) as usize;
        let mut out = vec![0f32; 3 * plane];
        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                out[c * plane + i] = (f32::from(pixel[c]) / 255.0 - self.mean[c]) / self.std[c];
            }
        }
        Ok(out)
    }
}

/// Cheap validity check on the container magic bytes, without a full decode.
pub fn sniff_image(bytes: &[u8]) -> Result<image::ImageFormat> {
    if bytes.is_empty() { return Err(anyhow!("image is empty")); }
    image::guess_format(bytes).map_err(|e| anyhow!("unrecognized image data: {}", e))
}
