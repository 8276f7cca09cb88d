//! Image preprocessing for model input

use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::{Error, Result};

/// Model input spatial resolution
pub const INPUT_SIZE: u32 = 224;

/// Per-channel normalization mean (ImageNet statistics)
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel normalization standard deviation (ImageNet statistics)
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decode raw image bytes into the `[1, 3, 224, 224]` model input tensor
///
/// Decode, force RGB, bilinear resize to the model resolution, scale to the
/// unit interval, normalize per channel. No randomness anywhere: identical
/// bytes produce identical tensors.
///
/// # Errors
///
/// Returns error if the bytes do not decode as an image
pub fn image_to_tensor(bytes: &[u8]) -> Result<Tensor> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::Inference(format!("image decode failed: {e}")))?
        .to_rgb8();

    let resized = imageops::resize(&decoded, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

    let size = INPUT_SIZE as usize;
    let tensor: Tensor = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
        let value = f32::from(resized[(x as u32, y as u32)][c]) / 255.0;
        (value - CHANNEL_MEAN[c]) / CHANNEL_STD[c]
    })
    .into();

    Ok(tensor)
}
