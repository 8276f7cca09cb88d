//! Anomaly inference pipeline
//!
//! Raw image bytes in, two heatmap byte buffers out: preprocessing, the
//! generator pass, the discriminator pass over the generator's output, and
//! two renders. Any step failure fails the whole pipeline; no partial
//! results are returned.

mod heatmap;
mod model;
mod preprocess;

use std::sync::Arc;

use tract_onnx::prelude::Tensor;

pub use heatmap::HeatmapRenderer;
pub use model::{AnomalyModel, OnnxModel};
pub use preprocess::{image_to_tensor, CHANNEL_MEAN, CHANNEL_STD, INPUT_SIZE};

use crate::Result;

/// Title rendered onto both heatmaps
pub const HEATMAP_TITLE: &str = "Heatmap anomaly detection";

/// The two rendered heatmaps for one processed image
pub struct Heatmaps {
    /// Generator reconstruction heatmap (JPEG bytes)
    pub generator: Vec<u8>,
    /// Discriminator patch-score heatmap (JPEG bytes)
    pub discriminator: Vec<u8>,
}

/// Orchestrates the dual-model anomaly detection pass
#[derive(Clone)]
pub struct AnomalyPipeline {
    generator: Arc<dyn AnomalyModel>,
    discriminator: Arc<dyn AnomalyModel>,
    renderer: Arc<HeatmapRenderer>,
}

impl AnomalyPipeline {
    /// Create a pipeline over the two loaded models
    #[must_use]
    pub fn new(generator: Arc<dyn AnomalyModel>, discriminator: Arc<dyn AnomalyModel>) -> Self {
        Self {
            generator,
            discriminator,
            renderer: Arc::new(HeatmapRenderer::new()),
        }
    }

    /// Run the full pipeline on raw image bytes
    ///
    /// Blocking: decoding, both forward passes and both renders happen
    /// inline. Callers on the async executor should wrap this in
    /// `spawn_blocking`.
    ///
    /// # Errors
    ///
    /// Returns error if decoding, either forward pass, or either render fails
    pub fn run(&self, image_bytes: &[u8]) -> Result<Heatmaps> {
        let input = preprocess::image_to_tensor(image_bytes)?;

        let reconstruction: Tensor = self.generator.forward(input)?;
        let scores = self.discriminator.forward(reconstruction.clone())?;

        let generator = self.renderer.render(&reconstruction, HEATMAP_TITLE)?;
        let discriminator = self.renderer.render(&scores, HEATMAP_TITLE)?;

        Ok(Heatmaps {
            generator,
            discriminator,
        })
    }
}
