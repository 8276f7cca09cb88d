//! Model artifacts as opaque inference functions

use std::path::Path;

use tract_onnx::prelude::*;

use crate::{Error, Result};

use super::preprocess::INPUT_SIZE;

/// An opaque forward pass over a loaded model artifact
pub trait AnomalyModel: Send + Sync {
    /// Short label used in logs and errors
    fn label(&self) -> &str;

    /// Run the model on one input tensor
    ///
    /// # Errors
    ///
    /// Returns error if the forward pass fails
    fn forward(&self, input: Tensor) -> Result<Tensor>;
}

type RunnablePlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-backed model loaded once at startup
///
/// The optimized plan is immutable; concurrent forward passes each run with
/// their own state, so no serialization is needed around `forward`.
pub struct OnnxModel {
    label: String,
    plan: RunnablePlan,
}

impl OnnxModel {
    /// Load and optimize a model artifact
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing or the graph cannot be built
    pub fn load(path: &Path, label: &str) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "model artifact not found: {}",
                path.display()
            )));
        }

        let size = INPUT_SIZE as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| Error::Inference(format!("failed to load {label} model: {e}")))?;

        tracing::info!(label, path = %path.display(), "model artifact loaded");
        Ok(Self {
            label: label.to_string(),
            plan,
        })
    }
}

impl AnomalyModel for OnnxModel {
    fn label(&self) -> &str {
        &self.label
    }

    fn forward(&self, input: Tensor) -> Result<Tensor> {
        let mut outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| Error::Inference(format!("{} forward pass failed: {e}", self.label)))?;

        if outputs.is_empty() {
            return Err(Error::Inference(format!(
                "{} produced no output",
                self.label
            )));
        }

        Ok(outputs.remove(0).into_tensor())
    }
}
