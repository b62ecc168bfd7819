use crate::{config::DetectorConfig, labels::LabelMap};
use ndarray::{Array, IxDyn};

#[cfg(feature = "ort-backend")]
pub mod ort;

pub trait InferenceBackend: Send {
    fn load_model(config: &DetectorConfig) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run inference on a letterboxed `[1, 3, H, W]` batch scaled to `[0, 1]`.
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;

    /// Class names embedded in the model, if any.
    fn class_names(&self) -> Option<LabelMap> {
        None
    }

    /// Short identifier reported by `/model-info`.
    fn model_type(&self) -> &str;
}

pub struct InferenceOutput {
    pub predictions: ndarray::ArrayD<f32>, // [1, 4 + num_classes, num_candidates] cxcywh in input pixels
}
