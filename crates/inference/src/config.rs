use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_MAX_DETECTIONS: usize = 300;
pub const MAX_INPUT_SIZE: u32 = 4096;

/// ONNX Runtime execution provider used by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
}

/// Detector settings. Thresholds are fixed for the process lifetime.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    /// Side of the square model input, in pixels.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub device: ExecutionProvider,
    pub intra_threads: usize,
    /// Class names, one per line. Overrides names embedded in the model.
    pub labels_path: Option<PathBuf>,
    /// TrueType font used for overlay labels. Boxes only when unset.
    pub font_path: Option<PathBuf>,
    pub line_width: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/best.onnx"),
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
            device: ExecutionProvider::Cpu,
            intra_threads: 4,
            labels_path: None,
            font_path: None,
            line_width: 2,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.input_size == 0 || self.input_size % 32 != 0 {
            anyhow::bail!(
                "input_size must be a positive multiple of 32, got {}",
                self.input_size
            );
        }
        if self.input_size > MAX_INPUT_SIZE {
            anyhow::bail!(
                "input_size must be at most {}, got {}",
                MAX_INPUT_SIZE,
                self.input_size
            );
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            anyhow::bail!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            anyhow::bail!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            );
        }
        if self.max_detections == 0 {
            anyhow::bail!("max_detections must be greater than 0");
        }
        if self.intra_threads == 0 {
            anyhow::bail!("intra_threads must be greater than 0");
        }
        Ok(())
    }

    pub fn input_dims(&self) -> (u32, u32) {
        (self.input_size, self.input_size)
    }
}
