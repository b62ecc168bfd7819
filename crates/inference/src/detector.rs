use crate::{
    backend::{InferenceBackend, InferenceOutput},
    config::DetectorConfig,
    labels::LabelMap,
    processing::{Detection, PostProcessor, PreProcessor},
};
use image::RgbImage;

/// Object-safe detection capability: pixels in, detections out.
pub trait ObjectDetector: Send {
    /// Detections in `image` pixel coordinates, highest confidence first.
    fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Detection>>;

    fn labels(&self) -> &LabelMap;

    fn model_type(&self) -> &str;
}

/// Letterbox, run the backend, decode and suppress.
pub struct Detector<B: InferenceBackend> {
    backend: B,
    preprocessor: PreProcessor,
    postprocessor: PostProcessor,
    labels: LabelMap,
}

impl<B: InferenceBackend> Detector<B> {
    /// Load the backend from `config.model_path` and build the detector.
    pub fn load(config: &DetectorConfig) -> anyhow::Result<Self> {
        config.validate()?;

        tracing::info!(
            model_path = %config.model_path.display(),
            device = ?config.device,
            "Loading inference model"
        );
        let backend = B::load_model(config)?;

        Self::new(backend, config)
    }

    pub fn new(backend: B, config: &DetectorConfig) -> anyhow::Result<Self> {
        let labels = resolve_labels(config, backend.class_names())?;
        Ok(Self::with_labels(backend, config, labels))
    }

    pub fn with_labels(backend: B, config: &DetectorConfig, labels: LabelMap) -> Self {
        let preprocessor = PreProcessor::new(config.input_dims());
        let postprocessor = PostProcessor::new(
            config.confidence_threshold,
            config.iou_threshold,
            config.max_detections,
        );

        Self {
            backend,
            preprocessor,
            postprocessor,
            labels,
        }
    }
}

impl<B: InferenceBackend> ObjectDetector for Detector<B> {
    fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
        let span = tracing::info_span!(
            "detect",
            width = image.width(),
            height = image.height()
        );
        let _enter = span.enter();

        let (input, transform) = self.preprocessor.preprocess(image)?;

        let InferenceOutput { predictions } = {
            let _infer_span = tracing::info_span!("model_inference").entered();
            self.backend.infer(&input)?
        };

        let detections = self
            .postprocessor
            .parse_detections(&predictions.view(), &transform)?;

        tracing::debug!(detections = detections.len(), "Image processed");

        Ok(detections)
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }

    fn model_type(&self) -> &str {
        self.backend.model_type()
    }
}

/// Labels file, then names embedded in the model, then COCO.
pub fn resolve_labels(
    config: &DetectorConfig,
    embedded: Option<LabelMap>,
) -> anyhow::Result<LabelMap> {
    if let Some(path) = &config.labels_path {
        let labels = LabelMap::from_file(path)?;
        tracing::info!(path = %path.display(), classes = labels.len(), "Using labels file");
        return Ok(labels);
    }

    match embedded {
        Some(labels) if !labels.is_empty() => {
            tracing::info!(classes = labels.len(), "Using class names from model metadata");
            Ok(labels)
        }
        _ => {
            tracing::warn!("Model has no class names, falling back to COCO labels");
            Ok(LabelMap::coco())
        }
    }
}
