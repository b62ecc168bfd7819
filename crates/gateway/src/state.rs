use crate::{error::GatewayError, metrics::GatewayMetrics};
use image::RgbImage;
use inference::{
    Detection, Detector, DetectorConfig, LabelMap, ObjectDetector, Overlay, backend::ort::OrtBackend,
};
use std::sync::{Arc, Mutex};

/// Long-lived detector plus the read-only data the handlers need.
///
/// Labels and model type are copied out at construction so that metadata
/// endpoints never contend with a running detection.
pub struct ModelHandle {
    detector: Mutex<Box<dyn ObjectDetector>>,
    labels: LabelMap,
    model_type: String,
    overlay: Overlay,
}

impl ModelHandle {
    pub fn new(detector: Box<dyn ObjectDetector>, overlay: Overlay) -> Self {
        let labels = detector.labels().clone();
        let model_type = detector.model_type().to_string();

        Self {
            detector: Mutex::new(detector),
            labels,
            model_type,
            overlay,
        }
    }

    /// Load the ONNX model and overlay settings from `config`.
    ///
    /// A configured font that fails to load falls back to the bundled one.
    pub fn load(config: &DetectorConfig) -> anyhow::Result<Self> {
        let detector = Detector::<OrtBackend>::load(config)?;

        let overlay = Overlay::from_config(config)
            .or_else(|e| {
                tracing::warn!(error = %e, "Failed to load overlay font, using bundled font");
                Overlay::with_default_font(config.line_width)
            })
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load bundled font, drawing boxes only");
                Overlay::boxes_only(config.line_width)
            });

        Ok(Self::new(Box::new(detector), overlay))
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Blocking. Serializes concurrent callers on the detector lock.
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, GatewayError> {
        let mut detector = self.detector.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Detector lock poisoned by an earlier panic, recovering");
            self.detector.clear_poison();
            poisoned.into_inner()
        });

        Ok(detector.detect(image)?)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub model: Option<Arc<ModelHandle>>,
    pub jpeg_quality: u8,
    pub metrics: Arc<GatewayMetrics>,
}

impl AppState {
    pub fn new(model: Option<ModelHandle>, jpeg_quality: u8) -> Self {
        Self {
            model: model.map(Arc::new),
            jpeg_quality,
            metrics: Arc::new(GatewayMetrics::new()),
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Result<Arc<ModelHandle>, GatewayError> {
        self.model.clone().ok_or(GatewayError::ModelUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticDetector {
        labels: LabelMap,
        fail: bool,
        panic_next: bool,
    }

    impl ObjectDetector for StaticDetector {
        fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
            if self.panic_next {
                self.panic_next = false;
                panic!("backend panicked mid-inference");
            }
            if self.fail {
                anyhow::bail!("backend exploded");
            }
            Ok(vec![Detection {
                x1: 0.0,
                y1: 0.0,
                x2: image.width() as f32,
                y2: image.height() as f32,
                confidence: 0.8,
                class_id: 1,
            }])
        }

        fn labels(&self) -> &LabelMap {
            &self.labels
        }

        fn model_type(&self) -> &str {
            "static"
        }
    }

    fn handle(fail: bool) -> ModelHandle {
        handle_with(fail, false)
    }

    fn handle_with(fail: bool, panic_next: bool) -> ModelHandle {
        let detector = StaticDetector {
            labels: LabelMap::from_names(["debris", "satellite"]),
            fail,
            panic_next,
        };
        ModelHandle::new(Box::new(detector), Overlay::boxes_only(2))
    }

    #[test]
    fn test_handle_copies_metadata() {
        let handle = handle(false);
        assert_eq!(handle.model_type(), "static");
        assert_eq!(handle.labels().names(), vec!["debris", "satellite"]);
    }

    #[test]
    fn test_detect_forwards_to_detector() {
        let detections = handle(false).detect(&RgbImage::new(10, 20)).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox(), [0.0, 0.0, 10.0, 20.0]);
    }

    #[test]
    fn test_detector_failure_is_internal() {
        let result = handle(true).detect(&RgbImage::new(4, 4));
        assert!(matches!(result, Err(GatewayError::Internal(msg)) if msg.contains("exploded")));
    }

    #[test]
    fn test_detect_recovers_after_panic_poisons_lock() {
        let handle = handle_with(false, true);
        let image = RgbImage::new(8, 8);

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = handle.detect(&image);
        }));
        assert!(panicked.is_err());

        let detections = handle.detect(&image).unwrap();
        assert_eq!(detections.len(), 1);
        assert!(!handle.detector.is_poisoned());
    }

    #[test]
    fn test_unloaded_state_reports_model_unavailable() {
        let state = AppState::new(None, 90);
        assert!(!state.model_loaded());
        assert!(matches!(state.model(), Err(GatewayError::ModelUnavailable)));
    }
}
