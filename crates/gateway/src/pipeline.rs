use crate::{codec, error::GatewayError, state::ModelHandle};
use inference::Detection;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DetectionRecord {
    pub class_name: String,
    pub class_id: u32,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in input image pixels.
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub success: bool,
    /// Base64 JPEG of the input with boxes drawn on it.
    pub annotated_image: String,
    pub detections: Vec<DetectionRecord>,
    pub num_detections: usize,
    /// `[width, height]` of the decoded input.
    pub image_size: [u32; 2],
}

/// Decode, detect, draw and encode one uploaded image.
///
/// Blocking; callers on the async runtime go through `spawn_blocking`.
pub fn run_prediction(
    handle: &ModelHandle,
    bytes: &[u8],
    jpeg_quality: u8,
) -> Result<PredictionResponse, GatewayError> {
    let image = {
        let _span = common::span!("decode");
        codec::decode_image(bytes)?
    };
    let (width, height) = image.dimensions();

    let detections = handle.detect(&image)?;

    let annotated_image = {
        let _span = common::span!("annotate");
        let annotated = handle.overlay().render(&image, &detections, handle.labels());
        codec::encode_jpeg_base64(&annotated, jpeg_quality)?
    };

    let detections: Vec<DetectionRecord> = detections
        .iter()
        .map(|det| to_record(det, handle))
        .collect();

    tracing::info!(
        width,
        height,
        detections = detections.len(),
        "Prediction complete"
    );

    Ok(PredictionResponse {
        success: true,
        annotated_image,
        num_detections: detections.len(),
        detections,
        image_size: [width, height],
    })
}

fn to_record(det: &Detection, handle: &ModelHandle) -> DetectionRecord {
    DetectionRecord {
        class_name: handle.labels().name(det.class_id).into_owned(),
        class_id: det.class_id,
        confidence: det.confidence,
        bbox: det.bbox(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use inference::{LabelMap, ObjectDetector, Overlay};
    use std::io::Cursor;

    struct ScriptedDetector {
        labels: LabelMap,
        detections: Vec<Detection>,
    }

    impl ObjectDetector for ScriptedDetector {
        fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
            Ok(self.detections.clone())
        }

        fn labels(&self) -> &LabelMap {
            &self.labels
        }

        fn model_type(&self) -> &str {
            "scripted"
        }
    }

    fn handle_with(detections: Vec<Detection>) -> ModelHandle {
        let detector = ScriptedDetector {
            labels: LabelMap::from_names(["debris", "satellite"]),
            detections,
        };
        ModelHandle::new(Box::new(detector), Overlay::with_default_font(2).unwrap())
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([40, 40, 40]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    fn det(class_id: u32, confidence: f32) -> Detection {
        Detection {
            x1: 10.0,
            y1: 20.0,
            x2: 60.0,
            y2: 70.0,
            confidence,
            class_id,
        }
    }

    #[test]
    fn test_records_preserve_detector_order_and_names() {
        let handle = handle_with(vec![det(1, 0.9), det(0, 0.7), det(5, 0.3)]);

        let response = run_prediction(&handle, &png_bytes(100, 80), 90).unwrap();

        assert!(response.success);
        assert_eq!(response.num_detections, 3);
        assert_eq!(response.image_size, [100, 80]);

        let names: Vec<_> = response.detections.iter().map(|d| d.class_name.as_str()).collect();
        assert_eq!(names, vec!["satellite", "debris", "class_5"]);
        assert_eq!(response.detections[0].bbox, [10.0, 20.0, 60.0, 70.0]);
    }

    #[test]
    fn test_empty_detections_are_a_valid_answer() {
        let handle = handle_with(Vec::new());

        let response = run_prediction(&handle, &png_bytes(32, 32), 90).unwrap();
        assert_eq!(response.num_detections, 0);
        assert!(response.detections.is_empty());
        assert!(!response.annotated_image.is_empty());
    }

    #[test]
    fn test_undecodable_bytes_are_invalid_input() {
        let handle = handle_with(Vec::new());

        let result = run_prediction(&handle, b"GIF89a but not really", 90);
        assert!(matches!(result, Err(GatewayError::InvalidInput(_))));
    }

    #[test]
    fn test_record_serializes_box_field() {
        let record = to_record(&det(0, 0.5), &handle_with(Vec::new()));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["class_name"], "debris");
        assert_eq!(json["class_id"], 0);
        assert_eq!(json["box"], serde_json::json!([10.0, 20.0, 60.0, 70.0]));
        assert!(json.get("bbox").is_none());
    }
}
