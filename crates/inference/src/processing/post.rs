use common::span_debug;
use std::cmp::Ordering;

/// Maps model-input coordinates back onto the original image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub input_width: u32,
    pub input_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl TransformParams {
    /// Undo the letterbox and clamp to the original image bounds.
    #[inline]
    fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        let x = ((x - self.offset_x) / self.scale).clamp(0.0, self.orig_width as f32);
        let y = ((y - self.offset_y) / self.scale).clamp(0.0, self.orig_height as f32);
        (x, y)
    }
}

/// A detection in original image pixel coordinates. `x1 <= x2`, `y1 <= y2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union of two boxes.
    pub fn iou(&self, other: &Detection) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    pub fn bbox(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

pub struct PostProcessor {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32, iou_threshold: f32, max_detections: usize) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            max_detections,
        }
    }

    /// Decode YOLO output into detections ordered by descending confidence.
    ///
    /// `predictions` is `[1, 4 + num_classes, num_candidates]`: rows 0..4 hold
    /// the box as cxcywh in model-input pixels, the remaining rows hold
    /// per-class scores already in `[0, 1]`.
    #[tracing::instrument(skip(self, predictions, transform))]
    pub fn parse_detections(
        &self,
        predictions: &ndarray::ArrayViewD<f32>,
        transform: &TransformParams,
    ) -> anyhow::Result<Vec<Detection>> {
        let shape = predictions.shape();
        if shape.len() != 3 || shape[0] == 0 || shape[1] <= 4 {
            anyhow::bail!(
                "Unexpected prediction shape {:?}, expected [1, 4 + num_classes, num_candidates]",
                shape
            );
        }

        let num_classes = shape[1] - 4;
        let num_candidates = shape[2];

        let mut candidates = Vec::new();

        for i in 0..num_candidates {
            // Argmax over class scores
            let mut confidence = f32::NEG_INFINITY;
            let mut class_id = 0usize;
            for c in 0..num_classes {
                let score = predictions[[0, 4 + c, i]];
                if score > confidence {
                    confidence = score;
                    class_id = c;
                }
            }

            if !confidence.is_finite() || confidence < self.confidence_threshold {
                continue;
            }

            let cx = predictions[[0, 0, i]];
            let cy = predictions[[0, 1, i]];
            let w = predictions[[0, 2, i]];
            let h = predictions[[0, 3, i]];

            if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
                continue;
            }

            let (x1_input, y1_input, x2_input, y2_input) = cxcywh_to_xyxy(cx, cy, w, h);

            let (x1, y1) = transform.to_original(x1_input, y1_input);
            let (x2, y2) = transform.to_original(x2_input, y2_input);

            candidates.push(Detection {
                x1: x1.min(x2),
                y1: y1.min(y2),
                x2: x1.max(x2),
                y2: y1.max(y2),
                confidence: confidence.min(1.0),
                class_id: class_id as u32,
            });
        }

        tracing::trace!(
            candidates = candidates.len(),
            num_candidates,
            "Candidates above confidence threshold"
        );

        Ok(non_max_suppression(
            candidates,
            self.iou_threshold,
            self.max_detections,
        ))
    }
}

/// Class-aware greedy non-maximum suppression.
///
/// Keeps at most `max_detections` boxes, highest confidence first. A box is
/// dropped when it overlaps an already kept box of the same class by more
/// than `iou_threshold`.
pub fn non_max_suppression(
    mut candidates: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    let _s = span_debug!("non_max_suppression");

    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len().min(max_detections));

    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }

        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold
        });

        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}
