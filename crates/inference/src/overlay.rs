use crate::{config::DetectorConfig, labels::LabelMap, processing::Detection};
use ab_glyph::{FontArc, PxScale};
use anyhow::Context;
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use std::path::Path;

// Ultralytics default palette
const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

const DEFAULT_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_PADDING: i32 = 2;
const MIN_FONT_SIZE: f32 = 12.0;
const FONT_SIZE_RATIO: f32 = 0.035;

pub fn class_color(class_id: u32) -> Rgb<u8> {
    Rgb(PALETTE[class_id as usize % PALETTE.len()])
}

/// Draws detection boxes, and labels when a font is available, onto a copy of
/// the input image.
pub struct Overlay {
    font: Option<FontArc>,
    line_width: u32,
}

impl Overlay {
    /// Box-only overlay.
    pub fn boxes_only(line_width: u32) -> Self {
        Self {
            font: None,
            line_width: line_width.max(1),
        }
    }

    /// Labels drawn with the bundled DejaVu Sans font.
    pub fn with_default_font(line_width: u32) -> anyhow::Result<Self> {
        let font = FontArc::try_from_slice(DEFAULT_FONT)
            .map_err(|e| anyhow::anyhow!("Invalid bundled font: {}", e))?;

        Ok(Self {
            font: Some(font),
            line_width: line_width.max(1),
        })
    }

    pub fn with_font_file(path: &Path, line_width: u32) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read font file {}", path.display()))?;
        let font = FontArc::try_from_vec(data)
            .map_err(|e| anyhow::anyhow!("Invalid font file {}: {}", path.display(), e))?;

        Ok(Self {
            font: Some(font),
            line_width: line_width.max(1),
        })
    }

    /// `font_path` overrides the bundled font.
    pub fn from_config(config: &DetectorConfig) -> anyhow::Result<Self> {
        match &config.font_path {
            Some(path) => Self::with_font_file(path, config.line_width),
            None => Self::with_default_font(config.line_width),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Returns an annotated copy of `image` with the same dimensions.
    pub fn render(
        &self,
        image: &RgbImage,
        detections: &[Detection],
        labels: &LabelMap,
    ) -> RgbImage {
        let mut canvas = image.clone();

        if canvas.width() == 0 || canvas.height() == 0 {
            return canvas;
        }

        let font_size = ((canvas.width() + canvas.height()) as f32 / 2.0 * FONT_SIZE_RATIO)
            .max(MIN_FONT_SIZE);

        for det in detections {
            let text = format!("{} {:.2}", labels.name(det.class_id), det.confidence);
            self.draw_detection(&mut canvas, det, &text, PxScale::from(font_size));
        }

        canvas
    }

    fn draw_detection(&self, canvas: &mut RgbImage, det: &Detection, text: &str, scale: PxScale) {
        let max_x = canvas.width() as i32 - 1;
        let max_y = canvas.height() as i32 - 1;

        let x1 = (det.x1.floor() as i32).clamp(0, max_x);
        let y1 = (det.y1.floor() as i32).clamp(0, max_y);
        let x2 = (det.x2.ceil() as i32 - 1).clamp(x1, max_x);
        let y2 = (det.y2.ceil() as i32 - 1).clamp(y1, max_y);

        let color = class_color(det.class_id);

        // Concentric rectangles, shrinking inwards
        for t in 0..self.line_width as i32 {
            let width = x2 - x1 + 1 - 2 * t;
            let height = y2 - y1 + 1 - 2 * t;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(x1 + t, y1 + t).of_size(width as u32, height as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        let Some(font) = &self.font else {
            return;
        };

        let (text_width, text_height) = text_size(scale, font, text);
        let tab_width = text_width as i32 + 2 * LABEL_PADDING;
        let tab_height = text_height as i32 + 2 * LABEL_PADDING;

        // Above the box when it fits, otherwise inside its top edge
        let tab_y = if y1 - tab_height >= 0 {
            y1 - tab_height
        } else {
            y1
        };

        draw_filled_rect_mut(
            canvas,
            Rect::at(x1, tab_y).of_size(tab_width.max(1) as u32, tab_height.max(1) as u32),
            color,
        );
        draw_text_mut(
            canvas,
            LABEL_TEXT_COLOR,
            x1 + LABEL_PADDING,
            tab_y + LABEL_PADDING,
            scale,
            font,
            text,
        );
    }
}
