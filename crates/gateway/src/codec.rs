use crate::error::GatewayError;
use anyhow::Context;
use base64::{Engine, engine::general_purpose::STANDARD};
use image::{RgbImage, codecs::jpeg::JpegEncoder};

/// Decode an uploaded raster image and normalize it to 8-bit RGB.
///
/// Grayscale, alpha and 16-bit inputs are converted; alpha is dropped.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, GatewayError> {
    if bytes.is_empty() {
        return Err(GatewayError::invalid_input("Uploaded file is empty"));
    }

    let image = image::load_from_memory(bytes)
        .map_err(|e| GatewayError::invalid_input(format!("Could not decode image: {}", e)))?;

    Ok(image.to_rgb8())
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> anyhow::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(image.as_raw().len() / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder
        .encode_image(image)
        .context("Failed to encode JPEG")?;
    Ok(buffer)
}

/// JPEG bytes as standard, padded base64.
pub fn encode_jpeg_base64(image: &RgbImage, quality: u8) -> anyhow::Result<String> {
    let jpeg = encode_jpeg(image, quality)?;
    Ok(STANDARD.encode(jpeg))
}
