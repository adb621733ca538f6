//! Image payload decoding and normalization.
//!
//! Uploads may carry transparency, but the OCR model was tuned on opaque
//! backgrounds, so every decoded image is alpha-composited onto white and
//! reduced to three channels before it reaches the engine.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use thiserror::Error;

// cap on a single image payload
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("image payload is empty")]
    Empty,
    #[error("image payload is too large: {0} bytes (max: {1})")]
    TooLarge(usize, usize),
    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("failed to decode image: {0}")]
    Undecodable(String),
}

// decode arbitrary container bytes into an opaque 3-channel buffer,
// dimensions preserved
pub fn normalize(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(DecodeError::TooLarge(bytes.len(), MAX_IMAGE_BYTES));
    }
    let decoded =
        image::load_from_memory(bytes).map_err(|e| DecodeError::Undecodable(e.to_string()))?;
    Ok(flatten_onto_white(&decoded.to_rgba8()))
}

// out = alpha*src + (1-alpha)*white, per channel
pub fn flatten_onto_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
        let alpha = a as f32 / 255.0;
        let blend = |channel: u8| (alpha * channel as f32 + (1.0 - alpha) * 255.0).round() as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

// base64 payloads may arrive as browser data URLs; everything through the
// first comma is the scheme marker and gets discarded before decoding
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }
    let encoded = match trimmed.split_once(',') {
        Some((_, rest)) => rest,
        None => trimmed,
    };
    Ok(STANDARD.decode(encoded)?)
}
