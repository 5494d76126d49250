//! Image decoding
//!
//! Symbol detection is delegated to `rqrr`; this module only adapts frames to
//! it and enforces the "exactly one code" rule. A frame showing two codes is
//! treated as a miss so the scanner never has to pick between them.

use std::sync::Arc;

use image::GrayImage;
use thiserror::Error;
use tracing::{debug, warn};

/// No QR code could be read from an image
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    /// Bytes are not a supported image format
    #[error("Could not read image: {0}")]
    UnreadableImage(String),

    /// Image loaded but no single readable QR code was found
    #[error("No QR code found in image. Please upload a clear image of a QR code.")]
    NoCode,
}

/// Finds and decodes a QR code in a greyscale frame
pub trait ImageDecoder: Send + Sync {
    /// Decoded text if exactly one readable code is present
    fn decode(&self, frame: &GrayImage) -> Option<String>;
}

/// [`ImageDecoder`] backed by the `rqrr` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl RqrrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl ImageDecoder for RqrrDecoder {
    fn decode(&self, frame: &GrayImage) -> Option<String> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            width as usize,
            height as usize,
            |x, y| frame.get_pixel(x as u32, y as u32).0[0],
        );
        let grids = prepared.detect_grids();
        if grids.len() != 1 {
            debug!(grids = grids.len(), "Frame does not contain exactly one QR grid");
            return None;
        }

        match grids[0].decode() {
            Ok((_meta, content)) => Some(content),
            Err(e) => {
                debug!(error = ?e, "QR grid found but could not be decoded");
                None
            }
        }
    }
}

/// Load PNG/JPEG bytes as a greyscale frame
pub fn load_frame(bytes: &[u8]) -> Result<GrayImage, DecodeFailure> {
    image::load_from_memory(bytes)
        .map(|img| img.to_luma8())
        .map_err(|e| DecodeFailure::UnreadableImage(e.to_string()))
}

/// Decode a QR code from encoded image bytes (upload path)
pub fn decode_image_bytes(
    decoder: &dyn ImageDecoder,
    bytes: &[u8],
) -> Result<String, DecodeFailure> {
    let frame = load_frame(bytes)?;
    decoder.decode(&frame).ok_or(DecodeFailure::NoCode)
}

/// Decode one frame on the blocking pool
///
/// A panicked or cancelled decode task counts as a miss.
pub async fn decode_frame(decoder: Arc<dyn ImageDecoder>, frame: GrayImage) -> Option<String> {
    match tokio::task::spawn_blocking(move || decoder.decode(&frame)).await {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(error = %e, "Frame decode task failed");
            None
        }
    }
}

/// [`decode_image_bytes`] on the blocking pool
pub async fn decode_upload(
    decoder: Arc<dyn ImageDecoder>,
    bytes: Vec<u8>,
) -> Result<String, DecodeFailure> {
    tokio::task::spawn_blocking(move || decode_image_bytes(decoder.as_ref(), &bytes))
        .await
        .map_err(|e| DecodeFailure::UnreadableImage(format!("decode task failed: {}", e)))?
}
