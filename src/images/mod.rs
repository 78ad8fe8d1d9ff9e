//! In-memory image canonicalization
//!
//! Whatever format the generation API returns, photos are sent as PNG.

use std::io::Cursor;

use image::ImageFormat;
use thiserror::Error;

/// PNG file signature
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode PNG: {0}")]
    Encode(#[source] image::ImageError),
}

/// Decode raw image bytes and re-encode them as PNG
pub fn to_png(data: &[u8]) -> Result<Vec<u8>, ImageError> {
    let img = image::load_from_memory(data).map_err(ImageError::Decode)?;

    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .map_err(ImageError::Encode)?;

    Ok(buffer.into_inner())
}
