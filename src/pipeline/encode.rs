//! Image encoding: `DynamicImage` → JPEG or PNG bytes.
//!
//! JPEG has no alpha channel, so images are flattened to RGB8 first. The
//! configured quality (0.0–1.0) maps onto the encoder's 1–100 scale; PNG is
//! lossless and ignores it.

use crate::config::OutputFormat;
use crate::error::DecodeError;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode decoded pixels in the requested format.
///
/// `quality_percent` is only used for JPEG and is clamped to 1–100.
pub fn encode_image(
    img: &DynamicImage,
    format: OutputFormat,
    quality_percent: u8,
) -> Result<Vec<u8>, DecodeError> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality_percent.clamp(1, 100));
            rgb.write_with_encoder(encoder)
                .map_err(|e| DecodeError::Encode(e.to_string()))?;
        }
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
                .map_err(|e| DecodeError::Encode(e.to_string()))?;
        }
    }
    debug!(
        "Encoded {}x{} image → {} bytes {:?}",
        img.width(),
        img.height(),
        buf.len(),
        format
    );
    Ok(buf)
}
