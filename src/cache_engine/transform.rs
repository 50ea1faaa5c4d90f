//! Resize-to-fit + JPEG re-encode pipeline (§4.3.2).
//!
//! Image processing is treated as a capability that is always linked in this build (§9's
//! "capability flag resolved at startup" collapses to a compile-time constant here, since
//! the `image` crate is always available rather than optionally probed at runtime). The
//! degraded pass-through path still exists for formats `image` cannot decode.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};

pub struct Transformed {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Resizes `source` to fit within `(max_width, max_height)` without upscaling, then
/// re-encodes as baseline JPEG at `quality`. Falls back to streaming the source bytes
/// through unchanged when they cannot be decoded as an image.
///
/// §4.3.2 asks for a progressive encoder "when available" — `image`'s `JpegEncoder` only
/// writes baseline JPEG, and no dependency in this codebase's stack provides a progressive
/// encoder, so baseline is what's available here.
pub fn transform(
    source: &[u8],
    max_width: u32,
    max_height: u32,
    quality: u8,
) -> Transformed {
    match try_transform(source, max_width, max_height, quality) {
        Ok(transformed) => transformed,
        Err(err) => {
            tracing::warn!(%err, "Image decode failed; storing original bytes unmodified");
            Transformed {
                bytes: source.to_vec(),
                mime_type: "application/octet-stream",
                width: 0,
                height: 0,
            }
        }
    }
}

fn try_transform(
    source: &[u8],
    max_width: u32,
    max_height: u32,
    quality: u8,
) -> anyhow::Result<Transformed> {
    let decoded = image::load_from_memory(source)?;
    let (src_width, src_height) = decoded.dimensions();

    let resized = if src_width > max_width || src_height > max_height {
        decoded.resize(max_width, max_height, FilterType::Lanczos3)
    } else {
        decoded
    };
    let (width, height) = resized.dimensions();

    let mut bytes = Vec::new();
    let rgb = resized.to_rgb8();
    let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut bytes), quality);
    encoder.encode(rgb.as_raw(), width, height, image::ColorType::Rgb8.into())?;

    Ok(Transformed {
        bytes,
        mime_type: "image/jpeg",
        width,
        height,
    })
}
