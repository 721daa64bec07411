use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage};

use crate::error::TransformError;

/// Fallback edge length when neither the requesting element nor the raster
/// itself reports a usable dimension.
pub const DEFAULT_EDGE: u32 = 300;

/// A blurred raster derived from one source, re-encoded and ready to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedImage {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
    pub data_url: String,
}

/// Resolve the dimensions the derived raster is produced at. Each axis falls
/// back independently: requested box, then the raster's natural size, then a
/// fixed default.
pub fn target_dimensions(requested: Option<(u32, u32)>, natural: (u32, u32)) -> (u32, u32) {
    let (req_w, req_h) = requested.unwrap_or((0, 0));
    let pick = |req: u32, nat: u32| {
        if req > 0 {
            req
        } else if nat > 0 {
            nat
        } else {
            DEFAULT_EDGE
        }
    };
    (pick(req_w, natural.0), pick(req_h, natural.1))
}

/// Decode `bytes`, scale to cover the target box (centered, aspect preserved,
/// overflow clipped), blur the whole surface, and re-encode as JPEG.
///
/// Pure pixel work; callers run it off the async executor.
pub fn derive_blurred(
    bytes: &[u8],
    source_id: &str,
    requested: Option<(u32, u32)>,
    blur_px: f32,
    quality: u8,
) -> Result<DerivedImage, TransformError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| TransformError::Decode {
        url: source_id.to_string(),
        reason: e.to_string(),
    })?;

    let (width, height) = target_dimensions(requested, (decoded.width(), decoded.height()));

    let blurred = decoded
        .resize_to_fill(width, height, FilterType::Triangle)
        .blur(blur_px)
        .to_rgb8();

    let mut out = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode(blurred.as_raw(), width, height, ColorType::Rgb8.into())
        .map_err(|e| TransformError::Encode {
            reason: e.to_string(),
        })?;

    let jpeg = out.into_inner();
    let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg));

    Ok(DerivedImage {
        width,
        height,
        jpeg,
        data_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 64]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_target_dimensions_fallback_chain() {
        assert_eq!(target_dimensions(Some((300, 169)), (1920, 1080)), (300, 169));
        assert_eq!(target_dimensions(None, (1920, 1080)), (1920, 1080));
        assert_eq!(target_dimensions(Some((0, 169)), (1920, 1080)), (1920, 169));
        assert_eq!(target_dimensions(None, (0, 0)), (DEFAULT_EDGE, DEFAULT_EDGE));
    }

    #[test]
    fn test_derive_produces_jpeg_at_requested_box() {
        let src = png_bytes(640, 480);
        let derived = derive_blurred(&src, "img/ep1.png", Some((300, 169)), 8.0, 85).unwrap();
        assert_eq!((derived.width, derived.height), (300, 169));
        // JPEG SOI marker
        assert_eq!(&derived.jpeg[..2], &[0xFF, 0xD8]);
        assert!(derived.data_url.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_derive_falls_back_to_natural_size() {
        let src = png_bytes(64, 48);
        let derived = derive_blurred(&src, "img/ep1.png", None, 4.0, 85).unwrap();
        assert_eq!((derived.width, derived.height), (64, 48));
    }

    #[test]
    fn test_derive_rejects_garbage_bytes() {
        let err = derive_blurred(b"not an image", "img/broken.jpg", None, 4.0, 85).unwrap_err();
        assert!(matches!(err, TransformError::Decode { .. }));
    }

    #[test]
    fn test_derivation_is_deterministic_per_source() {
        let src = png_bytes(320, 180);
        let a = derive_blurred(&src, "img/ep1.png", Some((160, 90)), 8.0, 85).unwrap();
        let b = derive_blurred(&src, "img/ep1.png", Some((160, 90)), 8.0, 85).unwrap();
        assert_eq!(a, b);
    }
}
