//! PNG/JPEG decoding and fixed-quality JPEG re-encoding.

use std::io::Cursor;

use image::{ImageFormat, codecs::jpeg::JpegEncoder};
use thiserror::Error;

pub const JPEG_QUALITY: u8 = 75;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("unsupported image format")]
    UnsupportedFormat,
    #[error("image is {width}x{height}, exceeding the {max_pixels} pixel limit")]
    TooManyPixels {
        width: usize,
        height: usize,
        max_pixels: u64,
    },
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image: {0}")]
    Encode(String),
}

impl ImagingError {
    pub fn is_encode(&self) -> bool {
        matches!(self, Self::Encode(_))
    }
}

#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode a PNG or JPEG and re-encode it as a quality-75 JPEG.
///
/// Dimensions are read from the header first so oversized images are
/// rejected before any pixel buffer is allocated. Alpha is dropped.
pub fn compress_to_jpeg(source: &[u8], max_pixels: u64) -> Result<CompressedImage, ImagingError> {
    let format = image::guess_format(source).map_err(|_| ImagingError::UnsupportedFormat)?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return Err(ImagingError::UnsupportedFormat);
    }

    let size = imagesize::blob_size(source).map_err(|err| ImagingError::Decode(err.to_string()))?;
    let pixels = (size.width as u64).saturating_mul(size.height as u64);
    if pixels > max_pixels {
        return Err(ImagingError::TooManyPixels {
            width: size.width,
            height: size.height,
            max_pixels,
        });
    }

    let decoded = image::load_from_memory_with_format(source, format)
        .map_err(|err| ImagingError::Decode(err.to_string()))?;
    let rgb = decoded.to_rgb8();

    let mut buffer = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    encoder
        .encode_image(&rgb)
        .map_err(|err| ImagingError::Encode(err.to_string()))?;

    Ok(CompressedImage {
        bytes: buffer.into_inner(),
        width: rgb.width(),
        height: rgb.height(),
    })
}
