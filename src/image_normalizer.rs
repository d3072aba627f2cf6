use image::codecs::jpeg::JpegEncoder;
use image::error::{ImageFormatHint, UnsupportedError, UnsupportedErrorKind};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use log::debug;
use std::io::Cursor;

use crate::error::ImageError;
use crate::mimetype_detector;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;
pub const BULK_MAX_DIMENSION: u32 = 1920;
pub const UPLOAD_MAX_DIMENSION: u32 = 2000;

/// Bounds and quality used when an image has to be shrunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl NormalizeOptions {
    pub fn new(max_width: u32, max_height: u32, quality: u8) -> Self {
        Self {
            max_width: max_width.max(1),
            max_height: max_height.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    /// Bounds used by the bulk ingestion paths.
    pub fn bulk() -> Self {
        Self::new(BULK_MAX_DIMENSION, BULK_MAX_DIMENSION, DEFAULT_JPEG_QUALITY)
    }

    /// Bounds used by the interactive single upload.
    pub fn upload() -> Self {
        Self::new(UPLOAD_MAX_DIMENSION, UPLOAD_MAX_DIMENSION, DEFAULT_JPEG_QUALITY)
    }

    fn fits(&self, width: u32, height: u32) -> bool {
        width <= self.max_width && height <= self.max_height
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::bulk()
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub resized: bool,
}

impl NormalizedImage {
    pub fn mime_type(&self) -> String {
        mimetype_detector::from_format(self.format).to_string()
    }
}

fn unknown_format() -> image::ImageError {
    image::ImageError::Unsupported(UnsupportedError::from_format_and_kind(
        ImageFormatHint::Unknown,
        UnsupportedErrorKind::Format(ImageFormatHint::Unknown),
    ))
}

/// Input handed back by [`try_normalize`] when it is not a usable image.
#[derive(Debug)]
pub struct Unprocessable {
    pub error: ImageError,
    pub bytes: Vec<u8>,
}

enum Plan {
    Keep { width: u32, height: u32, format: ImageFormat },
    Resized(NormalizedImage),
}

fn plan(bytes: &[u8], options: &NormalizeOptions) -> Result<Plan, ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(image::ImageError::IoError(e)))?;
    let Some(format) = reader.format() else {
        return Err(ImageError::Decode(unknown_format()));
    };
    let (width, height) = reader.into_dimensions().map_err(ImageError::Decode)?;

    if options.fits(width, height) {
        return Ok(Plan::Keep {
            width,
            height,
            format,
        });
    }

    let decoded = image::load_from_memory_with_format(bytes, format).map_err(ImageError::Decode)?;
    let resized = decoded.resize(options.max_width, options.max_height, FilterType::Lanczos3);
    let (new_width, new_height) = (resized.width(), resized.height());

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    let mut output = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut output, options.quality);
    rgb.write_with_encoder(encoder).map_err(ImageError::Encode)?;

    debug!(
        "Resized {}x{} -> {}x{} ({} -> {} bytes)",
        width,
        height,
        new_width,
        new_height,
        bytes.len(),
        output.len()
    );

    Ok(Plan::Resized(NormalizedImage {
        bytes: output,
        width: new_width,
        height: new_height,
        format: ImageFormat::Jpeg,
        resized: true,
    }))
}

/// Validates `bytes` as an image and shrinks it to fit `options`.
///
/// Images already inside the bounds come back untouched (same bytes, no
/// re-encode). Larger ones are resized with their aspect ratio kept and
/// re-encoded as JPEG at `options.quality`.
pub fn normalize(bytes: Vec<u8>, options: &NormalizeOptions) -> Result<NormalizedImage, ImageError> {
    try_normalize(bytes, options).map_err(|unprocessable| unprocessable.error)
}

/// Same as [`normalize`], but returns the untouched input alongside the error.
pub fn try_normalize(
    bytes: Vec<u8>,
    options: &NormalizeOptions,
) -> Result<NormalizedImage, Unprocessable> {
    match plan(&bytes, options) {
        Ok(Plan::Keep {
            width,
            height,
            format,
        }) => Ok(NormalizedImage {
            bytes,
            width,
            height,
            format,
            resized: false,
        }),
        Ok(Plan::Resized(image)) => Ok(image),
        Err(error) => Err(Unprocessable { error, bytes }),
    }
}
