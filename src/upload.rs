use chrono::Utc;
use log::{info, warn};
use std::path::Path;

use crate::error::UploadError;
use crate::file_scanner::ExtensionFilter;
use crate::image_normalizer::{try_normalize, NormalizeOptions};
use crate::mimetype_detector;
use crate::models::{parse_tags, NewPhoto, PhotoSummary, DEFAULT_MIME_TYPE};
use crate::store::PhotoStore;

pub const UPLOAD_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const UPLOAD_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "gif", "webp"];

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub extensions: ExtensionFilter,
    pub max_file_size: u64,
    pub normalize: NormalizeOptions,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            extensions: ExtensionFilter::new(UPLOAD_EXTENSIONS),
            max_file_size: UPLOAD_MAX_FILE_SIZE,
            normalize: NormalizeOptions::upload(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub description: Option<String>,
    /// Comma separated, as typed by the user.
    pub tags: Option<String>,
}

/// Stores a single user supplied image.
///
/// Unlike bulk ingestion there is no duplicate check, and a payload the codec
/// cannot read is still stored as-is with unknown dimensions.
pub async fn upload_photo(
    store: &dyn PhotoStore,
    request: UploadRequest,
    options: &UploadOptions,
) -> Result<PhotoSummary, UploadError> {
    if request.bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if !options.extensions.matches(Path::new(&request.filename)) {
        return Err(UploadError::UnsupportedType(request.filename));
    }
    let size = request.bytes.len() as u64;
    if size > options.max_file_size {
        return Err(UploadError::TooLarge {
            size,
            limit: options.max_file_size,
        });
    }

    let fallback_mime = mimetype_detector::from_path(Path::new(&request.filename))
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

    let (content, mime_type, width, height) = match try_normalize(request.bytes, &options.normalize) {
        Ok(image) => {
            let mime = image.mime_type();
            (image.bytes, mime, Some(image.width), Some(image.height))
        }
        Err(unprocessable) => {
            warn!(
                "Could not process {}, storing original bytes: {}",
                request.filename, unprocessable.error
            );
            (unprocessable.bytes, fallback_mime, None, None)
        }
    };

    let now = Utc::now();
    let photo = NewPhoto {
        filename: request.filename,
        content,
        mime_type: Some(mime_type),
        width,
        height,
        created_at: Some(now),
        updated_at: Some(now),
        description: request.description.filter(|d| !d.trim().is_empty()),
        tags: request.tags.as_deref().and_then(parse_tags),
    };

    let id = store.insert(&photo).await?;
    info!("Uploaded {} as id {}", photo.filename, id);

    Ok(PhotoSummary {
        id,
        byte_size: photo.byte_size(),
        filename: photo.filename,
        mime_type: photo.mime_type,
        width: photo.width,
        height: photo.height,
        created_at: now,
        updated_at: Some(now),
        description: photo.description,
        tags: photo.tags,
    })
}
