use std::env;

use crate::db_pool::DEFAULT_MAX_CONNECTIONS;
use crate::image_normalizer::{
    NormalizeOptions, BULK_MAX_DIMENSION, DEFAULT_JPEG_QUALITY, UPLOAD_MAX_DIMENSION,
};
use crate::ingest::{IngestOptions, BULK_MAX_FILE_SIZE, DEFAULT_BATCH_SIZE};
use crate::upload::{UploadOptions, UPLOAD_MAX_FILE_SIZE};

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: String,
    pub remote_db_url: Option<String>,
    pub photos_path: String,
    pub bulk_max_file_size: u64,
    pub upload_max_file_size: u64,
    pub bulk_max_dimension: u32,
    pub upload_max_dimension: u32,
    pub jpeg_quality: u8,
    pub batch_size: usize,
    pub max_connections: u32,
}

fn var_or(name: &str, default: impl ToString) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let upload_max_file_size = env::var("PHOTO_GALLERY_UPLOAD_MAX_FILE_SIZE")
            .or_else(|_| env::var("MAX_FILE_SIZE"))
            .unwrap_or_else(|_| UPLOAD_MAX_FILE_SIZE.to_string())
            .parse()?;

        Ok(Config {
            db_url: var_or("PHOTO_GALLERY_DB_URL", "./data/photo-gallery.db"),
            remote_db_url: env::var("PHOTO_GALLERY_REMOTE_DB_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            photos_path: var_or("PHOTO_GALLERY_PHOTOS_PATH", "./photos"),
            bulk_max_file_size: var_or("PHOTO_GALLERY_BULK_MAX_FILE_SIZE", BULK_MAX_FILE_SIZE)
                .parse()?,
            upload_max_file_size,
            bulk_max_dimension: var_or("PHOTO_GALLERY_BULK_MAX_DIMENSION", BULK_MAX_DIMENSION)
                .parse()?,
            upload_max_dimension: var_or(
                "PHOTO_GALLERY_UPLOAD_MAX_DIMENSION",
                UPLOAD_MAX_DIMENSION,
            )
            .parse()?,
            jpeg_quality: var_or("PHOTO_GALLERY_JPEG_QUALITY", DEFAULT_JPEG_QUALITY).parse()?,
            batch_size: var_or("PHOTO_GALLERY_BATCH_SIZE", DEFAULT_BATCH_SIZE).parse()?,
            max_connections: var_or("PHOTO_GALLERY_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)
                .parse()?,
        })
    }

    pub fn bulk_ingest_options(&self) -> IngestOptions {
        IngestOptions {
            max_file_size: self.bulk_max_file_size,
            normalize: self.bulk_normalize_options(),
            batch_size: self.batch_size,
            ..IngestOptions::bulk()
        }
    }

    pub fn local_import_options(&self, replace_existing: bool) -> IngestOptions {
        IngestOptions {
            max_file_size: self.bulk_max_file_size,
            normalize: self.bulk_normalize_options(),
            batch_size: self.batch_size,
            replace_existing,
            ..IngestOptions::local_import()
        }
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            max_file_size: self.upload_max_file_size,
            normalize: NormalizeOptions::new(
                self.upload_max_dimension,
                self.upload_max_dimension,
                self.jpeg_quality,
            ),
            ..UploadOptions::default()
        }
    }

    fn bulk_normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions::new(
            self.bulk_max_dimension,
            self.bulk_max_dimension,
            self.jpeg_quality,
        )
    }
}
