#![allow(dead_code)]

use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Rgb};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use std::sync::Mutex;

use photo_gallery::error::StoreError;
use photo_gallery::models::{NewPhoto, Photo};
use photo_gallery::store::{PhotoStore, SqliteStore};

pub fn encode_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, format).unwrap();
    buffer.into_inner()
}

pub fn write_image(path: &Path, width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let bytes = encode_image(width, height, format);
    std::fs::write(path, &bytes).unwrap();
    bytes
}

pub fn photo(filename: &str, content: &[u8]) -> NewPhoto {
    NewPhoto {
        filename: filename.to_string(),
        content: content.to_vec(),
        ..Default::default()
    }
}

fn injected() -> StoreError {
    StoreError::Query(sqlx::Error::Protocol("injected failure".to_string()))
}

/// Wraps a real store and fails selected operations on demand.
pub struct FlakyStore {
    inner: SqliteStore,
    failing_inserts: Mutex<HashSet<String>>,
    failing_exists: Mutex<HashSet<String>>,
    pub fail_clear: bool,
    pub fail_fetch: bool,
}

impl FlakyStore {
    pub async fn new() -> Self {
        Self {
            inner: SqliteStore::in_memory().await.unwrap(),
            failing_inserts: Mutex::new(HashSet::new()),
            failing_exists: Mutex::new(HashSet::new()),
            fail_clear: false,
            fail_fetch: false,
        }
    }

    pub fn fail_insert_of(&self, filename: &str) {
        self.failing_inserts.lock().unwrap().insert(filename.to_string());
    }

    pub fn fail_exists_of(&self, filename: &str) {
        self.failing_exists.lock().unwrap().insert(filename.to_string());
    }

    pub fn inner(&self) -> &SqliteStore {
        &self.inner
    }
}

#[async_trait]
impl PhotoStore for FlakyStore {
    async fn exists(&self, filename: &str, byte_size: i64) -> Result<bool, StoreError> {
        if self.failing_exists.lock().unwrap().contains(filename) {
            return Err(injected());
        }
        self.inner.exists(filename, byte_size).await
    }

    async fn insert(&self, photo: &NewPhoto) -> Result<i64, StoreError> {
        if self.failing_inserts.lock().unwrap().contains(&photo.filename) {
            return Err(injected());
        }
        self.inner.insert(photo).await
    }

    async fn fetch_all_ordered(&self) -> Result<Vec<Photo>, StoreError> {
        if self.fail_fetch {
            return Err(injected());
        }
        self.inner.fetch_all_ordered().await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        if self.fail_clear {
            return Err(injected());
        }
        self.inner.clear().await
    }

    async fn count(&self) -> Result<i64, StoreError> {
        self.inner.count().await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}
