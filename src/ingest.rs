use log::{error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::duplicate_filter::{DuplicateFilter, DuplicatePolicy};
use crate::error::{IngestError, ItemError};
use crate::file_scanner::{ExtensionFilter, FileScanner};
use crate::image_normalizer::{normalize, NormalizeOptions};
use crate::models::NewPhoto;
use crate::store::PhotoStore;

pub const BULK_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const BULK_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];
pub const LOCAL_IMPORT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff"];

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub extensions: ExtensionFilter,
    /// Files larger than this are skipped without being read.
    pub max_file_size: u64,
    pub normalize: NormalizeOptions,
    /// Only groups progress log lines; items are always processed one at a time.
    pub batch_size: usize,
    pub duplicate_policy: DuplicatePolicy,
    /// Clear the destination before the run starts.
    pub replace_existing: bool,
}

impl IngestOptions {
    pub fn bulk() -> Self {
        Self {
            extensions: ExtensionFilter::new(BULK_EXTENSIONS),
            max_file_size: BULK_MAX_FILE_SIZE,
            normalize: NormalizeOptions::bulk(),
            batch_size: DEFAULT_BATCH_SIZE,
            duplicate_policy: DuplicatePolicy::FailClosed,
            replace_existing: false,
        }
    }

    /// Local folder import; also accepts TIFF.
    pub fn local_import() -> Self {
        Self {
            extensions: ExtensionFilter::new(LOCAL_IMPORT_EXTENSIONS),
            ..Self::bulk()
        }
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::bulk()
    }
}

#[derive(Debug)]
pub enum ItemOutcome {
    Uploaded { id: i64, resized: bool },
    SkippedOversize { size: u64 },
    SkippedDuplicate,
    Failed(ItemError),
}

impl ItemOutcome {
    pub fn label(&self) -> String {
        match self {
            ItemOutcome::Uploaded { .. } => "uploaded".to_string(),
            ItemOutcome::SkippedOversize { .. } => "skipped:oversize".to_string(),
            ItemOutcome::SkippedDuplicate => "skipped:duplicate".to_string(),
            ItemOutcome::Failed(e) => format!("error:{}", e.kind()),
        }
    }
}

#[derive(Debug)]
pub struct ItemRecord {
    pub path: PathBuf,
    pub outcome: ItemOutcome,
}

#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub total: usize,
    pub uploaded: usize,
    pub skipped_duplicate: usize,
    pub skipped_oversize: usize,
    pub errors: usize,
    pub duration_secs: f64,
    #[serde(skip)]
    pub items: Vec<ItemRecord>,
}

impl IngestReport {
    pub fn skipped(&self) -> usize {
        self.skipped_duplicate + self.skipped_oversize
    }

    pub fn uploaded_ids(&self) -> Vec<i64> {
        self.items
            .iter()
            .filter_map(|item| match item.outcome {
                ItemOutcome::Uploaded { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&mut self, path: PathBuf, outcome: ItemOutcome) {
        self.total += 1;
        match outcome {
            ItemOutcome::Uploaded { .. } => self.uploaded += 1,
            ItemOutcome::SkippedOversize { .. } => self.skipped_oversize += 1,
            ItemOutcome::SkippedDuplicate => self.skipped_duplicate += 1,
            ItemOutcome::Failed(_) => self.errors += 1,
        }
        self.items.push(ItemRecord { path, outcome });
    }
}

/// Pushes candidate files into a store one at a time, isolating per-file failures.
pub struct BatchIngestor<'a> {
    store: &'a dyn PhotoStore,
    options: IngestOptions,
}

impl<'a> BatchIngestor<'a> {
    pub fn new(store: &'a dyn PhotoStore, options: IngestOptions) -> Self {
        Self { store, options }
    }

    /// Scans `root` and ingests every matching file.
    ///
    /// Only a bad root (or a failed clear in replace mode) fails the run; every
    /// per-file problem ends up in the report instead.
    pub async fn ingest_directory(&self, root: &Path) -> Result<IngestReport, IngestError> {
        let scanner = FileScanner::new(root, self.options.extensions.clone())?;

        if self.options.replace_existing {
            info!("Clearing destination before import");
            self.store.clear().await.map_err(IngestError::Clear)?;
        }

        Ok(self.ingest_paths(scanner).await)
    }

    pub async fn ingest_paths<I>(&self, paths: I) -> IngestReport
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let started = Instant::now();
        let batch_size = self.options.batch_size.max(1);
        let mut report = IngestReport::default();

        for path in paths {
            let outcome = self.process_file(&path).await;
            log_outcome(&path, &outcome);
            report.record(path, outcome);

            if report.total % batch_size == 0 {
                info!(
                    "Progress: {} processed ({} uploaded, {} skipped, {} errors)",
                    report.total,
                    report.uploaded,
                    report.skipped(),
                    report.errors
                );
            }
        }

        report.duration_secs = started.elapsed().as_secs_f64();
        info!(
            "Ingestion finished: total {}, uploaded {}, skipped {} ({} duplicate, {} oversize), errors {}, {:.2}s",
            report.total,
            report.uploaded,
            report.skipped(),
            report.skipped_duplicate,
            report.skipped_oversize,
            report.errors,
            report.duration_secs
        );
        report
    }

    pub async fn process_file(&self, path: &Path) -> ItemOutcome {
        match self.try_process_file(path).await {
            Ok(outcome) => outcome,
            Err(e) => ItemOutcome::Failed(e),
        }
    }

    async fn try_process_file(&self, path: &Path) -> Result<ItemOutcome, ItemError> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let size = tokio::fs::metadata(path).await?.len();
        if size > self.options.max_file_size {
            return Ok(ItemOutcome::SkippedOversize { size });
        }

        let duplicates = DuplicateFilter::new(self.store, self.options.duplicate_policy);
        if duplicates
            .is_duplicate(&filename, size as i64)
            .await
            .map_err(ItemError::DuplicateCheck)?
        {
            return Ok(ItemOutcome::SkippedDuplicate);
        }

        let bytes = tokio::fs::read(path).await?;
        let normalized = normalize(bytes, &self.options.normalize)?;

        let photo = NewPhoto {
            filename,
            mime_type: Some(normalized.mime_type()),
            width: Some(normalized.width),
            height: Some(normalized.height),
            description: Some(format!("Uploaded from {}", path.display())),
            content: normalized.bytes,
            ..Default::default()
        };

        let id = self.store.insert(&photo).await.map_err(ItemError::Persist)?;
        Ok(ItemOutcome::Uploaded {
            id,
            resized: normalized.resized,
        })
    }
}

fn log_outcome(path: &Path, outcome: &ItemOutcome) {
    match outcome {
        ItemOutcome::Uploaded { id, resized } => {
            info!("Uploaded {} (id {}, resized: {})", path.display(), id, resized)
        }
        ItemOutcome::SkippedOversize { size } => info!(
            "Skipping {} - too large ({:.2} MB)",
            path.display(),
            *size as f64 / 1024.0 / 1024.0
        ),
        ItemOutcome::SkippedDuplicate => info!("Skipping {} - already exists", path.display()),
        ItemOutcome::Failed(e @ ItemError::Persist(_)) => {
            error!("Error uploading {}: {}", path.display(), e)
        }
        ItemOutcome::Failed(e) => warn!("Error processing {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn write_png(path: &Path, width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, _| Rgb([(x % 256) as u8, 40, 200]));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        let bytes = buffer.into_inner();
        std::fs::write(path, &bytes).unwrap();
        bytes
    }

    fn small_options() -> IngestOptions {
        IngestOptions {
            normalize: NormalizeOptions::new(64, 64, 85),
            ..IngestOptions::bulk()
        }
    }

    #[test]
    fn test_presets_keep_distinct_allow_lists() {
        let bulk = IngestOptions::bulk();
        let local = IngestOptions::local_import();
        assert!(!bulk.extensions.matches(Path::new("scan.tiff")));
        assert!(local.extensions.matches(Path::new("scan.TIFF")));
        assert_eq!(bulk.max_file_size, 50 * 1024 * 1024);
        assert_eq!(bulk.normalize, NormalizeOptions::bulk());
    }

    #[tokio::test]
    async fn test_outcome_per_step() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::in_memory().await.unwrap();
        let ingestor = BatchIngestor::new(&store, small_options());

        let good = temp_dir.path().join("good.png");
        write_png(&good, 32, 32);
        let broken = temp_dir.path().join("broken.jpg");
        std::fs::write(&broken, b"not really a jpeg").unwrap();

        assert!(matches!(
            ingestor.process_file(&good).await,
            ItemOutcome::Uploaded { id: 1, resized: false }
        ));
        assert!(matches!(
            ingestor.process_file(&good).await,
            ItemOutcome::SkippedDuplicate
        ));

        let outcome = ingestor.process_file(&broken).await;
        assert_eq!(outcome.label(), "error:decode");

        let missing = ingestor.process_file(&temp_dir.path().join("gone.png")).await;
        assert_eq!(missing.label(), "error:read");
    }

    #[tokio::test]
    async fn test_oversize_is_skipped_before_decoding() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::in_memory().await.unwrap();
        let options = IngestOptions {
            max_file_size: 16,
            ..small_options()
        };
        let ingestor = BatchIngestor::new(&store, options);

        // Not an image: a decode attempt would report error:decode instead.
        let big = temp_dir.path().join("big.jpg");
        std::fs::write(&big, vec![0u8; 17]).unwrap();

        let outcome = ingestor.process_file(&big).await;
        assert!(matches!(outcome, ItemOutcome::SkippedOversize { size: 17 }));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stored_row_matches_normalized_output() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::in_memory().await.unwrap();
        let ingestor = BatchIngestor::new(&store, small_options());

        let large = temp_dir.path().join("large.png");
        let original = write_png(&large, 128, 96);

        let report = ingestor.ingest_paths(vec![large.clone()]).await;
        assert_eq!(report.uploaded, 1);

        let stored = store.find_by_id(report.uploaded_ids()[0]).await.unwrap().unwrap();
        assert_ne!(stored.content, original);
        assert_eq!(stored.byte_size, stored.content.len() as i64);
        assert_eq!((stored.width, stored.height), (Some(64), Some(48)));
        assert_eq!(stored.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(
            stored.description,
            Some(format!("Uploaded from {}", large.display()))
        );
    }

    #[tokio::test]
    async fn test_missing_root_fails_the_run() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::in_memory().await.unwrap();
        let ingestor = BatchIngestor::new(&store, IngestOptions::bulk());

        let result = ingestor
            .ingest_directory(&temp_dir.path().join("missing"))
            .await;
        assert!(matches!(result, Err(IngestError::RootNotFound(_))));
    }

    #[tokio::test]
    async fn test_replace_existing_clears_first() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .insert(&NewPhoto {
                filename: "old.jpg".to_string(),
                content: vec![1],
                ..Default::default()
            })
            .await
            .unwrap();
        write_png(&temp_dir.path().join("new.png"), 10, 10);

        let options = IngestOptions {
            replace_existing: true,
            ..IngestOptions::local_import()
        };
        let report = BatchIngestor::new(&store, options)
            .ingest_directory(temp_dir.path())
            .await
            .unwrap();

        assert_eq!(report.uploaded, 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(report.uploaded_ids(), vec![1]);
    }
}
