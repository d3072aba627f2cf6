use log::{error, info, warn};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::db_pool::OpenMode;
use crate::error::{StoreError, SyncError};
use crate::models::{NewPhoto, Photo};
use crate::store::{PhotoStore, SqliteStore};

const PROGRESS_INTERVAL: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Clear the destination, then copy every source row.
    Replace,
    /// Copy only rows whose `(filename, byte_size)` is missing from the destination.
    Merge,
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "replace" => Ok(SyncMode::Replace),
            "merge" => Ok(SyncMode::Merge),
            other => Err(format!("Unknown sync mode '{}', expected replace or merge", other)),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Replace => write!(f, "replace"),
            SyncMode::Merge => write!(f, "merge"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Init,
    ConnectSource,
    ConnectDestination,
    FetchSourceRows,
    ModeSelect,
    ClearDestination,
    TransferLoop,
    Report,
    Close,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::Init => "INIT",
            SyncStage::ConnectSource => "CONNECT_SOURCE",
            SyncStage::ConnectDestination => "CONNECT_DEST",
            SyncStage::FetchSourceRows => "FETCH_SOURCE_ROWS",
            SyncStage::ModeSelect => "MODE_SELECT",
            SyncStage::ClearDestination => "CLEAR_DEST",
            SyncStage::TransferLoop => "TRANSFER_LOOP",
            SyncStage::Report => "REPORT",
            SyncStage::Close => "CLOSE",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub source_count: usize,
    pub prior_destination_count: i64,
    pub transferred: usize,
    pub skipped_duplicate: usize,
    pub errors: usize,
    /// Re-queried after the loop; `None` when that query failed.
    pub final_destination_count: Option<i64>,
    pub duration_secs: f64,
}

impl SyncReport {
    fn new(mode: SyncMode, prior_destination_count: i64) -> Self {
        Self {
            mode,
            source_count: 0,
            prior_destination_count,
            transferred: 0,
            skipped_duplicate: 0,
            errors: 0,
            final_destination_count: None,
            duration_secs: 0.0,
        }
    }

    /// Row count the destination should hold when nothing else wrote to it.
    pub fn expected_destination_count(&self) -> i64 {
        let base = match self.mode {
            SyncMode::Replace => 0,
            SyncMode::Merge => self.prior_destination_count,
        };
        base + self.transferred as i64
    }
}

#[derive(Debug, PartialEq, Eq)]
enum RowOutcome {
    Transferred,
    SkippedDuplicate,
    Failed,
}

fn is_progress_row(processed: usize) -> bool {
    processed % PROGRESS_INTERVAL == 0
}

async fn transfer_row(destination: &dyn PhotoStore, photo: &Photo, mode: SyncMode) -> RowOutcome {
    if mode == SyncMode::Merge {
        match destination.exists(&photo.filename, photo.byte_size).await {
            Ok(true) => {
                info!("Skipping duplicate: {}", photo.filename);
                return RowOutcome::SkippedDuplicate;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Duplicate check failed for {}: {}", photo.filename, e);
                return RowOutcome::Failed;
            }
        }
    }

    match destination.insert(&NewPhoto::replay_of(photo)).await {
        Ok(_) => RowOutcome::Transferred,
        Err(e) => {
            error!("Error transferring {}: {}", photo.filename, e);
            RowOutcome::Failed
        }
    }
}

fn abort(stage: SyncStage) -> impl FnOnce(StoreError) -> SyncError {
    move |source| {
        error!("Synchronization failed at {}: {}", stage, source);
        SyncError { stage, source }
    }
}

fn enter(stage: SyncStage) {
    info!("[{}]", stage);
}

/// Replays every row of `source` into `destination`, in ascending id order.
///
/// Both stores must already be connected. Failures before the transfer loop
/// abort the run; a failing row is counted as an error and the loop moves on.
pub async fn sync_stores(
    source: &dyn PhotoStore,
    destination: &dyn PhotoStore,
    mode: SyncMode,
) -> Result<SyncReport, SyncError> {
    let started = Instant::now();

    let prior = destination
        .count()
        .await
        .map_err(abort(SyncStage::ConnectDestination))?;
    info!("Destination holds {} photos before sync", prior);

    enter(SyncStage::FetchSourceRows);
    let rows = source
        .fetch_all_ordered()
        .await
        .map_err(abort(SyncStage::FetchSourceRows))?;
    info!("Found {} photos in source", rows.len());

    enter(SyncStage::ModeSelect);
    info!("Mode: {}", mode);
    let mut report = SyncReport::new(mode, prior);
    report.source_count = rows.len();

    if mode == SyncMode::Replace {
        enter(SyncStage::ClearDestination);
        destination
            .clear()
            .await
            .map_err(abort(SyncStage::ClearDestination))?;
        info!("Cleared destination");
    }

    enter(SyncStage::TransferLoop);
    for (index, photo) in rows.iter().enumerate() {
        match transfer_row(destination, photo, mode).await {
            RowOutcome::Transferred => report.transferred += 1,
            RowOutcome::SkippedDuplicate => report.skipped_duplicate += 1,
            RowOutcome::Failed => report.errors += 1,
        }

        if is_progress_row(index + 1) {
            info!("Progress: {}/{} photos processed", index + 1, rows.len());
        }
    }

    enter(SyncStage::Report);
    report.final_destination_count = match destination.count().await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!("Could not re-query destination count: {}", e);
            None
        }
    };
    report.duration_secs = started.elapsed().as_secs_f64();

    info!(
        "Sync finished: source {}, transferred {}, skipped {}, errors {}, destination now {}",
        report.source_count,
        report.transferred,
        report.skipped_duplicate,
        report.errors,
        report
            .final_destination_count
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );
    if let Some(count) = report.final_destination_count {
        if count != report.expected_destination_count() {
            warn!(
                "Destination holds {} photos, expected {}; another writer may be active",
                count,
                report.expected_destination_count()
            );
        }
    }

    Ok(report)
}

/// Opens both stores, runs [`sync_stores`] and closes both on every path.
///
/// The source must already exist; the destination is created when missing.
pub async fn run_sync(
    source_locator: &str,
    destination_locator: &str,
    mode: SyncMode,
    max_connections: u32,
) -> Result<SyncReport, SyncError> {
    enter(SyncStage::Init);

    enter(SyncStage::ConnectSource);
    let source = SqliteStore::connect(source_locator, OpenMode::MustExist, max_connections)
        .await
        .map_err(abort(SyncStage::ConnectSource))?;

    enter(SyncStage::ConnectDestination);
    let destination =
        match SqliteStore::connect(destination_locator, OpenMode::CreateIfMissing, max_connections)
            .await
        {
            Ok(store) => store,
            Err(e) => {
                source.close().await;
                return Err(abort(SyncStage::ConnectDestination)(e));
            }
        };

    let result = sync_stores(&source, &destination, mode).await;

    enter(SyncStage::Close);
    source.close().await;
    destination.close().await;

    result
}
