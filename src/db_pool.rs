use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::db_schema::initialize_schema;
use crate::error::StoreError;

pub type DbPool = SqlitePool;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// How a store locator is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create the database file and schema when missing (destinations).
    CreateIfMissing,
    /// Fail when the database file does not exist (sync sources).
    MustExist,
}

/// Turns a `sqlite:` URL or a plain file path into connect options.
pub fn connect_options(locator: &str) -> Result<SqliteConnectOptions, StoreError> {
    let locator = locator.trim();
    if locator.is_empty() {
        return Err(StoreError::InvalidLocator(locator.to_string()));
    }

    if locator.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(locator)
            .map_err(|_| StoreError::InvalidLocator(locator.to_string()))
    } else {
        Ok(SqliteConnectOptions::new().filename(locator))
    }
}

pub async fn create_db_pool(
    locator: &str,
    open_mode: OpenMode,
    max_connections: u32,
) -> Result<DbPool, StoreError> {
    let connection_error = |source: sqlx::Error| StoreError::Connection {
        locator: locator.to_string(),
        source,
    };

    let create = open_mode == OpenMode::CreateIfMissing;
    let options = connect_options(locator)?
        .create_if_missing(create)
        // WAL with a busy timeout so transient locks are waited on instead of failing immediately
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    if create {
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| connection_error(sqlx::Error::Io(e)))?;
            }
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await
        .map_err(connection_error)?;

    if create {
        initialize_schema(&pool).await.map_err(connection_error)?;
        debug!("Schema ready for {}", locator);
    }

    info!("Connected to store {}", locator);
    Ok(pool)
}

/// Single-connection in-memory database; the connection is never recycled
/// because dropping it would drop the data.
pub async fn create_in_memory_pool() -> Result<DbPool, StoreError> {
    let connection_error = |source: sqlx::Error| StoreError::Connection {
        locator: "sqlite::memory:".to_string(),
        source,
    };

    let options = connect_options("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(connection_error)?;

    initialize_schema(&pool).await.map_err(connection_error)?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_connect_options_rejects_empty_locator() {
        assert!(matches!(
            connect_options("   "),
            Err(StoreError::InvalidLocator(_))
        ));
    }

    #[test]
    fn test_connect_options_accepts_path_and_url() {
        let options = connect_options("data/photos.db").unwrap();
        assert_eq!(options.get_filename(), std::path::Path::new("data/photos.db"));

        assert!(connect_options("sqlite://data/photos.db").is_ok());
    }

    #[tokio::test]
    async fn test_create_pool_creates_parent_and_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested/dir/gallery.db");
        let locator = db_path.to_string_lossy().to_string();

        let pool = create_db_pool(&locator, OpenMode::CreateIfMissing, 2)
            .await
            .unwrap();
        assert!(db_path.exists());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM photos")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_must_exist_fails_for_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let locator = temp_dir
            .path()
            .join("missing.db")
            .to_string_lossy()
            .to_string();

        let result = create_db_pool(&locator, OpenMode::MustExist, 1).await;
        assert!(matches!(result, Err(StoreError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_in_memory_pool_keeps_data() {
        let pool = create_in_memory_pool().await.unwrap();
        sqlx::query("INSERT INTO photos (filename, content, byte_size) VALUES ('a.jpg', x'00', 1)")
            .execute(&pool)
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM photos")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
