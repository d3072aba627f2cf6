use sqlx::SqlitePool;

// No uniqueness constraint on (filename, byte_size): duplicates are only
// filtered by explicit existence checks before insert.
pub const PHOTOS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    content BLOB NOT NULL,
    mime_type TEXT,
    byte_size INTEGER NOT NULL,
    width INTEGER,
    height INTEGER,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    description TEXT,
    -- JSON array of strings
    tags TEXT
)
"#;

pub const SCHEMA_SQL: &[&str] = &[
    PHOTOS_TABLE,
    "CREATE INDEX IF NOT EXISTS idx_photos_created_at ON photos(created_at DESC);",
    "CREATE INDEX IF NOT EXISTS idx_photos_filename ON photos(filename);",
];

pub async fn initialize_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for sql in SCHEMA_SQL {
        sqlx::query(sql).execute(pool).await?;
    }
    Ok(())
}
