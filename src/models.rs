use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// Photo entity as persisted, including the encoded image bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub filename: String,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub mime_type: Option<String>,
    /// Always the length of `content`.
    pub byte_size: i64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Photo without its payload, for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoSummary {
    pub id: i64,
    pub filename: String,
    pub mime_type: Option<String>,
    pub byte_size: i64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Insert payload. `id` and `byte_size` are assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct NewPhoto {
    pub filename: String,
    pub content: Vec<u8>,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// `None` means "now".
    pub created_at: Option<DateTime<Utc>>,
    /// `None` means "same as created_at".
    pub updated_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl NewPhoto {
    /// Replays a stored photo into another store, keeping its timestamps and
    /// annotations verbatim.
    pub fn replay_of(photo: &Photo) -> Self {
        Self {
            filename: photo.filename.clone(),
            content: photo.content.clone(),
            mime_type: Some(
                photo
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            ),
            width: photo.width,
            height: photo.height,
            created_at: Some(photo.created_at),
            updated_at: Some(photo.updated_at.unwrap_or(photo.created_at)),
            description: photo.description.clone(),
            tags: photo.tags.clone(),
        }
    }

    pub fn byte_size(&self) -> i64 {
        self.content.len() as i64
    }
}

impl From<Photo> for PhotoSummary {
    fn from(photo: Photo) -> Self {
        Self {
            id: photo.id,
            filename: photo.filename,
            mime_type: photo.mime_type,
            byte_size: photo.byte_size,
            width: photo.width,
            height: photo.height,
            created_at: photo.created_at,
            updated_at: photo.updated_at,
            description: photo.description,
            tags: photo.tags,
        }
    }
}

/// Splits a comma separated tag list, trimming entries and dropping empty ones.
pub fn parse_tags(raw: &str) -> Option<Vec<String>> {
    let tags: Vec<String> = raw
        .split(',')
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect();

    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

pub(crate) fn encode_tags(tags: Option<&Vec<String>>) -> Option<String> {
    tags.map(|tags| serde_json::Value::from(tags.clone()).to_string())
}

fn decode_tags(row: &SqliteRow) -> Result<Option<Vec<String>>, sqlx::Error> {
    let raw: Option<String> = row.try_get("tags")?;
    raw.map(|raw| serde_json::from_str::<Vec<String>>(&raw))
        .transpose()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: "tags".to_string(),
            source: Box::new(e),
        })
}

impl<'r> FromRow<'r, SqliteRow> for Photo {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Photo {
            id: row.try_get("id")?,
            filename: row.try_get("filename")?,
            content: row.try_get("content")?,
            mime_type: row.try_get("mime_type")?,
            byte_size: row.try_get("byte_size")?,
            width: row.try_get("width")?,
            height: row.try_get("height")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            description: row.try_get("description")?,
            tags: decode_tags(row)?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for PhotoSummary {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(PhotoSummary {
            id: row.try_get("id")?,
            filename: row.try_get("filename")?,
            mime_type: row.try_get("mime_type")?,
            byte_size: row.try_get("byte_size")?,
            width: row.try_get("width")?,
            height: row.try_get("height")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            description: row.try_get("description")?,
            tags: decode_tags(row)?,
        })
    }
}
