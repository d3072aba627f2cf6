use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};

use crate::db_pool::{create_db_pool, create_in_memory_pool, DbPool, OpenMode};
use crate::error::StoreError;
use crate::models::{encode_tags, NewPhoto, Photo, PhotoSummary};

const SUMMARY_COLUMNS: &str = "id, filename, mime_type, byte_size, width, height, \
     created_at, updated_at, description, tags";

/// What the ingestion and synchronization pipelines need from a store.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// True when at least one photo matches the dedup key exactly.
    async fn exists(&self, filename: &str, byte_size: i64) -> Result<bool, StoreError>;

    /// Inserts a photo and returns the assigned id.
    async fn insert(&self, photo: &NewPhoto) -> Result<i64, StoreError>;

    /// All photos in ascending id order.
    async fn fetch_all_ordered(&self) -> Result<Vec<Photo>, StoreError>;

    /// Removes every photo and resets the id sequence.
    async fn clear(&self) -> Result<(), StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    async fn close(&self);
}

/// One page of photo summaries plus the total number of matching rows.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PhotoPage {
    pub photos: Vec<PhotoSummary>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: i64,
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn connect(
        locator: &str,
        open_mode: OpenMode,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        Ok(Self::new(
            create_db_pool(locator, open_mode, max_connections).await?,
        ))
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(create_in_memory_pool().await?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Photo>, StoreError> {
        let photo = sqlx::query_as::<_, Photo>("SELECT * FROM photos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(photo)
    }

    pub async fn list_page(
        &self,
        page: u32,
        limit: u32,
        tag: Option<&str>,
    ) -> Result<PhotoPage, StoreError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let offset = i64::from(page - 1) * i64::from(limit);
        let tag = tag.map(str::trim).filter(|t| !t.is_empty());

        let (photos, total) = match tag {
            Some(tag) => {
                let filter = "EXISTS (SELECT 1 FROM json_each(photos.tags) WHERE json_each.value = ?)";
                let photos = sqlx::query_as::<_, PhotoSummary>(&format!(
                    "SELECT {SUMMARY_COLUMNS} FROM photos WHERE {filter} \
                     ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
                ))
                .bind(tag)
                .bind(i64::from(limit))
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
                let total: i64 =
                    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM photos WHERE {filter}"))
                        .bind(tag)
                        .fetch_one(&self.pool)
                        .await?;
                (photos, total)
            }
            None => {
                let photos = sqlx::query_as::<_, PhotoSummary>(&format!(
                    "SELECT {SUMMARY_COLUMNS} FROM photos \
                     ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
                ))
                .bind(i64::from(limit))
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
                (photos, self.count().await?)
            }
        };

        let limit_i64 = i64::from(limit);
        Ok(PhotoPage {
            photos,
            total,
            page,
            limit,
            total_pages: (total + limit_i64 - 1) / limit_i64,
        })
    }

    /// Updates description and/or tags; `None` keeps the stored value.
    /// Touches `updated_at` whenever the row exists.
    pub async fn update_details(
        &self,
        id: i64,
        description: Option<&str>,
        tags: Option<&Vec<String>>,
    ) -> Result<Option<PhotoSummary>, StoreError> {
        let result = sqlx::query(
            "UPDATE photos
             SET description = COALESCE(?, description),
                 tags = COALESCE(?, tags),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(description)
        .bind(encode_tags(tags))
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let summary = sqlx::query_as::<_, PhotoSummary>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM photos WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(summary)
    }

    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM photos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Photos carrying at least one of the given tags, newest first.
    pub async fn search_by_tags(&self, tags: &[String]) -> Result<Vec<PhotoSummary>, StoreError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = tags.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM photos
             WHERE EXISTS (
                 SELECT 1 FROM json_each(photos.tags) WHERE json_each.value IN ({placeholders})
             )
             ORDER BY created_at DESC, id DESC"
        );

        let mut query = sqlx::query_as::<_, PhotoSummary>(&sql);
        for tag in tags {
            query = query.bind(tag);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl PhotoStore for SqliteStore {
    async fn exists(&self, filename: &str, byte_size: i64) -> Result<bool, StoreError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM photos WHERE filename = ? AND byte_size = ? LIMIT 1")
                .bind(filename)
                .bind(byte_size)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn insert(&self, photo: &NewPhoto) -> Result<i64, StoreError> {
        let created_at = photo.created_at.unwrap_or_else(Utc::now);
        let updated_at = photo.updated_at.unwrap_or(created_at);

        let result = sqlx::query(
            "INSERT INTO photos
             (filename, content, mime_type, byte_size, width, height,
              created_at, updated_at, description, tags)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&photo.filename)
        .bind(&photo.content)
        .bind(&photo.mime_type)
        .bind(photo.byte_size())
        .bind(photo.width)
        .bind(photo.height)
        .bind(created_at)
        .bind(updated_at)
        .bind(&photo.description)
        .bind(encode_tags(photo.tags.as_ref()))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Inserted {} as id {}", photo.filename, id);
        Ok(id)
    }

    async fn fetch_all_ordered(&self) -> Result<Vec<Photo>, StoreError> {
        let photos = sqlx::query_as::<_, Photo>("SELECT * FROM photos ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(photos)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM photos").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'photos'")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(
            "Cleared {} photos and reset id sequence",
            deleted.rows_affected()
        );
        Ok(())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM photos")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn new_photo(filename: &str, content: &[u8]) -> NewPhoto {
        NewPhoto {
            filename: filename.to_string(),
            content: content.to_vec(),
            mime_type: Some("image/jpeg".to_string()),
            width: Some(4),
            height: Some(3),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = SqliteStore::in_memory().await.unwrap();
        let created: DateTime<Utc> = "2023-07-14T09:15:00Z".parse().unwrap();

        let mut photo = new_photo("a.jpg", &[1, 2, 3, 4]);
        photo.created_at = Some(created);
        photo.description = Some("harbour".to_string());
        photo.tags = Some(vec!["sea".to_string(), "boat".to_string()]);

        let id = store.insert(&photo).await.unwrap();
        let stored = store.find_by_id(id).await.unwrap().unwrap();

        assert_eq!(stored.filename, "a.jpg");
        assert_eq!(stored.content, vec![1, 2, 3, 4]);
        assert_eq!(stored.byte_size, 4);
        assert_eq!(stored.width, Some(4));
        assert_eq!(stored.created_at, created);
        assert_eq!(stored.updated_at, Some(created));
        assert_eq!(stored.tags, Some(vec!["sea".to_string(), "boat".to_string()]));
        assert!(store.find_by_id(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exists_matches_both_fields() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert(&new_photo("a.jpg", &[0; 10])).await.unwrap();

        assert!(store.exists("a.jpg", 10).await.unwrap());
        assert!(!store.exists("a.jpg", 11).await.unwrap());
        assert!(!store.exists("b.jpg", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_all_is_id_ordered() {
        let store = SqliteStore::in_memory().await.unwrap();
        for name in ["c.jpg", "a.jpg", "b.jpg"] {
            store.insert(&new_photo(name, &[1])).await.unwrap();
        }

        let photos = store.fetch_all_ordered().await.unwrap();
        let ids: Vec<i64> = photos.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(photos[0].filename, "c.jpg");
    }

    #[tokio::test]
    async fn test_clear_resets_sequence() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert(&new_photo("a.jpg", &[1])).await.unwrap();
        store.insert(&new_photo("b.jpg", &[1])).await.unwrap();

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        let id = store.insert(&new_photo("c.jpg", &[1])).await.unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_delete() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert(&new_photo("a.jpg", &[1])).await.unwrap();
        let second = store.insert(&new_photo("b.jpg", &[1])).await.unwrap();

        assert!(store.delete(second).await.unwrap());
        assert!(!store.delete(second).await.unwrap());

        let third = store.insert(&new_photo("c.jpg", &[1])).await.unwrap();
        assert_eq!(third, second + 1);
    }

    #[tokio::test]
    async fn test_update_details_keeps_unset_fields() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut photo = new_photo("a.jpg", &[1]);
        photo.created_at = Some("2020-01-01T00:00:00Z".parse().unwrap());
        photo.description = Some("old".to_string());
        photo.tags = Some(vec!["x".to_string()]);
        let id = store.insert(&photo).await.unwrap();

        let updated = store
            .update_details(id, Some("new"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("new"));
        assert_eq!(updated.tags, Some(vec!["x".to_string()]));
        assert!(updated.updated_at.unwrap() > updated.created_at);

        assert!(store.update_details(999, Some("n"), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_page_and_tag_filter() {
        let store = SqliteStore::in_memory().await.unwrap();
        for i in 0..5 {
            let mut photo = new_photo(&format!("{i}.jpg"), &[1]);
            if i % 2 == 0 {
                photo.tags = Some(vec!["even".to_string()]);
            }
            store.insert(&photo).await.unwrap();
        }

        let page = store.list_page(1, 2, None).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.photos.len(), 2);

        let tagged = store.list_page(1, 20, Some("even")).await.unwrap();
        assert_eq!(tagged.total, 3);
        assert_eq!(tagged.photos.len(), 3);
    }

    #[tokio::test]
    async fn test_search_by_tags_any_overlap() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut a = new_photo("a.jpg", &[1]);
        a.tags = Some(vec!["cat".to_string()]);
        let mut b = new_photo("b.jpg", &[1]);
        b.tags = Some(vec!["dog".to_string(), "park".to_string()]);
        let c = new_photo("c.jpg", &[1]);
        for photo in [&a, &b, &c] {
            store.insert(photo).await.unwrap();
        }

        let found = store
            .search_by_tags(&["park".to_string(), "cat".to_string()])
            .await
            .unwrap();
        let mut names: Vec<&str> = found.iter().map(|p| p.filename.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a.jpg", "b.jpg"]);

        assert!(store.search_by_tags(&[]).await.unwrap().is_empty());
    }
}
