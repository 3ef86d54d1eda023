//! Media catalog repository for database operations

use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::media::{CatalogFilter, Image, Video};

const VIDEO_COLUMNS: &str =
    "id, category, level, description, filename, thumbnail, filesize, created_at";
const IMAGE_COLUMNS: &str = "id, category, level, description, filename, filesize, created_at";

/// Append the filter's conditions to a query ending in a WHERE clause
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &CatalogFilter) {
    if let Some(level) = filter.level {
        qb.push(" AND LOWER(level) = ").push_bind(level.as_str());
    }
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(ids) = &filter.ids {
        qb.push(" AND id = ANY(").push_bind(ids.clone()).push(")");
    }
    qb.push(" ORDER BY created_at, id");
}

fn catalog_query<'a>(columns: &str, table: &str, filter: &CatalogFilter) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {columns} FROM {table} WHERE TRUE"));
    push_filter(&mut qb, filter);
    qb
}

/// Read access to the video and image catalogs
#[derive(Clone)]
pub struct MediaRepository {
    pool: PgPool,
}

impl MediaRepository {
    /// Create a new media repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List videos matching every condition of the filter
    pub async fn list_videos(&self, filter: &CatalogFilter) -> Result<Vec<Video>> {
        let mut qb = catalog_query(VIDEO_COLUMNS, "videos", filter);
        let videos = qb.build_query_as::<Video>().fetch_all(&self.pool).await?;
        Ok(videos)
    }

    /// List meditation images matching every condition of the filter
    pub async fn list_images(&self, filter: &CatalogFilter) -> Result<Vec<Image>> {
        let mut qb = catalog_query(IMAGE_COLUMNS, "images", filter);
        let images = qb.build_query_as::<Image>().fetch_all(&self.pool).await?;
        Ok(images)
    }

    /// Get a video by ID
    pub async fn find_video_by_id(&self, id: Uuid) -> Result<Option<Video>> {
        let query = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1");
        let video = sqlx::query_as::<_, Video>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(video)
    }

    /// Get a video by its stored filename
    pub async fn find_video_by_filename(&self, filename: &str) -> Result<Option<Video>> {
        let query = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE filename = $1");
        let video = sqlx::query_as::<_, Video>(&query)
            .bind(filename)
            .fetch_optional(&self.pool)
            .await?;
        Ok(video)
    }

    /// Get the video a thumbnail belongs to
    pub async fn find_video_by_thumbnail(&self, thumbnail: &str) -> Result<Option<Video>> {
        let query = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE thumbnail = $1");
        let video = sqlx::query_as::<_, Video>(&query)
            .bind(thumbnail)
            .fetch_optional(&self.pool)
            .await?;
        Ok(video)
    }

    /// Get a meditation image by its stored filename
    pub async fn find_image_by_filename(&self, filename: &str) -> Result<Option<Image>> {
        let query = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE filename = $1");
        let image = sqlx::query_as::<_, Image>(&query)
            .bind(filename)
            .fetch_optional(&self.pool)
            .await?;
        Ok(image)
    }

    /// Whether a video with this ID is in the catalog
    pub async fn video_exists(&self, id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM videos WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Whether a meditation image with this ID is in the catalog
    pub async fn image_exists(&self, id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM images WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media::Level;

    #[test]
    fn test_empty_filter_selects_everything() {
        let qb = catalog_query(VIDEO_COLUMNS, "videos", &CatalogFilter::default());

        assert_eq!(
            qb.sql(),
            format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE TRUE ORDER BY created_at, id")
        );
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let filter = CatalogFilter {
            level: Some(Level::Beginner),
            category: Some("strength".to_string()),
            ids: Some(vec![Uuid::new_v4()]),
        };
        let qb = catalog_query(IMAGE_COLUMNS, "images", &filter);

        assert_eq!(
            qb.sql(),
            format!(
                "SELECT {IMAGE_COLUMNS} FROM images WHERE TRUE \
                 AND LOWER(level) = $1 AND category = $2 AND id = ANY($3) \
                 ORDER BY created_at, id"
            )
        );
    }

    #[test]
    fn test_favourites_only_filter() {
        let filter = CatalogFilter::default().with_ids(vec![]);
        let qb = catalog_query(VIDEO_COLUMNS, "videos", &filter);

        assert!(qb.sql().contains("WHERE TRUE AND id = ANY($1) ORDER BY"));
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_unknown_ids_do_not_exist() -> Result<()> {
        let config = common::database::DatabaseConfig::from_env()?;
        let pool = common::database::init_pool(&config).await?;
        common::database::run_migrations(&pool).await?;
        let repository = MediaRepository::new(pool);

        assert!(!repository.video_exists(Uuid::new_v4()).await?);
        assert!(!repository.image_exists(Uuid::new_v4()).await?);
        Ok(())
    }
}
