//! SQLite-backed implementation of the repository traits.
//!
//! Mirrors the teacher's `database::Database` connection/migration pattern:
//! a pooled `SqlitePool`, a `migrate()` step run once at startup, and one
//! struct per repository holding a cheap clone of the pool.

use super::{ChannelRepository, MediaRepository, PlaylistItemRepository, RepositoryError, RepositoryResult};
use crate::config::DatabaseConfig;
use crate::models::{Channel, Media, PlaylistEntry};
use async_trait::async_trait;
use sqlx::{migrate::MigrateDatabase, Row, Sqlite, SqlitePool};
use uuid::Uuid;

pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    if !Sqlite::database_exists(&config.url).await.unwrap_or(false) {
        Sqlite::create_database(&config.url).await?;
    }
    SqlitePool::connect(&config.url).await
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS channels (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            epoch_start TEXT NOT NULL,
            looping BOOLEAN NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media (
            id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL UNIQUE,
            duration_seconds INTEGER NOT NULL,
            codec TEXT,
            resolution TEXT,
            size_bytes INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlist_items (
            channel_id TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            media_id TEXT NOT NULL REFERENCES media(id),
            position INTEGER NOT NULL,
            PRIMARY KEY (channel_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Clone)]
pub struct SqliteChannelRepository {
    pool: SqlitePool,
}

impl SqliteChannelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelRepository for SqliteChannelRepository {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Channel> {
        let id_str = id.to_string();
        let row = sqlx::query("SELECT id, name, epoch_start, looping FROM channels WHERE id = ?")
            .bind(&id_str)
            .fetch_optional(&self.pool)
            .await?;
        let row = row.ok_or_else(|| RepositoryError::NotFound(format!("channel {id}")))?;
        Ok(Channel {
            id,
            name: row.try_get("name")?,
            epoch_start: row.try_get("epoch_start")?,
            looping: row.try_get("looping")?,
        })
    }
}

#[derive(Clone)]
pub struct SqliteMediaRepository {
    pool: SqlitePool,
}

impl SqliteMediaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_media(row: sqlx::sqlite::SqliteRow, id: Uuid) -> RepositoryResult<Media> {
        Ok(Media {
            id,
            file_path: row.try_get("file_path")?,
            duration_seconds: row.try_get("duration_seconds")?,
            codec: row.try_get("codec")?,
            resolution: row.try_get("resolution")?,
            size_bytes: row.try_get("size_bytes")?,
        })
    }
}

#[async_trait]
impl MediaRepository for SqliteMediaRepository {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Media> {
        let id_str = id.to_string();
        let row = sqlx::query(
            "SELECT id, file_path, duration_seconds, codec, resolution, size_bytes FROM media WHERE id = ?",
        )
        .bind(&id_str)
        .fetch_optional(&self.pool)
        .await?;
        let row = row.ok_or_else(|| RepositoryError::NotFound(format!("media {id}")))?;
        Self::row_to_media(row, id)
    }

    async fn get_by_path(&self, path: &str) -> RepositoryResult<Media> {
        let row = sqlx::query(
            "SELECT id, file_path, duration_seconds, codec, resolution, size_bytes FROM media WHERE file_path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        let row = row.ok_or_else(|| RepositoryError::NotFound(format!("media at {path}")))?;
        let id: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id).map_err(|e| RepositoryError::NotFound(e.to_string()))?;
        Self::row_to_media(row, id)
    }
}

#[derive(Clone)]
pub struct SqlitePlaylistItemRepository {
    pool: SqlitePool,
}

impl SqlitePlaylistItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlaylistItemRepository for SqlitePlaylistItemRepository {
    async fn get_with_media(&self, channel_id: Uuid) -> RepositoryResult<Vec<PlaylistEntry>> {
        let channel_id_str = channel_id.to_string();
        let rows = sqlx::query(
            r#"
            SELECT pi.position, m.id as media_id, m.file_path, m.duration_seconds,
                   m.codec, m.resolution, m.size_bytes
            FROM playlist_items pi
            JOIN media m ON m.id = pi.media_id
            WHERE pi.channel_id = ?
            ORDER BY pi.position ASC
            "#,
        )
        .bind(&channel_id_str)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let media_id: String = row.try_get("media_id")?;
            let media_id = Uuid::parse_str(&media_id).map_err(|e| RepositoryError::NotFound(e.to_string()))?;
            entries.push(PlaylistEntry {
                position: row.try_get("position")?,
                media: Media {
                    id: media_id,
                    file_path: row.try_get("file_path")?,
                    duration_seconds: row.try_get("duration_seconds")?,
                    codec: row.try_get("codec")?,
                    resolution: row.try_get("resolution")?,
                    size_bytes: row.try_get("size_bytes")?,
                },
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn setup() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn get_with_media_is_ordered_by_position() {
        let pool = setup().await;
        let channel_id = Uuid::new_v4();
        sqlx::query("INSERT INTO channels (id, name, epoch_start, looping) VALUES (?, 'Test', ?, 1)")
            .bind(channel_id.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&pool)
            .await
            .unwrap();

        for i in 0..3 {
            let media_id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO media (id, file_path, duration_seconds) VALUES (?, ?, 60)",
            )
            .bind(media_id.to_string())
            .bind(format!("/media/{i}.mp4"))
            .execute(&pool)
            .await
            .unwrap();

            sqlx::query(
                "INSERT INTO playlist_items (channel_id, media_id, position) VALUES (?, ?, ?)",
            )
            .bind(channel_id.to_string())
            .bind(media_id.to_string())
            .bind(i)
            .execute(&pool)
            .await
            .unwrap();
        }

        let repo = SqlitePlaylistItemRepository::new(pool);
        let entries = repo.get_with_media(channel_id).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.windows(2).all(|w| w[0].position < w[1].position));
    }
}
