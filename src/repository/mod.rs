//! Read-only access to the external persistence layer (spec.md §6).
//!
//! Channel/media/playlist CRUD and the library scanner are explicitly out
//! of scope for this crate (spec.md §1); what the core needs is a narrow,
//! typed, read-only view. These traits describe that view so the engine can
//! be tested against an in-memory fake without a real database, and
//! [`sqlite::SqliteRepositories`] provides the production `sqlx` backend,
//! grounded on the teacher's `database::Database` + `repositories::*`
//! pattern (pooled connection, typed errors, embedded migrations).

pub mod sqlite;

use crate::models::{Channel, Media, PlaylistEntry};
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Channel>;
}

#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Media>;
    async fn get_by_path(&self, path: &str) -> RepositoryResult<Media>;
}

#[async_trait]
pub trait PlaylistItemRepository: Send + Sync {
    /// Ordered playlist entries for a channel, with media embedded, per
    /// the dense 0-based position invariant in spec.md §3.
    async fn get_with_media(&self, channel_id: Uuid) -> RepositoryResult<Vec<PlaylistEntry>>;
}

/// Bundle of the three read-only repositories the engine depends on.
#[derive(Clone)]
pub struct Repositories {
    pub channels: std::sync::Arc<dyn ChannelRepository>,
    pub media: std::sync::Arc<dyn MediaRepository>,
    pub playlist_items: std::sync::Arc<dyn PlaylistItemRepository>,
}
