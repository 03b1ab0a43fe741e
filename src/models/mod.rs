//! Data model shared across the engine (spec.md §3).
//!
//! `Channel`, `Media`, and `PlaylistItem` are owned by the external
//! persistence layer (see [`crate::repository`]) and are read-only here.
//! `StreamSession`, `BatchState`, and friends are the engine's own
//! in-memory state and live in [`crate::session`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub epoch_start: DateTime<Utc>,
    pub looping: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Media {
    pub id: Uuid,
    pub file_path: String,
    pub duration_seconds: i64,
    pub codec: Option<String>,
    pub resolution: Option<String>,
    pub size_bytes: Option<i64>,
}

impl Media {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.file_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlaylistItem {
    pub channel_id: Uuid,
    pub media_id: Uuid,
    pub position: i64,
}

/// A playlist item with its media record embedded, as returned by
/// `PlaylistItems.GetWithMedia` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub position: i64,
    pub media: Media,
}

/// Published HLS variant (spec.md §3/§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
}

impl Quality {
    pub const DEFAULT_PUBLISHED: &'static [Quality] = &[Quality::P1080];
    pub const ALL: &'static [Quality] = &[Quality::P1080, Quality::P720, Quality::P480];

    pub fn label(&self) -> &'static str {
        match self {
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
        }
    }

    pub fn bitrate_kbps(&self) -> u32 {
        match self {
            Quality::P1080 => 5000,
            Quality::P720 => 3000,
            Quality::P480 => 1500,
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        match self {
            Quality::P1080 => (1920, 1080),
            Quality::P720 => (1280, 720),
            Quality::P480 => (854, 480),
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "1080p" => Some(Quality::P1080),
            "720p" => Some(Quality::P720),
            "480p" => Some(Quality::P480),
            _ => None,
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

pub const AUDIO_BITRATE_KBPS: u32 = 192;
