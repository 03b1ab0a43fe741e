//! HLS delivery handlers (spec.md §4.7): master/media playlist serving,
//! segment serving with path-traversal defense, and client registration.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::responses::{map_engine_error, ApiError};
use super::AppState;
use crate::models::Quality;

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

fn require_channel_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::InvalidId)
}

fn require_session_id(query: &SessionQuery) -> Result<&str, ApiError> {
    match query.session_id.as_deref() {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(ApiError::MissingSessionId),
    }
}

/// `GET /:channelID/master.m3u8?session_id=`
pub async fn get_master_playlist(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Response, ApiError> {
    let channel_id = require_channel_id(&channel_id)?;
    let session_id = require_session_id(&query)?;

    state.manager.start_stream(channel_id).await.map_err(|e| map_engine_error(&e))?;

    let entry = state.manager.get_stream(channel_id).await.ok_or(ApiError::ServiceUnavailable)?;
    let master_path = {
        let session = entry.session.lock().await;
        session.output_dir.join("master.m3u8")
    };

    let contents = match tokio::fs::read_to_string(&master_path).await {
        Ok(c) => c,
        Err(_) => return Err(ApiError::StreamStarting),
    };

    state.manager.register_client(channel_id, session_id).await.map_err(|e| map_engine_error(&e))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/vnd.apple.mpegurl"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        contents,
    )
        .into_response())
}

/// `GET /:channelID/:quality(.m3u8)?`
pub async fn get_media_playlist(
    State(state): State<AppState>,
    Path((channel_id, quality_segment)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let channel_id = require_channel_id(&channel_id)?;
    let quality_label = quality_segment.strip_suffix(".m3u8").unwrap_or(&quality_segment);
    let quality = Quality::from_label(quality_label).ok_or(ApiError::InvalidQuality)?;

    let entry = state.manager.get_stream(channel_id).await.ok_or(ApiError::StreamNotFound)?;
    let playlist_path = {
        let session = entry.session.lock().await;
        session
            .qualities
            .iter()
            .find(|v| v.quality == quality)
            .map(|v| v.playlist_path.clone())
            .ok_or(ApiError::InvalidQuality)?
    };

    let contents = match tokio::fs::read_to_string(&playlist_path).await {
        Ok(c) => c,
        Err(_) => return Err(ApiError::PlaylistNotReady),
    };

    let rewritten = rewrite_segment_uris(&contents, quality_label);

    Ok((
        [
            (header::CONTENT_TYPE, "application/vnd.apple.mpegurl"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        rewritten,
    )
        .into_response())
}

/// Rewrites every non-comment line ending in `.ts` or `.vtt` to
/// `<quality>/<filename>` so the client requests it through the segment
/// route (spec.md §4.7).
fn rewrite_segment_uris(playlist: &str, quality_label: &str) -> String {
    playlist
        .lines()
        .map(|line| {
            if !line.starts_with('#') && (line.ends_with(".ts") || line.ends_with(".vtt")) {
                format!("{quality_label}/{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `GET /:channelID/:quality/:segment`
pub async fn get_segment(
    State(state): State<AppState>,
    Path((channel_id, quality_label, segment)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let channel_id = require_channel_id(&channel_id)?;
    let quality = Quality::from_label(&quality_label).ok_or(ApiError::InvalidQuality)?;

    if !segment.ends_with(".ts") || segment.contains("..") || segment.contains('/') || segment.contains('\\') {
        return Err(ApiError::InvalidSegment);
    }

    let entry = state.manager.get_stream(channel_id).await.ok_or(ApiError::StreamNotFound)?;
    let segment_dir = {
        let session = entry.session.lock().await;
        session
            .qualities
            .iter()
            .find(|v| v.quality == quality)
            .map(|v| v.segment_dir.clone())
            .ok_or(ApiError::InvalidQuality)?
    };

    let candidate = segment_dir.join(&segment);
    let resolved = candidate.canonicalize().map_err(|_| ApiError::SegmentNotFound)?;
    let resolved_dir = segment_dir.canonicalize().map_err(|_| ApiError::SegmentNotFound)?;
    if !resolved.starts_with(&resolved_dir) {
        return Err(ApiError::InvalidPath);
    }

    let bytes = tokio::fs::read(&resolved).await.map_err(|_| ApiError::SegmentNotFound)?;

    Ok((
        [
            (header::CONTENT_TYPE, "video/MP2T"),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        bytes,
    )
        .into_response())
}

/// `DELETE /:channelID/client?session_id=`
pub async fn delete_client(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<StatusCode, ApiError> {
    let channel_id = require_channel_id(&channel_id)?;
    let session_id = require_session_id(&query)?;

    match state.manager.unregister_client(channel_id, session_id).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(crate::errors::EngineError::ChannelNotFound(_)) => Err(ApiError::StreamNotFound),
        Err(_) => Err(ApiError::UnregisterFailed),
    }
}

#[derive(Debug, Deserialize)]
pub struct PositionRequest {
    pub session_id: String,
    pub segment_number: u64,
    pub quality: String,
    #[allow(dead_code)]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
pub struct PositionResponse {
    /// 0 when no batch has been scheduled yet, matching `segments_remaining`.
    pub current_batch: u64,
    pub segments_remaining: u64,
    pub acknowledged: bool,
}

/// `POST /:channelID/position`
pub async fn post_position(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(body): Json<PositionRequest>,
) -> Result<Json<PositionResponse>, ApiError> {
    let channel_id = require_channel_id(&channel_id)?;
    if body.session_id.is_empty() {
        return Err(ApiError::InvalidRequest);
    }
    let quality = Quality::from_label(&body.quality).ok_or(ApiError::InvalidRequest)?;

    let entry = state.manager.get_stream(channel_id).await.ok_or(ApiError::StreamNotFound)?;
    let mut session = entry.session.lock().await;
    session.update_position(&body.session_id, body.segment_number, quality);

    let (current_batch, segments_remaining) = match &session.current_batch {
        Some(batch) => (batch.batch_number, session.segments_remaining()),
        None => (0, 0),
    };

    Ok(Json(PositionResponse { current_batch, segments_remaining, acknowledged: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_ts_and_vtt_lines_only() {
        let playlist = "#EXTM3U\n#EXTINF:6.0,\n1080p_segment_000.ts\n#EXT-X-ENDLIST\ncaption.vtt\n";
        let rewritten = rewrite_segment_uris(playlist, "1080p");
        assert!(rewritten.contains("1080p/1080p_segment_000.ts"));
        assert!(rewritten.contains("1080p/caption.vtt"));
        assert!(rewritten.contains("#EXTM3U"));
    }

    #[test]
    fn session_query_rejects_empty_string() {
        let q = SessionQuery { session_id: Some(String::new()) };
        assert!(require_session_id(&q).is_err());
    }

    #[test]
    fn channel_id_must_be_a_uuid() {
        assert!(require_channel_id("not-a-uuid").is_err());
        assert!(require_channel_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
