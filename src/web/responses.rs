//! Stable error codes for the HLS delivery endpoints (spec.md §4.7, §6).
//!
//! Handlers return `Result<T, ApiError>`; `ApiError` carries the status code
//! and the machine-readable code string clients are expected to match on.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    InvalidId,
    MissingSessionId,
    ChannelNotFound,
    ServiceUnavailable,
    StreamStarting,
    StreamNotFound,
    InvalidQuality,
    InvalidSegment,
    SegmentNotFound,
    InvalidPath,
    PlaylistNotReady,
    ReadFailed,
    UnregisterFailed,
    InvalidRequest,
}

impl ApiError {
    fn code(self) -> &'static str {
        match self {
            ApiError::InvalidId => "invalid_id",
            ApiError::MissingSessionId => "missing_session_id",
            ApiError::ChannelNotFound => "channel_not_found",
            ApiError::ServiceUnavailable => "service_unavailable",
            ApiError::StreamStarting => "stream_starting",
            ApiError::StreamNotFound => "stream_not_found",
            ApiError::InvalidQuality => "invalid_quality",
            ApiError::InvalidSegment => "invalid_segment",
            ApiError::SegmentNotFound => "segment_not_found",
            ApiError::InvalidPath => "invalid_path",
            ApiError::PlaylistNotReady => "playlist_not_ready",
            ApiError::ReadFailed => "read_failed",
            ApiError::UnregisterFailed => "unregister_failed",
            ApiError::InvalidRequest => "invalid_request",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            ApiError::InvalidId
            | ApiError::MissingSessionId
            | ApiError::InvalidQuality
            | ApiError::InvalidSegment
            | ApiError::InvalidPath
            | ApiError::InvalidRequest => StatusCode::BAD_REQUEST,
            ApiError::ChannelNotFound | ApiError::StreamNotFound | ApiError::SegmentNotFound => {
                StatusCode::NOT_FOUND
            }
            ApiError::ServiceUnavailable | ApiError::StreamStarting | ApiError::PlaylistNotReady => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::ReadFailed | ApiError::UnregisterFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(self) -> &'static str {
        match self {
            ApiError::InvalidId => "channel id is not a valid UUID",
            ApiError::MissingSessionId => "session_id is required",
            ApiError::ChannelNotFound => "channel does not exist",
            ApiError::ServiceUnavailable => "stream could not be started",
            ApiError::StreamStarting => "stream is still starting, retry shortly",
            ApiError::StreamNotFound => "no active stream for this channel",
            ApiError::InvalidQuality => "quality must be one of 1080p, 720p, 480p",
            ApiError::InvalidSegment => "segment filename is invalid",
            ApiError::SegmentNotFound => "segment file does not exist",
            ApiError::InvalidPath => "resolved path escapes the quality directory",
            ApiError::PlaylistNotReady => "quality playlist has not been written yet",
            ApiError::ReadFailed => "failed to read file from disk",
            ApiError::UnregisterFailed => "failed to unregister client",
            ApiError::InvalidRequest => "request body is invalid",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody { error: self.code(), message: self.message() })).into_response()
    }
}

/// Maps the core engine's error taxonomy onto the HTTP surface's stable
/// codes. Distinct from `EngineError::code()`, which serves internal
/// logging rather than the client-facing contract.
pub fn map_engine_error(err: &crate::errors::EngineError) -> ApiError {
    use crate::errors::EngineError;
    match err {
        EngineError::ChannelNotFound(_) => ApiError::ChannelNotFound,
        _ => ApiError::ServiceUnavailable,
    }
}
