//! Error type definitions for the streaming engine.
//!
//! Errors are tagged values carrying a kind, a severity, and whether the
//! failure is recoverable by the [`crate::recovery`] engine, mirroring the
//! taxonomy in the design notes. Local recovery is only attempted for
//! [`EngineError::is_recoverable`] errors; everything else propagates to the
//! caller, which for HTTP handlers means a stable machine-readable code.

use thiserror::Error;

pub mod kind;
pub use kind::{ErrorKind, Severity};

/// Top-level engine error type.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Playlist(#[from] PlaylistError),

    #[error("channel not found: {0}")]
    ChannelNotFound(uuid::Uuid),

    #[error("playlist is empty for channel: {0}")]
    EmptyPlaylist(uuid::Uuid),

    #[error("insufficient disk space: {available_bytes} bytes available, {required_bytes} required")]
    InsufficientDiskSpace {
        available_bytes: u64,
        required_bytes: u64,
    },

    #[error("circuit open for channel {0}")]
    CircuitOpen(uuid::Uuid),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Database(_) => ErrorKind::Internal,
            EngineError::Io(_) => ErrorKind::Internal,
            EngineError::Encoder(e) => e.kind(),
            EngineError::Timeline(e) => e.kind(),
            EngineError::Session(e) => e.kind(),
            EngineError::Playlist(_) => ErrorKind::Internal,
            EngineError::ChannelNotFound(_) => ErrorKind::ChannelNotFound,
            EngineError::EmptyPlaylist(_) => ErrorKind::EmptyPlaylist,
            EngineError::InsufficientDiskSpace { .. } => ErrorKind::DiskSpace,
            EngineError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            EngineError::InsufficientDiskSpace { .. } => Severity::Critical,
            EngineError::Encoder(e) => e.severity(),
            _ => Severity::Error,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::EncoderCrash
                | ErrorKind::FileMissing
                | ErrorKind::FileCorrupt
                | ErrorKind::HardwareEncoder
                | ErrorKind::Timeout
        )
    }

    /// Stable machine-readable code used by the HTTP layer (spec §4.7/§6).
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::ChannelNotFound(_) => "channel_not_found",
            EngineError::EmptyPlaylist(_) => "empty_playlist",
            EngineError::InsufficientDiskSpace { .. } => "insufficient_disk_space",
            EngineError::CircuitOpen(_) => "circuit_open",
            EngineError::Timeline(TimelineError::FileNotFound { .. }) => "file_not_found",
            _ => "internal_error",
        }
    }
}

/// Errors from building or validating an encoder invocation (spec §4.3).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncoderError {
    #[error("invalid quality: {0}")]
    InvalidQuality(String),
    #[error("invalid hardware acceleration method: {0}")]
    InvalidHwAccel(String),
    #[error("input file path is empty")]
    EmptyInputFile,
    #[error("output path is empty")]
    EmptyOutputPath,
    #[error("invalid segment duration: {0}")]
    InvalidSegmentDuration(i64),
    #[error("invalid playlist size: {0}")]
    InvalidPlaylistSize(i64),
    #[error("invalid batch size: {0}")]
    InvalidBatchSize(i64),
    #[error("encoder process exited with non-zero status: {0}")]
    NonZeroExit(i32),
    #[error("encoder process was terminated by a signal")]
    Terminated,
    #[error("failed to spawn encoder process: {0}")]
    SpawnFailed(String),
}

impl EncoderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EncoderError::NonZeroExit(_) | EncoderError::Terminated | EncoderError::SpawnFailed(_) => {
                ErrorKind::EncoderCrash
            }
            _ => ErrorKind::Internal,
        }
    }

    pub fn severity(&self) -> Severity {
        match self.kind() {
            ErrorKind::EncoderCrash => Severity::Error,
            _ => Severity::Error,
        }
    }
}

/// Errors from resolving a channel's current input plan (spec §4.4).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    #[error("file not found: {path}")]
    FileNotFound { path: String },
    #[error("channel playlist is empty")]
    EmptyPlaylist,
    #[error("media record missing for playlist item")]
    MissingMedia,
}

impl TimelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TimelineError::FileNotFound { .. } => ErrorKind::FileMissing,
            TimelineError::EmptyPlaylist => ErrorKind::EmptyPlaylist,
            TimelineError::MissingMedia => ErrorKind::FileMissing,
        }
    }
}

/// Errors from session/stream-manager lifecycle operations (spec §4.1/§4.2).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("illegal state transition from {from:?} to {to:?}")]
    IllegalTransition { from: String, to: String },
    #[error("stream is not active")]
    NotActive,
    #[error("circuit breaker open")]
    CircuitOpen,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::CircuitOpen => ErrorKind::CircuitOpen,
            _ => ErrorKind::Internal,
        }
    }
}

/// Errors from building/parsing/writing HLS playlists (spec §4.7/§6).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaylistError {
    #[error("failed to render playlist: {0}")]
    RenderFailed(String),
    #[error("failed to parse playlist: {0}")]
    ParseFailed(String),
    #[error("atomic write failed: {0}")]
    WriteFailed(String),
}
