//! Error taxonomy shared by the recovery engine and the HTTP layer.

use serde::Serialize;

/// Classification of an error, independent of where it originated.
///
/// Matches the taxonomy table in the design notes: each kind carries an
/// implicit severity and recoverability that [`super::EngineError`] and
/// [`crate::recovery`] consult to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EncoderCrash,
    FileMissing,
    FileCorrupt,
    HardwareEncoder,
    DiskSpace,
    PlaylistEnd,
    Timeout,
    ChannelNotFound,
    EmptyPlaylist,
    CircuitOpen,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}
