//! Recovery Engine (spec.md §4.6): classifies encoder failures and decides
//! how to react — restart with backoff, skip to the next playlist item,
//! fall back from hardware to software encoding, or fail fast.

use crate::errors::{ErrorKind, Severity};

const MAX_RESTART_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_SECONDS: u64 = 1;
const BACKOFF_CAP_SECONDS: u64 = 8;

/// What the recovery engine recommends in response to a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    RestartWithBackoff,
    SkipToNextItem,
    FallBackToSoftware,
    FailFast,
    TerminateCleanly,
}

impl Strategy {
    pub fn for_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::EncoderCrash | ErrorKind::Timeout => Strategy::RestartWithBackoff,
            ErrorKind::FileMissing | ErrorKind::FileCorrupt => Strategy::SkipToNextItem,
            ErrorKind::HardwareEncoder => Strategy::FallBackToSoftware,
            ErrorKind::DiskSpace => Strategy::FailFast,
            ErrorKind::PlaylistEnd => Strategy::TerminateCleanly,
            ErrorKind::ChannelNotFound | ErrorKind::EmptyPlaylist | ErrorKind::CircuitOpen | ErrorKind::Internal => {
                Strategy::FailFast
            }
        }
    }
}

/// Classifies encoder stderr by scanning for known tokens, case-insensitive
/// (spec.md §4.6). Tokens are checked in order of specificity so e.g. a
/// CUDA load failure isn't misreported as a generic timeout.
pub fn classify_stderr(stderr: &[String]) -> ErrorKind {
    let combined = stderr.join("\n").to_lowercase();

    const DISK_SPACE: &[&str] = &["no space left on device"];
    const FILE_MISSING: &[&str] = &["no such file or directory"];
    const FILE_CORRUPT: &[&str] = &["invalid data found"];
    const HARDWARE: &[&str] = &["cannot load nvcuda", "qsv not available", "failed to initialise vaapi", "cannot load libva"];
    const TIMEOUT: &[&str] = &["timeout", "timed out"];

    if DISK_SPACE.iter().any(|t| combined.contains(t)) {
        return ErrorKind::DiskSpace;
    }
    if HARDWARE.iter().any(|t| combined.contains(t)) {
        return ErrorKind::HardwareEncoder;
    }
    if FILE_MISSING.iter().any(|t| combined.contains(t)) {
        return ErrorKind::FileMissing;
    }
    if FILE_CORRUPT.iter().any(|t| combined.contains(t)) {
        return ErrorKind::FileCorrupt;
    }
    if TIMEOUT.iter().any(|t| combined.contains(t)) {
        return ErrorKind::Timeout;
    }
    ErrorKind::EncoderCrash
}

pub fn severity_for(kind: ErrorKind) -> Severity {
    match kind {
        ErrorKind::EncoderCrash | ErrorKind::Timeout => Severity::Error,
        ErrorKind::FileMissing | ErrorKind::FileCorrupt | ErrorKind::HardwareEncoder => Severity::Warning,
        ErrorKind::DiskSpace => Severity::Critical,
        ErrorKind::PlaylistEnd => Severity::Info,
        ErrorKind::ChannelNotFound | ErrorKind::EmptyPlaylist | ErrorKind::CircuitOpen | ErrorKind::Internal => {
            Severity::Error
        }
    }
}

/// Exponential backoff: `1s, 2s, 4s, 8s`, capped at 8s, for `attempt`
/// (1-based). `attempt = 0` is treated as the first attempt.
pub fn backoff_seconds(attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(3);
    (BACKOFF_BASE_SECONDS << exponent).min(BACKOFF_CAP_SECONDS)
}

pub fn attempts_exhausted(restart_count: u32) -> bool {
    restart_count >= MAX_RESTART_ATTEMPTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_space_token_is_classified_critical_and_not_recoverable() {
        let kind = classify_stderr(&["Error: No space left on device".to_string()]);
        assert_eq!(kind, ErrorKind::DiskSpace);
        assert_eq!(severity_for(kind), Severity::Critical);
        assert_eq!(Strategy::for_kind(kind), Strategy::FailFast);
    }

    #[test]
    fn missing_file_token_triggers_skip_strategy() {
        let kind = classify_stderr(&["a.mp4: No such file or directory".to_string()]);
        assert_eq!(kind, ErrorKind::FileMissing);
        assert_eq!(Strategy::for_kind(kind), Strategy::SkipToNextItem);
    }

    #[test]
    fn nvcuda_token_triggers_hardware_fallback() {
        let kind = classify_stderr(&["Cannot load nvcuda.dll".to_string()]);
        assert_eq!(kind, ErrorKind::HardwareEncoder);
        assert_eq!(Strategy::for_kind(kind), Strategy::FallBackToSoftware);
    }

    #[test]
    fn qsv_unavailable_triggers_hardware_fallback() {
        let kind = classify_stderr(&["QSV not available on this device".to_string()]);
        assert_eq!(kind, ErrorKind::HardwareEncoder);
    }

    #[test]
    fn unrecognized_stderr_defaults_to_encoder_crash() {
        let kind = classify_stderr(&["segmentation fault".to_string()]);
        assert_eq!(kind, ErrorKind::EncoderCrash);
        assert_eq!(Strategy::for_kind(kind), Strategy::RestartWithBackoff);
    }

    #[test]
    fn backoff_doubles_and_caps_at_eight_seconds() {
        assert_eq!(backoff_seconds(1), 1);
        assert_eq!(backoff_seconds(2), 2);
        assert_eq!(backoff_seconds(3), 4);
        assert_eq!(backoff_seconds(4), 8);
        assert_eq!(backoff_seconds(5), 8);
        assert_eq!(backoff_seconds(99), 8);
    }

    #[test]
    fn three_attempts_is_exhausted() {
        assert!(!attempts_exhausted(2));
        assert!(attempts_exhausted(3));
        assert!(attempts_exhausted(4));
    }
}
