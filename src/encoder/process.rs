//! Encoder child process spawning and supervision.
//!
//! Grounded on the registry-of-children pattern used to supervise
//! `gst-launch-1.0` processes in the reference stream-manager: spawn via
//! `Command`, hand back a handle the caller owns, and let the caller decide
//! whether and how to restart on exit. Adapted here to `tokio::process`
//! so waiting on exit doesn't block a worker thread, and restart/backoff
//! policy itself lives in [`crate::recovery`] rather than in this module.

use crate::errors::EncoderError;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

const STDERR_TAIL_LINES: usize = 40;

/// How an encoder invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    NonZero(i32),
    /// Killed by a signal (unix) or otherwise exited with no status code.
    Terminated,
}

/// A running (or exited) encoder invocation. Termination is driven by
/// `pid` through `nix::sys::signal` (graceful SIGTERM, then SIGKILL) rather
/// than through `Child` directly, since `Child` is owned by the detached
/// task that awaits `wait_with_stderr_tail`, not by the stream manager.
pub struct SpawnedEncoder {
    child: Child,
    pub pid: Option<u32>,
}

impl SpawnedEncoder {
    /// Spawns `encoder_path` with `args`, discarding stdout and piping
    /// stderr so callers can inspect it for crash diagnostics.
    pub fn spawn(encoder_path: &Path, args: &[String]) -> Result<Self, EncoderError> {
        let child = Command::new(encoder_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EncoderError::SpawnFailed(e.to_string()))?;

        let pid = child.id();
        Ok(Self { child, pid })
    }

    /// Runs the child to completion, capturing the tail of its stderr
    /// output for [`crate::recovery`]'s error classification.
    pub async fn wait_with_stderr_tail(mut self) -> Result<(ExitOutcome, Vec<String>), EncoderError> {
        let stderr = self.child.stderr.take();
        let tail_handle = stderr.map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut tail = std::collections::VecDeque::with_capacity(STDERR_TAIL_LINES);
                while let Ok(Some(line)) = lines.next_line().await {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail.into_iter().collect::<Vec<_>>()
            })
        });

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| EncoderError::SpawnFailed(e.to_string()))?;

        let tail = match tail_handle {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        };

        let outcome = match status.code() {
            Some(0) => ExitOutcome::Success,
            Some(code) => ExitOutcome::NonZero(code),
            None => ExitOutcome::Terminated,
        };

        Ok((outcome, tail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn success_exit_is_classified_as_success() {
        let spawned = SpawnedEncoder::spawn(Path::new("true"), &[]).unwrap();
        let (outcome, _tail) = spawned.wait_with_stderr_tail().await.unwrap();
        assert_eq!(outcome, ExitOutcome::Success);
    }

    #[tokio::test]
    async fn non_zero_exit_carries_the_code() {
        let spawned = SpawnedEncoder::spawn(Path::new("false"), &[]).unwrap();
        let (outcome, _tail) = spawned.wait_with_stderr_tail().await.unwrap();
        assert_eq!(outcome, ExitOutcome::NonZero(1));
    }

    #[tokio::test]
    async fn stderr_tail_is_captured() {
        let spawned = SpawnedEncoder::spawn(
            Path::new("sh"),
            &["-c".to_string(), "echo boom 1>&2; exit 1".to_string()],
        )
        .unwrap();
        let (outcome, tail) = spawned.wait_with_stderr_tail().await.unwrap();
        assert_eq!(outcome, ExitOutcome::NonZero(1));
        assert!(tail.iter().any(|l| l.contains("boom")));
    }

    #[tokio::test]
    async fn spawning_a_missing_binary_fails() {
        let result = SpawnedEncoder::spawn(Path::new("/nonexistent/binary"), &[]);
        assert!(result.is_err());
    }
}
