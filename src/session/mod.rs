//! Stream Session: the in-memory state of one active channel stream
//! (spec.md §3, §4.1, §4.2).
//!
//! A single struct behind one lock per session, per the design notes —
//! state, encoder PID, and batch pointer change together and must not be
//! split across separate locks. [`manager::SessionManager`] owns the
//! map of these plus one [`circuit_breaker::CircuitBreaker`] per channel.

pub mod circuit_breaker;
pub mod manager;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState};
pub use manager::{SessionEntry, SessionManager};

use crate::errors::SessionError;
use crate::models::Quality;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Starting,
    Active,
    Stopping,
    Failed,
}

impl StreamState {
    fn can_transition_to(self, to: StreamState) -> bool {
        use StreamState::*;
        matches!(
            (self, to),
            (Idle, Starting)
                | (Starting, Active)
                | (Starting, Failed)
                | (Starting, Stopping)
                | (Active, Stopping)
                | (Active, Failed)
                | (Stopping, Idle)
                | (Failed, Starting)
                | (Failed, Idle)
        )
    }
}

/// A published HLS variant with its on-disk locations (spec.md §3).
#[derive(Debug, Clone)]
pub struct VariantPaths {
    pub quality: Quality,
    pub segment_dir: PathBuf,
    pub playlist_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ClientPosition {
    pub segment_number: u64,
    pub quality: Quality,
    pub last_updated: DateTime<Utc>,
}

/// One encoder invocation's worth of segments (spec.md §3).
#[derive(Debug, Clone)]
pub struct BatchState {
    pub batch_number: u64,
    pub start_segment: u64,
    pub end_segment: u64,
    pub video_source_path: PathBuf,
    pub video_start_offset: f64,
    pub generation_started: DateTime<Utc>,
    pub generation_ended: Option<DateTime<Utc>>,
    pub is_complete: bool,
}

impl BatchState {
    pub fn len(&self) -> u64 {
        self.end_segment - self.start_segment + 1
    }
}

pub struct StreamSession {
    pub channel_id: Uuid,
    pub state: StreamState,
    pub output_dir: PathBuf,
    pub qualities: Vec<VariantPaths>,
    pub encoder_pid: Option<u32>,
    pub last_access: Instant,
    pub registered_sessions: HashSet<String>,
    pub client_positions: HashMap<String, ClientPosition>,
    pub current_batch: Option<BatchState>,
    pub restart_count: u32,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub hw_accel_failed: bool,
}

impl StreamSession {
    pub fn new(channel_id: Uuid, output_dir: PathBuf, qualities: Vec<VariantPaths>) -> Self {
        Self {
            channel_id,
            state: StreamState::Idle,
            output_dir,
            qualities,
            encoder_pid: None,
            last_access: Instant::now(),
            registered_sessions: HashSet::new(),
            client_positions: HashMap::new(),
            current_batch: None,
            restart_count: 0,
            error_count: 0,
            last_error: None,
            hw_accel_failed: false,
        }
    }

    pub fn transition(&mut self, to: StreamState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(to) {
            return Err(SessionError::IllegalTransition {
                from: format!("{:?}", self.state),
                to: format!("{:?}", to),
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn client_count(&self) -> usize {
        self.registered_sessions.len()
    }

    /// Registers `session_id`; returns `true` if this session id was not
    /// already registered (spec.md §4.1 idempotent registration).
    pub fn register_client(&mut self, session_id: &str) -> bool {
        self.last_access = Instant::now();
        self.registered_sessions.insert(session_id.to_string())
    }

    /// Unregisters `session_id`; returns `true` if it had been registered.
    pub fn unregister_client(&mut self, session_id: &str) -> bool {
        self.client_positions.remove(session_id);
        self.registered_sessions.remove(session_id)
    }

    pub fn update_position(&mut self, session_id: &str, segment_number: u64, quality: Quality) {
        self.client_positions.insert(
            session_id.to_string(),
            ClientPosition {
                segment_number,
                quality,
                last_updated: Utc::now(),
            },
        );
    }

    pub fn furthest_position(&self) -> u64 {
        self.client_positions.values().map(|p| p.segment_number).max().unwrap_or(0)
    }

    pub fn segments_remaining(&self) -> u64 {
        match &self.current_batch {
            Some(batch) => batch.end_segment.saturating_sub(self.furthest_position()),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> StreamSession {
        StreamSession::new(Uuid::new_v4(), PathBuf::from("/tmp/chan"), vec![])
    }

    #[test]
    fn idle_to_starting_is_legal() {
        let mut s = session();
        assert!(s.transition(StreamState::Starting).is_ok());
    }

    #[test]
    fn idle_to_active_is_illegal() {
        let mut s = session();
        assert!(s.transition(StreamState::Active).is_err());
    }

    #[test]
    fn full_lifecycle_transitions_are_legal() {
        let mut s = session();
        s.transition(StreamState::Starting).unwrap();
        s.transition(StreamState::Active).unwrap();
        s.transition(StreamState::Stopping).unwrap();
        s.transition(StreamState::Idle).unwrap();
    }

    #[test]
    fn failed_can_restart() {
        let mut s = session();
        s.transition(StreamState::Starting).unwrap();
        s.transition(StreamState::Failed).unwrap();
        assert!(s.transition(StreamState::Starting).is_ok());
    }

    #[test]
    fn repeated_registration_is_idempotent() {
        let mut s = session();
        assert!(s.register_client("sid-1"));
        assert!(!s.register_client("sid-1"));
        assert_eq!(s.client_count(), 1);
    }

    #[test]
    fn unregister_unknown_session_returns_false() {
        let mut s = session();
        assert!(!s.unregister_client("ghost"));
    }

    #[test]
    fn furthest_position_is_max_of_client_positions() {
        let mut s = session();
        s.update_position("a", 3, Quality::P1080);
        s.update_position("b", 7, Quality::P720);
        assert_eq!(s.furthest_position(), 7);
    }

    #[test]
    fn segments_remaining_is_zero_with_no_batch() {
        let s = session();
        assert_eq!(s.segments_remaining(), 0);
    }
}
