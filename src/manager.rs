//! Stream Manager (spec.md §4.1): orchestrates the session map, timeline
//! builder, encoder, recovery engine, playlist builder, and cleanup sweep
//! for every channel. The single per-process singleton the design notes
//! call for — constructed once with its collaborators injected.

use crate::batch::{self, BatchScheduler};
use crate::cleanup;
use crate::config::Config;
use crate::encoder::{self, EncoderParams, ExitOutcome, HwAccelProbe, InputMode, SpawnedEncoder};
use crate::errors::EngineError;
use crate::models::Quality;
use crate::playlist::{self, MasterVariant};
use crate::recovery::{self, Strategy};
use crate::repository::Repositories;
use crate::session::{BatchState, SessionEntry, SessionManager, StreamSession, StreamState, VariantPaths};
use crate::timeline;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

const SIGTERM_TIMEOUT: Duration = Duration::from_secs(5);
const SIGKILL_TIMEOUT: Duration = Duration::from_secs(2);

pub struct StreamManager {
    sessions: Arc<SessionManager>,
    repositories: Repositories,
    config: Config,
    hw_probe: RwLock<Option<HwAccelProbe>>,
    /// Lets methods reachable only through `&self` (the [`BatchScheduler`]
    /// trait impl) hand an owned `Arc<Self>` to a detached `tokio::spawn`.
    self_ref: std::sync::Weak<StreamManager>,
}

impl StreamManager {
    pub fn new(config: Config, repositories: Repositories) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            sessions: Arc::new(SessionManager::new()),
            repositories,
            config,
            hw_probe: RwLock::new(None),
            self_ref: weak.clone(),
        })
    }

    fn arc(&self) -> Arc<Self> {
        self.self_ref.upgrade().expect("StreamManager outlives its own Arc")
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Starts the cleanup sweep and batch coordinator as perpetual tasks.
    /// Returns the stop signal and both join handles (spec.md §5).
    pub fn start(&self) -> StreamManagerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);

        let coordinator = batch::BatchCoordinator::new(
            self.sessions.clone(),
            self.arc() as Arc<dyn BatchScheduler>,
            self.config.streaming.trigger_threshold,
        );
        let coordinator_rx = stop_rx.clone();
        let coordinator_handle = tokio::spawn(async move { coordinator.run(coordinator_rx).await });

        let manager = self.arc();
        let mut cleanup_rx = stop_rx.clone();
        let cleanup_handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(manager.config.streaming.cleanup_interval_seconds));
            loop {
                tokio::select! {
                    _ = interval.tick() => manager.run_cleanup_sweep().await,
                    _ = cleanup_rx.changed() => {
                        if *cleanup_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        StreamManagerHandle { stop_tx, coordinator_handle, cleanup_handle }
    }

    /// Graceful shutdown: stop the perpetual tasks, then every active
    /// session (spec.md §5).
    pub async fn stop(&self, handle: StreamManagerHandle) {
        let _ = handle.stop_tx.send(true);
        let _ = handle.coordinator_handle.await;
        let _ = handle.cleanup_handle.await;

        for channel_id in self.sessions.channel_ids().await {
            let _ = self.stop_stream(channel_id).await;
        }
    }

    async fn run_cleanup_sweep(&self) {
        let grace_period = Duration::from_secs(self.config.streaming.grace_period_seconds);
        let channel_ids = self.sessions.channel_ids().await;

        for channel_id in &channel_ids {
            let Some(entry) = self.sessions.get(*channel_id).await else { continue };
            let should_stop = {
                let session = entry.session.lock().await;
                cleanup::is_idle(session.client_count(), session.last_access, grace_period)
            };
            if should_stop {
                let _ = self.stop_stream(*channel_id).await;
            }
        }

        let active: HashSet<Uuid> = self.sessions.channel_ids().await.into_iter().collect();
        if let Err(e) = cleanup::sweep_orphan_directories(&self.config.streaming.segment_root, &active) {
            tracing::warn!(error = %e, "orphan directory sweep failed");
        }
    }

    pub async fn get_stream(&self, channel_id: Uuid) -> Option<Arc<SessionEntry>> {
        self.sessions.get(channel_id).await
    }

    /// `StartStream` (spec.md §4.1): idempotent, returns the existing
    /// session if present.
    pub async fn start_stream(&self, channel_id: Uuid) -> Result<Arc<SessionEntry>, EngineError> {
        if let Some(existing) = self.sessions.get(channel_id).await {
            return Ok(existing);
        }

        check_free_disk_space(
            &self.config.streaming.segment_root,
            self.config.streaming.min_free_disk_bytes,
        )?;

        let channel = self
            .repositories
            .channels
            .get_by_id(channel_id)
            .await
            .map_err(|_| EngineError::ChannelNotFound(channel_id))?;
        let playlist_entries = self
            .repositories
            .playlist_items
            .get_with_media(channel_id)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        if playlist_entries.is_empty() {
            return Err(EngineError::EmptyPlaylist(channel_id));
        }

        let output_dir = self.config.streaming.segment_root.join(channel_id.to_string());
        let qualities = build_variant_paths(&output_dir, Quality::DEFAULT_PUBLISHED);
        for variant in &qualities {
            std::fs::create_dir_all(&variant.segment_dir).map_err(EngineError::Io)?;
        }

        let master_variants: Vec<MasterVariant> = qualities
            .iter()
            .map(|v| MasterVariant { quality: v.quality, uri: format!("{}/{}.m3u8", v.quality.label(), v.quality.label()) })
            .collect();
        let master_text = playlist::build_master(&master_variants)?;
        playlist::write_atomic(&output_dir.join("master.m3u8"), &master_text)?;

        let entry = self
            .sessions
            .get_or_insert_with(channel_id, || StreamSession::new(channel_id, output_dir.clone(), qualities))
            .await;

        {
            let mut session = entry.session.lock().await;
            session.transition(StreamState::Starting)?;
        }

        let batch = self.build_initial_batch(&channel, &playlist_entries, &output_dir)?;
        self.run_batch(channel_id, batch).await;

        Ok(entry)
    }

    /// Resolves the timeline plan for `channel` at the current wall-clock
    /// position and turns it into the batch that bootstraps a stream
    /// (spec.md §4.4). Shared by `start_stream` and the coordinator's
    /// `schedule_initial_batch`, so a session re-entering `Starting` after
    /// a crash gets the same entry-point resolution as a fresh start.
    fn build_initial_batch(
        &self,
        channel: &crate::models::Channel,
        playlist_entries: &[crate::models::PlaylistEntry],
        output_dir: &std::path::Path,
    ) -> Result<BatchState, EngineError> {
        let concat_dir = output_dir.join("concat");
        let plan = timeline::build_plan(channel, playlist_entries, Utc::now(), &concat_dir)?;
        let (video_source_path, video_start_offset) = plan_entry_point(&plan);
        Ok(batch::initial_batch(video_source_path, video_start_offset, self.config.streaming.batch_size))
    }

    /// `RegisterClient` (spec.md §4.1): starts the stream first, then
    /// registers idempotently.
    pub async fn register_client(&self, channel_id: Uuid, session_id: &str) -> Result<(), EngineError> {
        let entry = self.start_stream(channel_id).await?;
        let mut session = entry.session.lock().await;
        session.register_client(session_id);
        Ok(())
    }

    /// `UnregisterClient` (spec.md §4.1): decrements count; teardown is
    /// left to the idle sweep.
    pub async fn unregister_client(&self, channel_id: Uuid, session_id: &str) -> Result<bool, EngineError> {
        let entry = self.sessions.get(channel_id).await.ok_or(EngineError::ChannelNotFound(channel_id))?;
        let mut session = entry.session.lock().await;
        Ok(session.unregister_client(session_id))
    }

    /// `StopStream` (spec.md §4.1): terminate the encoder, delete the
    /// output directory, drop the session and its circuit breaker.
    pub async fn stop_stream(&self, channel_id: Uuid) -> Result<(), EngineError> {
        let Some(entry) = self.sessions.remove(channel_id).await else {
            return Ok(());
        };

        let (output_dir, pid) = {
            let mut session = entry.session.lock().await;
            let _ = session.transition(StreamState::Stopping);
            (session.output_dir.clone(), session.encoder_pid)
        };

        if let Some(pid) = pid {
            terminate_pid(pid).await;
        }

        if output_dir.exists() {
            let _ = std::fs::remove_dir_all(&output_dir);
        }

        Ok(())
    }

    async fn resolved_hw_accel(&self) -> crate::config::HardwareAccel {
        let preferred = self.config.streaming.hardware_accel;
        if preferred == crate::config::HardwareAccel::None {
            return preferred;
        }

        let mut probe = self.hw_probe.write().await;
        if probe.is_none() {
            *probe = Some(encoder::detect_hw_accel(&self.config.streaming.encoder_path).await);
        }
        probe.as_ref().unwrap().resolve(preferred)
    }

    /// Launches the encoder for `batch` on the session's default quality
    /// and reacts to its outcome: N-2 cleanup and state advance on
    /// success, classified-error recovery on failure.
    ///
    /// Returns a boxed future (rather than `async fn`) because this method
    /// and [`Self::record_batch_failure`] call each other indirectly through
    /// detached `tokio::spawn` tasks; leaving both as plain `async fn`
    /// creates a cyclic opaque-type reference that the compiler cannot
    /// resolve to a concrete `Send` future.
    fn run_batch<'a>(
        &'a self,
        channel_id: Uuid,
        batch: BatchState,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
        let Some(entry) = self.sessions.get(channel_id).await else { return };
        let (output_dir, quality) = {
            let session = entry.session.lock().await;
            let Some(variant) = session.qualities.first() else { return };
            (session.output_dir.clone(), variant.clone())
        };

        let hw_accel = self.resolved_hw_accel().await;
        let params = EncoderParams {
            input_file: batch.video_source_path.clone(),
            output_path: quality.playlist_path.clone(),
            quality: quality.quality,
            hardware_accel: hw_accel,
            seek_seconds: batch.video_start_offset,
            segment_duration: self.config.streaming.segment_duration,
            playlist_size: self.config.streaming.playlist_size,
            encoding_preset: self.config.streaming.encoding_preset.clone(),
            mode: InputMode::Batch { batch_size: self.config.streaming.batch_size },
        };

        let spawned = match encoder::build(&params).and_then(|args| {
            SpawnedEncoder::spawn(&self.config.streaming.encoder_path, &args)
        }) {
            Ok(spawned) => spawned,
            Err(e) => {
                self.record_batch_failure(channel_id, batch, &e.to_string(), &[]).await;
                return;
            }
        };

        {
            let mut session = entry.session.lock().await;
            session.encoder_pid = spawned.pid;
        }

        let manager = self.arc();
        tokio::spawn(async move {
            match spawned.wait_with_stderr_tail().await {
                Ok((ExitOutcome::Success, _tail)) => {
                    manager.record_batch_success(channel_id, batch, &output_dir, quality.quality).await;
                }
                Ok((_, tail)) => {
                    let message = tail.join("\n");
                    manager.record_batch_failure(channel_id, batch, &message, &tail).await;
                }
                Err(e) => {
                    manager.record_batch_failure(channel_id, batch, &e.to_string(), &[]).await;
                }
            }
        });
        })
    }

    async fn record_batch_success(
        &self,
        channel_id: Uuid,
        mut batch: BatchState,
        output_dir: &std::path::Path,
        quality: Quality,
    ) {
        let Some(entry) = self.sessions.get(channel_id).await else { return };

        batch.generation_ended = Some(Utc::now());
        batch.is_complete = true;

        {
            let mut session = entry.session.lock().await;
            if session.state == StreamState::Starting {
                let _ = session.transition(StreamState::Active);
            }
            session.error_count = 0;
            session.restart_count = 0;
            session.last_error = None;
            session.current_batch.replace(batch.clone());
        }

        {
            let mut breaker = entry.breaker.lock().await;
            breaker.on_success();
        }

        // N-2 cleanup: batch `k` completing deletes the segment range of
        // batch `k - 2`, which spans exactly one batch width immediately
        // before the batch preceding this one.
        if batch.batch_number >= 2 {
            let quality_dir = output_dir.join(quality.label());
            let batch_size = self.config.streaming.batch_size as u64;
            let start = batch.start_segment.saturating_sub(2 * batch_size);
            let end = batch.start_segment.saturating_sub(batch_size + 1);
            if end >= start {
                let _ = cleanup::cleanup_batch_segments(&quality_dir, quality, start, end);
            }
        }
    }

    async fn record_batch_failure(&self, channel_id: Uuid, batch: BatchState, stderr_joined: &str, tail: &[String]) {
        let Some(entry) = self.sessions.get(channel_id).await else { return };

        let kind = recovery::classify_stderr(tail);
        let strategy = Strategy::for_kind(kind);

        let client_count = {
            let mut session = entry.session.lock().await;
            session.error_count += 1;
            session.last_error = Some(stderr_joined.to_string());
            session.client_count()
        };

        {
            let mut breaker = entry.breaker.lock().await;
            breaker.on_failure();
        }

        if client_count == 0 || !matches!(strategy, Strategy::RestartWithBackoff | Strategy::FallBackToSoftware) {
            let mut session = entry.session.lock().await;
            let _ = session.transition(StreamState::Failed);
            return;
        }

        let restart_count = {
            let mut session = entry.session.lock().await;
            let _ = session.transition(StreamState::Failed);
            session.restart_count += 1;
            session.restart_count
        };

        if recovery::attempts_exhausted(restart_count) {
            return;
        }

        if entry.breaker.lock().await.allow().is_err() {
            return;
        }

        if matches!(strategy, Strategy::FallBackToSoftware) {
            let mut session = entry.session.lock().await;
            session.hw_accel_failed = true;
        }

        {
            let mut session = entry.session.lock().await;
            let _ = session.transition(StreamState::Starting);
        }

        let backoff = recovery::backoff_seconds(restart_count);
        tracing::warn!(%channel_id, backoff, "scheduling encoder restart");

        let manager = self.arc();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            manager.run_batch(channel_id, batch).await;
        });
    }
}

/// Handle to the background tasks started by [`StreamManager::start`].
pub struct StreamManagerHandle {
    stop_tx: watch::Sender<bool>,
    coordinator_handle: tokio::task::JoinHandle<()>,
    cleanup_handle: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl BatchScheduler for StreamManager {
    async fn schedule_initial_batch(&self, channel_id: Uuid) {
        let Some(entry) = self.sessions.get(channel_id).await else { return };
        let output_dir = {
            let session = entry.session.lock().await;
            session.output_dir.clone()
        };

        let Ok(channel) = self.repositories.channels.get_by_id(channel_id).await else { return };
        let Ok(playlist_entries) = self.repositories.playlist_items.get_with_media(channel_id).await else { return };
        if playlist_entries.is_empty() {
            return;
        }

        let Ok(batch) = self.build_initial_batch(&channel, &playlist_entries, &output_dir) else { return };
        self.run_batch_detached(channel_id, batch);
    }

    async fn schedule_next_batch(&self, channel_id: Uuid, previous: BatchState) {
        let media_duration = self
            .repositories
            .playlist_items
            .get_with_media(channel_id)
            .await
            .ok()
            .and_then(|entries| {
                entries
                    .into_iter()
                    .find(|e| e.media.path() == previous.video_source_path)
                    .map(|e| e.media.duration_seconds as f64)
            })
            .unwrap_or(0.0);

        let next = batch::next_batch(
            &previous,
            self.config.streaming.batch_size,
            self.config.streaming.segment_duration,
            media_duration,
        );
        self.run_batch_detached(channel_id, next);
    }
}

impl StreamManager {
    fn run_batch_detached(&self, channel_id: Uuid, batch: BatchState) {
        let manager = self.arc();
        tokio::spawn(async move { manager.run_batch(channel_id, batch).await });
    }
}

fn plan_entry_point(plan: &timeline::InputPlan) -> (PathBuf, f64) {
    match plan {
        timeline::InputPlan::Simple { file, seek_seconds, .. } => (file.clone(), *seek_seconds),
        timeline::InputPlan::Concat { list_path, entries, .. } => {
            let offset = entries.first().map(|e| e.in_point).unwrap_or(0.0);
            (list_path.clone(), offset)
        }
    }
}

fn build_variant_paths(output_dir: &std::path::Path, qualities: &[Quality]) -> Vec<VariantPaths> {
    qualities
        .iter()
        .map(|q| {
            let dir = output_dir.join(q.label());
            VariantPaths {
                quality: *q,
                playlist_path: dir.join(format!("{}.m3u8", q.label())),
                segment_dir: dir,
            }
        })
        .collect()
}

/// Disk-space admission control (spec.md §4.1 step 1): uses `sysinfo` to
/// find the available space on the disk backing `path`.
fn check_free_disk_space(path: &std::path::Path, min_free_bytes: u64) -> Result<(), EngineError> {
    use sysinfo::Disks;

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();

    let mut best_match: Option<(&std::path::Path, u64)> = None;
    for disk in disks.list() {
        let mount_point = disk.mount_point();
        if canonical.starts_with(mount_point) {
            let is_better = best_match.map_or(true, |(best, _)| mount_point.components().count() > best.components().count());
            if is_better {
                best_match = Some((mount_point, disk.available_space()));
            }
        }
    }

    let available = best_match.map(|(_, space)| space).unwrap_or(u64::MAX);
    if available < min_free_bytes {
        return Err(EngineError::InsufficientDiskSpace { available_bytes: available, required_bytes: min_free_bytes });
    }
    Ok(())
}

/// SIGTERM with a timeout, then SIGKILL (spec.md §4.1, §5). There is no
/// portable way to observe the process actually exiting here without
/// holding the `Child` handle, which belongs to the batch monitor task
/// (design notes: encoder processes never escape their owner) — this
/// sends the signals and gives the process time to act on them.
async fn terminate_pid(pid: u32) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        tokio::time::sleep(SIGTERM_TIMEOUT).await;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
        tokio::time::sleep(SIGKILL_TIMEOUT).await;
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_paths_are_nested_under_quality_label() {
        let output_dir = PathBuf::from("/segments/chan");
        let variants = build_variant_paths(&output_dir, Quality::DEFAULT_PUBLISHED);
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].segment_dir, PathBuf::from("/segments/chan/1080p"));
        assert_eq!(variants[0].playlist_path, PathBuf::from("/segments/chan/1080p/1080p.m3u8"));
    }

    #[test]
    fn disk_space_check_passes_when_requirement_is_trivial() {
        let result = check_free_disk_space(std::path::Path::new("."), 1);
        assert!(result.is_ok());
    }

    #[test]
    fn disk_space_check_fails_when_requirement_is_absurd() {
        let result = check_free_disk_space(std::path::Path::new("."), u64::MAX);
        assert!(result.is_err());
    }
}
