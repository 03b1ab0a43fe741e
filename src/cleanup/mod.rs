//! Filesystem cleanup (spec.md §4.8): N-2 batch deletion, the idle-stream
//! predicate the manager's sweep loop consults, and the orphan-directory
//! sweep over the segment root.

use crate::models::Quality;
use crate::playlist::segment_filename;
use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Deletes `<quality>_segment_<NNN>.ts` for every segment index in
/// `start_segment..=end_segment` (mod 1000), ignoring files that are
/// already gone.
pub fn cleanup_batch_segments(
    quality_dir: &Path,
    quality: Quality,
    start_segment: u64,
    end_segment: u64,
) -> std::io::Result<()> {
    for segment in start_segment..=end_segment {
        let path = quality_dir.join(segment_filename(quality, (segment % 1000) as u32));
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Whether a session with `client_count` clients and `last_access` should
/// be torn down by the idle sweep (spec.md §4.8).
pub fn is_idle(client_count: usize, last_access: Instant, grace_period: Duration) -> bool {
    client_count == 0 && last_access.elapsed() > grace_period
}

/// Removes subdirectories of `segment_root` whose name parses as a UUID
/// and is not in `active_channel_ids`. Returns the ids of removed
/// directories.
pub fn sweep_orphan_directories(
    segment_root: &Path,
    active_channel_ids: &HashSet<Uuid>,
) -> std::io::Result<Vec<Uuid>> {
    let mut removed = Vec::new();

    let read_dir = match std::fs::read_dir(segment_root) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
        Err(e) => return Err(e),
    };

    for entry in read_dir {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Ok(id) = Uuid::parse_str(&name) {
            if !active_channel_ids.contains(&id) {
                std::fs::remove_dir_all(entry.path())?;
                removed.push(id);
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn cleanup_deletes_segment_range_and_ignores_missing() {
        let dir = tempdir().unwrap();
        for i in 0..5u32 {
            std::fs::write(dir.path().join(segment_filename(Quality::P1080, i)), b"x").unwrap();
        }
        cleanup_batch_segments(dir.path(), Quality::P1080, 0, 4).unwrap();
        for i in 0..5u32 {
            assert!(!dir.path().join(segment_filename(Quality::P1080, i)).exists());
        }
        // re-running over an already-cleaned range must not error
        cleanup_batch_segments(dir.path(), Quality::P1080, 0, 4).unwrap();
    }

    #[test]
    fn cleanup_wraps_segment_index_at_one_thousand() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(segment_filename(Quality::P1080, 0)), b"x").unwrap();
        cleanup_batch_segments(dir.path(), Quality::P1080, 1000, 1000).unwrap();
        assert!(!dir.path().join(segment_filename(Quality::P1080, 0)).exists());
    }

    #[test]
    fn idle_with_zero_clients_past_grace_period() {
        let last_access = Instant::now() - Duration::from_secs(10);
        assert!(is_idle(0, last_access, Duration::from_secs(5)));
    }

    #[test]
    fn not_idle_with_clients_connected() {
        let last_access = Instant::now() - Duration::from_secs(10);
        assert!(!is_idle(1, last_access, Duration::from_secs(5)));
    }

    #[test]
    fn not_idle_within_grace_period() {
        let last_access = Instant::now();
        assert!(!is_idle(0, last_access, Duration::from_secs(300)));
    }

    #[test]
    fn orphan_sweep_removes_unknown_uuid_dirs_only() {
        let root = tempdir().unwrap();
        let active = Uuid::new_v4();
        let orphan = Uuid::new_v4();
        std::fs::create_dir(root.path().join(active.to_string())).unwrap();
        std::fs::create_dir(root.path().join(orphan.to_string())).unwrap();
        std::fs::create_dir(root.path().join("not-a-uuid")).unwrap();

        let mut active_ids = HashSet::new();
        active_ids.insert(active);

        let removed = sweep_orphan_directories(root.path(), &active_ids).unwrap();
        assert_eq!(removed, vec![orphan]);
        assert!(root.path().join(active.to_string()).exists());
        assert!(!root.path().join(orphan.to_string()).exists());
        assert!(root.path().join("not-a-uuid").exists());
    }
}
