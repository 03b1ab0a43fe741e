//! Timeline/Input Builder (spec.md §4.4).
//!
//! Maps a channel's wall-clock playback position onto an encoder input
//! plan: either a simple `{file, seek}` pair, or — near a media boundary —
//! a concat list spanning several playlist entries. Concat lists are
//! persisted atomically the same way the playlist builder writes playlists
//! ([`crate::playlist`]), because the encoder reads the file from disk.

use crate::errors::TimelineError;
use crate::models::{Channel, PlaylistEntry};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Boundary below which an offset into the current file is rounded to 0
/// for faster encoder startup.
const SEEK_COLLAPSE_THRESHOLD_SECONDS: f64 = 10.0;
/// Below this much remaining runtime in the current file, switch to a
/// concat plan spanning the file boundary.
const CONCAT_TRIGGER_SECONDS: f64 = 30.0;
const CONCAT_MAX_ENTRIES: usize = 10;
const CONCAT_MAX_TOTAL_SECONDS: f64 = 7200.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ConcatEntry {
    pub media_id: Uuid,
    pub file: PathBuf,
    pub in_point: f64,
    pub out_point: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputPlan {
    Simple {
        media_id: Uuid,
        file: PathBuf,
        seek_seconds: f64,
        duration_seconds: f64,
    },
    Concat {
        list_path: PathBuf,
        entries: Vec<ConcatEntry>,
        total_duration_seconds: f64,
    },
}

/// Resolves `(media_id, offset_seconds)` for `channel` at `now`, walking
/// the cumulative durations of `entries` (ordered by position) from the
/// channel's epoch. Entries must be non-empty.
pub fn resolve_position(
    channel: &Channel,
    entries: &[PlaylistEntry],
    now: DateTime<Utc>,
) -> Result<(usize, f64), TimelineError> {
    if entries.is_empty() {
        return Err(TimelineError::EmptyPlaylist);
    }

    let total_duration: f64 = entries.iter().map(|e| e.media.duration_seconds as f64).sum();
    let elapsed = (now - channel.epoch_start).num_milliseconds() as f64 / 1000.0;
    let elapsed = elapsed.max(0.0);

    let position_in_cycle = if channel.looping {
        if total_duration <= 0.0 {
            0.0
        } else {
            elapsed.rem_euclid(total_duration)
        }
    } else {
        elapsed.min(total_duration)
    };

    let mut acc = 0.0;
    for (idx, entry) in entries.iter().enumerate() {
        let dur = entry.media.duration_seconds as f64;
        if position_in_cycle < acc + dur || idx == entries.len() - 1 {
            return Ok((idx, (position_in_cycle - acc).max(0.0)));
        }
        acc += dur;
    }

    unreachable!("loop always returns on the last entry")
}

/// Builds the input plan for `channel` at `now`. `concat_dir` is where a
/// concat list file is written when a concat plan is required.
pub fn build_plan(
    channel: &Channel,
    entries: &[PlaylistEntry],
    now: DateTime<Utc>,
    concat_dir: &Path,
) -> Result<InputPlan, TimelineError> {
    let (idx, offset) = resolve_position(channel, entries, now)?;
    let current = &entries[idx];
    let path = current.media.path();
    if !path.exists() {
        return Err(TimelineError::FileNotFound {
            path: current.media.file_path.clone(),
        });
    }

    let duration = current.media.duration_seconds as f64;
    let remaining = duration - offset;

    if remaining >= CONCAT_TRIGGER_SECONDS {
        let seek = if offset < SEEK_COLLAPSE_THRESHOLD_SECONDS { 0.0 } else { offset };
        return Ok(InputPlan::Simple {
            media_id: current.media.id,
            file: path,
            seek_seconds: seek,
            duration_seconds: duration - seek,
        });
    }

    let (concat_entries, total_duration_seconds) =
        build_concat_entries(entries, idx, offset, channel.looping)?;

    let list_path = write_concat_file(concat_dir, &concat_entries)?;

    Ok(InputPlan::Concat {
        list_path,
        entries: concat_entries,
        total_duration_seconds,
    })
}

fn build_concat_entries(
    entries: &[PlaylistEntry],
    start_idx: usize,
    start_offset: f64,
    looping: bool,
) -> Result<(Vec<ConcatEntry>, f64), TimelineError> {
    let mut plan = Vec::new();
    let mut total = 0.0;
    let mut idx = start_idx;
    let mut offset = start_offset;

    loop {
        let entry = &entries[idx];
        let path = entry.media.path();
        if !path.exists() {
            return Err(TimelineError::FileNotFound {
                path: entry.media.file_path.clone(),
            });
        }
        let duration = entry.media.duration_seconds as f64;
        let remaining = (duration - offset).max(0.0);

        let budget = CONCAT_MAX_TOTAL_SECONDS - total;
        let used = remaining.min(budget);
        let out_point = if used < remaining { Some(offset + used) } else { None };

        plan.push(ConcatEntry {
            media_id: entry.media.id,
            file: path,
            in_point: offset,
            out_point,
        });
        total += used;

        let exhausted_budget = total >= CONCAT_MAX_TOTAL_SECONDS || out_point.is_some();
        let at_capacity = plan.len() >= CONCAT_MAX_ENTRIES;
        if exhausted_budget || at_capacity {
            break;
        }

        let next_idx = idx + 1;
        if next_idx >= entries.len() {
            if !looping {
                break;
            }
            idx = 0;
        } else {
            idx = next_idx;
        }
        offset = 0.0;

        if idx == start_idx {
            break;
        }
    }

    Ok((plan, total))
}

/// Writes the concat list in ffmpeg concat-demuxer format, atomically
/// (temp file + rename) so the encoder never reads a partial file.
fn write_concat_file(dir: &Path, entries: &[ConcatEntry]) -> Result<PathBuf, TimelineError> {
    std::fs::create_dir_all(dir).map_err(|e| TimelineError::FileNotFound { path: e.to_string() })?;

    let mut contents = String::new();
    for entry in entries {
        contents.push_str(&format!("file '{}'\n", entry.file.display()));
        contents.push_str(&format!("inpoint {:.3}\n", entry.in_point));
        if let Some(out_point) = entry.out_point {
            contents.push_str(&format!("outpoint {:.3}\n", out_point));
        }
    }

    let final_path = dir.join("concat.txt");
    let tmp_path = dir.join(".concat.txt.tmp");

    let mut file = std::fs::File::create(&tmp_path)
        .map_err(|e| TimelineError::FileNotFound { path: e.to_string() })?;
    file.write_all(contents.as_bytes())
        .map_err(|e| TimelineError::FileNotFound { path: e.to_string() })?;
    file.sync_all().map_err(|e| TimelineError::FileNotFound { path: e.to_string() })?;

    std::fs::rename(&tmp_path, &final_path)
        .map_err(|e| TimelineError::FileNotFound { path: e.to_string() })?;

    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Media;
    use chrono::Duration;
    use tempfile::tempdir;

    fn entry(dir: &Path, name: &str, duration: i64) -> PlaylistEntry {
        let path = dir.join(name);
        std::fs::write(&path, b"fake").unwrap();
        PlaylistEntry {
            position: 0,
            media: Media {
                id: Uuid::new_v4(),
                file_path: path.to_string_lossy().to_string(),
                duration_seconds: duration,
                codec: None,
                resolution: None,
                size_bytes: None,
            },
        }
    }

    fn channel(epoch_start: DateTime<Utc>, looping: bool) -> Channel {
        Channel {
            id: Uuid::new_v4(),
            name: "test".to_string(),
            epoch_start,
            looping,
        }
    }

    #[test]
    fn seek_below_threshold_collapses_to_zero() {
        let dir = tempdir().unwrap();
        let entries = vec![entry(dir.path(), "a.mp4", 120)];
        let chan = channel(Utc::now() - Duration::seconds(5), false);
        let plan = build_plan(&chan, &entries, Utc::now(), dir.path()).unwrap();
        match plan {
            InputPlan::Simple { seek_seconds, .. } => assert_eq!(seek_seconds, 0.0),
            _ => panic!("expected simple plan"),
        }
    }

    #[test]
    fn seek_above_threshold_is_preserved() {
        let dir = tempdir().unwrap();
        let entries = vec![entry(dir.path(), "a.mp4", 120)];
        let chan = channel(Utc::now() - Duration::seconds(50), false);
        let plan = build_plan(&chan, &entries, Utc::now(), dir.path()).unwrap();
        match plan {
            InputPlan::Simple { seek_seconds, .. } => assert!((seek_seconds - 50.0).abs() < 1.0),
            _ => panic!("expected simple plan"),
        }
    }

    #[test]
    fn remaining_below_thirty_seconds_triggers_concat() {
        let dir = tempdir().unwrap();
        let entries = vec![entry(dir.path(), "a.mp4", 100), entry(dir.path(), "b.mp4", 100)];
        let chan = channel(Utc::now() - Duration::seconds(90), false);
        let plan = build_plan(&chan, &entries, Utc::now(), dir.path()).unwrap();
        match plan {
            InputPlan::Concat { entries, list_path, .. } => {
                assert!(entries.len() >= 2);
                assert!(list_path.exists());
            }
            _ => panic!("expected concat plan"),
        }
    }

    #[test]
    fn concat_list_is_capped_at_ten_entries() {
        let dir = tempdir().unwrap();
        let entries: Vec<_> = (0..20).map(|i| entry(dir.path(), &format!("{i}.mp4"), 1)).collect();
        let chan = channel(Utc::now() - Duration::seconds(0), true);
        let plan = build_plan(&chan, &entries, Utc::now(), dir.path()).unwrap();
        match plan {
            InputPlan::Concat { entries, .. } => assert!(entries.len() <= CONCAT_MAX_ENTRIES),
            _ => panic!("expected concat plan"),
        }
    }

    #[test]
    fn looping_channel_wraps_position() {
        let dir = tempdir().unwrap();
        let entries = vec![entry(dir.path(), "a.mp4", 60)];
        // two full cycles plus 10s in
        let chan = channel(Utc::now() - Duration::seconds(130), true);
        let (idx, offset) = resolve_position(&chan, &entries, Utc::now()).unwrap();
        assert_eq!(idx, 0);
        assert!((offset - 10.0).abs() < 1.0);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempdir().unwrap();
        let e = entry(dir.path(), "a.mp4", 120);
        std::fs::remove_file(&e.media.file_path).unwrap();
        let chan = channel(Utc::now(), false);
        let result = build_plan(&chan, &[e], Utc::now(), dir.path());
        assert!(matches!(result, Err(TimelineError::FileNotFound { .. })));
    }

    #[test]
    fn empty_playlist_is_rejected() {
        let chan = channel(Utc::now(), false);
        let result = resolve_position(&chan, &[], Utc::now());
        assert_eq!(result, Err(TimelineError::EmptyPlaylist));
    }
}
