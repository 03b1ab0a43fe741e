//! HLS Playlist Builder (spec.md §4.7, §6): emits and validates RFC 8216
//! master and media playlists, discovers segments on disk, and publishes
//! both via atomic temp-file-and-rename writes so a concurrent reader
//! never observes a torn file — grounded on the same `m3u8_rs` segment
//! types the reference HLS muxer uses, and on the atomic-write discipline
//! the core's design notes require for playlist publication.

use crate::errors::PlaylistError;
use crate::models::Quality;
use m3u8_rs::{MasterPlaylist, MediaPlaylist, MediaPlaylistType, MediaSegment, Playlist, VariantStream};
use std::io::Write;
use std::path::Path;

/// One quality variant as it appears in the master playlist.
#[derive(Debug, Clone)]
pub struct MasterVariant {
    pub quality: Quality,
    /// Relative URI, e.g. `1080p/1080p.m3u8`.
    pub uri: String,
}

pub fn build_master(variants: &[MasterVariant]) -> Result<String, PlaylistError> {
    let variant_streams = variants
        .iter()
        .map(|v| VariantStream {
            uri: v.uri.clone(),
            bandwidth: v.quality.bitrate_kbps() as u64 * 1000,
            resolution: Some({
                let (w, h) = v.quality.resolution();
                m3u8_rs::Resolution { width: w as u64, height: h as u64 }
            }),
            ..Default::default()
        })
        .collect();

    let playlist = MasterPlaylist {
        version: Some(3),
        variants: variant_streams,
        ..Default::default()
    };

    render(&Playlist::MasterPlaylist(playlist))
}

/// A discovered or freshly-produced segment on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentFile {
    pub index: u32,
    pub filename: String,
}

pub enum PlaylistType {
    Event,
    Vod,
}

pub fn build_media(
    segments: &[SegmentFile],
    segment_duration_seconds: u32,
    media_sequence: u64,
    playlist_type: Option<PlaylistType>,
) -> Result<String, PlaylistError> {
    let media_segments = segments
        .iter()
        .map(|s| MediaSegment {
            uri: s.filename.clone(),
            duration: segment_duration_seconds as f32,
            ..Default::default()
        })
        .collect();

    let (m3u8_type, end_list) = match playlist_type {
        Some(PlaylistType::Event) => (Some(MediaPlaylistType::Event), false),
        Some(PlaylistType::Vod) => (Some(MediaPlaylistType::Vod), true),
        None => (None, false),
    };

    let playlist = MediaPlaylist {
        version: Some(3),
        target_duration: segment_duration_seconds as f32,
        media_sequence,
        segments: media_segments,
        playlist_type: m3u8_type,
        end_list,
        ..Default::default()
    };

    render(&Playlist::MediaPlaylist(playlist))
}

fn render(playlist: &Playlist) -> Result<String, PlaylistError> {
    let mut buf = Vec::new();
    let result = match playlist {
        Playlist::MasterPlaylist(p) => p.write_to(&mut buf),
        Playlist::MediaPlaylist(p) => p.write_to(&mut buf),
    };
    result.map_err(|e| PlaylistError::RenderFailed(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| PlaylistError::RenderFailed(e.to_string()))
}

/// Parses a playlist and returns an error if it fails to validate, used by
/// tests that check the round-trip law (generate, then parse).
pub fn parse(contents: &str) -> Result<Playlist, PlaylistError> {
    m3u8_rs::parse_playlist_res(contents.as_bytes()).map_err(|e| PlaylistError::ParseFailed(format!("{e:?}")))
}

/// Writes `contents` to `path` via a temp file in the same directory
/// followed by a rename, so readers never see a partial write.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), PlaylistError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| PlaylistError::WriteFailed(e.to_string()))?;

    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("playlist")
    ));

    let mut file = std::fs::File::create(&tmp_path).map_err(|e| PlaylistError::WriteFailed(e.to_string()))?;
    file.write_all(contents.as_bytes()).map_err(|e| PlaylistError::WriteFailed(e.to_string()))?;
    file.sync_all().map_err(|e| PlaylistError::WriteFailed(e.to_string()))?;

    std::fs::rename(&tmp_path, path).map_err(|e| PlaylistError::WriteFailed(e.to_string()))?;
    Ok(())
}

/// Segment filename pattern: `<quality>_segment_<NNN>.ts`, `NNN` zero-padded
/// mod 1000 (spec.md §3 — wrap is intentional).
pub fn segment_filename(quality: Quality, index: u32) -> String {
    format!("{}_segment_{:03}.ts", quality.label(), index % 1000)
}

/// Discovers `<quality>_segment_NNN.ts` files in `dir`, sorted ascending
/// by the embedded index.
pub fn discover_segments(dir: &Path, quality: Quality) -> Result<Vec<SegmentFile>, PlaylistError> {
    let prefix = format!("{}_segment_", quality.label());
    let mut found = Vec::new();

    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PlaylistError::RenderFailed(e.to_string())),
    };

    for entry in read_dir {
        let entry = entry.map_err(|e| PlaylistError::RenderFailed(e.to_string()))?;
        let filename = entry.file_name().to_string_lossy().to_string();
        if let Some(index) = parse_segment_index(&filename, &prefix) {
            found.push(SegmentFile { index, filename });
        }
    }

    found.sort();
    Ok(found)
}

fn parse_segment_index(filename: &str, prefix: &str) -> Option<u32> {
    let rest = filename.strip_prefix(prefix)?;
    let digits = rest.strip_suffix(".ts")?;
    digits.parse().ok()
}

/// Drops segments from the head of `segments` until at most `max_segments`
/// remain, returning the drop count so the caller can advance
/// `EXT-X-MEDIA-SEQUENCE` by the same amount. `max_segments == 0` disables
/// the window.
pub fn apply_sliding_window(segments: &mut Vec<SegmentFile>, max_segments: u32) -> u64 {
    if max_segments == 0 {
        return 0;
    }
    let max_segments = max_segments as usize;
    if segments.len() <= max_segments {
        return 0;
    }
    let drop_count = segments.len() - max_segments;
    segments.drain(0..drop_count);
    drop_count as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn master_playlist_round_trips() {
        let variants = vec![
            MasterVariant { quality: Quality::P1080, uri: "1080p/1080p.m3u8".to_string() },
            MasterVariant { quality: Quality::P720, uri: "720p/720p.m3u8".to_string() },
        ];
        let text = build_master(&variants).unwrap();
        assert!(text.contains("#EXTM3U"));
        assert!(text.contains("BANDWIDTH"));
        let parsed = parse(&text).unwrap();
        assert!(matches!(parsed, Playlist::MasterPlaylist(_)));
    }

    #[test]
    fn media_playlist_round_trips() {
        let segments = vec![
            SegmentFile { index: 0, filename: "1080p_segment_000.ts".to_string() },
            SegmentFile { index: 1, filename: "1080p_segment_001.ts".to_string() },
        ];
        let text = build_media(&segments, 6, 0, None).unwrap();
        assert!(text.contains("#EXT-X-MEDIA-SEQUENCE:0"));
        let parsed = parse(&text).unwrap();
        assert!(matches!(parsed, Playlist::MediaPlaylist(_)));
    }

    #[test]
    fn segment_filename_wraps_at_one_thousand() {
        assert_eq!(segment_filename(Quality::P1080, 1000), "1080p_segment_000.ts");
        assert_eq!(segment_filename(Quality::P1080, 1999), "1080p_segment_999.ts");
    }

    #[test]
    fn discover_segments_sorts_ascending_and_contiguous() {
        let dir = tempdir().unwrap();
        for name in ["1080p_segment_002.ts", "1080p_segment_000.ts", "1080p_segment_001.ts"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let found = discover_segments(dir.path(), Quality::P1080).unwrap();
        let indices: Vec<u32> = found.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn discover_segments_ignores_other_qualities() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("720p_segment_000.ts"), b"x").unwrap();
        let found = discover_segments(dir.path(), Quality::P1080).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn discover_segments_on_missing_dir_returns_empty() {
        let found = discover_segments(Path::new("/nonexistent/dir"), Quality::P1080).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn write_atomic_never_leaves_a_partial_file_on_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("media.m3u8");
        write_atomic(&path, "first").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first");
        write_atomic(&path, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join(".media.m3u8.tmp").exists());
    }

    #[test]
    fn sliding_window_drops_from_head_and_reports_count() {
        let mut segments: Vec<_> = (0..10)
            .map(|i| SegmentFile { index: i, filename: format!("1080p_segment_{i:03}.ts") })
            .collect();
        let dropped = apply_sliding_window(&mut segments, 6);
        assert_eq!(dropped, 4);
        assert_eq!(segments.len(), 6);
        assert_eq!(segments[0].index, 4);
    }

    #[test]
    fn sliding_window_disabled_when_zero() {
        let mut segments = vec![SegmentFile { index: 0, filename: "1080p_segment_000.ts".to_string() }];
        assert_eq!(apply_sliding_window(&mut segments, 0), 0);
        assert_eq!(segments.len(), 1);
    }
}
