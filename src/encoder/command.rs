//! Pure encoder argv construction (spec.md §4.3).
//!
//! `build` takes a fully-resolved [`EncoderParams`] and produces the
//! argument vector to pass to the encoder binary. It performs no I/O and
//! has no side effects, so every edge case is covered by unit tests without
//! spawning a real process — the same "typed plan, then render" shape as
//! the teacher's `proxy::generator::ProxyGenerator::generate_m3u_content`.

use crate::config::HardwareAccel;
use crate::errors::EncoderError;
use crate::models::{Quality, AUDIO_BITRATE_KBPS};
use std::path::{Path, PathBuf};

/// How the encoder should bound and loop its output (spec.md §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    /// Produce a fixed number of segments and stop; disables input looping.
    Batch { batch_size: u32 },
    /// Loop the input indefinitely so a short file can back a 24/7 channel.
    Continuous,
    /// Produce exactly one segment into a directory rather than a playlist.
    SingleSegment,
}

#[derive(Debug, Clone)]
pub struct EncoderParams {
    pub input_file: PathBuf,
    /// Playlist output path, except in [`InputMode::SingleSegment`] where
    /// this is the output directory.
    pub output_path: PathBuf,
    pub quality: Quality,
    pub hardware_accel: HardwareAccel,
    pub seek_seconds: f64,
    pub segment_duration: u32,
    pub playlist_size: u32,
    pub encoding_preset: String,
    pub mode: InputMode,
}

/// Builds the encoder argv for `params`. Pure function: same input always
/// produces the same output.
pub fn build(params: &EncoderParams) -> Result<Vec<String>, EncoderError> {
    validate(params)?;

    let mut args = Vec::new();

    // Seek flags precede `-i`.
    if params.seek_seconds > 0.0 {
        args.push("-ss".to_string());
        args.push(format!("{:.3}", params.seek_seconds));
        // Seeking mid-file needs PTS regeneration so segment timestamps start at 0.
        args.push("-fflags".to_string());
        args.push("+genpts".to_string());
    }

    // Input looping precedes `-i`.
    if matches!(params.mode, InputMode::Continuous) {
        args.push("-stream_loop".to_string());
        args.push("-1".to_string());
    }

    args.push("-i".to_string());
    args.push(path_str(&params.input_file)?);

    let codec = video_codec(params.hardware_accel);
    args.push("-c:v".to_string());
    args.push(codec.to_string());

    let preset = resolve_preset(params.hardware_accel, &params.encoding_preset);
    args.push(PRESET_FLAG.to_string());
    args.push(preset);

    let (width, height) = params.quality.resolution();
    args.push("-vf".to_string());
    args.push(format!("scale={width}:{height}"));

    args.push("-b:v".to_string());
    args.push(format!("{}k", params.quality.bitrate_kbps()));

    args.push("-c:a".to_string());
    args.push("aac".to_string());
    args.push("-b:a".to_string());
    args.push(format!("{AUDIO_BITRATE_KBPS}k"));
    args.push("-ac".to_string());
    args.push("2".to_string());

    match &params.mode {
        InputMode::SingleSegment => {
            args.push("-f".to_string());
            args.push("mpegts".to_string());
            let dir = &params.output_path;
            let filename = format!(
                "{}_segment_000.ts",
                params.quality.label()
            );
            args.push(path_str(&dir.join(filename))?);
        }
        InputMode::Batch { batch_size } => {
            let total_seconds = *batch_size as f64 * params.segment_duration as f64;
            args.push("-t".to_string());
            args.push(format!("{total_seconds:.3}"));

            args.push("-f".to_string());
            args.push("hls".to_string());
            args.push("-hls_time".to_string());
            args.push(params.segment_duration.to_string());
            args.push("-hls_list_size".to_string());
            args.push(params.playlist_size.to_string());
            args.push("-hls_segment_filename".to_string());
            args.push(segment_filename_pattern(&params.output_path, params.quality)?);
            args.push(path_str(&params.output_path)?);
        }
        InputMode::Continuous => {
            args.push("-f".to_string());
            args.push("hls".to_string());
            args.push("-hls_time".to_string());
            args.push(params.segment_duration.to_string());
            args.push("-hls_list_size".to_string());
            args.push(params.playlist_size.to_string());
            args.push("-hls_segment_filename".to_string());
            args.push(segment_filename_pattern(&params.output_path, params.quality)?);
            args.push(path_str(&params.output_path)?);
        }
    }

    Ok(args)
}

/// Derives `<dir>/<quality>_segment_%03d.ts` from the playlist path.
fn segment_filename_pattern(playlist_path: &Path, quality: Quality) -> Result<String, EncoderError> {
    let dir = playlist_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok(format!("{}/{}_segment_%03d.ts", path_str(dir)?, quality.label()))
}

fn path_str(path: &Path) -> Result<String, EncoderError> {
    path.to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| EncoderError::EmptyOutputPath)
}

fn video_codec(hw: HardwareAccel) -> &'static str {
    match hw {
        HardwareAccel::None | HardwareAccel::Auto => "libx264",
        HardwareAccel::Nvenc => "h264_nvenc",
        HardwareAccel::Qsv => "h264_qsv",
        HardwareAccel::Vaapi => "h264_vaapi",
        HardwareAccel::Videotoolbox => "h264_videotoolbox",
    }
}

/// Every supported codec (libx264, NVENC, QSV, VAAPI, VideoToolbox) takes
/// its preset through the same `-preset` flag; only the value namespace
/// differs, handled by `resolve_preset`.
const PRESET_FLAG: &str = "-preset";

/// Maps a software x264-style preset name onto the scale the active codec
/// expects; NVENC's preset namespace is `p1`(fastest)..`p7`(slowest).
fn resolve_preset(hw: HardwareAccel, preset: &str) -> String {
    if hw != HardwareAccel::Nvenc {
        return preset.to_string();
    }
    match preset {
        "ultrafast" => "p1",
        "superfast" => "p2",
        "veryfast" => "p3",
        "faster" => "p4",
        "fast" => "p5",
        "medium" => "p5",
        "slow" => "p6",
        "slower" | "veryslow" => "p7",
        other => other,
    }
    .to_string()
}

fn validate(params: &EncoderParams) -> Result<(), EncoderError> {
    if params.input_file.as_os_str().is_empty() {
        return Err(EncoderError::EmptyInputFile);
    }
    if params.output_path.as_os_str().is_empty() {
        return Err(EncoderError::EmptyOutputPath);
    }
    if params.segment_duration == 0 {
        return Err(EncoderError::InvalidSegmentDuration(params.segment_duration as i64));
    }
    if params.playlist_size == 0 && !matches!(params.mode, InputMode::Batch { .. }) {
        return Err(EncoderError::InvalidPlaylistSize(params.playlist_size as i64));
    }
    if let InputMode::Batch { batch_size } = params.mode {
        if batch_size == 0 {
            return Err(EncoderError::InvalidBatchSize(batch_size as i64));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_params() -> EncoderParams {
        EncoderParams {
            input_file: PathBuf::from("/media/show.mp4"),
            output_path: PathBuf::from("/segments/chan/1080p/1080p.m3u8"),
            quality: Quality::P1080,
            hardware_accel: HardwareAccel::None,
            seek_seconds: 0.0,
            segment_duration: 6,
            playlist_size: 6,
            encoding_preset: "veryfast".to_string(),
            mode: InputMode::Batch { batch_size: 10 },
        }
    }

    #[test]
    fn seek_and_loop_flags_precede_input() {
        let mut params = base_params();
        params.seek_seconds = 12.0;
        let args = build(&params).unwrap();
        let ss_idx = args.iter().position(|a| a == "-ss").unwrap();
        let i_idx = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss_idx < i_idx);
    }

    #[test]
    fn continuous_mode_loops_input_before_input_flag() {
        let mut params = base_params();
        params.mode = InputMode::Continuous;
        let args = build(&params).unwrap();
        let loop_idx = args.iter().position(|a| a == "-stream_loop").unwrap();
        let i_idx = args.iter().position(|a| a == "-i").unwrap();
        assert!(loop_idx < i_idx);
        assert!(!args.contains(&"-t".to_string()));
    }

    #[test]
    fn batch_mode_bounds_total_duration() {
        let params = base_params();
        let args = build(&params).unwrap();
        let t_idx = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t_idx + 1], "60.000");
        assert!(!args.contains(&"-stream_loop".to_string()));
    }

    #[test]
    fn output_path_is_last_argument() {
        let params = base_params();
        let args = build(&params).unwrap();
        assert_eq!(args.last().unwrap(), "/segments/chan/1080p/1080p.m3u8");
    }

    #[test]
    fn segment_filename_pattern_is_derived_from_playlist_path() {
        let params = base_params();
        let args = build(&params).unwrap();
        let idx = args.iter().position(|a| a == "-hls_segment_filename").unwrap();
        assert_eq!(args[idx + 1], "/segments/chan/1080p/1080p_segment_%03d.ts");
    }

    #[test]
    fn batch_size_zero_is_rejected() {
        let mut params = base_params();
        params.mode = InputMode::Batch { batch_size: 0 };
        assert_eq!(build(&params), Err(EncoderError::InvalidBatchSize(0)));
    }

    #[test]
    fn empty_input_file_is_rejected() {
        let mut params = base_params();
        params.input_file = PathBuf::new();
        assert_eq!(build(&params), Err(EncoderError::EmptyInputFile));
    }

    #[test]
    fn zero_segment_duration_is_rejected() {
        let mut params = base_params();
        params.segment_duration = 0;
        assert_eq!(build(&params), Err(EncoderError::InvalidSegmentDuration(0)));
    }

    #[test]
    fn nvenc_maps_software_preset_names() {
        let mut params = base_params();
        params.hardware_accel = HardwareAccel::Nvenc;
        params.encoding_preset = "ultrafast".to_string();
        let args = build(&params).unwrap();
        let idx = args.iter().position(|a| a == "-preset").unwrap();
        assert_eq!(args[idx + 1], "p1");
        assert!(args.contains(&"h264_nvenc".to_string()));
    }

    #[test]
    fn batch_size_one_is_valid() {
        let mut params = base_params();
        params.mode = InputMode::Batch { batch_size: 1 };
        assert!(build(&params).is_ok());
    }
}
