//! Engine configuration.
//!
//! Loaded once at startup into a plain immutable record and passed to the
//! [`crate::manager::StreamManager`] and its collaborators — no ambient
//! lookup, per the design notes.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

/// Options enumerated in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Root directory under which `<channelID>/<quality>/...` trees live.
    pub segment_root: PathBuf,
    /// Target duration of each `.ts` segment, in seconds.
    pub segment_duration: u32,
    /// Number of segments retained in a media playlist's sliding window.
    /// `0` disables the window (unbounded `EVENT`-style playlist).
    pub playlist_size: u32,
    /// Seconds a stream may sit at zero clients before the idle sweep stops it.
    pub grace_period_seconds: u64,
    /// Interval, in seconds, of the idle-stream and orphan-directory sweep.
    pub cleanup_interval_seconds: u64,
    /// Preferred hardware acceleration method.
    pub hardware_accel: HardwareAccel,
    /// Encoder speed/quality preset, e.g. `"veryfast"`.
    pub encoding_preset: String,
    /// Number of segments produced per encoder invocation.
    pub batch_size: u32,
    /// Remaining-segments threshold at or below which the next batch is scheduled.
    pub trigger_threshold: u32,
    /// Minimum free space required at the segment root to start a stream.
    pub min_free_disk_bytes: u64,
    /// Path to the encoder executable.
    pub encoder_path: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HardwareAccel {
    None,
    Nvenc,
    Qsv,
    Vaapi,
    Videotoolbox,
    Auto,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://./livecast-engine.db".to_string(),
                max_connections: Some(10),
            },
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            streaming: StreamingConfig {
                segment_root: PathBuf::from("./data/segments"),
                segment_duration: 6,
                playlist_size: 6,
                grace_period_seconds: 300,
                cleanup_interval_seconds: 60,
                hardware_accel: HardwareAccel::Auto,
                encoding_preset: "veryfast".to_string(),
                batch_size: 10,
                trigger_threshold: 3,
                min_free_disk_bytes: 5 * 1024 * 1024 * 1024,
                encoder_path: PathBuf::from("ffmpeg"),
            },
        }
    }
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_file = path.unwrap_or("config.toml").to_string();

        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            if let Some(parent) = std::path::Path::new(&config_file).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::create_dir_all(&default_config.streaming.segment_root)?;
            std::fs::write(&config_file, contents)?;
            Ok(default_config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_batch_defaults() {
        let cfg = Config::default();
        assert!(cfg.streaming.batch_size > 0);
        assert!(cfg.streaming.trigger_threshold < cfg.streaming.batch_size);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = Config::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.streaming.segment_duration, cfg.streaming.segment_duration);
        assert_eq!(parsed.streaming.hardware_accel, cfg.streaming.hardware_accel);
    }
}
