//! Hardware acceleration probing.
//!
//! Runs the encoder binary with `-hwaccels` and scans stdout for known
//! tokens, the same "spawn a short-lived child and read its output" shape
//! the teacher uses for version/capability probes elsewhere in the corpus.

use crate::config::HardwareAccel;
use std::path::Path;
use tokio::process::Command;

/// Result of probing the encoder binary for hardware acceleration support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwAccelProbe {
    pub available: Vec<HardwareAccel>,
}

impl HwAccelProbe {
    pub fn supports(&self, accel: HardwareAccel) -> bool {
        self.available.contains(&accel)
    }

    /// Picks the first of `preferred` that the probe reports available,
    /// falling back to [`HardwareAccel::None`] (software encoding).
    pub fn resolve(&self, preferred: HardwareAccel) -> HardwareAccel {
        match preferred {
            HardwareAccel::None => HardwareAccel::None,
            HardwareAccel::Auto => self
                .available
                .iter()
                .copied()
                .find(|a| *a != HardwareAccel::None)
                .unwrap_or(HardwareAccel::None),
            specific => {
                if self.supports(specific) {
                    specific
                } else {
                    HardwareAccel::None
                }
            }
        }
    }
}

/// Probes `encoder_path -hwaccels` for the acceleration methods this build
/// of the encoder was compiled with. Returns a probe reporting nothing
/// available if the process fails to spawn or exits non-zero; hardware
/// detection failing is not itself a fatal error (spec.md §4.3), software
/// encoding is always a valid fallback.
pub async fn detect_hw_accel(encoder_path: &Path) -> HwAccelProbe {
    let output = Command::new(encoder_path).arg("-hwaccels").output().await;

    let stdout = match output {
        Ok(out) => String::from_utf8_lossy(&out.stdout).to_lowercase(),
        Err(_) => return HwAccelProbe { available: vec![] },
    };

    let mut available = Vec::new();
    if stdout.contains("cuda") || stdout.contains("nvenc") || stdout.contains("cuvid") {
        available.push(HardwareAccel::Nvenc);
    }
    if stdout.contains("qsv") {
        available.push(HardwareAccel::Qsv);
    }
    if stdout.contains("vaapi") {
        available.push(HardwareAccel::Vaapi);
    }
    if stdout.contains("videotoolbox") {
        available.push(HardwareAccel::Videotoolbox);
    }

    HwAccelProbe { available }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_software_when_unsupported() {
        let probe = HwAccelProbe { available: vec![HardwareAccel::Vaapi] };
        assert_eq!(probe.resolve(HardwareAccel::Nvenc), HardwareAccel::None);
    }

    #[test]
    fn resolve_auto_picks_first_available() {
        let probe = HwAccelProbe { available: vec![HardwareAccel::Qsv] };
        assert_eq!(probe.resolve(HardwareAccel::Auto), HardwareAccel::Qsv);
    }

    #[test]
    fn resolve_auto_with_nothing_available_is_software() {
        let probe = HwAccelProbe { available: vec![] };
        assert_eq!(probe.resolve(HardwareAccel::Auto), HardwareAccel::None);
    }

    #[test]
    fn none_preference_is_never_overridden() {
        let probe = HwAccelProbe { available: vec![HardwareAccel::Nvenc] };
        assert_eq!(probe.resolve(HardwareAccel::None), HardwareAccel::None);
    }

    #[tokio::test]
    async fn missing_binary_reports_nothing_available() {
        let probe = detect_hw_accel(Path::new("/nonexistent/ffmpeg-binary")).await;
        assert!(probe.available.is_empty());
    }
}
