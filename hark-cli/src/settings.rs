//! Persistent tool settings (optional JSON file).
//!
//! Flags override file values; the file overrides the built-in defaults. A
//! missing file is normal, a present-but-broken one falls back to defaults
//! with a warning so a typo never bricks the tool.

use std::fs;
use std::path::{Path, PathBuf};

use hark_core::EngineConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct CliSettings {
    /// Serial device path.
    pub port: String,
    /// Serial baud rate.
    pub baud: u32,
    /// Amplitude level above which a frame counts as voiced.
    pub amplitude_threshold: f32,
    /// Quiet frames tolerated inside a word.
    pub max_quiet_frames: usize,
    /// First index of the feature vector within a record's number list.
    pub feature_lo: usize,
    /// One past the last feature index.
    pub feature_hi: usize,
}

impl Default for CliSettings {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            port: "/dev/ttyACM0".into(),
            baud: 1_000_000,
            amplitude_threshold: config.amplitude_threshold,
            max_quiet_frames: config.max_quiet_frames,
            feature_lo: config.feature_lo,
            feature_hi: config.feature_hi,
        }
    }
}

impl CliSettings {
    /// Clamp the taste knobs into sane ranges. The feature range is left
    /// alone; `EngineConfig::validate` rejects a bad one with a message
    /// naming the actual indices.
    pub fn normalize(&mut self) {
        self.amplitude_threshold = self.amplitude_threshold.clamp(0.0, 1.0);
        self.max_quiet_frames = self.max_quiet_frames.clamp(0, 64);
        if self.baud == 0 {
            self.baud = 1_000_000;
        }
        self.port = self.port.trim().to_string();
        if self.port.is_empty() {
            self.port = "/dev/ttyACM0".into();
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            amplitude_threshold: self.amplitude_threshold,
            max_quiet_frames: self.max_quiet_frames,
            feature_lo: self.feature_lo,
            feature_hi: self.feature_hi,
        }
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hark")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("hark")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> CliSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<CliSettings>(&raw).unwrap_or_else(|e| {
            warn!(path = ?path, error = %e, "settings file unreadable, using defaults");
            CliSettings::default()
        }),
        Err(_) => CliSettings::default(),
    };
    settings.normalize();
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_missing_fields_with_defaults() {
        let settings: CliSettings =
            serde_json::from_str(r#"{"port": "/dev/ttyUSB1"}"#).unwrap();
        assert_eq!(settings.port, "/dev/ttyUSB1");
        assert_eq!(settings.baud, 1_000_000);
        assert_eq!(settings.feature_lo, 2);
        assert_eq!(settings.feature_hi, 7);
    }

    #[test]
    fn keys_are_camel_case() {
        let settings: CliSettings =
            serde_json::from_str(r#"{"amplitudeThreshold": 0.02, "maxQuietFrames": 3}"#)
                .unwrap();
        assert!((settings.amplitude_threshold - 0.02).abs() < 1e-6);
        assert_eq!(settings.max_quiet_frames, 3);
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut settings = CliSettings {
            amplitude_threshold: -3.0,
            max_quiet_frames: 10_000,
            baud: 0,
            port: "   ".into(),
            ..CliSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.amplitude_threshold, 0.0);
        assert_eq!(settings.max_quiet_frames, 64);
        assert_eq!(settings.baud, 1_000_000);
        assert_eq!(settings.port, "/dev/ttyACM0");
    }

    #[test]
    fn normalize_leaves_the_feature_range_alone() {
        let mut settings = CliSettings {
            feature_lo: 9,
            feature_hi: 4,
            ..CliSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.feature_lo, 9);
        assert_eq!(settings.feature_hi, 4);
        assert!(settings.engine_config().validate().is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let settings = load_settings(Path::new("/nonexistent/hark/settings.json"));
        assert_eq!(settings, CliSettings::default());
    }

    #[test]
    fn engine_config_carries_the_tuning_fields() {
        let settings: CliSettings = serde_json::from_str(
            r#"{"amplitudeThreshold": 0.05, "maxQuietFrames": 8, "featureLo": 2, "featureHi": 9}"#,
        )
        .unwrap();
        let config = settings.engine_config();
        assert!((config.amplitude_threshold - 0.05).abs() < 1e-6);
        assert_eq!(config.max_quiet_frames, 8);
        assert_eq!(config.feature_dim(), 7);
    }
}
