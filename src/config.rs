use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PasslineError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub runner: RunnerConfig,
    pub loudness: LoudnessConfig,
    pub download: DownloadConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Path to the ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to the ffprobe binary, used to look up media durations
    pub ffprobe_path: String,
    /// Path to the yt-dlp binary
    pub ytdlp_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Seconds a stopped process may take to exit before it is killed
    pub graceful_stop_timeout_secs: u64,
}

/// EBU R128 targets for loudness normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessConfig {
    /// Integrated loudness target (LUFS)
    pub integrated: f64,
    /// Maximum true peak (dBTP)
    pub true_peak: f64,
    /// Loudness range target (LU)
    pub lra: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// yt-dlp output template, relative to the output directory
    pub output_template: String,
    /// yt-dlp format selector
    pub format: Option<String>,
    /// Additional yt-dlp arguments
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory for per-batch audit logs and the diagnostic log
    pub directory: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            graceful_stop_timeout_secs: 10,
        }
    }
}

impl RunnerConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.graceful_stop_timeout_secs)
    }
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self {
            integrated: -24.0,
            true_peak: -2.0,
            lra: 7.0,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_template: "%(title)s.%(ext)s".to_string(),
            format: None,
            extra_args: vec![
                // Example:
                // "--embed-metadata".to_string(),
            ],
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(".passline").join("log"),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PasslineError::Config(format!("Failed to read config file: {}", e)))?;

        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PasslineError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| PasslineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passline.toml");

        let mut config = Config::default();
        config.tools.ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg".to_string();
        config.download.format = Some("bestaudio".to_string());
        config.save_to_file(&path).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [loudness]
            integrated = -16.0
            "#,
        )
        .unwrap();

        assert_eq!(config.loudness.integrated, -16.0);
        assert_eq!(config.loudness.true_peak, -2.0);
        assert_eq!(config.tools.ffmpeg_path, "ffmpeg");
        assert_eq!(config.runner.grace(), Duration::from_secs(10));
    }

    #[test]
    fn test_bad_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[runner\ngraceful").unwrap();
        assert!(Config::from_file(&path).is_err());
        assert!(Config::from_file(dir.path().join("absent.toml")).is_err());
    }
}
