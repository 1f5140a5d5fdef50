use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// All tunable parameters of the face inventory and streaming pipelines.
///
/// Every section falls back to its defaults, so a config file only needs
/// to mention what it overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacestreamConfig {
    pub paths: PathsConfig,
    pub sampling: SamplingConfig,
    pub detector: DetectorConfig,
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub video: PathBuf,
    pub report: PathBuf,
    pub stream_dir: PathBuf,
    /// URL path under which `stream_dir` is published.
    pub stream_url_prefix: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            video: PathBuf::from("uploads").join("office.mp4"),
            report: PathBuf::from("data").join("face_data.json"),
            stream_dir: PathBuf::from("streams").join("sample"),
            stream_url_prefix: "/streams/sample".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub stride: usize,
    /// Progress is logged once per this many sampled frames.
    pub progress_every: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            stride: DEFAULT_STRIDE,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl SamplingConfig {
    /// Frame-index interval between progress lines.
    pub fn progress_interval(&self) -> usize {
        self.stride.saturating_mul(self.progress_every).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub downscale: f64,
    pub scale_factor: f64,
    pub min_neighbors: i32,
    pub min_size: i32,
    pub model_name: String,
    pub model_url: String,
    pub model_path: Option<PathBuf>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            downscale: DEFAULT_DOWNSCALE,
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: DEFAULT_MIN_SIZE,
            model_name: CASCADE_MODEL_NAME.to_string(),
            model_url: CASCADE_MODEL_URL.to_string(),
            model_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub ffmpeg: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    pub segment_seconds: u32,
    pub playlist_name: String,
    pub segment_pattern: String,
    pub poll_interval_ms: u64,
    pub poll_attempts: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            video_bitrate: DEFAULT_VIDEO_BITRATE.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            segment_seconds: DEFAULT_SEGMENT_SECONDS,
            playlist_name: PLAYLIST_NAME.to_string(),
            segment_pattern: SEGMENT_PATTERN.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

impl StreamConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl FacestreamConfig {
    /// Loads a JSON config file. Absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.stride == 0 {
            return Err(ConfigError::Invalid("sampling.stride must be >= 1".into()));
        }
        if !(self.detector.downscale > 0.0 && self.detector.downscale <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "detector.downscale must be in (0, 1], got {}",
                self.detector.downscale
            )));
        }
        if self.detector.scale_factor <= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "detector.scale_factor must be > 1.0, got {}",
                self.detector.scale_factor
            )));
        }
        if self.stream.poll_attempts == 0 {
            return Err(ConfigError::Invalid(
                "stream.poll_attempts must be >= 1".into(),
            ));
        }
        Ok(())
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.paths.stream_dir.join(&self.stream.playlist_name)
    }

    pub fn playlist_url(&self) -> String {
        format!(
            "{}/{}",
            self.paths.stream_url_prefix.trim_end_matches('/'),
            self.stream.playlist_name
        )
    }
}
