use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::shared::config::StreamConfig;
use crate::streaming::domain::stream_encoder::{EncodeJob, StreamEncoder};

/// Re-encodes a video into an HLS playlist with the `ffmpeg` CLI.
///
/// Input is read at native frame rate (`-re`), so segments appear as if the
/// video were being broadcast live. Every segment stays listed in the
/// playlist.
#[derive(Clone, Debug)]
pub struct FfmpegHlsEncoder {
    ffmpeg: PathBuf,
    video_codec: String,
    audio_codec: String,
    video_bitrate: String,
    audio_bitrate: String,
    segment_seconds: u32,
    segment_pattern: String,
}

impl FfmpegHlsEncoder {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg.clone(),
            video_codec: config.video_codec.clone(),
            audio_codec: config.audio_codec.clone(),
            video_bitrate: config.video_bitrate.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
            segment_seconds: config.segment_seconds,
            segment_pattern: config.segment_pattern.clone(),
        }
    }

    /// Full argument list, excluding the program name.
    pub fn build_args(&self, job: &EncodeJob) -> Vec<String> {
        let segment_path = job.output_dir.join(&self.segment_pattern);
        vec![
            "-re".to_string(),
            "-i".to_string(),
            job.video.to_string_lossy().to_string(),
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:v".to_string(),
            self.video_bitrate.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.segment_seconds.to_string(),
            "-hls_list_size".to_string(),
            "0".to_string(),
            "-hls_segment_filename".to_string(),
            segment_path.to_string_lossy().to_string(),
            "-hls_flags".to_string(),
            "delete_segments+append_list".to_string(),
            "-hls_segment_type".to_string(),
            "mpegts".to_string(),
            job.playlist.to_string_lossy().to_string(),
        ]
    }
}

impl StreamEncoder for FfmpegHlsEncoder {
    fn spawn(&self, job: &EncodeJob) -> std::io::Result<Child> {
        let args = self.build_args(job);
        log::debug!("Starting {}: {}", self.ffmpeg.display(), args.join(" "));
        Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn job() -> EncodeJob {
        EncodeJob {
            video: PathBuf::from("uploads/sample.mp4"),
            output_dir: PathBuf::from("streams/sample"),
            playlist: PathBuf::from("streams/sample/playlist.m3u8"),
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_default_args() {
        let args = FfmpegHlsEncoder::new(&StreamConfig::default()).build_args(&job());

        assert_eq!(args[0], "-re");
        assert_eq!(value_after(&args, "-i"), Some("uploads/sample.mp4"));
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-c:a"), Some("aac"));
        assert_eq!(value_after(&args, "-b:v"), Some("1.5M"));
        assert_eq!(value_after(&args, "-b:a"), Some("128k"));
        assert_eq!(value_after(&args, "-f"), Some("hls"));
        assert_eq!(value_after(&args, "-hls_time"), Some("6"));
        assert_eq!(value_after(&args, "-hls_list_size"), Some("0"));
        assert_eq!(value_after(&args, "-hls_segment_type"), Some("mpegts"));
        assert_eq!(args.last().map(String::as_str), Some("streams/sample/playlist.m3u8"));
    }

    #[test]
    fn test_segment_pattern_lives_in_output_dir() {
        let args = FfmpegHlsEncoder::new(&StreamConfig::default()).build_args(&job());
        let pattern = value_after(&args, "-hls_segment_filename").unwrap();
        assert_eq!(Path::new(pattern), Path::new("streams/sample/segment_%03d.ts"));
    }

    #[test]
    fn test_configured_parameters_are_used() {
        let config = StreamConfig {
            segment_seconds: 2,
            video_bitrate: "800k".into(),
            ..StreamConfig::default()
        };
        let args = FfmpegHlsEncoder::new(&config).build_args(&job());
        assert_eq!(value_after(&args, "-hls_time"), Some("2"));
        assert_eq!(value_after(&args, "-b:v"), Some("800k"));
    }

    #[test]
    fn test_missing_binary_fails_to_spawn() {
        let config = StreamConfig {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ..StreamConfig::default()
        };
        assert!(FfmpegHlsEncoder::new(&config).spawn(&job()).is_err());
    }
}
