pub const CASCADE_MODEL_NAME: &str = "haarcascade_frontalface_default.xml";
pub const CASCADE_MODEL_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml";

/// Process 1 of every N decoded frames.
pub const DEFAULT_STRIDE: usize = 15;

/// Log progress once per this many sampled frames.
pub const DEFAULT_PROGRESS_EVERY: usize = 10;

pub const DEFAULT_DOWNSCALE: f64 = 0.5;
pub const DEFAULT_SCALE_FACTOR: f64 = 1.2;
pub const DEFAULT_MIN_NEIGHBORS: i32 = 4;
pub const DEFAULT_MIN_SIZE: i32 = 20;

pub const DEFAULT_SEGMENT_SECONDS: u32 = 6;
pub const DEFAULT_VIDEO_BITRATE: &str = "1.5M";
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
pub const PLAYLIST_NAME: &str = "playlist.m3u8";
pub const SEGMENT_PATTERN: &str = "segment_%03d.ts";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_POLL_ATTEMPTS: u32 = 60;
