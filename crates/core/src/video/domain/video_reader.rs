use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Boxed lazy frame sequence in decode order.
pub type FrameIter<'a> = Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + 'a>;

/// Reads frames from a video source.
///
/// The sequence is finite and cannot be restarted; a second call to
/// `frames` continues where the first stopped. Callers must `close` the
/// reader once done, on success and on error alike.
pub trait VideoReader: Send {
    /// Opens a video file and returns its metadata.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Returns an iterator over frames in decode order.
    fn frames(&mut self) -> FrameIter<'_>;

    /// Releases any resources held by the reader.
    fn close(&mut self);
}
