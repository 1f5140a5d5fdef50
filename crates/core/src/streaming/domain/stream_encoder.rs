use std::path::{Path, PathBuf};
use std::process::Child;

/// Where a re-encoding run reads from and writes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeJob {
    pub video: PathBuf,
    pub output_dir: PathBuf,
    pub playlist: PathBuf,
}

/// Launches an external worker that turns a video into a segmented,
/// appendable playlist.
///
/// The returned child should have its stderr piped; the supervisor drains
/// it for diagnostics. Whatever is not piped is ignored.
pub trait StreamEncoder: Send + Sync {
    fn spawn(&self, job: &EncodeJob) -> std::io::Result<Child>;
}

/// A playlist is usable once it exists and has content.
pub fn is_playlist_ready(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
