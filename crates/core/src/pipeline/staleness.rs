use std::fs;
use std::path::Path;

/// Decides whether the face report must be regenerated.
///
/// - no report → `true`
/// - report present, video missing → `false` (nothing to process)
/// - otherwise → `true` iff the video was modified after the report
///
/// Only modification times are compared. Content changes that keep the
/// mtime, or changes to detector parameters, do not invalidate a report.
/// When either mtime cannot be read the report is treated as stale.
pub fn needs_processing(video_path: &Path, report_path: &Path) -> bool {
    if !report_path.exists() {
        return true;
    }
    if !video_path.exists() {
        return false;
    }

    let modified = |path: &Path| fs::metadata(path).and_then(|m| m.modified());
    match (modified(video_path), modified(report_path)) {
        (Ok(video_mtime), Ok(report_mtime)) => video_mtime > report_mtime,
        (Err(e), _) | (_, Err(e)) => {
            log::warn!("Could not compare modification times, reprocessing: {e}");
            true
        }
    }
}
