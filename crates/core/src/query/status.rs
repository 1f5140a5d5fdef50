use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::detection::domain::detection_report::DetectionReport;
use crate::shared::config::FacestreamConfig;
use crate::streaming::domain::stream_encoder::is_playlist_ready;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("not found: {0}")]
    NotFound(PathBuf),
    #[error("report {path} is not a valid detection report: {source}")]
    InvalidReport {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Readiness {
    Ready { url: String },
    NotReady,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", content = "report", rename_all = "snake_case")]
pub enum ReportStatus {
    Ready(DetectionReport),
    /// No report yet, but a session is producing one.
    Processing,
    NotReady,
}

/// Everything a client polls for, in one serializable value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub video_available: bool,
    pub playlist: Readiness,
    pub report: ReportStatus,
}

impl StatusSnapshot {
    /// `session_running` can only be true when the caller owns the session;
    /// a separate process has no view of another's in-flight run.
    pub fn collect(config: &FacestreamConfig, session_running: bool) -> Result<Self, QueryError> {
        Ok(Self {
            video_available: video_available(&config.paths.video),
            playlist: playlist_status(&config.playlist_path(), &config.playlist_url()),
            report: report_status(&config.paths.report, session_running)?,
        })
    }
}

pub fn video_available(video: &Path) -> bool {
    video.is_file()
}

pub fn playlist_status(playlist: &Path, url: &str) -> Readiness {
    if is_playlist_ready(playlist) {
        Readiness::Ready {
            url: url.to_string(),
        }
    } else {
        Readiness::NotReady
    }
}

/// Reads the stored report. A stored report always wins over an in-flight
/// session since reports are only ever replaced whole.
pub fn report_status(report: &Path, session_running: bool) -> Result<ReportStatus, QueryError> {
    let json = match fs::read_to_string(report) {
        Ok(json) => json,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(if session_running {
                ReportStatus::Processing
            } else {
                ReportStatus::NotReady
            });
        }
        Err(source) => {
            return Err(QueryError::Io {
                path: report.to_path_buf(),
                source,
            })
        }
    };

    DetectionReport::from_json(&json)
        .map(ReportStatus::Ready)
        .map_err(|source| QueryError::InvalidReport {
            path: report.to_path_buf(),
            source,
        })
}

/// Maps an artifact name to a file inside `dir`.
///
/// Only plain file names are served; anything that could escape `dir`
/// is treated as missing.
pub fn resolve_artifact(dir: &Path, name: &str) -> Result<PathBuf, QueryError> {
    let requested = Path::new(name);
    let mut components = requested.components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    let path = dir.join(requested);
    if !plain || !path.is_file() {
        return Err(QueryError::NotFound(path));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection_report::{FrameDetection, ReportMetadata};
    use crate::shared::face_box::FaceBox;
    use rstest::rstest;
    use tempfile::TempDir;

    fn report() -> DetectionReport {
        DetectionReport {
            face_detections: vec![FrameDetection {
                frame_index: 15,
                timestamp: "0:00:00.500000".into(),
                faces: vec![FaceBox {
                    x: 10,
                    y: 20,
                    width: 30,
                    height: 30,
                }],
            }],
            metadata: ReportMetadata {
                total_frames: 300,
                fps: 30.0,
                processed_frames: 20,
                step_size: 15,
            },
        }
    }

    #[test]
    fn test_video_available() {
        let tmp = TempDir::new().unwrap();
        let video = tmp.path().join("office.mp4");
        assert!(!video_available(&video));
        fs::write(&video, b"data").unwrap();
        assert!(video_available(&video));
        assert!(!video_available(tmp.path()));
    }

    #[test]
    fn test_playlist_status() {
        let tmp = TempDir::new().unwrap();
        let playlist = tmp.path().join("playlist.m3u8");
        let url = "/streams/sample/playlist.m3u8";

        assert_eq!(playlist_status(&playlist, url), Readiness::NotReady);
        fs::write(&playlist, b"").unwrap();
        assert_eq!(playlist_status(&playlist, url), Readiness::NotReady);
        fs::write(&playlist, b"#EXTM3U\n").unwrap();
        assert_eq!(
            playlist_status(&playlist, url),
            Readiness::Ready { url: url.into() }
        );
    }

    #[rstest]
    #[case(false, ReportStatus::NotReady)]
    #[case(true, ReportStatus::Processing)]
    fn test_missing_report(#[case] running: bool, #[case] expected: ReportStatus) {
        let tmp = TempDir::new().unwrap();
        let status = report_status(&tmp.path().join("face_data.json"), running).unwrap();
        assert_eq!(status, expected);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_stored_report_is_served(#[case] running: bool) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("face_data.json");
        report().save(&path).unwrap();

        let status = report_status(&path, running).unwrap();
        assert_eq!(status, ReportStatus::Ready(report()));
    }

    #[test]
    fn test_invalid_report_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("face_data.json");
        fs::write(&path, b"{\"face_detections\": 3}").unwrap();

        assert!(matches!(
            report_status(&path, false),
            Err(QueryError::InvalidReport { .. })
        ));
    }

    #[test]
    fn test_report_status_serializes_tagged() {
        let json = serde_json::to_value(ReportStatus::Processing).unwrap();
        assert_eq!(json, serde_json::json!({"status": "processing"}));

        let json = serde_json::to_value(Readiness::Ready { url: "/p.m3u8".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "ready", "url": "/p.m3u8"}));
    }

    fn config_in(dir: &Path) -> FacestreamConfig {
        let mut config = FacestreamConfig::default();
        config.paths.video = dir.join("office.mp4");
        config.paths.report = dir.join("face_data.json");
        config.paths.stream_dir = dir.join("streams");
        config
    }

    #[test]
    fn test_snapshot_sees_in_flight_session() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(tmp.path());
        fs::write(&config.paths.video, b"video").unwrap();

        let snapshot = StatusSnapshot::collect(&config, true).unwrap();

        assert!(snapshot.video_available);
        assert_eq!(snapshot.playlist, Readiness::NotReady);
        assert_eq!(snapshot.report, ReportStatus::Processing);
    }

    #[test]
    fn test_snapshot_after_stream_and_session() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(tmp.path());
        fs::create_dir_all(&config.paths.stream_dir).unwrap();
        fs::write(config.playlist_path(), b"#EXTM3U\n").unwrap();
        report().save(&config.paths.report).unwrap();

        let snapshot = StatusSnapshot::collect(&config, false).unwrap();
        let json = serde_json::to_value(&snapshot).unwrap();

        assert!(!snapshot.video_available);
        assert_eq!(json["playlist"]["status"], "ready");
        assert_eq!(json["playlist"]["url"], "/streams/sample/playlist.m3u8");
        assert_eq!(json["report"]["status"], "ready");
        assert_eq!(json["report"]["report"]["metadata"]["step_size"], 15);
    }

    #[test]
    fn test_resolve_existing_artifact() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("segment_000.ts"), b"ts").unwrap();

        let path = resolve_artifact(tmp.path(), "segment_000.ts").unwrap();
        assert_eq!(path, tmp.path().join("segment_000.ts"));
    }

    #[rstest]
    #[case("segment_999.ts")]
    #[case("../secret.txt")]
    #[case("nested/segment_000.ts")]
    #[case("/etc/passwd")]
    #[case("")]
    #[case(".")]
    fn test_unservable_artifacts_are_not_found(#[case] name: &str) {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("streams");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested").join("segment_000.ts"), b"ts").unwrap();
        fs::write(tmp.path().join("secret.txt"), b"secret").unwrap();

        assert!(matches!(
            resolve_artifact(&dir, name),
            Err(QueryError::NotFound(_))
        ));
    }
}
