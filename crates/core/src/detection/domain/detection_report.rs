use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::shared::face_box::FaceBox;

/// Faces found on one sampled frame. Only emitted when `faces` is non-empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameDetection {
    #[serde(rename = "frame")]
    pub frame_index: usize,
    pub timestamp: String,
    pub faces: Vec<FaceBox>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub total_frames: usize,
    pub fps: f64,
    /// Frames actually iterated, sampled or not.
    pub processed_frames: usize,
    pub step_size: usize,
}

/// Per-frame face inventory of one video, persisted as pretty-printed JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub face_detections: Vec<FrameDetection>,
    pub metadata: ReportMetadata,
}

impl DetectionReport {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Replaces `path` as a whole: the JSON is written to a sibling `.part`
    /// file and renamed over the target, so readers never see a partial
    /// report.
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("part");
        let result = fs::File::create(&temp_path).and_then(|mut file| {
            file.write_all(json.as_bytes())?;
            file.sync_all()
        });
        if let Err(e) = result.and_then(|_| fs::rename(&temp_path, path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn total_faces(&self) -> usize {
        self.face_detections.iter().map(|d| d.faces.len()).sum()
    }
}
