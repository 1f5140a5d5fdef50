//! Haar cascade face detector using OpenCV's `CascadeClassifier`.
use std::path::Path;

use opencv::boxed_ref::BoxedRef;
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::preprocess::{downscale, luminance};
use crate::shared::config::DetectorConfig;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// Multi-scale sliding-window cascade parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeParams {
    /// Linear factor applied to the frame before detection.
    pub downscale: f64,
    pub scale_factor: f64,
    pub min_neighbors: i32,
    /// Minimum face side in pixels, at downscaled resolution.
    pub min_size: i32,
}

impl From<&DetectorConfig> for CascadeParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            downscale: config.downscale,
            scale_factor: config.scale_factor,
            min_neighbors: config.min_neighbors,
            min_size: config.min_size,
        }
    }
}

/// Frontal face detector backed by a pre-trained Haar cascade.
///
/// Loading the cascade XML is the expensive part; construct once per
/// process and reuse.
pub struct CascadeFaceDetector {
    classifier: CascadeClassifier,
    params: CascadeParams,
}

impl CascadeFaceDetector {
    pub fn new(model_path: &Path, params: CascadeParams) -> Result<Self, Box<dyn std::error::Error>> {
        let path = model_path
            .to_str()
            .ok_or("Cascade model path is not valid UTF-8")?;
        let classifier = CascadeClassifier::new(path)?;
        if classifier.empty()? {
            return Err(format!("Failed to load cascade from {}", model_path.display()).into());
        }
        Ok(Self { classifier, params })
    }
}

/// Borrows a single-channel frame as a `rows x cols` 8-bit matrix.
fn gray_mat(gray: &Frame) -> Result<BoxedRef<'_, Mat>, Box<dyn std::error::Error>> {
    if gray.channels() != 1 {
        return Err(format!("expected 1-channel frame, got {}", gray.channels()).into());
    }
    Ok(Mat::new_rows_cols_with_data(
        gray.height() as i32,
        gray.width() as i32,
        gray.data(),
    )?)
}

impl FaceDetector for CascadeFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
        let small = downscale(frame, self.params.downscale)?;
        let gray = luminance(&small)?;

        let mat = gray_mat(&gray)?;

        let mut faces: Vector<Rect> = Vector::new();
        self.classifier.detect_multi_scale(
            &*mat,
            &mut faces,
            self.params.scale_factor,
            self.params.min_neighbors,
            0,
            Size::new(self.params.min_size, self.params.min_size),
            Size::default(),
        )?;

        Ok(faces
            .iter()
            .map(|r| {
                FaceBox::from_detection(
                    r.x,
                    r.y,
                    r.width,
                    r.height,
                    self.params.downscale,
                    frame.width(),
                    frame.height(),
                )
            })
            .collect())
    }
}
