use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use thiserror::Error;

use crate::detection::domain::detection_report::{
    DetectionReport, FrameDetection, ReportMetadata,
};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::sampling_policy::SamplingPolicy;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::single_flight::SingleFlight;
use crate::shared::timestamp::format_timestamp;
use crate::video::domain::video_reader::VideoReader;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a detection session is already running")]
    AlreadyRunning,
    #[error("video not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to open video {path}: {message}")]
    Open { path: PathBuf, message: String },
    #[error("detection failed at frame {frame_index}: {message}")]
    Decode { frame_index: usize, message: String },
    #[error("failed to write report {path}: {message}")]
    Persist { path: PathBuf, message: String },
}

/// Creates a fresh reader for each session.
pub type ReaderFactory = Box<dyn Fn() -> Box<dyn VideoReader> + Send + Sync>;

/// Single-flight face inventory of one video.
///
/// Streams frames from a reader, runs the detector on every frame the
/// sampling policy selects, and writes a [`DetectionReport`] only once
/// the whole video has been iterated. At most one run is in flight per
/// session; overlapping calls are rejected with
/// [`SessionError::AlreadyRunning`] and have no side effects.
pub struct DetectionSession {
    reader_factory: ReaderFactory,
    detector: Mutex<Box<dyn FaceDetector>>,
    policy: SamplingPolicy,
    running: SingleFlight,
}

impl DetectionSession {
    pub fn new(
        reader_factory: ReaderFactory,
        detector: Box<dyn FaceDetector>,
        policy: SamplingPolicy,
    ) -> Self {
        Self {
            reader_factory,
            detector: Mutex::new(detector),
            policy,
            running: SingleFlight::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_active()
    }

    pub fn policy(&self) -> SamplingPolicy {
        self.policy
    }

    /// Runs a full session and atomically replaces `report_path`.
    ///
    /// Any failure discards the partial inventory; a previous report at
    /// `report_path` is left untouched.
    pub fn run(
        &self,
        video_path: &Path,
        report_path: &Path,
        logger: &mut dyn PipelineLogger,
    ) -> Result<DetectionReport, SessionError> {
        let _guard = self
            .running
            .try_acquire()
            .ok_or(SessionError::AlreadyRunning)?;

        if !video_path.exists() {
            return Err(SessionError::NotFound(video_path.to_path_buf()));
        }
        log::info!("Starting face detection for video: {}", video_path.display());

        let mut reader = (self.reader_factory)();
        let result = self.scan(reader.as_mut(), video_path, logger);
        reader.close();
        let report = result?;

        report
            .save(report_path)
            .map_err(|e| SessionError::Persist {
                path: report_path.to_path_buf(),
                message: e.to_string(),
            })?;

        logger.summary();
        log::info!(
            "Face detection completed: {} faces on {} frames. Data saved to {}",
            report.total_faces(),
            report.face_detections.len(),
            report_path.display()
        );
        Ok(report)
    }

    /// [`run`](Self::run) with every failure logged and folded into `false`.
    pub fn process(
        &self,
        video_path: &Path,
        report_path: &Path,
        logger: &mut dyn PipelineLogger,
    ) -> bool {
        match self.run(video_path, report_path, logger) {
            Ok(_) => true,
            Err(SessionError::AlreadyRunning) => {
                log::warn!("Already processing a video");
                false
            }
            Err(e) => {
                log::error!("Error processing video: {e}");
                false
            }
        }
    }

    fn scan(
        &self,
        reader: &mut dyn VideoReader,
        video_path: &Path,
        logger: &mut dyn PipelineLogger,
    ) -> Result<DetectionReport, SessionError> {
        let metadata = reader.open(video_path).map_err(|e| SessionError::Open {
            path: video_path.to_path_buf(),
            message: e.to_string(),
        })?;
        log::info!(
            "Video loaded: {} frames at {} FPS ({:.1}s)",
            metadata.total_frames,
            metadata.fps,
            metadata.duration_secs()
        );

        // The detector holds no per-run state, so a panic in an earlier
        // run leaves it usable.
        let mut detector = self.detector.lock().unwrap_or_else(PoisonError::into_inner);
        let mut detections = Vec::new();
        let mut processed = 0;

        for frame in reader.frames() {
            let index = processed;
            let frame = frame.map_err(|e| SessionError::Decode {
                frame_index: index,
                message: e.to_string(),
            })?;
            processed += 1;

            if !self.policy.is_selected(index) {
                continue;
            }
            logger.progress(index, metadata.total_frames);

            let started = Instant::now();
            let faces = detector.detect(&frame).map_err(|e| SessionError::Decode {
                frame_index: index,
                message: e.to_string(),
            })?;
            logger.timing("detect", started.elapsed().as_secs_f64() * 1000.0);
            logger.metric("faces", faces.len() as f64);

            if !faces.is_empty() {
                detections.push(FrameDetection {
                    frame_index: index,
                    timestamp: format_timestamp(index, metadata.fps),
                    faces,
                });
            }
        }

        let total_frames = if metadata.total_frames > 0 {
            metadata.total_frames
        } else {
            processed
        };

        Ok(DetectionReport {
            face_detections: detections,
            metadata: ReportMetadata {
                total_frames,
                fps: metadata.fps,
                processed_frames: processed,
                step_size: self.policy.stride(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::shared::face_box::FaceBox;
    use crate::shared::frame::Frame;
    use crate::shared::video_metadata::VideoMetadata;
    use crate::video::domain::video_reader::FrameIter;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    const WIDTH: u32 = 64;
    const HEIGHT: u32 = 48;

    // --- Stubs ---

    /// Frames whose first byte is 255 "contain" a face.
    struct StubReader {
        total: usize,
        fps: f64,
        face_frames: std::ops::Range<usize>,
        fail_open: bool,
        fail_at: Option<usize>,
    }

    impl StubReader {
        fn new(total: usize, face_frames: std::ops::Range<usize>) -> Self {
            Self {
                total,
                fps: 30.0,
                face_frames,
                fail_open: false,
                fail_at: None,
            }
        }
    }

    impl VideoReader for StubReader {
        fn open(&mut self, _path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            if self.fail_open {
                return Err("moov atom not found".into());
            }
            Ok(VideoMetadata {
                width: WIDTH,
                height: HEIGHT,
                fps: self.fps,
                total_frames: self.total,
                codec: "h264".to_string(),
                source_path: None,
            })
        }

        fn frames(&mut self) -> FrameIter<'_> {
            let face_frames = self.face_frames.clone();
            let fail_at = self.fail_at;
            Box::new((0..self.total).map(move |i| -> Result<Frame, Box<dyn std::error::Error>> {
                if Some(i) == fail_at {
                    return Err("corrupt packet".into());
                }
                let mut data = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
                if face_frames.contains(&i) {
                    data[0] = 255;
                }
                Ok(Frame::new(data, WIDTH, HEIGHT, 3, i))
            }))
        }

        fn close(&mut self) {}
    }

    struct MarkerDetector {
        calls: Arc<AtomicUsize>,
    }

    impl FaceDetector for MarkerDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if frame.data()[0] == 255 {
                Ok(vec![FaceBox::from_detection(
                    10, 8, 12, 12, 0.5, WIDTH, HEIGHT,
                )])
            } else {
                Ok(vec![])
            }
        }
    }

    struct FailingDetector {
        fail_on: usize,
    }

    impl FaceDetector for FailingDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
            if frame.index() == self.fail_on {
                return Err("classifier exploded".into());
            }
            Ok(vec![])
        }
    }

    /// Blocks inside its first `detect` call until released.
    struct BlockingDetector {
        entered: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
        blocked_once: bool,
    }

    impl FaceDetector for BlockingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
            if !self.blocked_once {
                self.blocked_once = true;
                self.entered.send(())?;
                self.release.recv()?;
            }
            Ok(vec![])
        }
    }

    // --- Helpers ---

    fn session_with(
        make_reader: impl Fn() -> StubReader + Send + Sync + 'static,
        detector: Box<dyn FaceDetector>,
        stride: usize,
    ) -> DetectionSession {
        DetectionSession::new(
            Box::new(move || Box::new(make_reader()) as Box<dyn VideoReader>),
            detector,
            SamplingPolicy::new(stride).unwrap(),
        )
    }

    fn marker_session(
        total: usize,
        faces: std::ops::Range<usize>,
    ) -> (DetectionSession, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let session = session_with(
            move || StubReader::new(total, faces.clone()),
            Box::new(MarkerDetector {
                calls: calls.clone(),
            }),
            15,
        );
        (session, calls)
    }

    fn video_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("office.mp4");
        fs::write(&path, b"not decoded by the stub").unwrap();
        path
    }

    // --- Tests ---

    #[test]
    fn test_face_visible_in_first_45_frames() {
        let tmp = TempDir::new().unwrap();
        let video = video_file(&tmp);
        let report_path = tmp.path().join("data").join("face_data.json");
        let (session, calls) = marker_session(300, 0..45);

        let report = session
            .run(&video, &report_path, &mut NullPipelineLogger)
            .unwrap();

        let indices: Vec<usize> = report.face_detections.iter().map(|d| d.frame_index).collect();
        assert_eq!(indices, vec![0, 15, 30]);
        assert!(report.face_detections.iter().all(|d| !d.faces.is_empty()));
        assert_eq!(report.face_detections[1].timestamp, "0:00:00.500000");
        assert_eq!(calls.load(Ordering::SeqCst), 20);
        let stored = fs::read_to_string(&report_path).unwrap();
        assert_eq!(DetectionReport::from_json(&stored).unwrap(), report);
    }

    #[test]
    fn test_metadata_counts_every_iterated_frame() {
        let tmp = TempDir::new().unwrap();
        let video = video_file(&tmp);
        let (session, _) = marker_session(300, 0..0);

        let report = session
            .run(&video, &tmp.path().join("face_data.json"), &mut NullPipelineLogger)
            .unwrap();

        assert!(report.face_detections.is_empty());
        assert_eq!(report.metadata.total_frames, 300);
        assert_eq!(report.metadata.processed_frames, 300);
        assert_eq!(report.metadata.step_size, 15);
        assert_eq!(report.metadata.fps, 30.0);
    }

    #[test]
    fn test_boxes_lie_within_frame() {
        let tmp = TempDir::new().unwrap();
        let video = video_file(&tmp);
        let (session, _) = marker_session(90, 0..90);

        let report = session
            .run(&video, &tmp.path().join("face_data.json"), &mut NullPipelineLogger)
            .unwrap();

        for detection in &report.face_detections {
            for face in &detection.faces {
                assert!(face.fits_within(WIDTH, HEIGHT), "{face:?}");
            }
        }
    }

    #[test]
    fn test_missing_video_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let (session, calls) = marker_session(30, 0..30);
        let report_path = tmp.path().join("face_data.json");

        let err = session
            .run(&tmp.path().join("absent.mp4"), &report_path, &mut NullPipelineLogger)
            .unwrap_err();

        assert!(matches!(err, SessionError::NotFound(_)));
        assert!(!session.is_running());
        assert!(!report_path.exists());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_open_failure_leaves_session_idle() {
        let tmp = TempDir::new().unwrap();
        let video = video_file(&tmp);
        let session = session_with(
            || StubReader {
                fail_open: true,
                ..StubReader::new(30, 0..0)
            },
            Box::new(FailingDetector { fail_on: usize::MAX }),
            15,
        );

        let err = session
            .run(&video, &tmp.path().join("face_data.json"), &mut NullPipelineLogger)
            .unwrap_err();

        assert!(matches!(err, SessionError::Open { .. }));
        assert!(!session.is_running());
    }

    #[test]
    fn test_detector_failure_keeps_previous_report() {
        let tmp = TempDir::new().unwrap();
        let video = video_file(&tmp);
        let report_path = tmp.path().join("face_data.json");
        fs::write(&report_path, "previous").unwrap();
        let session = session_with(
            || StubReader::new(60, 0..0),
            Box::new(FailingDetector { fail_on: 30 }),
            15,
        );

        let err = session
            .run(&video, &report_path, &mut NullPipelineLogger)
            .unwrap_err();

        assert!(matches!(err, SessionError::Decode { frame_index: 30, .. }));
        assert_eq!(fs::read_to_string(&report_path).unwrap(), "previous");
        assert!(!session.is_running());
    }

    #[test]
    fn test_decode_failure_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let video = video_file(&tmp);
        let report_path = tmp.path().join("face_data.json");
        let session = session_with(
            || StubReader {
                fail_at: Some(7),
                ..StubReader::new(60, 0..60)
            },
            Box::new(FailingDetector { fail_on: usize::MAX }),
            15,
        );

        let err = session
            .run(&video, &report_path, &mut NullPipelineLogger)
            .unwrap_err();

        assert!(matches!(err, SessionError::Decode { frame_index: 7, .. }));
        assert!(!report_path.exists());
    }

    #[test]
    fn test_process_folds_errors_into_false() {
        let tmp = TempDir::new().unwrap();
        let (session, _) = marker_session(30, 0..30);
        let report_path = tmp.path().join("face_data.json");

        assert!(!session.process(&tmp.path().join("absent.mp4"), &report_path, &mut NullPipelineLogger));
        assert!(session.process(&video_file(&tmp), &report_path, &mut NullPipelineLogger));
    }

    #[test]
    fn test_session_can_run_again_after_completion() {
        let tmp = TempDir::new().unwrap();
        let video = video_file(&tmp);
        let report_path = tmp.path().join("face_data.json");
        let (session, calls) = marker_session(30, 0..30);

        session.run(&video, &report_path, &mut NullPipelineLogger).unwrap();
        session.run(&video, &report_path, &mut NullPipelineLogger).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_overlapping_runs_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let video = video_file(&tmp);
        let report_path = tmp.path().join("face_data.json");
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let session = Arc::new(session_with(
            || StubReader::new(30, 0..0),
            Box::new(BlockingDetector {
                entered: entered_tx,
                release: release_rx,
                blocked_once: false,
            }),
            15,
        ));

        let first = {
            let session = session.clone();
            let video = video.clone();
            let report_path = report_path.clone();
            thread::spawn(move || session.run(&video, &report_path, &mut NullPipelineLogger))
        };
        entered_rx.recv().unwrap();
        assert!(session.is_running());

        let contenders: Vec<_> = (0..4)
            .map(|_| {
                let session = session.clone();
                let video = video.clone();
                let report_path = report_path.clone();
                thread::spawn(move || session.run(&video, &report_path, &mut NullPipelineLogger))
            })
            .collect();
        for contender in contenders {
            let result = contender.join().unwrap();
            assert!(matches!(result, Err(SessionError::AlreadyRunning)));
        }
        assert!(!report_path.exists());

        release_tx.send(()).unwrap();
        let report = first.join().unwrap().unwrap();
        assert_eq!(report.metadata.processed_frames, 30);
        assert!(report_path.exists());
        assert!(!session.is_running());
    }

    #[test]
    fn test_unknown_frame_count_falls_back_to_processed() {
        let tmp = TempDir::new().unwrap();
        let video = video_file(&tmp);
        struct UncountedReader(StubReader);
        impl VideoReader for UncountedReader {
            fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
                let mut meta = self.0.open(path)?;
                meta.total_frames = 0;
                Ok(meta)
            }
            fn frames(&mut self) -> FrameIter<'_> {
                self.0.frames()
            }
            fn close(&mut self) {}
        }
        let session = DetectionSession::new(
            Box::new(|| {
                Box::new(UncountedReader(StubReader::new(20, 0..0))) as Box<dyn VideoReader>
            }),
            Box::new(FailingDetector { fail_on: usize::MAX }),
            SamplingPolicy::default(),
        );

        let report = session
            .run(&video, &tmp.path().join("face_data.json"), &mut NullPipelineLogger)
            .unwrap();

        assert_eq!(report.metadata.total_frames, 20);
        assert_eq!(report.metadata.processed_frames, 20);
    }

    #[test]
    fn test_real_video_reader_iterates_all_frames() {
        use crate::video::infrastructure::ffmpeg_reader::tests::create_test_video;
        use crate::video::infrastructure::ffmpeg_reader::FfmpegReader;

        let tmp = TempDir::new().unwrap();
        let video = tmp.path().join("office.mp4");
        create_test_video(&video, 45, 160, 120, 30);
        let calls = Arc::new(AtomicUsize::new(0));
        let session = DetectionSession::new(
            Box::new(|| Box::new(FfmpegReader::new()) as Box<dyn VideoReader>),
            Box::new(MarkerDetector {
                calls: calls.clone(),
            }),
            SamplingPolicy::default(),
        );

        let report = session
            .run(&video, &tmp.path().join("face_data.json"), &mut NullPipelineLogger)
            .unwrap();

        assert_eq!(report.metadata.processed_frames, 45);
        assert_eq!(report.metadata.total_frames, 45);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
