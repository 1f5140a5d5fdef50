pub mod detection_report;
pub mod face_detector;
pub mod sampling_policy;
