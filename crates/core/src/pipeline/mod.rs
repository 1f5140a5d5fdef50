pub mod detection_session;
pub mod pipeline_logger;
pub mod staleness;
pub mod stream_supervisor;
