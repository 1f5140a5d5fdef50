//! Face inventory and live HLS streaming for a single recorded video.
//!
//! Two independent activities share an on-disk state area: a
//! [`pipeline::detection_session::DetectionSession`] samples frames and writes
//! a JSON report, and a [`pipeline::stream_supervisor::StreamSupervisor`]
//! drives an external encoder that produces a segmented playlist. The
//! [`query`] module reads both back.

pub mod detection;
pub mod pipeline;
pub mod query;
pub mod shared;
pub mod streaming;
pub mod video;
