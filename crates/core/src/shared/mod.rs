pub mod config;
pub mod constants;
pub mod face_box;
pub mod frame;
pub mod model_resolver;
pub mod single_flight;
pub mod timestamp;
pub mod video_metadata;
