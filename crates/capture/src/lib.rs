//! Reconnect-capable camera frame source (RTSP IP cameras and local V4L
//! devices through OpenCV videoio).

pub mod camera;
pub mod types;

pub use camera::CameraSource;
pub use types::{CaptureError, Frame};
