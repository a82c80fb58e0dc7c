use crate::types::{CaptureError, Frame};
use opencv::{
    core::MatTraitConstManual,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use std::time::Duration;

/// Parse a `/dev/videoX` style URI or bare integer and return the
/// zero-based device index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video")
        && stripped.chars().all(|c| c.is_ascii_digit())
        && let Ok(index) = stripped.parse::<i32>()
    {
        return Some(index);
    }
    None
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened()? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    tracing::debug!(
                        "Failed to open device #{} with backend {}: {}",
                        index,
                        backend,
                        err
                    );
                }
            }
        }
    }

    for backend in [videoio::CAP_FFMPEG, videoio::CAP_ANY] {
        match VideoCapture::from_file(uri, backend) {
            Ok(cap) => {
                if cap.is_opened()? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                tracing::debug!("Failed to open {} with backend {}: {}", uri, backend, err);
            }
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

/// A frame producer over one video source, local or RTSP.
///
/// `read` never blocks beyond one grab; on failure the caller releases and
/// reopens via [`CameraSource::reopen`] - the only retry loop in the core.
pub struct CameraSource {
    uri: String,
    cap: VideoCapture,
    bgr: Mat,
    rgb: Mat,
}

impl CameraSource {
    pub fn open(uri: &str) -> Result<Self, CaptureError> {
        let cap = open_video_capture(uri)?;
        tracing::info!("Video source open: {}", uri);
        Ok(Self {
            uri: uri.to_string(),
            cap,
            bgr: Mat::default(),
            rgb: Mat::default(),
        })
    }

    /// Grab the next frame and convert it to tightly packed RGB.
    pub fn read(&mut self) -> Result<Frame, CaptureError> {
        let grabbed = self.cap.read(&mut self.bgr)?;
        if !grabbed || self.bgr.size()?.width <= 0 {
            return Err(CaptureError::Read);
        }

        imgproc::cvt_color_def(&self.bgr, &mut self.rgb, imgproc::COLOR_BGR2RGB)?;

        let size = self.rgb.size()?;
        Ok(Frame {
            data: self.rgb.data_bytes()?.to_vec(),
            width: size.width as u32,
            height: size.height as u32,
        })
    }

    /// Release the capture handle and make one reopen attempt after a
    /// bounded backoff.
    ///
    /// Callers loop on this so that serial polling and keepalive keep
    /// running between attempts; a camera outage freezes classification
    /// only.
    pub fn reopen(&mut self, backoff: Duration) -> Result<(), CaptureError> {
        let _ = self.cap.release();
        std::thread::sleep(backoff);

        match open_video_capture(&self.uri) {
            Ok(cap) => {
                self.cap = cap;
                tracing::info!("Video source reopened: {}", self.uri);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Release the underlying capture handle.
    pub fn release(&mut self) {
        if let Err(e) = self.cap.release() {
            tracing::warn!("Failed to release video capture: {}", e);
        }
    }
}
