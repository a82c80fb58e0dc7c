use thiserror::Error;

/// Raw RGB frame captured from the video source.
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },

    #[error("frame read failed or returned an empty frame")]
    Read,

    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}
