use ndarray::{Array, ArrayD, IxDyn};

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Opaque scoring call: preprocessed frame tensor in, raw score tensor out.
///
/// A load failure is a fatal startup-time condition; a scoring call on a
/// loaded model is expected to succeed every frame.
pub trait ScoreBackend {
    fn load_model(path: &str) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run the model on an NHWC `[1, h, w, 3]` float input and return the
    /// raw output tensor (a per-cell class score grid, possibly with a
    /// leading batch axis).
    fn score(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<ArrayD<f32>>;

    /// `(width, height)` the model expects, when it declares a static
    /// input shape.
    fn input_size(&self) -> Option<(u32, u32)> {
        None
    }
}
