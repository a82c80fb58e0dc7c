use crate::aggregator::{EdgeMargin, count_detections};
use crate::backend::ScoreBackend;
use crate::grid::ScoreGrid;
use ndarray::{Array, IxDyn};

/// One classifier stage: a loaded model plus its label list, confidence
/// threshold, and optional edge margin.
///
/// Stateless per call; the input must already be resized to the model's
/// input shape (see [`crate::PreProcessor`]).
pub struct ClassifierAdapter<B: ScoreBackend> {
    backend: B,
    labels: Vec<String>,
    threshold: f32,
    margin: Option<EdgeMargin>,
}

impl<B: ScoreBackend> ClassifierAdapter<B> {
    pub fn load(
        model_path: &str,
        labels: Vec<String>,
        threshold: f32,
        margin: Option<EdgeMargin>,
    ) -> anyhow::Result<Self> {
        let backend = B::load_model(model_path)?;
        Ok(Self {
            backend,
            labels,
            threshold,
            margin,
        })
    }

    pub fn from_backend(
        backend: B,
        labels: Vec<String>,
        threshold: f32,
        margin: Option<EdgeMargin>,
    ) -> Self {
        Self {
            backend,
            labels,
            threshold,
            margin,
        }
    }

    /// Input size the loaded model declares, if static.
    pub fn input_size(&self) -> Option<(u32, u32)> {
        self.backend.input_size()
    }

    /// Score one preprocessed frame into a per-cell class score grid.
    pub fn score(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<ScoreGrid> {
        let output = self.backend.score(input)?;
        ScoreGrid::from_output(output)
    }

    /// Score one frame and reduce it to a detection count.
    pub fn detect(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<u32> {
        let grid = self.score(input)?;
        Ok(count_detections(
            &grid,
            &self.labels,
            self.threshold,
            self.margin,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    /// Backend returning a fixed tensor, for exercising the adapter
    /// without a model file.
    struct FixedBackend {
        output: ArrayD<f32>,
    }

    impl ScoreBackend for FixedBackend {
        fn load_model(_path: &str) -> anyhow::Result<Self> {
            anyhow::bail!("fixed backend is constructed directly in tests")
        }

        fn score(&mut self, _input: &Array<f32, IxDyn>) -> anyhow::Result<ArrayD<f32>> {
            Ok(self.output.clone())
        }
    }

    fn stage_labels() -> Vec<String> {
        vec!["uncertain".to_string(), "fire".to_string()]
    }

    fn dummy_input() -> Array<f32, IxDyn> {
        Array::zeros(IxDyn(&[1, 96, 96, 3]))
    }

    #[test]
    fn detect_counts_through_the_aggregator() {
        // 4x4 grid; two confident fire cells in the interior.
        let mut output = ArrayD::zeros(IxDyn(&[1, 4, 4, 2]));
        output[[0, 1, 1, 1]] = 0.9;
        output[[0, 2, 2, 1]] = 0.8;

        let backend = FixedBackend { output };
        let mut adapter = ClassifierAdapter::from_backend(backend, stage_labels(), 0.65, None);

        assert_eq!(adapter.detect(&dummy_input()).unwrap(), 2);
    }

    #[test]
    fn detect_is_stateless_across_calls() {
        let mut output = ArrayD::zeros(IxDyn(&[1, 4, 4, 2]));
        output[[0, 1, 1, 1]] = 0.9;

        let backend = FixedBackend { output };
        let mut adapter = ClassifierAdapter::from_backend(backend, stage_labels(), 0.65, None);

        let first = adapter.detect(&dummy_input()).unwrap();
        let second = adapter.detect(&dummy_input()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_backend_output_is_an_error() {
        let backend = FixedBackend {
            output: ArrayD::zeros(IxDyn(&[1, 10])),
        };
        let mut adapter = ClassifierAdapter::from_backend(backend, stage_labels(), 0.65, None);
        assert!(adapter.score(&dummy_input()).is_err());
    }
}
