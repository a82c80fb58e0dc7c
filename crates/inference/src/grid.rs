use ndarray::{Array3, ArrayD, ArrayView1};

/// A rectangular grid of per-cell class score vectors, `[h, w, classes]`.
///
/// Produced by one classifier call and consumed immediately by the
/// aggregator; never persisted.
#[derive(Debug, Clone)]
pub struct ScoreGrid {
    scores: Array3<f32>,
}

impl ScoreGrid {
    pub fn new(scores: Array3<f32>) -> Self {
        Self { scores }
    }

    /// Build from a raw backend output, squeezing any leading batch axes
    /// of size 1 down to `[h, w, classes]`.
    pub fn from_output(output: ArrayD<f32>) -> anyhow::Result<Self> {
        let mut squeezed = output;
        while squeezed.ndim() > 3 && squeezed.shape()[0] == 1 {
            squeezed = squeezed.remove_axis(ndarray::Axis(0));
        }

        if squeezed.ndim() != 3 {
            anyhow::bail!(
                "Expected a [h, w, classes] score grid, got shape {:?}",
                squeezed.shape()
            );
        }

        Ok(Self {
            scores: squeezed.into_dimensionality()?,
        })
    }

    pub fn height(&self) -> usize {
        self.scores.shape()[0]
    }

    pub fn width(&self) -> usize {
        self.scores.shape()[1]
    }

    pub fn num_classes(&self) -> usize {
        self.scores.shape()[2]
    }

    /// Class score vector for one cell.
    pub fn cell(&self, y: usize, x: usize) -> ArrayView1<'_, f32> {
        self.scores.slice(ndarray::s![y, x, ..])
    }

    /// Index and score of the best class for one cell.
    pub fn argmax(&self, y: usize, x: usize) -> (usize, f32) {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (idx, &score) in self.cell(y, x).iter().enumerate() {
            if score > best_score {
                best_idx = idx;
                best_score = score;
            }
        }
        (best_idx, best_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    #[test]
    fn squeezes_batch_axis() {
        let output = Array::zeros(IxDyn(&[1, 4, 5, 2]));
        let grid = ScoreGrid::from_output(output).unwrap();
        assert_eq!(grid.height(), 4);
        assert_eq!(grid.width(), 5);
        assert_eq!(grid.num_classes(), 2);
    }

    #[test]
    fn rejects_non_grid_output() {
        let output = Array::zeros(IxDyn(&[1, 10]));
        assert!(ScoreGrid::from_output(output).is_err());
    }

    #[test]
    fn argmax_picks_best_class() {
        let mut scores = Array3::zeros((2, 2, 3));
        scores[[1, 0, 2]] = 0.9;
        scores[[1, 0, 1]] = 0.3;
        let grid = ScoreGrid::new(scores);

        let (idx, score) = grid.argmax(1, 0);
        assert_eq!(idx, 2);
        assert!((score - 0.9).abs() < 1e-6);
    }
}
