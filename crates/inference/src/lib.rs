//! Two-stage on-device classifier: backend abstraction, frame
//! preprocessing, score grids, and the detection count aggregator.

pub mod aggregator;
pub mod backend;
pub mod classifier;
pub mod grid;
pub mod preprocessing;

pub use aggregator::{EdgeMargin, count_detections};
pub use backend::ScoreBackend;
pub use classifier::ClassifierAdapter;
pub use grid::ScoreGrid;
pub use preprocessing::PreProcessor;
