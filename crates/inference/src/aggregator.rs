use crate::grid::ScoreGrid;

/// Border fractions excluded from the first-stage scan.
///
/// The centered-region restriction suppresses false triggers from
/// frame-boundary artifacts; the confirmation stage scans the full grid.
#[derive(Debug, Clone, Copy)]
pub struct EdgeMargin {
    pub horizontal: f32,
    pub vertical: f32,
}

/// Reduce a score grid to the number of cells with a confident,
/// non-background detection.
///
/// A cell counts iff its argmax score is strictly greater than `threshold`
/// (ties do not count), the winning class is not index 0, and its label is
/// not case-insensitively "background" or "uncertain". With a margin, cells
/// within the border fractions of the grid edge are skipped entirely.
/// Pure function: no state, same inputs always give the same count.
pub fn count_detections(
    grid: &ScoreGrid,
    labels: &[String],
    threshold: f32,
    margin: Option<EdgeMargin>,
) -> u32 {
    let (h, w) = (grid.height(), grid.width());

    let (x_start, x_end, y_start, y_end) = match margin {
        Some(m) => (
            (w as f32 * m.horizontal) as usize,
            (w as f32 * (1.0 - m.horizontal)) as usize,
            (h as f32 * m.vertical) as usize,
            (h as f32 * (1.0 - m.vertical)) as usize,
        ),
        None => (0, w, 0, h),
    };

    let mut count = 0;
    for y in 0..h {
        for x in 0..w {
            if !(x_start <= x && x < x_end && y_start <= y && y < y_end) {
                continue;
            }

            let (class_id, confidence) = grid.argmax(y, x);
            if class_id >= labels.len() {
                continue;
            }

            let label = labels[class_id].to_lowercase();
            let is_background =
                class_id == 0 || label == "background" || label == "uncertain";

            if confidence > threshold && !is_background {
                count += 1;
            }
        }
    }
    count
}
