use ndarray::{ArrayView1, ArrayView2, Axis, Slice};

use super::VisionError;

/// Rows 0..4 of every candidate column: center x, center y, width, height.
pub const BOX_ROWS: usize = 4;

/// Logical shape of the model output, `[1][4 + num_classes][num_candidates]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
    pub num_classes: usize,
    pub num_candidates: usize,
}

impl OutputLayout {
    pub const fn new(num_classes: usize, num_candidates: usize) -> Self {
        Self {
            num_classes,
            num_candidates,
        }
    }

    /// Channel rows per candidate.
    pub const fn rows(&self) -> usize {
        BOX_ROWS + self.num_classes
    }

    pub const fn expected_len(&self) -> usize {
        self.rows() * self.num_candidates
    }

    /// Checks model output dims against `[1, 4 + num_classes, num_candidates]`.
    ///
    /// Negative dims are symbolic (dynamic) and match anything. A transposed
    /// `[1, N, 4 + C]` output is rejected.
    pub fn check_output_dims(&self, dims: &[i64]) -> Result<(), VisionError> {
        let expected = [1, self.rows() as i64, self.num_candidates as i64];
        let fits = dims.len() == expected.len()
            && dims.iter().zip(expected).all(|(&got, want)| got < 0 || got == want);

        if fits {
            Ok(())
        } else {
            Err(VisionError::InvalidOutputShape {
                expected: format!("{expected:?}"),
                got: format!("{dims:?}"),
            })
        }
    }
}

/// One raw per-anchor prediction, borrowed from the output tensor.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub index: usize,
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub class_scores: ArrayView1<'a, f32>,
}

/// Channel-major view over a flat model output buffer.
///
/// The buffer is read as `rows × num_candidates`, each channel contiguous
/// over candidates. Candidate `i` is column `i`. Reading it the other way
/// round produces plausible-looking garbage, so the layout is fixed here and
/// nowhere else.
#[derive(Debug, Clone)]
pub struct TensorDecoder<'a> {
    grid: ArrayView2<'a, f32>,
    layout: OutputLayout,
}

impl<'a> TensorDecoder<'a> {
    /// Wraps `raw` without copying.
    ///
    /// # Errors
    ///
    /// [`VisionError::ShapeMismatch`] unless `raw.len()` is exactly
    /// `(4 + num_classes) * num_candidates`.
    pub fn new(raw: &'a [f32], layout: OutputLayout) -> Result<Self, VisionError> {
        let expected = layout.expected_len();
        if raw.len() != expected {
            return Err(VisionError::ShapeMismatch {
                expected,
                got: raw.len(),
            });
        }

        let grid = ArrayView2::from_shape((layout.rows(), layout.num_candidates), raw)
            .map_err(|e| VisionError::Processing(e.to_string()))?;

        Ok(Self { grid, layout })
    }

    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.layout.num_candidates
    }

    pub fn is_empty(&self) -> bool {
        self.layout.num_candidates == 0
    }

    /// Candidate at column `index`, or `None` past the end.
    pub fn candidate(&self, index: usize) -> Option<Candidate<'a>> {
        if index >= self.layout.num_candidates {
            return None;
        }

        // Reborrow the view with the full 'a lifetime so candidates can
        // outlive `&self`.
        let grid: ArrayView2<'a, f32> = self.grid.clone();
        let class_scores = grid
            .index_axis_move(Axis(1), index)
            .slice_axis_move(Axis(0), Slice::from(BOX_ROWS..));

        Some(Candidate {
            index,
            center_x: self.grid[[0, index]],
            center_y: self.grid[[1, index]],
            width: self.grid[[2, index]],
            height: self.grid[[3, index]],
            class_scores,
        })
    }

    /// Lazily yields every candidate in column order.
    pub fn candidates(&self) -> impl Iterator<Item = Candidate<'a>> + '_ {
        (0..self.layout.num_candidates).filter_map(move |i| self.candidate(i))
    }
}
