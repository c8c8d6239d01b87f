use lensfix_image::{Image, ImageError};
use lensfix_imgproc::calibration::chessboard::{detect_chessboard, ChessboardParams};

use crate::grid::GridSpec;

/// Locates the internal intersections of a checkerboard in a grayscale frame.
///
/// Implementations return the corners in row-major order, `grid.rows_internal`
/// points per line, or `None` when the full pattern is not visible.
pub trait CornerDetector: Send + Sync {
    /// Detect the corners of `grid` in `gray`.
    fn detect(
        &self,
        gray: &Image<u8, 1>,
        grid: &GridSpec,
    ) -> Result<Option<Vec<[f32; 2]>>, ImageError>;
}

/// The quad based chessboard detector with sub-pixel refinement.
#[derive(Debug, Clone, Default)]
pub struct ChessboardDetector {
    /// The detector parameters.
    pub params: ChessboardParams,
}

impl ChessboardDetector {
    /// Create a detector with custom parameters.
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }
}

impl CornerDetector for ChessboardDetector {
    fn detect(
        &self,
        gray: &Image<u8, 1>,
        grid: &GridSpec,
    ) -> Result<Option<Vec<[f32; 2]>>, ImageError> {
        detect_chessboard(gray, grid.pattern_size(), &self.params)
    }
}
