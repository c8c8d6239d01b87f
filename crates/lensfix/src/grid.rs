use lensfix_imgproc::calibration::chessboard::PatternSize;
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

/// A checkerboard described by its internal intersections and square size.
///
/// `rows_internal` is the number of intersections along a row of the board and
/// `cols_internal` the number along a column, so the detected corners come in
/// `cols_internal` lines of `rows_internal` points each.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Internal intersections along a row.
    pub rows_internal: usize,
    /// Internal intersections along a column.
    pub cols_internal: usize,
    /// Width of a square in target units.
    pub square_width: f64,
    /// Height of a square in target units.
    pub square_height: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            rows_internal: 9,
            cols_internal: 6,
            square_width: 1.0,
            square_height: 1.0,
        }
    }
}

impl GridSpec {
    /// Create a validated grid.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidGrid`] when an axis has no intersections or
    /// a square size is not a positive finite number. A board with a single line of
    /// intersections is accepted here and rejected by the solver as degenerate.
    pub fn new(
        rows_internal: usize,
        cols_internal: usize,
        square_width: f64,
        square_height: f64,
    ) -> Result<Self, CalibrationError> {
        let grid = Self {
            rows_internal,
            cols_internal,
            square_width,
            square_height,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Check the grid, for values built without [`GridSpec::new`].
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.rows_internal == 0 || self.cols_internal == 0 {
            return Err(CalibrationError::InvalidGrid(format!(
                "internal intersections must be positive, got {}x{}",
                self.rows_internal, self.cols_internal
            )));
        }
        for (name, value) in [("width", self.square_width), ("height", self.square_height)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(CalibrationError::InvalidGrid(format!(
                    "square {name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Number of intersections on the board.
    pub fn num_points(&self) -> usize {
        self.rows_internal * self.cols_internal
    }

    /// The pattern searched by the chessboard detector.
    pub fn pattern_size(&self) -> PatternSize {
        PatternSize::new(self.rows_internal, self.cols_internal)
    }

    /// The target coordinates of every intersection, in detection order.
    ///
    /// Intersection `c` lies at
    /// `((c % rows_internal) * square_width, (c / rows_internal) * square_height, 0)`.
    pub fn object_points(&self) -> Vec<[f64; 3]> {
        (0..self.num_points())
            .map(|c| {
                [
                    (c % self.rows_internal) as f64 * self.square_width,
                    (c / self.rows_internal) as f64 * self.square_height,
                    0.0,
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_points_layout() -> Result<(), CalibrationError> {
        let grid = GridSpec::new(9, 6, 2.0, 0.5)?;
        let points = grid.object_points();
        assert_eq!(points.len(), 54);
        assert_eq!(points[0], [0.0, 0.0, 0.0]);
        assert_eq!(points[1], [2.0, 0.0, 0.0]);
        assert_eq!(points[8], [16.0, 0.0, 0.0]);
        assert_eq!(points[9], [0.0, 0.5, 0.0]);
        assert_eq!(points[53], [16.0, 2.5, 0.0]);
        assert_eq!(grid.pattern_size().len(), 54);
        Ok(())
    }

    #[test]
    fn single_line_grid() -> Result<(), CalibrationError> {
        let grid = GridSpec::new(9, 1, 1.0, 1.0)?;
        assert_eq!(grid.num_points(), 9);
        assert!(grid.object_points().iter().all(|p| p[1] == 0.0));
        assert_eq!(GridSpec::new(1, 1, 1.0, 1.0)?.num_points(), 1);
        Ok(())
    }

    #[test]
    fn invalid_grids() {
        assert!(matches!(
            GridSpec::new(0, 6, 1.0, 1.0),
            Err(CalibrationError::InvalidGrid(_))
        ));
        assert!(matches!(
            GridSpec::new(9, 0, 1.0, 1.0),
            Err(CalibrationError::InvalidGrid(_))
        ));
        assert!(matches!(
            GridSpec::new(9, 6, 0.0, 1.0),
            Err(CalibrationError::InvalidGrid(_))
        ));
        assert!(matches!(
            GridSpec::new(9, 6, 1.0, f64::NAN),
            Err(CalibrationError::InvalidGrid(_))
        ));
    }

    #[test]
    fn serde_roundtrip() -> Result<(), serde_json::Error> {
        let grid = GridSpec::default();
        let json = serde_json::to_string(&grid)?;
        assert!(json.contains("\"rows_internal\":9"));
        let back: GridSpec = serde_json::from_str(&json)?;
        assert_eq!(back, grid);
        Ok(())
    }
}
