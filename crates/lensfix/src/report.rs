use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibrate::CalibrationSummary;
use crate::error::CalibrationError;
use crate::grid::GridSpec;

/// Summary of a calibration run written next to the calibration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// The checkerboard used.
    pub grid: GridSpec,
    /// Width of the calibrated frames.
    pub image_width: usize,
    /// Height of the calibrated frames.
    pub image_height: usize,
    /// The 3x3 camera matrix.
    pub camera_matrix: [[f64; 3]; 3],
    /// The coefficients `k1, k2, p1, p2, k3`.
    pub distortion_coefficients: [f64; 5],
    /// Root mean square reprojection error in pixels.
    pub rms_error: f64,
    /// Number of solver iterations.
    pub iterations: usize,
    /// Why the solver stopped.
    pub termination: String,
    /// Whether a convergence criterion was met.
    pub converged: bool,
    /// Number of frames read.
    pub frames_scanned: usize,
    /// Number of frames with a detected checkerboard.
    pub detections: usize,
    /// Number of views used by the solver.
    pub views_used: usize,
}

impl CalibrationReport {
    /// Build the report of a calibration run.
    pub fn new(summary: &CalibrationSummary) -> Self {
        let result = &summary.result;
        Self {
            grid: summary.grid,
            image_width: summary.image_size.width,
            image_height: summary.image_size.height,
            camera_matrix: result.intrinsic.to_matrix(),
            distortion_coefficients: result.distortion.coefficients(),
            rms_error: result.rms_error,
            iterations: result.iterations,
            termination: result.termination.to_string(),
            converged: result.termination.is_converged(),
            frames_scanned: summary.frames_scanned,
            detections: summary.detections,
            views_used: summary.views_used,
        }
    }

    /// Write the report as pretty printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibrationError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json + "\n").map_err(lensfix_io::IoError::from)?;
        Ok(())
    }

    /// Read a report written by [`CalibrationReport::write_json`].
    pub fn read_json(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let json = std::fs::read_to_string(path).map_err(lensfix_io::IoError::from)?;
        Ok(serde_json::from_str(&json)?)
    }
}
