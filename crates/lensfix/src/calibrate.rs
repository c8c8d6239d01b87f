use std::path::{Path, PathBuf};

use lensfix_3d::calibration::{calibrate_camera, CalibrationParams, CalibrationResult};
use lensfix_image::ImageSize;
use lensfix_imgproc::draw::draw_chessboard_corners;
use lensfix_io::calibration::{write_camera_matrix, write_distortion_coefficients};
use lensfix_io::jpeg::{write_image_jpeg_rgb8, DEFAULT_JPEG_QUALITY};
use lensfix_io::{open_frame_source, FrameSource};

use crate::cancel::CancelToken;
use crate::collect::{collect_with, CalibrationDataset, CollectorConfig};
use crate::detector::{ChessboardDetector, CornerDetector};
use crate::error::CalibrationError;
use crate::grid::GridSpec;
use crate::report::CalibrationReport;

/// Append `suffix` to the full path, keeping its extension.
pub(crate) fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    // drops a trailing separator so "frames/" names "frames_<suffix>"
    let mut name = path.components().collect::<PathBuf>().into_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// The files written by a calibration run on `<video>`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutputs {
    /// `<video>_camera_matrix.csv`
    pub camera_matrix: PathBuf,
    /// `<video>_distortion_coefficients.csv`
    pub distortion_coefficients: PathBuf,
    /// `<video>_calibration.json`
    pub report: PathBuf,
    video: PathBuf,
}

impl CalibrationOutputs {
    /// The output paths for a calibration video or frame directory.
    pub fn for_video(video: impl AsRef<Path>) -> Self {
        let video = video.as_ref();
        Self {
            camera_matrix: suffixed(video, "_camera_matrix.csv"),
            distortion_coefficients: suffixed(video, "_distortion_coefficients.csv"),
            report: suffixed(video, "_calibration.json"),
            video: video.to_path_buf(),
        }
    }

    /// `<video>_corner_NNNN.jpg` for the 1-based `frame_number`.
    pub fn corner_image(&self, frame_number: usize) -> PathBuf {
        suffixed(&self.video, &format!("_corner_{frame_number:04}.jpg"))
    }
}

/// Options of a calibration run.
#[derive(Debug, Clone, Default)]
pub struct CalibrationRun {
    /// The checkerboard to look for.
    pub grid: GridSpec,
    /// Collector options.
    pub collector: CollectorConfig,
    /// Solver options.
    pub solver: CalibrationParams,
    /// Write a JPEG with the detected corners drawn for every detection.
    pub save_corners: bool,
    /// Write a JSON report next to the calibration files.
    pub write_report: bool,
}

impl CalibrationRun {
    /// Set the checkerboard.
    pub fn with_grid(mut self, grid: GridSpec) -> Self {
        self.grid = grid;
        self
    }

    /// Set the collector options.
    pub fn with_collector(mut self, collector: CollectorConfig) -> Self {
        self.collector = collector;
        self
    }

    /// Set the solver options.
    pub fn with_solver(mut self, solver: CalibrationParams) -> Self {
        self.solver = solver;
        self
    }

    /// Enable the corner overlay images.
    pub fn with_save_corners(mut self, save_corners: bool) -> Self {
        self.save_corners = save_corners;
        self
    }

    /// Enable the JSON report.
    pub fn with_report(mut self, write_report: bool) -> Self {
        self.write_report = write_report;
        self
    }

    /// Check every option before any frame is read.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.grid.validate()?;
        self.collector.validate()?;
        if self.solver.max_iterations == 0 {
            return Err(CalibrationError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a calibration run.
#[derive(Debug, Clone)]
pub struct CalibrationSummary {
    /// The solver result.
    pub result: CalibrationResult,
    /// The checkerboard used.
    pub grid: GridSpec,
    /// The size of the frames.
    pub image_size: ImageSize,
    /// Number of frames read.
    pub frames_scanned: usize,
    /// Number of frames with a detection.
    pub detections: usize,
    /// Number of views given to the solver.
    pub views_used: usize,
}

impl CalibrationSummary {
    /// The 3x3 camera matrix.
    pub fn camera_matrix(&self) -> [[f64; 3]; 3] {
        self.result.intrinsic.to_matrix()
    }

    /// The coefficients `k1, k2, p1, p2, k3`.
    pub fn distortion_coefficients(&self) -> [f64; 5] {
        self.result.distortion.coefficients()
    }

    /// Write the calibration files and, if requested, the JSON report.
    pub fn write(
        &self,
        outputs: &CalibrationOutputs,
        write_report: bool,
    ) -> Result<(), CalibrationError> {
        write_camera_matrix(&outputs.camera_matrix, &self.camera_matrix())?;
        write_distortion_coefficients(
            &outputs.distortion_coefficients,
            &self.distortion_coefficients(),
        )?;
        log::info!(
            "wrote {} and {}",
            outputs.camera_matrix.display(),
            outputs.distortion_coefficients.display()
        );
        if write_report {
            CalibrationReport::new(self).write_json(&outputs.report)?;
        }
        Ok(())
    }
}

/// Solve for the camera from collected correspondences.
///
/// Reaching the iteration cap is logged and the best parameters are returned.
pub fn calibrate_dataset(
    dataset: &CalibrationDataset,
    params: &CalibrationParams,
) -> Result<CalibrationResult, CalibrationError> {
    if dataset.is_empty() {
        return Err(CalibrationError::EmptyCorpus);
    }
    log::info!("Calibrating from {} views", dataset.len());

    let result = calibrate_camera(
        &dataset.object_points(),
        &dataset.image_points(),
        dataset.image_size,
        params,
    )?;

    if !result.termination.is_converged() {
        log::warn!(
            "calibration did not converge ({}) after {} iterations, keeping the best parameters",
            result.termination,
            result.iterations
        );
    }
    log::info!("Camera matrix: {:?}", result.intrinsic.to_matrix());
    log::info!(
        "Distortion coefficients: {:?}",
        result.distortion.coefficients()
    );
    log::info!("RMS reprojection error: {:.4} px", result.rms_error);
    Ok(result)
}

/// Collect correspondences from `source` and calibrate the camera.
///
/// Corner overlays are written to `outputs` when `run.save_corners` is set; the
/// calibration files are not written, see [`CalibrationSummary::write`].
pub fn calibrate_source(
    source: &mut dyn FrameSource,
    run: &CalibrationRun,
    detector: &dyn CornerDetector,
    cancel: &CancelToken,
    outputs: &CalibrationOutputs,
) -> Result<CalibrationSummary, CalibrationError> {
    run.validate()?;

    let pattern = run.grid.pattern_size();
    let dataset = collect_with(
        source,
        &run.grid,
        detector,
        &run.collector,
        cancel,
        |index, frame, corners| {
            if run.save_corners {
                let mut overlay = frame.clone();
                draw_chessboard_corners(&mut overlay, pattern, corners);
                write_image_jpeg_rgb8(
                    outputs.corner_image(index + 1),
                    &overlay,
                    DEFAULT_JPEG_QUALITY,
                )?;
            }
            Ok(())
        },
    )?;

    let result = calibrate_dataset(&dataset, &run.solver)?;
    Ok(CalibrationSummary {
        result,
        grid: run.grid,
        image_size: dataset.image_size,
        frames_scanned: dataset.frames_scanned,
        detections: dataset.detections,
        views_used: dataset.len(),
    })
}

/// Calibrate the camera that recorded `video` and write the calibration files.
///
/// `video` is a video file, or a directory of frame images. Nothing is written when
/// no frame contains the checkerboard.
pub fn calibrate_video(
    video: impl AsRef<Path>,
    run: &CalibrationRun,
    cancel: &CancelToken,
) -> Result<CalibrationSummary, CalibrationError> {
    let video = video.as_ref();
    run.validate()?;

    let mut source = open_frame_source(video)?;
    let size = source.frame_size();
    log::info!(
        "Video: {} ({}x{}), intersections {}x{}, squares {}x{}",
        video.display(),
        size.width,
        size.height,
        run.grid.rows_internal,
        run.grid.cols_internal,
        run.grid.square_width,
        run.grid.square_height
    );

    let outputs = CalibrationOutputs::for_video(video);
    let summary = calibrate_source(
        source.as_mut(),
        run,
        &ChessboardDetector::default(),
        cancel,
        &outputs,
    )?;
    summary.write(&outputs, run.write_report)?;
    Ok(summary)
}
