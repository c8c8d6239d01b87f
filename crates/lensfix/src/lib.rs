#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use lensfix_image as image;

#[doc(inline)]
pub use lensfix_imgproc as imgproc;

#[doc(inline)]
pub use lensfix_io as io;

#[doc(inline)]
pub use lensfix_3d as k3d;

/// Calibration of a camera from a frame source.
pub mod calibrate;

/// Cooperative cancellation of long running pipelines.
pub mod cancel;

/// Collection of checkerboard correspondences from a frame source.
pub mod collect;

/// Corner detectors used by the collector.
pub mod detector;

/// Error types of the pipelines.
pub mod error;

/// Checkerboard geometry.
pub mod grid;

/// Serializable summary of a calibration.
pub mod report;

/// Undistortion of a frame source.
pub mod undistort;

pub use calibrate::{
    calibrate_dataset, calibrate_source, calibrate_video, CalibrationOutputs, CalibrationRun,
    CalibrationSummary,
};
pub use cancel::CancelToken;
pub use collect::{collect, collect_with, CalibrationDataset, CollectorConfig, CorrespondenceSet};
pub use detector::{ChessboardDetector, CornerDetector};
pub use error::{CalibrationError, UndistortError};
pub use grid::GridSpec;
pub use report::CalibrationReport;
pub use undistort::{
    load_calibration, undistort_frames, undistort_video, UndistortConfig, UndistortOutputs,
    UndistortSummary,
};
