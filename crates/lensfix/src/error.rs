use lensfix_3d::calibration::CalibError;
use lensfix_image::ImageError;
use lensfix_io::IoError;

/// Errors of the calibration pipeline.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    /// The checkerboard description is not usable.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// A run option is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No frame of the source contained the checkerboard.
    #[error("no corners detected in any frame")]
    EmptyCorpus,

    /// Reading frames or writing results failed.
    #[error(transparent)]
    Io(#[from] IoError),

    /// An image operation failed.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// The solver rejected the correspondences.
    #[error(transparent)]
    Calib(#[from] CalibError),

    /// The calibration report could not be serialized.
    #[error("failed to serialize the calibration report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Errors of the undistortion pipeline.
#[derive(thiserror::Error, Debug)]
pub enum UndistortError {
    /// A run option is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A frame does not have the size the map was built for.
    #[error("frame {index} is {actual:?}, expected {expected:?}")]
    FrameSize {
        /// The index of the frame.
        index: usize,
        /// The size of the undistortion map.
        expected: lensfix_image::ImageSize,
        /// The size of the frame.
        actual: lensfix_image::ImageSize,
    },

    /// Reading frames, calibration files or writing the output failed.
    #[error(transparent)]
    Io(#[from] IoError),

    /// An image operation failed.
    #[error(transparent)]
    Image(#[from] ImageError),
}
