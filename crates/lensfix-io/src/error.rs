use std::path::PathBuf;

use lensfix_image::ImageSize;

/// An error type for the io module.
#[derive(thiserror::Error, Debug)]
pub enum IoError {
    /// Error when the file does not exist.
    #[error("File does not exist: {0}")]
    FileDoesNotExist(PathBuf),

    /// Invalid file extension.
    #[error("File does not have a valid extension: {0}")]
    InvalidFileExtension(PathBuf),

    /// Error to open the file.
    #[error("Failed to manipulate the file. {0}")]
    FileError(#[from] std::io::Error),

    /// Error to encode the JPEG image.
    #[error("Error with Jpeg encoding. {0}")]
    JpegEncodingError(#[from] jpeg_encoder::EncodingError),

    /// Error to create the image.
    #[error("Failed to create image. {0}")]
    ImageCreationError(#[from] lensfix_image::ImageError),

    /// Error to decode the image.
    #[error("Failed to decode the image. {0}")]
    ImageDecodeError(#[from] image::ImageError),

    /// A calibration file could not be parsed.
    #[error("Invalid calibration file {path}: {reason}")]
    InvalidCalibrationFile {
        /// The path of the file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// A directory holds no readable frames.
    #[error("No image frames found in {0}")]
    EmptySequence(PathBuf),

    /// A frame does not have the size of the stream.
    #[error("Frame size mismatch: expected {expected:?}, got {actual:?}")]
    FrameSizeMismatch {
        /// The size of the stream.
        expected: ImageSize,
        /// The size of the frame.
        actual: ImageSize,
    },

    /// The path cannot be opened as a frame source.
    #[error("Unsupported frame source {0}: enable the `gstreamer` feature to read video files")]
    UnsupportedSource(PathBuf),

    /// Error from the GStreamer video backend.
    #[cfg(feature = "gstreamer")]
    #[error(transparent)]
    VideoError(#[from] crate::gstreamer::VideoError),
}
