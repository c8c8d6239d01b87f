#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for I/O operations.
///
/// Defines [`error::IoError`] variants for file access, encoding/decoding failures,
/// calibration file parsing and video streams.
pub mod error;

/// High-level image reading functions.
///
/// See [`functional::read_image_any_rgb8`] for automatic format detection.
pub mod functional;

/// JPEG image encoding.
pub mod jpeg;

/// Camera matrix and distortion coefficient files.
///
/// Comma separated text files, one matrix row per line.
pub mod calibration;

/// Frame source and sink abstractions shared by video and image sequences.
pub mod frames;

/// Directories of numbered image files used as frame sources and sinks.
pub mod sequence;

/// GStreamer video reading and writing (feature-gated).
///
/// Requires the `gstreamer` feature flag and system GStreamer libraries.
#[cfg(feature = "gstreamer")]
pub mod gstreamer;

pub use error::IoError;
pub use frames::{create_video_sink, open_frame_source, FrameSink, FrameSource, VideoCodec};
