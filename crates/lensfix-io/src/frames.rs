use std::path::Path;

use lensfix_image::{Image, ImageSize};

use crate::error::IoError;
use crate::sequence::ImageSequenceReader;

/// A finite, ordered sequence of RGB frames consumed once.
pub trait FrameSource {
    /// The size shared by every frame of the source.
    fn frame_size(&self) -> ImageSize;

    /// The number of frames reported by the container, if known.
    ///
    /// The reported count may be inaccurate; [`FrameSource::read_frame`] is the
    /// authority on the end of the stream.
    fn frame_count(&self) -> Option<usize>;

    /// The frame rate reported by the container, if known.
    fn fps(&self) -> Option<f64>;

    /// Decode the next frame, or `None` at the end of the stream.
    fn read_frame(&mut self) -> Result<Option<Image<u8, 3>>, IoError>;
}

/// A destination for RGB frames, written in order.
pub trait FrameSink {
    /// Append a frame.
    fn write_frame(&mut self, frame: &Image<u8, 3>) -> Result<(), IoError>;

    /// Flush and close the sink. Frames written so far must be persisted.
    fn finish(&mut self) -> Result<(), IoError>;
}

/// The encoding of a written video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// H.264 in an MPEG-4 container.
    H264,
    /// Uncompressed frames in an AVI container.
    Raw,
}

impl VideoCodec {
    /// The file extension of videos written with this codec.
    pub fn extension(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "m4v",
            VideoCodec::Raw => "avi",
        }
    }
}

/// Open a path as a frame source.
///
/// Directories are read as image sequences. Other paths are decoded as video files,
/// which requires the `gstreamer` feature.
pub fn open_frame_source(path: impl AsRef<Path>) -> Result<Box<dyn FrameSource>, IoError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IoError::FileDoesNotExist(path.to_path_buf()));
    }
    if path.is_dir() {
        return Ok(Box::new(ImageSequenceReader::new(path)?));
    }

    #[cfg(feature = "gstreamer")]
    {
        Ok(Box::new(crate::gstreamer::VideoReader::new(path)?))
    }

    #[cfg(not(feature = "gstreamer"))]
    {
        Err(IoError::UnsupportedSource(path.to_path_buf()))
    }
}

/// Create a sink writing a video file.
///
/// With the `gstreamer` feature the frames are encoded into `path`. Without it the
/// frames are written as numbered JPEG files into a directory named after `path`
/// without its extension.
///
/// # Arguments
///
/// * `path` - The path of the video file.
/// * `codec` - The video encoding.
/// * `fps` - The frame rate of the video.
/// * `size` - The size of every frame.
pub fn create_video_sink(
    path: impl AsRef<Path>,
    codec: VideoCodec,
    fps: u32,
    size: ImageSize,
) -> Result<Box<dyn FrameSink>, IoError> {
    let path = path.as_ref();

    #[cfg(feature = "gstreamer")]
    {
        let writer = crate::gstreamer::VideoWriter::new(path, codec, fps, size)?;
        Ok(Box::new(writer))
    }

    #[cfg(not(feature = "gstreamer"))]
    {
        let dir = path.with_extension("");
        log::warn!(
            "built without gstreamer: writing {codec:?} video at {fps} fps as frames in {}",
            dir.display()
        );
        let prefix = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string());
        let writer = crate::sequence::ImageSequenceWriter::new(&dir, prefix)?;
        Ok(Box::new(writer.with_expected_size(size)))
    }
}
