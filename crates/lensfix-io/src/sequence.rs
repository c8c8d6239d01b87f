use std::path::{Path, PathBuf};

use lensfix_image::{Image, ImageSize};

use crate::error::IoError;
use crate::frames::{FrameSink, FrameSource};
use crate::functional::{has_image_extension, read_image_any_rgb8};
use crate::jpeg::{write_image_jpeg_rgb8, DEFAULT_JPEG_QUALITY};

/// Reads the image files of a directory, sorted by file name, as a frame source.
pub struct ImageSequenceReader {
    files: Vec<PathBuf>,
    next: usize,
    size: ImageSize,
    pending: Option<Image<u8, 3>>,
}

impl ImageSequenceReader {
    /// Open a directory of images.
    ///
    /// The first image is decoded up front to learn the frame size.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, IoError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(IoError::FileDoesNotExist(dir.to_path_buf()));
        }

        let mut files = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect::<Vec<_>>();
        files.sort();

        let first = files
            .first()
            .ok_or_else(|| IoError::EmptySequence(dir.to_path_buf()))?;
        let first = read_image_any_rgb8(first)?;

        Ok(Self {
            files,
            next: 0,
            size: first.size(),
            pending: Some(first),
        })
    }
}

impl FrameSource for ImageSequenceReader {
    fn frame_size(&self) -> ImageSize {
        self.size
    }

    fn frame_count(&self) -> Option<usize> {
        Some(self.files.len())
    }

    fn fps(&self) -> Option<f64> {
        None
    }

    fn read_frame(&mut self) -> Result<Option<Image<u8, 3>>, IoError> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let frame = match self.pending.take() {
            Some(frame) => frame,
            None => read_image_any_rgb8(path)?,
        };
        self.next += 1;

        if frame.size() != self.size {
            return Err(IoError::FrameSizeMismatch {
                expected: self.size,
                actual: frame.size(),
            });
        }
        Ok(Some(frame))
    }
}

/// Writes frames as numbered JPEG files `<prefix>_NNNN.jpg` into a directory.
///
/// Numbering starts at zero and follows the write order.
pub struct ImageSequenceWriter {
    dir: PathBuf,
    prefix: String,
    quality: u8,
    counter: usize,
    expected_size: Option<ImageSize>,
}

impl ImageSequenceWriter {
    /// Create the writer, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>, prefix: impl Into<String>) -> Result<Self, IoError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            quality: DEFAULT_JPEG_QUALITY,
            counter: 0,
            expected_size: None,
        })
    }

    /// Set the JPEG quality.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Reject frames that do not have the given size.
    pub fn with_expected_size(mut self, size: ImageSize) -> Self {
        self.expected_size = Some(size);
        self
    }

    /// The path the next frame will be written to.
    pub fn next_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_{:04}.jpg", self.prefix, self.counter))
    }

    /// Number of frames written so far.
    pub fn frames_written(&self) -> usize {
        self.counter
    }
}

impl FrameSink for ImageSequenceWriter {
    fn write_frame(&mut self, frame: &Image<u8, 3>) -> Result<(), IoError> {
        if let Some(expected) = self.expected_size {
            if frame.size() != expected {
                return Err(IoError::FrameSizeMismatch {
                    expected,
                    actual: frame.size(),
                });
            }
        }
        write_image_jpeg_rgb8(self.next_path(), frame, self.quality)?;
        self.counter += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), IoError> {
        log::debug!("wrote {} frames to {}", self.counter, self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_sequence() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let dir = tmp_dir.path().join("clip_raw");
        let size = ImageSize {
            width: 16,
            height: 8,
        };

        let mut writer = ImageSequenceWriter::new(&dir, "clip")?;
        for value in [0u8, 100, 200] {
            writer.write_frame(&Image::from_size_val(size, value)?)?;
        }
        writer.finish()?;
        assert_eq!(writer.frames_written(), 3);
        assert!(dir.join("clip_0000.jpg").exists());
        assert!(dir.join("clip_0002.jpg").exists());

        // unrelated files are ignored
        std::fs::write(dir.join("notes.txt"), "not a frame")?;

        let mut reader = ImageSequenceReader::new(&dir)?;
        assert_eq!(reader.frame_size(), size);
        assert_eq!(reader.frame_count(), Some(3));
        assert_eq!(reader.fps(), None);

        let mut means = Vec::new();
        while let Some(frame) = reader.read_frame()? {
            let sum = frame.as_slice().iter().map(|&v| v as f64).sum::<f64>();
            means.push(sum / frame.as_slice().len() as f64);
        }
        assert_eq!(means.len(), 3);
        assert!(means[0] < 5.0 && (means[1] - 100.0).abs() < 5.0 && means[2] > 195.0);
        Ok(())
    }

    #[test]
    fn empty_sequence() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        assert!(matches!(
            ImageSequenceReader::new(tmp_dir.path()),
            Err(IoError::EmptySequence(_))
        ));
        Ok(())
    }

    #[test]
    fn writer_rejects_other_sizes() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let size = ImageSize {
            width: 4,
            height: 4,
        };
        let mut writer = ImageSequenceWriter::new(tmp_dir.path(), "f")?.with_expected_size(size);
        let other = Image::from_size_val(
            ImageSize {
                width: 5,
                height: 4,
            },
            0,
        )?;
        assert!(matches!(
            writer.write_frame(&other),
            Err(IoError::FrameSizeMismatch { .. })
        ));
        Ok(())
    }
}
