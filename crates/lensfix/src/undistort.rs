use std::path::{Path, PathBuf};

use lensfix_image::Image;
use lensfix_imgproc::calibration::distortion::{generate_correction_map_polynomial, UndistortMap};
use lensfix_imgproc::calibration::{CameraIntrinsic, PolynomialDistortion};
use lensfix_imgproc::interpolation::{remap, InterpolationMode};
use lensfix_io::calibration::{read_camera_matrix, read_distortion_coefficients};
use lensfix_io::sequence::ImageSequenceWriter;
use lensfix_io::{create_video_sink, open_frame_source, FrameSink, FrameSource, VideoCodec};

use crate::calibrate::suffixed;
use crate::cancel::CancelToken;
use crate::collect::{trimmed_frame_count, PROGRESS_INTERVAL};
use crate::error::UndistortError;

/// Options of an undistortion run.
#[derive(Debug, Clone, PartialEq)]
pub struct UndistortConfig {
    /// Frame rate of the written video. The rate of the input is used when `None`.
    pub fps: Option<u32>,
    /// Encoding of the written video.
    pub codec: VideoCodec,
    /// Also write every undistorted frame as a JPEG.
    pub raw: bool,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            fps: None,
            codec: VideoCodec::H264,
            raw: false,
        }
    }
}

impl UndistortConfig {
    /// Set the frame rate of the written video.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Set the encoding of the written video.
    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Enable the raw frame export.
    pub fn with_raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    /// Check the options before anything is read.
    pub fn validate(&self) -> Result<(), UndistortError> {
        if self.fps == Some(0) {
            return Err(UndistortError::InvalidConfig(
                "fps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The frame rate to write at: the configured one, else the rate reported by the
    /// input rounded to whole frames.
    pub fn resolve_fps(&self, source_fps: Option<f64>) -> Result<u32, UndistortError> {
        if let Some(fps) = self.fps {
            return Ok(fps);
        }
        match source_fps {
            Some(fps) if fps.is_finite() && fps >= 0.5 => Ok(fps.round() as u32),
            _ => Err(UndistortError::InvalidConfig(
                "no fps given and the input reports no frame rate".to_string(),
            )),
        }
    }
}

/// The files written by an undistortion run on `<video>`.
#[derive(Debug, Clone, PartialEq)]
pub struct UndistortOutputs {
    /// `<video>_undistort.m4v`, or `.avi` for uncompressed output.
    pub video: PathBuf,
    /// `<video>_raw`, holding `<name>_NNNN.jpg` where `<name>` is the file name of
    /// the input.
    pub raw_dir: PathBuf,
    /// Prefix of the raw frame files.
    pub raw_prefix: String,
}

impl UndistortOutputs {
    /// The output paths for `video` written with `codec`.
    pub fn for_video(video: impl AsRef<Path>, codec: VideoCodec) -> Self {
        let video = video.as_ref();
        let raw_prefix = video
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string());
        Self {
            video: suffixed(video, &format!("_undistort.{}", codec.extension())),
            raw_dir: suffixed(video, "_raw"),
            raw_prefix,
        }
    }
}

/// Outcome of an undistortion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndistortSummary {
    /// Number of frames written.
    pub frames_written: usize,
    /// Whether the run stopped on the cancel token.
    pub cancelled: bool,
}

/// Load the camera written by a calibration run.
pub fn load_calibration(
    camera_matrix: impl AsRef<Path>,
    distortion_coefficients: impl AsRef<Path>,
) -> Result<(CameraIntrinsic, PolynomialDistortion), UndistortError> {
    let k = read_camera_matrix(camera_matrix)?;
    let d = read_distortion_coefficients(distortion_coefficients)?;
    if k[0][0] <= 0.0 || k[1][1] <= 0.0 {
        return Err(UndistortError::InvalidConfig(format!(
            "focal lengths must be positive, got {} and {}",
            k[0][0], k[1][1]
        )));
    }
    Ok((
        CameraIntrinsic::from_matrix(&k),
        PolynomialDistortion::from_coefficients(d),
    ))
}

/// Undistort every frame of `source` into `sink`, and into `raw` when given.
///
/// Frames are remapped with bilinear sampling; pixels mapped outside the input are
/// black. When the source reports a frame count only the first
/// [`trimmed_frame_count`] frames are processed. A frame that fails to decode ends
/// the run. The sinks are finished whether the run succeeds or not, so frames
/// written before a cancellation or an error are kept.
pub fn undistort_frames(
    source: &mut dyn FrameSource,
    map: &UndistortMap,
    sink: &mut dyn FrameSink,
    mut raw: Option<&mut dyn FrameSink>,
    cancel: &CancelToken,
) -> Result<UndistortSummary, UndistortError> {
    let outcome = remap_frames(source, map, sink, raw.as_deref_mut(), cancel);

    let sink_finished = sink.finish();
    let raw_finished = raw.map_or(Ok(()), |raw| raw.finish());

    let summary = outcome?;
    sink_finished?;
    raw_finished?;
    Ok(summary)
}

fn remap_frames(
    source: &mut dyn FrameSource,
    map: &UndistortMap,
    sink: &mut dyn FrameSink,
    mut raw: Option<&mut (dyn FrameSink + '_)>,
    cancel: &CancelToken,
) -> Result<UndistortSummary, UndistortError> {
    let expected = map.size();
    let limit = source.frame_count().map(trimmed_frame_count);
    match limit {
        Some(limit) => log::info!("Num Frames = {limit}"),
        None => log::info!("Num Frames = unknown"),
    }

    let mut undistorted = Image::<u8, 3>::from_size_val(expected, 0)?;
    let mut index = 0;
    let mut cancelled = false;

    loop {
        if cancel.is_cancelled() {
            log::info!("cancelled after {index} frames");
            cancelled = true;
            break;
        }
        if limit.is_some_and(|limit| index >= limit) {
            break;
        }
        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                log::warn!("no frame {index}, stopping early: {e}");
                break;
            }
        };
        if frame.size() != expected {
            return Err(UndistortError::FrameSize {
                index,
                expected,
                actual: frame.size(),
            });
        }

        remap(
            &frame,
            &mut undistorted,
            &map.map_x,
            &map.map_y,
            InterpolationMode::Bilinear,
            [0, 0, 0],
        )?;
        sink.write_frame(&undistorted)?;
        if let Some(raw) = raw.as_mut() {
            raw.write_frame(&undistorted)?;
        }

        index += 1;
        if index % PROGRESS_INTERVAL == 0 {
            log::info!("Frame: {index}");
        }
    }

    Ok(UndistortSummary {
        frames_written: index,
        cancelled,
    })
}

/// Undistort `video` with the camera stored in the two calibration files.
///
/// The calibration files and the options are checked before the video is opened.
/// The output is written to [`UndistortOutputs::for_video`].
pub fn undistort_video(
    video: impl AsRef<Path>,
    camera_matrix: impl AsRef<Path>,
    distortion_coefficients: impl AsRef<Path>,
    config: &UndistortConfig,
    cancel: &CancelToken,
) -> Result<UndistortSummary, UndistortError> {
    let video = video.as_ref();
    config.validate()?;
    let (intrinsic, distortion) = load_calibration(camera_matrix, distortion_coefficients)?;

    let mut source = open_frame_source(video)?;
    let size = source.frame_size();
    let fps = config.resolve_fps(source.fps())?;
    log::info!(
        "Video: {} ({}x{}), frame rate = {fps} frames per sec",
        video.display(),
        size.width,
        size.height,
    );

    let map = generate_correction_map_polynomial(&intrinsic, &distortion, size)?;

    let outputs = UndistortOutputs::for_video(video, config.codec);
    let mut raw = if config.raw {
        log::info!("Will be saving raw images to {}", outputs.raw_dir.display());
        let writer = ImageSequenceWriter::new(&outputs.raw_dir, &outputs.raw_prefix)?;
        Some(writer.with_expected_size(size))
    } else {
        None
    };
    let mut sink = create_video_sink(&outputs.video, config.codec, fps, size)?;

    let summary = undistort_frames(
        source.as_mut(),
        &map,
        sink.as_mut(),
        raw.as_mut().map(|raw| raw as &mut dyn FrameSink),
        cancel,
    )?;
    log::info!(
        "wrote {} frames to {}",
        summary.frames_written,
        outputs.video.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lensfix_image::{ImageError, ImageSize};
    use lensfix_io::IoError;

    struct Frames {
        frames: Vec<Image<u8, 3>>,
        reported: Option<usize>,
    }

    impl FrameSource for Frames {
        fn frame_size(&self) -> ImageSize {
            self.frames
                .first()
                .map(|f| f.size())
                .unwrap_or(ImageSize {
                    width: 0,
                    height: 0,
                })
        }

        fn frame_count(&self) -> Option<usize> {
            self.reported
        }

        fn fps(&self) -> Option<f64> {
            Some(30.0)
        }

        fn read_frame(&mut self) -> Result<Option<Image<u8, 3>>, IoError> {
            if self.frames.is_empty() {
                return Ok(None);
            }
            Ok(Some(self.frames.remove(0)))
        }
    }

    #[derive(Default)]
    struct Collected {
        frames: Vec<Image<u8, 3>>,
        finished: bool,
    }

    impl FrameSink for Collected {
        fn write_frame(&mut self, frame: &Image<u8, 3>) -> Result<(), IoError> {
            self.frames.push(frame.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<(), IoError> {
            self.finished = true;
            Ok(())
        }
    }

    fn gradient(size: ImageSize, offset: usize) -> Result<Image<u8, 3>, ImageError> {
        let data = (0..size.width * size.height * 3)
            .map(|i| ((i + offset) % 251) as u8)
            .collect();
        Image::new(size, data)
    }

    fn intrinsic() -> CameraIntrinsic {
        CameraIntrinsic {
            fx: 40.0,
            fy: 40.0,
            cx: 15.5,
            cy: 11.5,
        }
    }

    #[test]
    fn zero_distortion_reproduces_frames() -> Result<(), UndistortError> {
        let size = ImageSize {
            width: 32,
            height: 24,
        };
        let inputs = (0..3)
            .map(|i| gradient(size, i * 7))
            .collect::<Result<Vec<_>, _>>()?;
        let mut source = Frames {
            frames: inputs.clone(),
            reported: None,
        };
        let map = generate_correction_map_polynomial(
            &intrinsic(),
            &PolynomialDistortion::default(),
            size,
        )?;

        let mut sink = Collected::default();
        let mut raw = Collected::default();
        let summary = undistort_frames(
            &mut source,
            &map,
            &mut sink,
            Some(&mut raw),
            &CancelToken::new(),
        )?;

        assert_eq!(summary.frames_written, 3);
        assert!(!summary.cancelled);
        assert!(sink.finished && raw.finished);
        assert_eq!(sink.frames, inputs);
        assert_eq!(raw.frames, inputs);
        Ok(())
    }

    #[test]
    fn strong_distortion_blackens_the_border() -> Result<(), UndistortError> {
        let size = ImageSize {
            width: 32,
            height: 24,
        };
        let frame = Image::<u8, 3>::from_size_val(size, 200)?;
        let mut source = Frames {
            frames: vec![frame],
            reported: None,
        };
        // corner pixels sample far outside the frame
        let distortion = PolynomialDistortion::from_coefficients([2.0, 0.0, 0.0, 0.0, 0.0]);
        let map = generate_correction_map_polynomial(&intrinsic(), &distortion, size)?;

        let mut sink = Collected::default();
        undistort_frames(&mut source, &map, &mut sink, None, &CancelToken::new())?;

        let out = &sink.frames[0];
        assert_eq!(out.get_pixel(0, 0, 0)?, 0);
        assert_eq!(out.get_pixel(15, 11, 1)?, 200);
        Ok(())
    }

    #[test]
    fn reported_count_and_cancellation() -> Result<(), UndistortError> {
        let size = ImageSize {
            width: 8,
            height: 6,
        };
        let frames = (0..10)
            .map(|i| gradient(size, i))
            .collect::<Result<Vec<_>, _>>()?;
        let map =
            generate_correction_map_polynomial(&intrinsic(), &PolynomialDistortion::default(), size)?;

        let mut source = Frames {
            frames: frames.clone(),
            reported: Some(10),
        };
        let mut sink = Collected::default();
        let summary = undistort_frames(&mut source, &map, &mut sink, None, &CancelToken::new())?;
        assert_eq!(summary.frames_written, 9);

        let cancel = CancelToken::new();
        cancel.cancel();
        let mut source = Frames {
            frames,
            reported: None,
        };
        let mut sink = Collected::default();
        let summary = undistort_frames(&mut source, &map, &mut sink, None, &cancel)?;
        assert_eq!(summary.frames_written, 0);
        assert!(summary.cancelled);
        assert!(sink.finished);
        Ok(())
    }

    #[test]
    fn frame_size_mismatch() -> Result<(), UndistortError> {
        let map = generate_correction_map_polynomial(
            &intrinsic(),
            &PolynomialDistortion::default(),
            ImageSize {
                width: 8,
                height: 6,
            },
        )?;
        let mut source = Frames {
            frames: vec![Image::from_size_val(
                ImageSize {
                    width: 4,
                    height: 4,
                },
                0,
            )?],
            reported: None,
        };
        let mut sink = Collected::default();
        let mut raw = Collected::default();
        let result = undistort_frames(
            &mut source,
            &map,
            &mut sink,
            Some(&mut raw),
            &CancelToken::new(),
        );
        assert!(matches!(
            result,
            Err(UndistortError::FrameSize { index: 0, .. })
        ));
        assert!(sink.finished && raw.finished);
        Ok(())
    }

    struct Full;

    impl FrameSink for Full {
        fn write_frame(&mut self, _frame: &Image<u8, 3>) -> Result<(), IoError> {
            Err(std::io::Error::other("no space left on device").into())
        }

        fn finish(&mut self) -> Result<(), IoError> {
            Ok(())
        }
    }

    #[test]
    fn failed_raw_write_still_finishes_the_video() -> Result<(), UndistortError> {
        let size = ImageSize {
            width: 8,
            height: 6,
        };
        let map = generate_correction_map_polynomial(
            &intrinsic(),
            &PolynomialDistortion::default(),
            size,
        )?;
        let mut source = Frames {
            frames: vec![gradient(size, 0)?, gradient(size, 1)?],
            reported: None,
        };
        let mut sink = Collected::default();
        let result = undistort_frames(
            &mut source,
            &map,
            &mut sink,
            Some(&mut Full),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(UndistortError::Io(_))));
        // the first frame reached the video before the raw export failed
        assert_eq!(sink.frames.len(), 1);
        assert!(sink.finished);
        Ok(())
    }

    #[test]
    fn fps_falls_back_to_the_input_rate() -> Result<(), UndistortError> {
        let config = UndistortConfig::default();
        assert_eq!(config.resolve_fps(Some(29.97))?, 30);
        assert_eq!(config.clone().with_fps(25).resolve_fps(Some(30.0))?, 25);
        assert!(matches!(
            config.resolve_fps(None),
            Err(UndistortError::InvalidConfig(_))
        ));
        assert!(matches!(
            config.resolve_fps(Some(0.0)),
            Err(UndistortError::InvalidConfig(_))
        ));
        Ok(())
    }

    #[test]
    fn output_paths() {
        let outputs = UndistortOutputs::for_video("clips/run1.MP4", VideoCodec::H264);
        assert_eq!(outputs.video, PathBuf::from("clips/run1.MP4_undistort.m4v"));
        assert_eq!(outputs.raw_dir, PathBuf::from("clips/run1.MP4_raw"));
        assert_eq!(outputs.raw_prefix, "run1.MP4");

        let outputs = UndistortOutputs::for_video("run1.MP4", VideoCodec::Raw);
        assert_eq!(outputs.video, PathBuf::from("run1.MP4_undistort.avi"));
    }

    #[test]
    fn invalid_fps_is_rejected_first() {
        let result = undistort_video(
            "/nonexistent/video.mp4",
            "/nonexistent/k.csv",
            "/nonexistent/d.csv",
            &UndistortConfig::default().with_fps(0),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(UndistortError::InvalidConfig(_))));
    }
}
