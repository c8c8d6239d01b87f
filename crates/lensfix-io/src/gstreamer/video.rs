use std::path::Path;

use gstreamer::prelude::*;
use lensfix_image::{Image, ImageSize};

use super::error::VideoError;
use crate::error::IoError;
use crate::frames::{FrameSink, FrameSource, VideoCodec};

// raw RGB rows are padded to four bytes in GStreamer buffers
fn rgb_stride(width: usize) -> usize {
    (width * 3 + 3) & !3
}

fn init_gstreamer() -> Result<(), VideoError> {
    // make sure that we do not initialize gstreamer several times
    if !gstreamer::INITIALIZED.load(std::sync::atomic::Ordering::Relaxed) {
        gstreamer::init()?;
    }
    Ok(())
}

/// Reads the frames of a video file sequentially as RGB images.
pub struct VideoReader {
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    size: ImageSize,
    fps: Option<f64>,
    frame_count: Option<usize>,
    first: Option<Image<u8, 3>>,
}

impl VideoReader {
    /// Open a video file and decode its first frame.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the video file to be read.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, VideoError> {
        init_gstreamer()?;

        let pipeline_str = format!(
            "filesrc location=\"{}\" ! \
            decodebin ! \
            videoconvert ! \
            video/x-raw,format=RGB ! \
            appsink name=sink sync=false",
            path.as_ref().to_string_lossy()
        );

        let pipeline = gstreamer::parse::launch(&pipeline_str)?
            .dynamic_cast::<gstreamer::Pipeline>()
            .map_err(VideoError::DowncastPipelineError)?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or(VideoError::GetElementByNameError)?
            .dynamic_cast::<gstreamer_app::AppSink>()
            .map_err(VideoError::DowncastPipelineError)?;

        pipeline.set_state(gstreamer::State::Playing)?;

        let sample = appsink.pull_sample().map_err(|_| VideoError::NoFrames)?;
        let (first, fps) = Self::extract_image_frame(&sample)?;

        let frame_count = fps.and_then(|fps| {
            let duration = pipeline.query_duration::<gstreamer::ClockTime>()?;
            Some((duration.nseconds() as f64 * 1e-9 * fps).round() as usize)
        });

        log::debug!(
            "opened video {}: {:?}, fps {fps:?}, frames {frame_count:?}",
            path.as_ref().display(),
            first.size()
        );

        Ok(Self {
            pipeline,
            appsink,
            size: first.size(),
            fps,
            frame_count,
            first: Some(first),
        })
    }

    /// Extracts the RGB image and the frame rate from a sample.
    fn extract_image_frame(
        sample: &gstreamer::Sample,
    ) -> Result<(Image<u8, 3>, Option<f64>), VideoError> {
        let caps = sample
            .caps()
            .ok_or_else(|| VideoError::GetCapsError("missing caps".to_string()))?;

        let structure = caps
            .structure(0)
            .ok_or_else(|| VideoError::GetCapsError("missing structure".to_string()))?;

        let height = structure
            .get::<i32>("height")
            .map_err(|e| VideoError::GetCapsError(e.to_string()))? as usize;

        let width = structure
            .get::<i32>("width")
            .map_err(|e| VideoError::GetCapsError(e.to_string()))? as usize;

        let fps = structure
            .get::<gstreamer::Fraction>("framerate")
            .ok()
            .filter(|f| f.numer() > 0 && f.denom() > 0)
            .map(|f| f.numer() as f64 / f.denom() as f64);

        let buffer = sample
            .buffer()
            .ok_or(VideoError::GetBufferError)?
            .map_readable()?;
        let data = buffer.as_slice();

        let row_len = width * 3;
        let stride = if height > 0 { data.len() / height } else { row_len };
        if stride < row_len {
            return Err(VideoError::InvalidImageFormat(format!(
                "buffer of {} bytes for a {width}x{height} RGB frame",
                data.len()
            )));
        }

        let pixels = data
            .chunks(stride)
            .take(height)
            .flat_map(|row| row[..row_len].iter().copied())
            .collect::<Vec<_>>();

        let image = Image::new(ImageSize { width, height }, pixels)
            .map_err(|e| VideoError::InvalidImageFormat(e.to_string()))?;
        Ok((image, fps))
    }
}

impl FrameSource for VideoReader {
    fn frame_size(&self) -> ImageSize {
        self.size
    }

    fn frame_count(&self) -> Option<usize> {
        self.frame_count
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn read_frame(&mut self) -> Result<Option<Image<u8, 3>>, IoError> {
        if let Some(first) = self.first.take() {
            return Ok(Some(first));
        }
        if self.appsink.is_eos() {
            return Ok(None);
        }
        match self.appsink.pull_sample() {
            Ok(sample) => {
                let (image, _) = Self::extract_image_frame(&sample)?;
                if image.size() != self.size {
                    return Err(IoError::FrameSizeMismatch {
                        expected: self.size,
                        actual: image.size(),
                    });
                }
                Ok(Some(image))
            }
            Err(_) if self.appsink.is_eos() => Ok(None),
            Err(e) => Err(VideoError::PullSampleError(e).into()),
        }
    }
}

impl Drop for VideoReader {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

/// Encodes RGB frames into a video file.
pub struct VideoWriter {
    pipeline: gstreamer::Pipeline,
    appsrc: gstreamer_app::AppSrc,
    fps: u32,
    size: ImageSize,
    counter: u64,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl VideoWriter {
    /// Create a new VideoWriter and start its pipeline.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to save the video file.
    /// * `codec` - The codec to use for the video writer.
    /// * `fps` - The frames per second of the video.
    /// * `size` - The size of the video.
    pub fn new(
        path: impl AsRef<Path>,
        codec: VideoCodec,
        fps: u32,
        size: ImageSize,
    ) -> Result<Self, VideoError> {
        if fps == 0 {
            return Err(VideoError::InvalidImageFormat(
                "the frame rate must be positive".to_string(),
            ));
        }
        init_gstreamer()?;

        let encoder = match codec {
            VideoCodec::H264 => {
                "video/x-raw,format=I420 ! x264enc ! video/x-h264,profile=main ! h264parse ! mp4mux"
            }
            VideoCodec::Raw => "video/x-raw,format=I420 ! avimux",
        };

        let pipeline_str = format!(
            "appsrc name=src ! \
            videoconvert ! {encoder} ! \
            filesink location=\"{}\"",
            path.as_ref().to_string_lossy()
        );

        let pipeline = gstreamer::parse::launch(&pipeline_str)?
            .dynamic_cast::<gstreamer::Pipeline>()
            .map_err(VideoError::DowncastPipelineError)?;

        let appsrc = pipeline
            .by_name("src")
            .ok_or(VideoError::GetElementByNameError)?
            .dynamic_cast::<gstreamer_app::AppSrc>()
            .map_err(VideoError::DowncastPipelineError)?;

        appsrc.set_format(gstreamer::Format::Time);

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .field("width", size.width as i32)
            .field("height", size.height as i32)
            .field("framerate", gstreamer::Fraction::new(fps as i32, 1))
            .build();

        appsrc.set_caps(Some(&caps));
        appsrc.set_property("block", true);

        pipeline.set_state(gstreamer::State::Playing)?;

        let bus = pipeline.bus().ok_or(VideoError::BusError)?;

        // watch the bus until EOS or an error
        let handle = std::thread::spawn(move || {
            for msg in bus.iter_timed(gstreamer::ClockTime::NONE) {
                match msg.view() {
                    gstreamer::MessageView::Eos(..) => {
                        log::debug!("gstreamer received EOS");
                        break;
                    }
                    gstreamer::MessageView::Error(err) => {
                        log::error!(
                            "Error from {:?}: {} ({:?})",
                            msg.src().map(|s| s.path_string()),
                            err.error(),
                            err.debug()
                        );
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(Self {
            pipeline,
            appsrc,
            fps,
            size,
            counter: 0,
            handle: Some(handle),
        })
    }

    /// Write an image to the video file.
    pub fn write(&mut self, img: &Image<u8, 3>) -> Result<(), VideoError> {
        if img.size() != self.size {
            return Err(VideoError::InvalidImageFormat(format!(
                "expected a {:?} frame, got {:?}",
                self.size,
                img.size()
            )));
        }

        let row_len = self.size.width * 3;
        let stride = rgb_stride(self.size.width);
        let data = if stride == row_len {
            img.as_slice().to_vec()
        } else {
            let mut padded = vec![0u8; stride * self.size.height];
            for (dst, src) in padded
                .chunks_mut(stride)
                .zip(img.as_slice().chunks(row_len))
            {
                dst[..row_len].copy_from_slice(src);
            }
            padded
        };

        let mut buffer = gstreamer::Buffer::from_mut_slice(data);

        let fps = self.fps as u64;
        let pts = gstreamer::ClockTime::from_nseconds(self.counter * 1_000_000_000 / fps);
        let duration = gstreamer::ClockTime::from_nseconds(1_000_000_000 / fps);

        let buffer_ref = buffer.get_mut().ok_or(VideoError::GetBufferError)?;
        buffer_ref.set_pts(Some(pts));
        buffer_ref.set_duration(Some(duration));

        self.counter += 1;

        self.appsrc.push_buffer(buffer)?;

        Ok(())
    }

    /// Close the video writer.
    ///
    /// Sends the end of stream, waits for the bus thread and sets the pipeline to null.
    pub fn close(&mut self) -> Result<(), VideoError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        self.appsrc.end_of_stream()?;

        if handle.join().is_err() {
            return Err(VideoError::JoinThreadError);
        }

        self.pipeline.set_state(gstreamer::State::Null)?;

        Ok(())
    }
}

impl FrameSink for VideoWriter {
    fn write_frame(&mut self, frame: &Image<u8, 3>) -> Result<(), IoError> {
        Ok(self.write(frame)?)
    }

    fn finish(&mut self) -> Result<(), IoError> {
        log::debug!("closing video after {} frames", self.counter);
        Ok(self.close()?)
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.close();
        }
    }
}
