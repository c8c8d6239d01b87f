use lensfix_image::{Image, ImageError, ImageSize};
use lensfix_imgproc::color::gray_from_rgb_u8;
use lensfix_io::FrameSource;
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::detector::{ChessboardDetector, CornerDetector};
use crate::error::CalibrationError;
use crate::grid::GridSpec;

/// Number of frames between two progress messages.
pub(crate) const PROGRESS_INTERVAL: usize = 100;

/// The number of frames scanned out of a reported frame count.
///
/// Only the first 98% are used, since the frame count stored in video containers is
/// often too large.
pub fn trimmed_frame_count(reported: usize) -> usize {
    reported * 98 / 100
}

/// The detected corners of one frame paired with the target points.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceSet {
    /// Zero based index of the frame in the source.
    pub frame_index: usize,
    /// The detected corners in pixels, in detection order.
    pub image_points: Vec<[f64; 2]>,
    /// The target points matching `image_points`.
    pub object_points: Vec<[f64; 3]>,
}

/// The correspondences kept for calibration.
#[derive(Debug, Clone)]
pub struct CalibrationDataset {
    /// The kept sets, in ascending frame order.
    pub sets: Vec<CorrespondenceSet>,
    /// The size of the frames.
    pub image_size: ImageSize,
    /// Number of frames read from the source.
    pub frames_scanned: usize,
    /// Number of frames with a detection, before subsampling.
    pub detections: usize,
}

impl CalibrationDataset {
    /// Number of kept views.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Whether no view was kept.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// The object points of every view.
    pub fn object_points(&self) -> Vec<Vec<[f64; 3]>> {
        self.sets.iter().map(|s| s.object_points.clone()).collect()
    }

    /// The image points of every view.
    pub fn image_points(&self) -> Vec<Vec<[f64; 2]>> {
        self.sets.iter().map(|s| s.image_points.clone()).collect()
    }

    /// The source frame index of every view.
    pub fn frame_indices(&self) -> Vec<usize> {
        self.sets.iter().map(|s| s.frame_index).collect()
    }
}

/// Options of the correspondence collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Maximum number of views kept for calibration.
    pub max_kept: usize,
    /// Seed of the subsampling. A random seed is drawn when `None`.
    pub seed: Option<u64>,
    /// Number of frames decoded before running the detector on them in parallel.
    pub batch_size: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_kept: 100,
            seed: None,
            batch_size: rayon::current_num_threads().max(1),
        }
    }
}

impl CollectorConfig {
    /// Set the maximum number of kept views.
    pub fn with_max_kept(mut self, max_kept: usize) -> Self {
        self.max_kept = max_kept;
        self
    }

    /// Set the seed of the subsampling.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the number of frames detected in parallel.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Check the options before any frame is read.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.max_kept == 0 {
            return Err(CalibrationError::InvalidConfig(
                "max_kept must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(CalibrationError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Collect checkerboard correspondences with the default chessboard detector.
///
/// See [`collect_with`].
pub fn collect(
    source: &mut dyn FrameSource,
    grid: &GridSpec,
    config: &CollectorConfig,
) -> Result<CalibrationDataset, CalibrationError> {
    collect_with(
        source,
        grid,
        &ChessboardDetector::default(),
        config,
        &CancelToken::new(),
        |_, _, _| Ok(()),
    )
}

/// Collect checkerboard correspondences from a frame source.
///
/// Frames are read in order until the source ends, a frame fails to decode, or the
/// cancel token is set. When the source reports a frame count only the first
/// [`trimmed_frame_count`] frames are scanned. Frames are decoded in batches of
/// `config.batch_size` and the detector runs on a batch in parallel; detections are
/// appended in frame order and `on_detection` is called for each of them.
///
/// When more than `config.max_kept` frames have a detection, a uniform sample of
/// `max_kept` of them is kept, in ascending frame order.
///
/// # Errors
///
/// Returns [`CalibrationError::EmptyCorpus`] if no frame contains the checkerboard,
/// and a configuration error before reading anything if `grid` or `config` is invalid.
pub fn collect_with<F>(
    source: &mut dyn FrameSource,
    grid: &GridSpec,
    detector: &dyn CornerDetector,
    config: &CollectorConfig,
    cancel: &CancelToken,
    mut on_detection: F,
) -> Result<CalibrationDataset, CalibrationError>
where
    F: FnMut(usize, &Image<u8, 3>, &[[f32; 2]]) -> Result<(), CalibrationError>,
{
    grid.validate()?;
    config.validate()?;

    let image_size = source.frame_size();
    let limit = source.frame_count().map(trimmed_frame_count);
    match limit {
        Some(limit) => log::info!("Num Frames = {limit}"),
        None => log::info!("Num Frames = unknown"),
    }

    let object_points = grid.object_points();
    let mut sets = Vec::new();
    let mut frame_index = 0;
    let mut exhausted = false;

    while !exhausted {
        let mut batch = Vec::with_capacity(config.batch_size);
        while batch.len() < config.batch_size {
            if cancel.is_cancelled() {
                log::info!("cancelled after {frame_index} frames");
                exhausted = true;
                break;
            }
            if limit.is_some_and(|limit| frame_index >= limit) {
                exhausted = true;
                break;
            }
            match source.read_frame() {
                Ok(Some(frame)) => {
                    batch.push((frame_index, frame));
                    frame_index += 1;
                    if frame_index % PROGRESS_INTERVAL == 0 {
                        log::info!("Frame: {frame_index}");
                    }
                }
                Ok(None) => {
                    exhausted = true;
                    break;
                }
                Err(e) => {
                    log::warn!("no frame {frame_index}, stopping early: {e}");
                    exhausted = true;
                    break;
                }
            }
        }

        let detections = batch
            .par_iter()
            .map(|(_, frame)| -> Result<Option<Vec<[f32; 2]>>, ImageError> {
                let mut gray = Image::<u8, 1>::from_size_val(frame.size(), 0)?;
                gray_from_rgb_u8(frame, &mut gray)?;
                detector.detect(&gray, grid)
            })
            .collect::<Vec<_>>();

        for ((index, frame), detection) in batch.iter().zip(detections) {
            let Some(corners) = detection? else {
                log::trace!("frame {index}: no checkerboard");
                continue;
            };
            if corners.len() != object_points.len() {
                log::warn!(
                    "frame {index}: detector returned {} corners, expected {}",
                    corners.len(),
                    object_points.len()
                );
                continue;
            }
            on_detection(*index, frame, &corners)?;
            sets.push(CorrespondenceSet {
                frame_index: *index,
                image_points: corners
                    .iter()
                    .map(|p| [p[0] as f64, p[1] as f64])
                    .collect(),
                object_points: object_points.clone(),
            });
        }
    }

    let detections = sets.len();
    log::info!("Found {detections} images with corners");
    if sets.is_empty() {
        return Err(CalibrationError::EmptyCorpus);
    }

    if sets.len() > config.max_kept {
        let seed = config.seed.unwrap_or_else(rand::random);
        log::info!(
            "Reducing the set of images with detected corners to {} images by random selection (seed {seed})",
            config.max_kept
        );
        sets = subsample(sets, config.max_kept, seed);
    }

    Ok(CalibrationDataset {
        sets,
        image_size,
        frames_scanned: frame_index,
        detections,
    })
}

/// Keep `amount` uniformly sampled items, in their original order.
fn subsample<T>(items: Vec<T>, amount: usize, seed: u64) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut selected = vec![false; items.len()];
    for i in rand::seq::index::sample(&mut rng, items.len(), amount).into_vec() {
        selected[i] = true;
    }
    items
        .into_iter()
        .zip(selected)
        .filter_map(|(item, keep)| keep.then_some(item))
        .collect()
}
