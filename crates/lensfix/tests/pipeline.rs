use std::collections::VecDeque;
use std::path::Path;

use approx::assert_relative_eq;
use lensfix::image::{Image, ImageSize};
use lensfix::imgproc::calibration::distortion::distort_normalized;
use lensfix::imgproc::calibration::CameraIntrinsic;
use lensfix::imgproc::color::rgb_from_gray;
use lensfix::io::calibration::read_camera_matrix;
use lensfix::io::functional::write_image_png_rgb8;
use lensfix::io::{FrameSource, IoError};
use lensfix::k3d::calibration::CalibrationParams;
use lensfix::k3d::camera::CameraPose;
use lensfix::k3d::synthetic::render_checkerboard;
use lensfix::{
    calibrate_dataset, calibrate_video, collect, CalibrationError, CalibrationReport,
    CalibrationRun, CancelToken, CollectorConfig, GridSpec,
};

const SIZE: ImageSize = ImageSize {
    width: 480,
    height: 360,
};
const SQUARE: f64 = 0.03;

fn camera() -> CameraIntrinsic {
    CameraIntrinsic {
        fx: 420.0,
        fy: 420.0,
        cx: 239.5,
        cy: 179.5,
    }
}

/// Where the centre of the board lands in the image `(u, v)`, its depth and its
/// rotation vector. The views cover the frame up to its edges with a white margin.
const VIEWS: [(f64, f64, f64, [f64; 3]); 12] = [
    (180.0, 137.0, 0.45, [0.35, -0.35, 0.05]),
    (300.0, 137.0, 0.45, [0.35, 0.35, -0.05]),
    (180.0, 223.0, 0.45, [-0.35, -0.35, -0.05]),
    (300.0, 223.0, 0.45, [-0.35, 0.35, 0.05]),
    (240.0, 180.0, 0.42, [0.45, 0.0, 0.1]),
    (240.0, 180.0, 0.42, [0.0, 0.45, -0.1]),
    (240.0, 130.0, 0.42, [0.3, 0.1, 0.0]),
    (240.0, 230.0, 0.42, [-0.3, -0.1, 0.0]),
    (182.0, 180.0, 0.43, [0.1, -0.3, 0.0]),
    (298.0, 180.0, 0.43, [-0.1, 0.3, 0.0]),
    (240.0, 180.0, 0.42, [-0.4, 0.2, 0.2]),
    (240.0, 180.0, 0.42, [0.2, -0.4, -0.2]),
];

fn poses() -> Vec<CameraPose> {
    let k = camera();
    let center = [4.0 * SQUARE, 2.5 * SQUARE, 0.0];
    VIEWS
        .iter()
        .map(|(u, v, depth, rvec)| {
            let rotated = CameraPose::from_rvec_tvec(rvec, &[0.0; 3]);
            let rc = rotated.transform_point(&center);
            let target = [depth * (u - k.cx) / k.fx, depth * (v - k.cy) / k.fy, *depth];
            CameraPose {
                rotation: rotated.rotation,
                translation: [target[0] - rc[0], target[1] - rc[1], target[2] - rc[2]],
            }
        })
        .collect()
}

fn rendered_frames() -> Result<Vec<Image<u8, 3>>, Box<dyn std::error::Error>> {
    let grid = GridSpec::default();
    let mut frames = Vec::with_capacity(VIEWS.len());
    for pose in poses() {
        let gray = render_checkerboard(
            grid.rows_internal,
            grid.cols_internal,
            SQUARE,
            &pose,
            &camera(),
            SIZE,
        )?;
        let mut rgb = Image::<u8, 3>::from_size_val(SIZE, 0)?;
        rgb_from_gray(&gray, &mut rgb)?;
        frames.push(rgb);
    }
    Ok(frames)
}

struct InMemory(VecDeque<Image<u8, 3>>);

impl FrameSource for InMemory {
    fn frame_size(&self) -> ImageSize {
        SIZE
    }

    fn frame_count(&self) -> Option<usize> {
        None
    }

    fn fps(&self) -> Option<f64> {
        Some(30.0)
    }

    fn read_frame(&mut self) -> Result<Option<Image<u8, 3>>, IoError> {
        Ok(self.0.pop_front())
    }
}

fn write_frames(dir: &Path, frames: &[Image<u8, 3>]) -> Result<(), IoError> {
    std::fs::create_dir_all(dir)?;
    for (i, frame) in frames.iter().enumerate() {
        write_image_png_rgb8(dir.join(format!("frame_{i:04}.png")), frame)?;
    }
    Ok(())
}

#[test]
fn calibrate_rendered_checkerboards() -> Result<(), Box<dyn std::error::Error>> {
    let frames = rendered_frames()?;
    let mut source = InMemory(frames.into());

    let grid = GridSpec::new(9, 6, SQUARE, SQUARE)?;
    let dataset = collect(&mut source, &grid, &CollectorConfig::default().with_seed(3))?;
    assert!(dataset.len() >= 10, "only {} boards found", dataset.len());
    assert_eq!(dataset.frames_scanned, VIEWS.len());

    let result = calibrate_dataset(&dataset, &CalibrationParams::default())?;
    let k = camera();
    assert_relative_eq!(result.intrinsic.fx, k.fx, max_relative = 5e-3);
    assert_relative_eq!(result.intrinsic.fy, k.fy, max_relative = 5e-3);
    assert_relative_eq!(result.intrinsic.cx, k.cx, epsilon = 5.0);
    assert_relative_eq!(result.intrinsic.cy, k.cy, epsilon = 5.0);
    assert!(result.rms_error < 0.5, "rms {}", result.rms_error);

    // the rendering camera has no lens distortion
    let d = &result.distortion;
    assert!(d.k1.abs() < 0.05, "k1 {}", d.k1);
    assert!(d.k2.abs() < 0.35, "k2 {}", d.k2);
    assert!(d.k3.abs() < 0.75, "k3 {}", d.k3);
    assert!(d.p1.abs() < 4e-3, "p1 {}", d.p1);
    assert!(d.p2.abs() < 4e-3, "p2 {}", d.p2);

    // and barely moves a point near the edge of the covered field
    let (x, y) = (0.4, 0.3);
    let (xd, yd) = distort_normalized(x, y, d);
    assert!((xd - x).hypot(yd - y) * k.fx < 0.5);
    Ok(())
}

#[test]
fn calibrate_frame_directory_writes_outputs() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let video = tmp.path().join("board");
    write_frames(&video, &rendered_frames()?)?;

    let run = CalibrationRun::default()
        .with_grid(GridSpec::new(9, 6, SQUARE, SQUARE)?)
        .with_collector(CollectorConfig::default().with_seed(11))
        .with_save_corners(true)
        .with_report(true);
    let summary = calibrate_video(&video, &run, &CancelToken::new())?;

    // 98% of the 12 reported frames
    assert_eq!(summary.frames_scanned, 11);
    assert!(summary.detections >= 9);

    let k = read_camera_matrix(tmp.path().join("board_camera_matrix.csv"))?;
    assert_relative_eq!(k[0][0], summary.result.intrinsic.fx, max_relative = 1e-12);
    assert_relative_eq!(k[2][2], 1.0);
    assert!(tmp.path().join("board_distortion_coefficients.csv").exists());

    let report = CalibrationReport::read_json(tmp.path().join("board_calibration.json"))?;
    assert_eq!(report.views_used, summary.views_used);
    assert_eq!(report.image_width, 480);
    assert_eq!(report.grid.rows_internal, 9);

    let overlays = std::fs::read_dir(tmp.path())?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().contains("_corner_"))
        .count();
    assert_eq!(overlays, summary.detections);
    Ok(())
}

#[test]
fn empty_corpus_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let video = tmp.path().join("blank");
    let white = Image::<u8, 3>::from_size_val(SIZE, 255)?;
    write_frames(&video, &[white.clone(), white.clone(), white])?;

    let run = CalibrationRun::default().with_save_corners(true).with_report(true);
    let result = calibrate_video(&video, &run, &CancelToken::new());
    assert!(matches!(result, Err(CalibrationError::EmptyCorpus)));

    // only the input directory is left
    assert_eq!(std::fs::read_dir(tmp.path())?.count(), 1);
    Ok(())
}
