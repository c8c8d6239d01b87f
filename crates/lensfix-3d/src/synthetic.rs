//! Synthetic planar targets.
//!
//! Builds checkerboard intersection grids on the Z=0 plane, simple camera poses looking
//! at them, their projections, and rendered grayscale images of the board.

use lensfix_image::{Image, ImageError, ImageSize};
use lensfix_imgproc::calibration::{CameraIntrinsic, PolynomialDistortion};

use crate::camera::{project_target_point, CameraPose};
use crate::linalg;
use crate::transforms::rotation_from_rvec;

/// Generate the internal intersections of a checkerboard on the Z=0 plane.
///
/// Points are ordered row-major: index `c` lies at
/// `((c % points_per_row) * square_width, (c / points_per_row) * square_height, 0)`.
pub fn grid_points(
    points_per_row: usize,
    points_per_col: usize,
    square_width: f64,
    square_height: f64,
) -> Vec<[f64; 3]> {
    (0..points_per_row * points_per_col)
        .map(|c| {
            [
                (c % points_per_row) as f64 * square_width,
                (c / points_per_row) as f64 * square_height,
                0.0,
            ]
        })
        .collect()
}

/// Generate `n_views` poses looking at `center` from roughly `distance` away.
///
/// The target is tilted in a different direction for every view and slightly shifted
/// off the optical axis, which keeps the views well conditioned for calibration.
pub fn orbit_poses(n_views: usize, center: &[f64; 3], distance: f64) -> Vec<CameraPose> {
    (0..n_views)
        .map(|i| {
            let a = 2.0 * std::f64::consts::PI * i as f64 / n_views.max(1) as f64;
            let rvec = [0.3 * a.cos() + 0.05, 0.3 * a.sin(), 0.1 * (2.0 * a).sin()];
            let rotation = rotation_from_rvec(&rvec);
            let rc = linalg::mat33_mul_vec3(&rotation, center);
            let offset = [0.04 * distance * a.cos(), 0.03 * distance * a.sin(), distance];
            CameraPose {
                rotation,
                translation: [offset[0] - rc[0], offset[1] - rc[1], offset[2] - rc[2]],
            }
        })
        .collect()
}

/// Project every target point, or `None` if any point falls behind the camera.
pub fn project_view(
    object_points: &[[f64; 3]],
    pose: &CameraPose,
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> Option<Vec<[f64; 2]>> {
    object_points
        .iter()
        .map(|p| project_target_point(p, pose, intrinsic, distortion))
        .collect()
}

/// Render a checkerboard seen by an undistorted pinhole camera.
///
/// The board has `points_per_row x points_per_col` internal intersections, the first
/// one at the target origin, surrounded by a white margin. Every pixel averages a 4x4
/// grid of rays intersected with the target plane.
///
/// # Arguments
///
/// * `points_per_row` - Internal intersections along a row.
/// * `points_per_col` - Internal intersections along a column.
/// * `square` - The side of a square in target units.
/// * `pose` - The pose of the target in the camera frame.
/// * `intrinsic` - The camera intrinsics.
/// * `size` - The size of the rendered image.
pub fn render_checkerboard(
    points_per_row: usize,
    points_per_col: usize,
    square: f64,
    pose: &CameraPose,
    intrinsic: &CameraIntrinsic,
    size: ImageSize,
) -> Result<Image<u8, 1>, ImageError> {
    const SAMPLES: usize = 4;

    let rt = linalg::transpose_mat33(&pose.rotation);
    let normal = [pose.rotation[0][2], pose.rotation[1][2], pose.rotation[2][2]];
    let plane_d = linalg::dot_product3(&normal, &pose.translation);

    // board extent including the outer squares
    let (min_x, max_x) = (-square, points_per_row as f64 * square);
    let (min_y, max_y) = (-square, points_per_col as f64 * square);

    let shade = |u: f64, v: f64| -> f64 {
        let ray = [
            (u - intrinsic.cx) / intrinsic.fx,
            (v - intrinsic.cy) / intrinsic.fy,
            1.0,
        ];
        let denom = linalg::dot_product3(&normal, &ray);
        if denom.abs() < f64::EPSILON {
            return 1.0;
        }
        let s = plane_d / denom;
        if s <= 0.0 {
            return 1.0;
        }
        let p = [
            ray[0] * s - pose.translation[0],
            ray[1] * s - pose.translation[1],
            ray[2] * s - pose.translation[2],
        ];
        let x = linalg::mat33_mul_vec3(&rt, &p);
        if x[0] < min_x || x[0] >= max_x || x[1] < min_y || x[1] >= max_y {
            return 1.0;
        }
        let parity = (x[0] / square).floor() as i64 + (x[1] / square).floor() as i64;
        if parity.rem_euclid(2) == 0 {
            0.0
        } else {
            1.0
        }
    };

    let mut data = Vec::with_capacity(size.width * size.height);
    for row in 0..size.height {
        for col in 0..size.width {
            let mut acc = 0.0;
            for sy in 0..SAMPLES {
                for sx in 0..SAMPLES {
                    let u = col as f64 - 0.5 + (sx as f64 + 0.5) / SAMPLES as f64;
                    let v = row as f64 - 0.5 + (sy as f64 + 0.5) / SAMPLES as f64;
                    acc += shade(u, v);
                }
            }
            let value = acc / (SAMPLES * SAMPLES) as f64;
            data.push((value * 255.0).round() as u8);
        }
    }

    Image::new(size, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_grid_points_layout() {
        let points = grid_points(9, 6, 2.0, 3.0);
        assert_eq!(points.len(), 54);
        assert_eq!(points[0], [0.0, 0.0, 0.0]);
        assert_eq!(points[8], [16.0, 0.0, 0.0]);
        assert_eq!(points[9], [0.0, 3.0, 0.0]);
        assert_eq!(points[53], [16.0, 15.0, 0.0]);
    }

    #[test]
    fn test_orbit_poses_look_at_center() {
        let center = [0.1, 0.05, 0.0];
        for pose in orbit_poses(5, &center, 0.8) {
            let c = pose.transform_point(&center);
            assert_relative_eq!(c[2], 0.8, epsilon = 1e-12);
            assert!(c[0].abs() <= 0.04 * 0.8 + 1e-12);
        }
    }

    #[test]
    fn test_render_checkerboard_fronto_parallel() -> Result<(), ImageError> {
        let intrinsic = CameraIntrinsic {
            fx: 100.0,
            fy: 100.0,
            cx: 49.5,
            cy: 39.5,
        };
        // 10 px squares, first internal corner at pixel (29.5, 24.5)
        let pose = CameraPose {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [-0.2, -0.15, 1.0],
        };
        let size = ImageSize {
            width: 100,
            height: 80,
        };
        let img = render_checkerboard(5, 4, 0.1, &pose, &intrinsic, size)?;

        // margin, first square and its diagonal neighbour
        assert_eq!(img.get_pixel(2, 2, 0)?, 255);
        assert_eq!(img.get_pixel(34, 29, 0)?, 0);
        assert_eq!(img.get_pixel(24, 19, 0)?, 0);
        assert_eq!(img.get_pixel(34, 19, 0)?, 255);
        Ok(())
    }
}
