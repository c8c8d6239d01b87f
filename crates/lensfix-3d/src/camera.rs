use lensfix_imgproc::calibration::{distortion::distort_normalized, CameraIntrinsic, PolynomialDistortion};

use crate::linalg;
use crate::transforms::{rotation_from_rvec, rvec_from_rotation};

/// The pose of a calibration target in camera coordinates.
///
/// Maps target points into the camera frame: `X_cam = R * X_target + t`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    /// The rotation matrix of the target 3x3
    pub rotation: [[f64; 3]; 3],
    /// The translation vector of the target 3x1
    pub translation: [f64; 3],
}

impl CameraPose {
    /// Build a pose from a rotation vector and a translation.
    pub fn from_rvec_tvec(rvec: &[f64; 3], tvec: &[f64; 3]) -> Self {
        Self {
            rotation: rotation_from_rvec(rvec),
            translation: *tvec,
        }
    }

    /// The rotation as a rotation vector (axis scaled by angle).
    pub fn rvec(&self) -> [f64; 3] {
        rvec_from_rotation(&self.rotation)
    }

    /// Transform a target point into the camera frame.
    pub fn transform_point(&self, point: &[f64; 3]) -> [f64; 3] {
        let p = linalg::mat33_mul_vec3(&self.rotation, point);
        [
            p[0] + self.translation[0],
            p[1] + self.translation[1],
            p[2] + self.translation[2],
        ]
    }
}

/// Project a point in camera coordinates to pixel coordinates.
///
/// # Arguments
///
/// * `point` - The point in the camera frame.
/// * `intrinsic` - The intrinsic parameters of the camera.
/// * `distortion` - The lens distortion of the camera.
///
/// # Returns
///
/// The pixel coordinates, or `None` for points at or behind the camera centre.
pub fn project_point(
    point: &[f64; 3],
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> Option<[f64; 2]> {
    if point[2] <= f64::EPSILON {
        return None;
    }
    let (x, y) = (point[0] / point[2], point[1] / point[2]);
    let (xd, yd) = distort_normalized(x, y, distortion);
    Some([
        intrinsic.fx * xd + intrinsic.cx,
        intrinsic.fy * yd + intrinsic.cy,
    ])
}

/// Project a target point seen from the given pose.
pub fn project_target_point(
    point: &[f64; 3],
    pose: &CameraPose,
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> Option<[f64; 2]> {
    project_point(&pose.transform_point(point), intrinsic, distortion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_project_point() {
        let intrinsic = CameraIntrinsic {
            fx: 500.0,
            fy: 400.0,
            cx: 320.0,
            cy: 240.0,
        };
        let uv = project_point(&[1.0, -0.5, 2.0], &intrinsic, &PolynomialDistortion::default())
            .expect("in front");
        assert_relative_eq!(uv[0], 570.0);
        assert_relative_eq!(uv[1], 140.0);
        assert!(project_point(&[0.0, 0.0, -1.0], &intrinsic, &Default::default()).is_none());
    }

    #[test]
    fn test_pose_transform() {
        let pose = CameraPose::from_rvec_tvec(
            &[0.0, 0.0, std::f64::consts::FRAC_PI_2],
            &[0.0, 0.0, 5.0],
        );
        let p = pose.transform_point(&[1.0, 0.0, 0.0]);
        assert_relative_eq!(p[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[2], 5.0);
        assert_relative_eq!(pose.rvec()[2], std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
    }
}
