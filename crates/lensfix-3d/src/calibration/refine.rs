use lensfix_imgproc::calibration::{CameraIntrinsic, PolynomialDistortion};

use crate::camera::{project_point, CameraPose};
use crate::optim::{numerical_jacobian, Factor, FactorError, FactorResult, LinearizationResult};

/// Number of camera parameters: fx, fy, cx, cy, k1, k2, p1, p2, k3.
pub const CAMERA_PARAMS_DIM: usize = 9;

/// Number of pose parameters: rotation vector and translation.
pub const POSE_PARAMS_DIM: usize = 6;

// residual assigned to points that end up behind the camera during a trial step
const BEHIND_CAMERA_RESIDUAL: f64 = 1e6;

/// Pack intrinsics and distortion into the camera variable layout.
pub fn camera_params(intrinsic: &CameraIntrinsic, distortion: &PolynomialDistortion) -> Vec<f64> {
    let mut params = vec![intrinsic.fx, intrinsic.fy, intrinsic.cx, intrinsic.cy];
    params.extend_from_slice(&distortion.coefficients());
    params
}

/// Unpack the camera variable layout.
pub fn unpack_camera(params: &[f64]) -> FactorResult<(CameraIntrinsic, PolynomialDistortion)> {
    if params.len() != CAMERA_PARAMS_DIM {
        return Err(FactorError::DimensionMismatch {
            expected: CAMERA_PARAMS_DIM,
            actual: params.len(),
        });
    }
    let intrinsic = CameraIntrinsic {
        fx: params[0],
        fy: params[1],
        cx: params[2],
        cy: params[3],
    };
    let distortion =
        PolynomialDistortion::from_coefficients([params[4], params[5], params[6], params[7], params[8]]);
    Ok((intrinsic, distortion))
}

/// Pack a pose into the pose variable layout.
pub fn pose_params(pose: &CameraPose) -> Vec<f64> {
    let mut params = pose.rvec().to_vec();
    params.extend_from_slice(&pose.translation);
    params
}

/// Unpack the pose variable layout.
pub fn unpack_pose(params: &[f64]) -> FactorResult<CameraPose> {
    if params.len() != POSE_PARAMS_DIM {
        return Err(FactorError::DimensionMismatch {
            expected: POSE_PARAMS_DIM,
            actual: params.len(),
        });
    }
    Ok(CameraPose::from_rvec_tvec(
        &[params[0], params[1], params[2]],
        &[params[3], params[4], params[5]],
    ))
}

/// Reprojection error of one target point observed in one view.
///
/// Connects the shared camera variable and the pose variable of the view.
pub struct ReprojectionFactor {
    object: [f64; 3],
    observed: [f64; 2],
}

impl ReprojectionFactor {
    /// Create a factor for a target point and its observed pixel.
    pub fn new(object: [f64; 3], observed: [f64; 2]) -> Self {
        Self { object, observed }
    }

    fn residual(&self, params: &[&[f64]]) -> FactorResult<Vec<f64>> {
        let (intrinsic, distortion) = unpack_camera(params[0])?;
        let pose = unpack_pose(params[1])?;
        let residual = match project_point(&pose.transform_point(&self.object), &intrinsic, &distortion)
        {
            Some(uv) => vec![uv[0] - self.observed[0], uv[1] - self.observed[1]],
            None => vec![BEHIND_CAMERA_RESIDUAL; 2],
        };
        Ok(residual)
    }
}

impl Factor for ReprojectionFactor {
    fn linearize(
        &self,
        params: &[&[f64]],
        compute_jacobian: bool,
    ) -> FactorResult<LinearizationResult> {
        if params.len() != 2 {
            return Err(FactorError::DimensionMismatch {
                expected: 2,
                actual: params.len(),
            });
        }
        let residual = self.residual(params)?;
        let jacobian = if compute_jacobian {
            Some(numerical_jacobian(params, 2, |p| self.residual(p))?)
        } else {
            None
        };
        Ok(LinearizationResult::new(
            residual,
            jacobian,
            CAMERA_PARAMS_DIM + POSE_PARAMS_DIM,
        ))
    }

    fn residual_dim(&self) -> usize {
        2
    }

    fn num_variables(&self) -> usize {
        2
    }

    fn variable_local_dim(&self, idx: usize) -> usize {
        match idx {
            0 => CAMERA_PARAMS_DIM,
            _ => POSE_PARAMS_DIM,
        }
    }
}
