mod init;
mod refine;

pub use init::{init_intrinsics, init_pose};
pub use refine::{ReprojectionFactor, CAMERA_PARAMS_DIM, POSE_PARAMS_DIM};

use lensfix_image::ImageSize;
use lensfix_imgproc::calibration::{CameraIntrinsic, PolynomialDistortion};

use crate::camera::{project_target_point, CameraPose};
use crate::optim::{LevenbergMarquardt, OptimizerError, Problem, ProblemError, TerminationReason};
use crate::pose::{homography_dlt, HomographyError};

/// Errors of the camera calibration.
#[derive(thiserror::Error, Debug)]
pub enum CalibError {
    /// No views were given.
    #[error("no calibration views")]
    NoViews,

    /// The object and image points of a view do not match.
    #[error("view {view}: {object} object points but {image} image points")]
    MismatchedPoints {
        /// The index of the view.
        view: usize,
        /// The number of object points.
        object: usize,
        /// The number of image points.
        image: usize,
    },

    /// The object points of a view do not lie on the Z=0 plane.
    #[error("view {0}: object points are not on the Z=0 plane")]
    NonPlanarTarget(usize),

    /// The homography of a view could not be estimated.
    #[error("view {view}: {source}")]
    Homography {
        /// The index of the view.
        view: usize,
        /// The underlying error.
        source: HomographyError,
    },

    /// The initial pose of a view could not be recovered.
    #[error("view {0}: degenerate initial pose")]
    DegeneratePose(usize),

    /// The image size is empty.
    #[error("invalid image size {0}x{1}")]
    InvalidImageSize(usize, usize),

    /// Building the optimization problem failed.
    #[error(transparent)]
    Problem(#[from] ProblemError),

    /// The non-linear refinement failed.
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),
}

/// Parameters of the calibration refinement.
#[derive(Debug, Clone)]
pub struct CalibrationParams {
    /// Maximum number of Levenberg-Marquardt iterations.
    pub max_iterations: usize,
    /// Stop when the update norm relative to the parameter norm drops below this.
    pub step_tolerance: f64,
    /// Stop when the relative cost decrease drops below this.
    pub cost_tolerance: f64,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            step_tolerance: 1e-10,
            cost_tolerance: 1e-12,
        }
    }
}

impl CalibrationParams {
    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the relative step tolerance.
    pub fn with_step_tolerance(mut self, step_tolerance: f64) -> Self {
        self.step_tolerance = step_tolerance;
        self
    }

    /// Set the relative cost tolerance.
    pub fn with_cost_tolerance(mut self, cost_tolerance: f64) -> Self {
        self.cost_tolerance = cost_tolerance;
        self
    }
}

/// Result of the camera calibration.
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    /// The estimated camera intrinsics.
    pub intrinsic: CameraIntrinsic,
    /// The estimated lens distortion.
    pub distortion: PolynomialDistortion,
    /// The pose of the target in every view.
    pub poses: Vec<CameraPose>,
    /// Root mean square reprojection error in pixels over all points.
    pub rms_error: f64,
    /// Number of solver iterations.
    pub iterations: usize,
    /// Why the solver stopped.
    pub termination: TerminationReason,
}

/// Root mean square reprojection error over all points of all views.
///
/// Points projecting behind the camera are ignored.
pub fn rms_reprojection_error(
    object_points: &[Vec<[f64; 3]>],
    image_points: &[Vec<[f64; 2]>],
    poses: &[CameraPose],
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for ((object, image), pose) in object_points.iter().zip(image_points).zip(poses) {
        for (p, uv) in object.iter().zip(image) {
            if let Some(proj) = project_target_point(p, pose, intrinsic, distortion) {
                sum += (proj[0] - uv[0]).powi(2) + (proj[1] - uv[1]).powi(2);
                count += 1;
            }
        }
    }
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64).sqrt()
}

/// Calibrate a camera from views of a planar target.
///
/// Every view is initialised from its homography: Zhang's closed form gives the
/// intrinsics and each homography is decomposed into an initial pose, with zero
/// distortion. All views are then refined jointly with Levenberg-Marquardt over the
/// intrinsics, the five distortion coefficients and every pose, minimising the total
/// squared reprojection error.
///
/// # Arguments
///
/// * `object_points` - For every view, the target points on the Z=0 plane.
/// * `image_points` - For every view, the observed pixels of the target points.
/// * `image_size` - The size of the images.
/// * `params` - The refinement parameters.
///
/// # Returns
///
/// The calibration result. Reaching the iteration cap is not an error; check
/// [`CalibrationResult::termination`].
pub fn calibrate_camera(
    object_points: &[Vec<[f64; 3]>],
    image_points: &[Vec<[f64; 2]>],
    image_size: ImageSize,
    params: &CalibrationParams,
) -> Result<CalibrationResult, CalibError> {
    if object_points.is_empty() {
        return Err(CalibError::NoViews);
    }
    if image_size.width == 0 || image_size.height == 0 {
        return Err(CalibError::InvalidImageSize(
            image_size.width,
            image_size.height,
        ));
    }
    if object_points.len() != image_points.len() {
        return Err(CalibError::MismatchedPoints {
            view: object_points.len().min(image_points.len()),
            object: object_points.len(),
            image: image_points.len(),
        });
    }

    // 1. homographies from the target plane to the image
    let mut homographies = Vec::with_capacity(object_points.len());
    for (view, (object, image)) in object_points.iter().zip(image_points).enumerate() {
        if object.len() != image.len() {
            return Err(CalibError::MismatchedPoints {
                view,
                object: object.len(),
                image: image.len(),
            });
        }
        if object.iter().any(|p| p[2].abs() > 1e-9) {
            return Err(CalibError::NonPlanarTarget(view));
        }
        let plane = object.iter().map(|p| [p[0], p[1]]).collect::<Vec<_>>();
        let h = homography_dlt(&plane, image)
            .map_err(|source| CalibError::Homography { view, source })?;
        homographies.push(h);
    }

    // 2. closed form initialization
    let intrinsic = init_intrinsics(&homographies, image_size);
    let poses = homographies
        .iter()
        .enumerate()
        .map(|(view, h)| init_pose(h, &intrinsic).ok_or(CalibError::DegeneratePose(view)))
        .collect::<Result<Vec<_>, _>>()?;

    let distortion = PolynomialDistortion::default();
    log::debug!(
        "initial rms reprojection error: {:.4} px",
        rms_reprojection_error(object_points, image_points, &poses, &intrinsic, &distortion)
    );

    // 3. joint refinement
    let mut problem = Problem::new();
    problem.add_variable("camera", refine::camera_params(&intrinsic, &distortion))?;
    let pose_names = (0..poses.len())
        .map(|view| format!("pose_{view}"))
        .collect::<Vec<_>>();
    for (name, pose) in pose_names.iter().zip(poses.iter()) {
        problem.add_variable(name, refine::pose_params(pose))?;
    }
    for ((object, image), name) in object_points.iter().zip(image_points).zip(&pose_names) {
        for (p, uv) in object.iter().zip(image) {
            problem.add_factor(
                Box::new(ReprojectionFactor::new(*p, *uv)),
                &["camera", name.as_str()],
            )?;
        }
    }

    let optimizer = LevenbergMarquardt::default()
        .with_max_iterations(params.max_iterations)
        .with_step_tolerance(params.step_tolerance)
        .with_cost_tolerance(params.cost_tolerance);
    let summary = optimizer.optimize(&mut problem)?;

    let camera = problem
        .variable("camera")
        .ok_or_else(|| ProblemError::VariableNotFound {
            name: "camera".to_string(),
        })?;
    let (intrinsic, distortion) = refine::unpack_camera(camera)
        .map_err(|e| CalibError::Problem(ProblemError::Factor(e)))?;

    let mut refined_poses = Vec::with_capacity(pose_names.len());
    for name in &pose_names {
        let values = problem
            .variable(name)
            .ok_or_else(|| ProblemError::VariableNotFound { name: name.clone() })?;
        let pose =
            refine::unpack_pose(values).map_err(|e| CalibError::Problem(ProblemError::Factor(e)))?;
        refined_poses.push(pose);
    }

    let rms_error = rms_reprojection_error(
        object_points,
        image_points,
        &refined_poses,
        &intrinsic,
        &distortion,
    );
    log::debug!(
        "calibration finished after {} iterations ({}), rms {rms_error:.4} px",
        summary.iterations,
        summary.termination_reason
    );

    Ok(CalibrationResult {
        intrinsic,
        distortion,
        poses: refined_poses,
        rms_error,
        iterations: summary.iterations,
        termination: summary.termination_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibrate_camera_errors() {
        let size = ImageSize {
            width: 640,
            height: 480,
        };
        let params = CalibrationParams::default();
        assert!(matches!(
            calibrate_camera(&[], &[], size, &params),
            Err(CalibError::NoViews)
        ));

        let object = vec![vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]];
        let image = vec![vec![[0.0, 0.0]]];
        assert!(matches!(
            calibrate_camera(&object, &image, size, &params),
            Err(CalibError::MismatchedPoints { view: 0, .. })
        ));

        let object = vec![vec![[0.0, 0.0, 1.0]; 4]];
        let image = vec![vec![[0.0, 0.0]; 4]];
        assert!(matches!(
            calibrate_camera(&object, &image, size, &params),
            Err(CalibError::NonPlanarTarget(0))
        ));

        let object = vec![vec![[0.0, 0.0, 0.0]; 3]];
        let image = vec![vec![[0.0, 0.0]; 3]];
        assert!(matches!(
            calibrate_camera(&object, &image, size, &params),
            Err(CalibError::Homography {
                view: 0,
                source: HomographyError::NotEnoughPoints(3)
            })
        ));

        // a single line of intersections
        let object = vec![(0..9).map(|i| [i as f64, 0.0, 0.0]).collect::<Vec<_>>()];
        let image = vec![(0..9)
            .map(|i| [100.0 + 20.0 * i as f64, 200.0 + 3.0 * i as f64])
            .collect::<Vec<_>>()];
        assert!(matches!(
            calibrate_camera(&object, &image, size, &params),
            Err(CalibError::Homography {
                view: 0,
                source: HomographyError::Degenerate
            })
        ));
    }
}
