#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Planar-target camera calibration.
pub mod calibration;

/// Pinhole camera projection.
pub mod camera;

/// Linear algebra utilities.
pub mod linalg;

/// Non-linear least squares optimization.
pub mod optim;

/// Pose estimation algorithms.
pub mod pose;

/// Synthetic planar targets and camera poses.
pub mod synthetic;

/// 3D transforms algorithms.
pub mod transforms;
