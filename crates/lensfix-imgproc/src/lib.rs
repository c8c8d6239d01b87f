#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// camera models, checkerboard detection and undistortion maps.
pub mod calibration;

/// color transformations module.
pub mod color;

/// connected components labelling.
pub mod components;

/// utilities to draw on images.
pub mod draw;

/// utilities for interpolation.
pub mod interpolation;

/// morphological operations.
pub mod morphology;

/// module containing parallization utilities.
pub mod parallel;

/// operations to threshold images.
pub mod threshold;
