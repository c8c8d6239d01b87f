//! Pixel interpolation methods used when resampling images.
//!
//! - **Nearest**: uses the nearest pixel value (no interpolation)
//! - **Bilinear**: linear interpolation between the four surrounding pixels

mod bilinear;

/// Grid generation and coordinate mapping utilities.
pub mod grid;

mod interpolate;
mod nearest;
mod remap;

pub use interpolate::{interpolate_pixel, InterpolationMode};
pub use remap::remap;

pub(crate) use bilinear::bilinear_interpolation;
