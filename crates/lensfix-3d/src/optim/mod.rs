//! Non-linear least squares optimization.
//!
//! A [`Problem`] holds named euclidean variables and [`Factor`]s connecting them;
//! [`LevenbergMarquardt`] minimises the sum of squared residuals.

mod factor;
mod levenberg_marquardt;
mod problem;

pub use factor::{numerical_jacobian, Factor, FactorError, FactorResult, LinearizationResult};
pub use levenberg_marquardt::{
    LevenbergMarquardt, OptimizerError, OptimizerResult, TerminationReason,
};
pub use problem::{Problem, ProblemError};
