//! Factor trait for non-linear least squares problems.
//!
//! Factors represent measurements connecting one or more variables. Each factor
//! computes a residual and optionally the Jacobian with respect to the connected
//! variables.

use thiserror::Error;

/// Errors raised while evaluating a factor.
#[derive(Debug, Error)]
pub enum FactorError {
    /// Invalid dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The expected dimension.
        expected: usize,
        /// The dimension that was given.
        actual: usize,
    },

    /// Numerical instability detected
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),
}

/// Result type for factor operations
pub type FactorResult<T> = Result<T, FactorError>;

/// Output of factor linearization
#[derive(Debug, Clone)]
pub struct LinearizationResult {
    /// Residual vector (error)
    pub residual: Vec<f64>,
    /// Jacobian matrix (row-major, flattened)
    /// Shape: (residual_dim, total_local_dim)
    pub jacobian: Option<Vec<f64>>,
    /// Total local dimension (number of Jacobian columns)
    pub total_local_dim: usize,
}

impl LinearizationResult {
    /// Create a new linearization result
    pub fn new(residual: Vec<f64>, jacobian: Option<Vec<f64>>, total_local_dim: usize) -> Self {
        Self {
            residual,
            jacobian,
            total_local_dim,
        }
    }

    /// Get the residual dimension
    pub fn residual_dim(&self) -> usize {
        self.residual.len()
    }
}

/// Trait for factor (measurement) implementations.
///
/// Factors must be `Send + Sync` so that the linear system can be built in parallel.
pub trait Factor: Send + Sync {
    /// Compute the residual and optionally the Jacobian at the given parameter values.
    ///
    /// # Arguments
    ///
    /// * `params` - One slice of values per connected variable.
    /// * `compute_jacobian` - Whether to compute the Jacobian matrix.
    fn linearize(&self, params: &[&[f64]], compute_jacobian: bool)
        -> FactorResult<LinearizationResult>;

    /// Get the dimension of the residual vector.
    fn residual_dim(&self) -> usize;

    /// Get the number of variables this factor connects.
    fn num_variables(&self) -> usize;

    /// Get the dimension of a specific connected variable.
    fn variable_local_dim(&self, idx: usize) -> usize;

    /// Get the total dimension of all connected variables.
    fn total_local_dim(&self) -> usize {
        (0..self.num_variables())
            .map(|i| self.variable_local_dim(i))
            .sum()
    }
}

/// Compute a Jacobian by central differences.
///
/// # Arguments
///
/// * `params` - The values of the connected variables.
/// * `residual_dim` - The dimension of the residual.
/// * `residual_fn` - Evaluates the residual for a set of variable values.
///
/// # Returns
///
/// The row-major `residual_dim x total_dim` Jacobian.
pub fn numerical_jacobian(
    params: &[&[f64]],
    residual_dim: usize,
    residual_fn: impl Fn(&[&[f64]]) -> FactorResult<Vec<f64>>,
) -> FactorResult<Vec<f64>> {
    let total_dim = params.iter().map(|p| p.len()).sum::<usize>();
    let mut jacobian = vec![0.0; residual_dim * total_dim];
    let mut owned = params.iter().map(|p| p.to_vec()).collect::<Vec<_>>();

    let mut col = 0;
    for var in 0..owned.len() {
        for k in 0..owned[var].len() {
            let x = owned[var][k];
            let h = 1e-6 * x.abs().max(1.0);

            owned[var][k] = x + h;
            let plus = {
                let views = owned.iter().map(|p| p.as_slice()).collect::<Vec<_>>();
                residual_fn(&views)?
            };
            owned[var][k] = x - h;
            let minus = {
                let views = owned.iter().map(|p| p.as_slice()).collect::<Vec<_>>();
                residual_fn(&views)?
            };
            owned[var][k] = x;

            if plus.len() != residual_dim || minus.len() != residual_dim {
                return Err(FactorError::DimensionMismatch {
                    expected: residual_dim,
                    actual: plus.len(),
                });
            }
            for r in 0..residual_dim {
                jacobian[r * total_dim + col] = (plus[r] - minus[r]) / (2.0 * h);
            }
            col += 1;
        }
    }

    Ok(jacobian)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_numerical_jacobian() -> FactorResult<()> {
        // r(a, b) = [a0 * b0, a1^2 + b0]
        let a = [2.0, 3.0];
        let b = [5.0];
        let jac = numerical_jacobian(&[&a, &b], 2, |p| {
            Ok(vec![p[0][0] * p[1][0], p[0][1] * p[0][1] + p[1][0]])
        })?;
        let expected = [5.0, 0.0, 2.0, 0.0, 6.0, 1.0];
        for (j, e) in jac.iter().zip(expected.iter()) {
            assert_relative_eq!(*j, *e, epsilon = 1e-6);
        }
        Ok(())
    }
}
