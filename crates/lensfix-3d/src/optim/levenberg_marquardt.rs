//! Levenberg-Marquardt optimizer for non-linear least squares problems.
//!
//! Solves the damped normal equations `(J^T J + λ diag(J^T J)) δ = -J^T r` and adapts
//! the damping depending on whether the step reduced the cost.

use faer::prelude::SpSolver;
use thiserror::Error;

use super::problem::{Problem, ProblemError};

/// Errors that can occur during optimization.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Problem-related error
    #[error("Problem error: {0}")]
    Problem(#[from] ProblemError),

    /// The problem has nothing to optimize.
    #[error("Empty problem: {0}")]
    EmptyProblem(&'static str),

    /// Numerical instability detected
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),
}

/// Reason why the optimizer terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Converged: relative step size below tolerance
    StepConverged,
    /// Converged: cost change below tolerance
    CostConverged,
    /// Converged: gradient norm below tolerance
    GradientConverged,
    /// Maximum iterations reached
    MaxIterations,
    /// Lambda exceeded maximum (likely numerical issues)
    LambdaMaxExceeded,
}

impl TerminationReason {
    /// Whether the optimizer stopped because a convergence criterion was met.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            Self::StepConverged | Self::CostConverged | Self::GradientConverged
        )
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::StepConverged => "step converged",
            Self::CostConverged => "cost converged",
            Self::GradientConverged => "gradient converged",
            Self::MaxIterations => "maximum iterations",
            Self::LambdaMaxExceeded => "damping limit exceeded",
        };
        write!(f, "{name}")
    }
}

/// Result of an optimization run.
#[derive(Debug, Clone)]
pub struct OptimizerResult {
    /// Cost before the first iteration
    pub initial_cost: f64,
    /// Final cost (sum of squared residuals)
    pub final_cost: f64,
    /// Number of iterations performed
    pub iterations: usize,
    /// Reason for termination
    pub termination_reason: TerminationReason,
}

/// Levenberg-Marquardt optimizer configuration.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    /// Initial damping parameter
    pub lambda_init: f64,
    /// Maximum damping parameter
    pub lambda_max: f64,
    /// Factor for lambda adaptation
    pub lambda_factor: f64,
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Convergence threshold for the step norm relative to the parameter norm
    pub step_tolerance: f64,
    /// Convergence threshold for the relative cost change
    pub cost_tolerance: f64,
    /// Convergence threshold for gradient norm
    pub gradient_tolerance: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            lambda_init: 1e-3,
            lambda_max: 1e10,
            lambda_factor: 10.0,
            max_iterations: 100,
            step_tolerance: 1e-10,
            cost_tolerance: 1e-12,
            gradient_tolerance: 1e-12,
        }
    }
}

impl LevenbergMarquardt {
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

    /// Set the relative cost change tolerance.
    pub fn with_cost_tolerance(mut self, cost_tolerance: f64) -> Self {
        self.cost_tolerance = cost_tolerance;
        self
    }

    /// Minimise the total cost of the problem, updating its variables in place.
    pub fn optimize(&self, problem: &mut Problem) -> Result<OptimizerResult, OptimizerError> {
        if problem.num_variables() == 0 || problem.total_dim() == 0 {
            return Err(OptimizerError::EmptyProblem("no variables in problem"));
        }
        if problem.num_factors() == 0 {
            return Err(OptimizerError::EmptyProblem("no factors in problem"));
        }

        let dim = problem.total_dim();
        let initial_cost = problem.compute_total_cost()?;
        if !initial_cost.is_finite() {
            return Err(OptimizerError::NumericalInstability(
                "initial cost is not finite".to_string(),
            ));
        }

        let mut current_cost = initial_cost;
        let mut lambda = self.lambda_init;
        let mut iterations = 0;

        let finish = |final_cost: f64,
                      iterations: usize,
                      reason: TerminationReason|
         -> Result<OptimizerResult, OptimizerError> {
            log::debug!(
                "levenberg-marquardt: cost {initial_cost:.6e} -> {final_cost:.6e} after {iterations} iterations ({reason})"
            );
            Ok(OptimizerResult {
                initial_cost,
                final_cost,
                iterations,
                termination_reason: reason,
            })
        };

        // the normal equations only change after an accepted step
        let mut system = problem.normal_equations()?;

        loop {
            if iterations >= self.max_iterations {
                log::warn!(
                    "levenberg-marquardt reached the maximum of {} iterations",
                    self.max_iterations
                );
                return finish(current_cost, iterations, TerminationReason::MaxIterations);
            }

            let (jtj, jtr) = &system;

            let gradient_norm = jtr.iter().map(|g| g * g).sum::<f64>().sqrt();
            if gradient_norm < self.gradient_tolerance {
                return finish(current_cost, iterations, TerminationReason::GradientConverged);
            }

            let delta = self.solve_damped_system(jtj, jtr, lambda, dim)?;
            iterations += 1;

            let step_norm = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
            if step_norm <= self.step_tolerance * (problem.values_norm() + self.step_tolerance) {
                return finish(current_cost, iterations, TerminationReason::StepConverged);
            }

            let snapshot = problem.snapshot();
            problem.apply_step(&delta);
            let new_cost = problem.compute_total_cost()?;

            if new_cost.is_finite() && new_cost < current_cost {
                let relative_change = (current_cost - new_cost) / current_cost.max(f64::MIN_POSITIVE);
                current_cost = new_cost;
                lambda = (lambda / self.lambda_factor).max(1e-15);

                if relative_change < self.cost_tolerance {
                    return finish(current_cost, iterations, TerminationReason::CostConverged);
                }
                system = problem.normal_equations()?;
            } else {
                problem.restore(snapshot);
                lambda *= self.lambda_factor;
                if lambda > self.lambda_max {
                    return finish(current_cost, iterations, TerminationReason::LambdaMaxExceeded);
                }
            }
        }
    }

    /// Solve the damped system (J^T J + λ diag(J^T J)) δ = -J^T r.
    fn solve_damped_system(
        &self,
        jtj: &[f64],
        jtr: &[f64],
        lambda: f64,
        dim: usize,
    ) -> Result<Vec<f64>, OptimizerError> {
        let damped = faer::Mat::<f64>::from_fn(dim, dim, |i, j| {
            let v = jtj[i * dim + j];
            if i == j {
                v + lambda * v.max(1e-9)
            } else {
                v
            }
        });
        let rhs = faer::Mat::<f64>::from_fn(dim, 1, |i, _| -jtr[i]);

        let delta = damped.partial_piv_lu().solve(rhs);
        let delta = (0..dim).map(|i| delta.read(i, 0)).collect::<Vec<_>>();

        if delta.iter().any(|d| !d.is_finite()) {
            return Err(OptimizerError::NumericalInstability(
                "damped system solve produced non-finite values".to_string(),
            ));
        }
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::factor::{numerical_jacobian, Factor, FactorResult, LinearizationResult};
    use approx::assert_relative_eq;

    /// Residual of the Rosenbrock function split into two terms.
    struct Rosenbrock;

    impl Factor for Rosenbrock {
        fn linearize(&self, params: &[&[f64]], jac: bool) -> FactorResult<LinearizationResult> {
            let (x, y) = (params[0][0], params[0][1]);
            let residual = vec![1.0 - x, 10.0 * (y - x * x)];
            let jacobian = jac.then(|| vec![-1.0, 0.0, -20.0 * x, 10.0]);
            Ok(LinearizationResult::new(residual, jacobian, 2))
        }
        fn residual_dim(&self) -> usize {
            2
        }
        fn num_variables(&self) -> usize {
            1
        }
        fn variable_local_dim(&self, _idx: usize) -> usize {
            2
        }
    }

    /// Exponential decay model y = a * exp(-b t), fitted with a numerical jacobian.
    struct Decay {
        t: f64,
        y: f64,
    }

    impl Factor for Decay {
        fn linearize(&self, params: &[&[f64]], jac: bool) -> FactorResult<LinearizationResult> {
            let residual_fn =
                |p: &[&[f64]]| Ok(vec![p[0][0] * (-p[0][1] * self.t).exp() - self.y]);
            let residual = residual_fn(params)?;
            let jacobian = if jac {
                Some(numerical_jacobian(params, 1, residual_fn)?)
            } else {
                None
            };
            Ok(LinearizationResult::new(residual, jacobian, 2))
        }
        fn residual_dim(&self) -> usize {
            1
        }
        fn num_variables(&self) -> usize {
            1
        }
        fn variable_local_dim(&self, _idx: usize) -> usize {
            2
        }
    }

    #[test]
    fn test_lm_rosenbrock() -> Result<(), OptimizerError> {
        let mut problem = Problem::new();
        problem.add_variable("xy", vec![-1.2, 1.0])?;
        problem.add_factor(Box::new(Rosenbrock), &["xy"])?;

        let result = LevenbergMarquardt::default().optimize(&mut problem)?;
        assert!(result.termination_reason.is_converged());
        assert!(result.final_cost < result.initial_cost);

        let xy = problem.variable("xy").ok_or(OptimizerError::EmptyProblem("xy"))?;
        assert_relative_eq!(xy[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(xy[1], 1.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_lm_curve_fit() -> Result<(), OptimizerError> {
        let mut problem = Problem::new();
        problem.add_variable("ab", vec![1.0, 0.1])?;
        for i in 0..20 {
            let t = i as f64 * 0.25;
            problem.add_factor(
                Box::new(Decay {
                    t,
                    y: 3.0 * (-0.7 * t).exp(),
                }),
                &["ab"],
            )?;
        }

        let result = LevenbergMarquardt::default().optimize(&mut problem)?;
        assert!(result.final_cost < 1e-12);

        let ab = problem.variable("ab").ok_or(OptimizerError::EmptyProblem("ab"))?;
        assert_relative_eq!(ab[0], 3.0, epsilon = 1e-5);
        assert_relative_eq!(ab[1], 0.7, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_lm_max_iterations_is_not_an_error() -> Result<(), OptimizerError> {
        let mut problem = Problem::new();
        problem.add_variable("xy", vec![-1.2, 1.0])?;
        problem.add_factor(Box::new(Rosenbrock), &["xy"])?;

        let result = LevenbergMarquardt::default()
            .with_max_iterations(1)
            .optimize(&mut problem)?;
        assert_eq!(result.iterations, 1);
        assert_eq!(result.termination_reason, TerminationReason::MaxIterations);
        Ok(())
    }

    #[test]
    fn test_lm_empty_problem() {
        let mut problem = Problem::new();
        assert!(matches!(
            LevenbergMarquardt::default().optimize(&mut problem),
            Err(OptimizerError::EmptyProblem(_))
        ));
    }
}
