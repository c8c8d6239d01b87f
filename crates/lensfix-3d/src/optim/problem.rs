use std::collections::HashMap;

use rayon::prelude::*;
use thiserror::Error;

use super::factor::{Factor, FactorError};

/// Errors raised while building or evaluating a problem.
#[derive(Debug, Error)]
pub enum ProblemError {
    /// A variable with the same name was already added.
    #[error("Variable '{name}' already exists")]
    DuplicateVariable {
        /// The name of the variable.
        name: String,
    },

    /// A factor references an unknown variable.
    #[error("Variable '{name}' not found")]
    VariableNotFound {
        /// The name of the variable.
        name: String,
    },

    /// A factor does not match the variables it connects.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The expected dimension.
        expected: usize,
        /// The dimension that was given.
        actual: usize,
    },

    /// A factor failed to evaluate.
    #[error("Factor evaluation failed: {0}")]
    Factor(#[from] FactorError),
}

type FactorEntry = (Box<dyn Factor>, Vec<usize>);

/// A non-linear least squares problem made of named euclidean variables and factors.
///
/// Variables keep the order in which they were added, which defines the layout of
/// the normal equations.
#[derive(Default)]
pub struct Problem {
    names: Vec<String>,
    index: HashMap<String, usize>,
    values: Vec<Vec<f64>>,
    offsets: Vec<usize>,
    total_dim: usize,
    factors: Vec<FactorEntry>,
}

impl Problem {
    /// Create an empty problem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable with its initial values.
    pub fn add_variable(&mut self, name: &str, values: Vec<f64>) -> Result<(), ProblemError> {
        if self.index.contains_key(name) {
            return Err(ProblemError::DuplicateVariable {
                name: name.to_string(),
            });
        }
        self.index.insert(name.to_string(), self.names.len());
        self.names.push(name.to_string());
        self.offsets.push(self.total_dim);
        self.total_dim += values.len();
        self.values.push(values);
        Ok(())
    }

    /// Add a factor connecting the named variables, in the order the factor expects them.
    pub fn add_factor(
        &mut self,
        factor: Box<dyn Factor>,
        var_names: &[&str],
    ) -> Result<(), ProblemError> {
        if var_names.len() != factor.num_variables() {
            return Err(ProblemError::DimensionMismatch {
                expected: factor.num_variables(),
                actual: var_names.len(),
            });
        }

        let mut ids = Vec::with_capacity(var_names.len());
        for (k, name) in var_names.iter().enumerate() {
            let id = *self
                .index
                .get(*name)
                .ok_or_else(|| ProblemError::VariableNotFound {
                    name: name.to_string(),
                })?;
            if self.values[id].len() != factor.variable_local_dim(k) {
                return Err(ProblemError::DimensionMismatch {
                    expected: factor.variable_local_dim(k),
                    actual: self.values[id].len(),
                });
            }
            ids.push(id);
        }

        self.factors.push((factor, ids));
        Ok(())
    }

    /// The current values of a variable.
    pub fn variable(&self, name: &str) -> Option<&[f64]> {
        self.index.get(name).map(|&id| self.values[id].as_slice())
    }

    /// Number of factors in the problem.
    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    /// Number of variables in the problem.
    pub fn num_variables(&self) -> usize {
        self.names.len()
    }

    /// Sum of the dimensions of all variables.
    pub fn total_dim(&self) -> usize {
        self.total_dim
    }

    /// Sum of the dimensions of all residuals.
    pub fn total_residual_dim(&self) -> usize {
        self.factors.iter().map(|(f, _)| f.residual_dim()).sum()
    }

    fn params_of(&self, ids: &[usize]) -> Vec<&[f64]> {
        ids.iter().map(|&id| self.values[id].as_slice()).collect()
    }

    /// Compute the total cost, the sum of squared residuals of all factors.
    pub fn compute_total_cost(&self) -> Result<f64, ProblemError> {
        let costs = self
            .factors
            .par_iter()
            .map(|(factor, ids)| {
                let lin = factor.linearize(&self.params_of(ids), false)?;
                Ok(lin.residual.iter().map(|r| r * r).sum::<f64>())
            })
            .collect::<Result<Vec<f64>, FactorError>>()?;
        Ok(costs.iter().sum())
    }

    /// Build the normal equations `J^T J` and `J^T r` of the whole problem.
    ///
    /// Factors are linearized in parallel and accumulated in factor order.
    ///
    /// # Returns
    ///
    /// The row-major `J^T J` matrix and the `J^T r` vector.
    pub fn normal_equations(&self) -> Result<(Vec<f64>, Vec<f64>), ProblemError> {
        let dim = self.total_dim;

        let linearized = self
            .factors
            .par_iter()
            .map(|(factor, ids)| factor.linearize(&self.params_of(ids), true))
            .collect::<Result<Vec<_>, FactorError>>()?;

        let mut jtj = vec![0.0; dim * dim];
        let mut jtr = vec![0.0; dim];

        for ((_, ids), lin) in self.factors.iter().zip(linearized.iter()) {
            let Some(jac) = lin.jacobian.as_ref() else {
                continue;
            };
            let cols = lin.total_local_dim;

            // global column of every local jacobian column
            let global = ids
                .iter()
                .flat_map(|&id| (0..self.values[id].len()).map(move |k| self.offsets[id] + k))
                .collect::<Vec<_>>();
            if global.len() != cols || jac.len() != cols * lin.residual_dim() {
                return Err(ProblemError::DimensionMismatch {
                    expected: global.len(),
                    actual: cols,
                });
            }

            for (r, residual) in lin.residual.iter().enumerate() {
                let row = &jac[r * cols..(r + 1) * cols];
                for (a, &ga) in global.iter().enumerate() {
                    let ja = row[a];
                    if ja == 0.0 {
                        continue;
                    }
                    jtr[ga] += ja * residual;
                    for (b, &gb) in global.iter().enumerate() {
                        jtj[ga * dim + gb] += ja * row[b];
                    }
                }
            }
        }

        Ok((jtj, jtr))
    }

    /// A copy of all variable values, in insertion order.
    pub(crate) fn snapshot(&self) -> Vec<Vec<f64>> {
        self.values.clone()
    }

    /// Restore the values saved by [`Problem::snapshot`].
    pub(crate) fn restore(&mut self, snapshot: Vec<Vec<f64>>) {
        self.values = snapshot;
    }

    /// Add a stacked update vector to all variables.
    pub(crate) fn apply_step(&mut self, delta: &[f64]) {
        for (id, values) in self.values.iter_mut().enumerate() {
            let offset = self.offsets[id];
            let len = values.len();
            values
                .iter_mut()
                .zip(delta[offset..offset + len].iter())
                .for_each(|(v, d)| *v += d);
        }
    }

    /// Euclidean norm of the stacked variable values.
    pub(crate) fn values_norm(&self) -> f64 {
        self.values
            .iter()
            .flatten()
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
    }
}
