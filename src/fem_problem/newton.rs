use super::{DiscreteProblem, FormError};
use crate::domain::mesh::Mesh;

use log::{debug, trace};
use nalgebra::DVector;
use std::fmt;

/// Settings for a damped Newton iteration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewtonSolver {
    /// Iteration stops once the Euclidean norm of the residual falls below this value
    pub tol: f64,
    pub max_iter: usize,
    /// The step length is multiplied by this factor until the residual decreases
    pub damping_factor: f64,
    /// Smallest step length tried before accepting a non-decreasing step
    pub min_damping: f64,
}

impl Default for NewtonSolver {
    fn default() -> Self {
        Self {
            tol: 1e-8,
            max_iter: 50,
            damping_factor: 0.5,
            min_damping: 1.0 / 64.0,
        }
    }
}

/// Result of a converged Newton iteration
#[derive(Clone, Debug)]
pub struct NewtonReport {
    pub y: Vec<f64>,
    pub iterations: usize,
    pub residual_norm: f64,
}

impl NewtonSolver {
    pub fn with_tol(tol: f64) -> Self {
        Self {
            tol,
            ..Default::default()
        }
    }

    /// Solve `F(y) = 0` for the [DiscreteProblem] on `mesh` starting from `y`
    ///
    /// Each step solves `J dy = -F` with a dense LU decomposition.
    pub fn solve(&self, dp: &DiscreteProblem, mesh: &Mesh, y: Vec<f64>) -> Result<NewtonReport, NewtonError> {
        let mut y = DVector::from_vec(y);
        let (mut jacobian, mut residual) = dp.assemble(mesh, y.as_slice())?;
        let mut res_norm = residual.norm();

        for iteration in 0..self.max_iter {
            debug!("Newton iteration {}: residual norm = {:.6e}", iteration, res_norm);
            if res_norm < self.tol {
                return Ok(NewtonReport {
                    y: y.as_slice().to_vec(),
                    iterations: iteration,
                    residual_norm: res_norm,
                });
            }

            let step = jacobian
                .lu()
                .solve(&(-&residual))
                .ok_or(NewtonError::SingularJacobian)?;

            let mut alpha = 1.0;
            loop {
                let y_trial = &y + &step * alpha;
                let (j_trial, r_trial) = dp.assemble(mesh, y_trial.as_slice())?;
                let trial_norm = r_trial.norm();

                if trial_norm < res_norm || alpha * self.damping_factor < self.min_damping {
                    y = y_trial;
                    jacobian = j_trial;
                    residual = r_trial;
                    res_norm = trial_norm;
                    break;
                }
                alpha *= self.damping_factor;
                trace!("Newton step damped to {}", alpha);
            }
        }

        if res_norm < self.tol {
            Ok(NewtonReport {
                y: y.as_slice().to_vec(),
                iterations: self.max_iter,
                residual_norm: res_norm,
            })
        } else {
            Err(NewtonError::NotConverged {
                iterations: self.max_iter,
                residual_norm: res_norm,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NewtonError {
    SingularJacobian,
    NotConverged { iterations: usize, residual_norm: f64 },
    Form(FormError),
}

impl fmt::Display for NewtonError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SingularJacobian => write!(f, "Jacobian matrix is singular; cannot compute Newton step!"),
            Self::NotConverged {
                iterations,
                residual_norm,
            } => write!(
                f,
                "Newton iteration did not converge after {} iterations (residual norm {:.3e})!",
                iterations, residual_norm
            ),
            Self::Form(err) => write!(f, "Failed to assemble the discrete problem: {}", err),
        }
    }
}

impl std::error::Error for NewtonError {}

impl From<FormError> for NewtonError {
    fn from(err: FormError) -> Self {
        Self::Form(err)
    }
}
