/// Damped Newton iteration over a [DiscreteProblem]
pub mod newton;

use crate::adapt::{AdaptError, MeshSolver};
use crate::basis::{LobattoShapeFn, ShapeFn};
use crate::domain::mesh::Mesh;
use crate::integration::canonical_rule;
use newton::NewtonSolver;

use nalgebra::{DMatrix, DVector};
use std::fmt;

/// Data available to a weak form on one Elem
///
/// Every slice is indexed by quadrature point; `u_prev` and `du_prev` are indexed by `[component][point]`.
pub struct QuadContext<'a> {
    /// Real space quadrature points
    pub x: &'a [f64],
    /// Quadrature weights (including the Jacobian of the Elem)
    pub weights: &'a [f64],
    /// Values of every solution component of the previous iterate
    pub u_prev: &'a [Vec<f64>],
    /// Derivatives of every solution component of the previous iterate
    pub du_prev: &'a [Vec<f64>],
}

/// A shape function sampled over the quadrature points of a [QuadContext]
pub struct BasisSample<'a> {
    pub values: &'a [f64],
    /// Derivatives in real space
    pub derivs: &'a [f64],
}

/// A Jacobian block: `∂(residual of equation i) / ∂(component j)`, integrated against a trial function `u` and test function `v`
pub trait MatrixForm {
    fn eval(&self, ctx: &QuadContext, u: &BasisSample, v: &BasisSample) -> f64;
}

impl<F> MatrixForm for F
where
    F: Fn(&QuadContext, &BasisSample, &BasisSample) -> f64,
{
    fn eval(&self, ctx: &QuadContext, u: &BasisSample, v: &BasisSample) -> f64 {
        self(ctx, u, v)
    }
}

/// The residual of one equation integrated against a test function `v`
pub trait VectorForm {
    fn eval(&self, ctx: &QuadContext, v: &BasisSample) -> f64;
}

impl<F> VectorForm for F
where
    F: Fn(&QuadContext, &BasisSample) -> f64,
{
    fn eval(&self, ctx: &QuadContext, v: &BasisSample) -> f64 {
        self(ctx, v)
    }
}

/// Weak forms of a system of `n_eq` equations
pub struct DiscreteProblem {
    n_eq: usize,
    matrix_forms: Vec<(usize, usize, Box<dyn MatrixForm>)>,
    vector_forms: Vec<(usize, Box<dyn VectorForm>)>,
    /// Quadrature order used on an Elem of order `p` is `2p + extra_quad_order`
    pub extra_quad_order: usize,
}

impl DiscreteProblem {
    pub fn new(n_eq: usize) -> Self {
        Self {
            n_eq,
            matrix_forms: Vec::new(),
            vector_forms: Vec::new(),
            extra_quad_order: 2,
        }
    }

    pub fn n_eq(&self) -> usize {
        self.n_eq
    }

    /// Register the Jacobian block of equation `i` with respect to solution component `j`
    pub fn add_matrix_form<F>(&mut self, i: usize, j: usize, form: F) -> Result<(), FormError>
    where
        F: MatrixForm + 'static,
    {
        self.check_equation(i)?;
        self.check_equation(j)?;
        self.matrix_forms.push((i, j, Box::new(form)));
        Ok(())
    }

    /// Register the residual of equation `i`
    pub fn add_vector_form<F>(&mut self, i: usize, form: F) -> Result<(), FormError>
    where
        F: VectorForm + 'static,
    {
        self.check_equation(i)?;
        self.vector_forms.push((i, Box::new(form)));
        Ok(())
    }

    fn check_equation(&self, eq: usize) -> Result<(), FormError> {
        if eq < self.n_eq {
            Ok(())
        } else {
            Err(FormError::EquationOutOfRange { eq, n_eq: self.n_eq })
        }
    }

    /// Assemble the Jacobian matrix and residual vector at the coefficient vector `y`
    pub fn assemble(&self, mesh: &Mesh, y: &[f64]) -> Result<(DMatrix<f64>, DVector<f64>), FormError> {
        if mesh.n_eq() != self.n_eq {
            return Err(FormError::MeshEquations {
                expected: self.n_eq,
                found: mesh.n_eq(),
            });
        }
        if y.len() != mesh.n_dof() {
            return Err(FormError::CoefficientLength {
                expected: mesh.n_dof(),
                found: y.len(),
            });
        }

        let n_dof = mesh.n_dof();
        let mut jacobian = DMatrix::zeros(n_dof, n_dof);
        let mut residual = DVector::zeros(n_dof);

        for elem in mesh.active_elems() {
            let p = elem.poly_order as usize;
            let rule = canonical_rule(2 * p + self.extra_quad_order);
            let shape = LobattoShapeFn::with(p, &rule.points);
            let inv_jac = 1.0 / elem.jacobian();

            let x: Vec<f64> = rule.points.iter().map(|xi| elem.to_real(*xi)).collect();
            let weights: Vec<f64> = rule.weights.iter().map(|w| w * elem.jacobian()).collect();
            let prev = elem.get_solution(&x, y, mesh.bc());
            let ctx = QuadContext {
                x: &x,
                weights: &weights,
                u_prev: &prev.values,
                du_prev: &prev.derivs,
            };

            let samples: Vec<(Vec<f64>, Vec<f64>)> = (0..=p)
                .map(|k| {
                    (
                        (0..x.len()).map(|q| shape.poly(k, q)).collect(),
                        (0..x.len()).map(|q| shape.poly_d1(k, q) * inv_jac).collect(),
                    )
                })
                .collect();
            let sample = |k: usize| BasisSample {
                values: &samples[k].0,
                derivs: &samples[k].1,
            };

            for (i, form) in self.vector_forms.iter() {
                for (k, dof) in elem.dofs(*i).iter().enumerate() {
                    if let Some(row) = dof {
                        residual[*row] += form.eval(&ctx, &sample(k));
                    }
                }
            }

            for (i, j, form) in self.matrix_forms.iter() {
                for (k, row) in elem.dofs(*i).iter().enumerate().filter_map(|(k, d)| d.map(|r| (k, r))) {
                    for (l, col) in elem.dofs(*j).iter().enumerate().filter_map(|(l, d)| d.map(|c| (l, c))) {
                        jacobian[(row, col)] += form.eval(&ctx, &sample(l), &sample(k));
                    }
                }
            }
        }

        Ok((jacobian, residual))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormError {
    EquationOutOfRange { eq: usize, n_eq: usize },
    MeshEquations { expected: usize, found: usize },
    CoefficientLength { expected: usize, found: usize },
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::EquationOutOfRange { eq, n_eq } => write!(
                f,
                "Equation {} is out of range for a problem with {} equations!",
                eq, n_eq
            ),
            Self::MeshEquations { expected, found } => write!(
                f,
                "Problem has {} equations but the Mesh describes {}!",
                expected, found
            ),
            Self::CoefficientLength { expected, found } => write!(
                f,
                "Expected a coefficient vector of length {}, found {}!",
                expected, found
            ),
        }
    }
}

impl std::error::Error for FormError {}

/// Solves a [DiscreteProblem] with Newton's method on whatever Mesh the adaptivity loop provides
pub struct NewtonMeshSolver {
    pub problem: DiscreteProblem,
    pub newton: NewtonSolver,
}

impl NewtonMeshSolver {
    pub fn new(problem: DiscreteProblem, newton: NewtonSolver) -> Self {
        Self { problem, newton }
    }
}

impl MeshSolver for NewtonMeshSolver {
    fn solve(&mut self, mesh: &Mesh, initial_guess: Option<Vec<f64>>) -> Result<Vec<f64>, AdaptError> {
        let y = initial_guess.unwrap_or_else(|| vec![0.0; mesh.n_dof()]);
        let report = self.newton.solve(&self.problem, mesh, y)?;
        Ok(report.y)
    }
}
