/// Refinement candidates and their evaluation by projection of the reference solution
pub mod candidates;
/// Optional tracing and candidate curve dumps
pub mod diagnostics;
/// Norms and error estimates between coarse and reference solutions
pub mod error_est;
/// Choosing the best candidate for an Elem
pub mod selection;

use crate::domain::mesh::{
    h_refinement::HRef, Mesh, ReferenceRefinement, RefinementError,
};
use crate::domain::solution::transfer_solution;
use crate::fem_problem::newton::NewtonError;
use candidates::{Candidate, CandidateMenu};
use diagnostics::Diagnostics;
use error_est::{elem_pairs, estimate, ErrorEstimate};
use selection::{select, DegeneratePolicy, Selection};

use log::{debug, info};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fmt;

/// Norm used to measure errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Norm {
    L2,
    /// L2 plus the L2 norm of the first derivative
    H1,
}

/// Family of refinements considered for each flagged Elem
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdaptType {
    Hp,
    H,
    P,
}

impl AdaptType {
    pub fn menu(&self) -> CandidateMenu {
        match self {
            Self::Hp => CandidateMenu::hp(),
            Self::H => CandidateMenu::h(),
            Self::P => CandidateMenu::p(),
        }
    }
}

/// Settings for the adaptivity engine
#[derive(Clone, Debug)]
pub struct AdaptConfig {
    pub norm: Norm,
    pub adapt_type: AdaptType,
    /// Overrides the menu implied by `adapt_type` when set
    pub menu: Option<CandidateMenu>,
    /// Elems whose error exceeds `threshold * max_elem_error` are refined
    pub threshold: f64,
    /// Relative error (in percent of the reference solution's norm) at which adaptivity stops
    pub tol_err_rel: f64,
    pub max_iterations: usize,
    /// Adaptivity stops once the coarse mesh has at least this many DoFs
    pub max_dofs: usize,
    pub reference: ReferenceRefinement,
    pub degenerate_policy: DegeneratePolicy,
    pub diagnostics: Diagnostics,
}

impl Default for AdaptConfig {
    fn default() -> Self {
        Self {
            norm: Norm::H1,
            adapt_type: AdaptType::Hp,
            menu: None,
            threshold: 0.7,
            tol_err_rel: 1e-2,
            max_iterations: 50,
            max_dofs: 10_000,
            reference: ReferenceRefinement::Hp,
            degenerate_policy: DegeneratePolicy::Reject,
            diagnostics: Diagnostics::default(),
        }
    }
}

impl AdaptConfig {
    /// Candidate menu applied to every flagged Elem
    pub fn candidate_menu(&self) -> CandidateMenu {
        self.menu.clone().unwrap_or_else(|| self.adapt_type.menu())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdaptError {
    /// The reference mesh is not a one-level refinement of the coarse mesh
    MeshMismatch { elem_id: Option<usize>, detail: String },
    /// A coefficient vector does not match its mesh's DoF count
    CoefficientLength { expected: usize, found: usize },
    /// No candidates remain for an Elem after filtering the menu
    EmptyCandidateMenu(usize),
    /// None of an Elem's candidates produced an admissible score
    NoViableCandidate { elem_id: usize, detail: String },
    Refinement(RefinementError),
    Newton(NewtonError),
    /// A user supplied [MeshSolver] failed
    Solver(String),
}

impl fmt::Display for AdaptError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MeshMismatch { elem_id: Some(id), detail } => write!(f, "Reference mesh does not match coarse Elem {}: {}", id, detail),
            Self::MeshMismatch { elem_id: None, detail } => write!(f, "Reference mesh does not match coarse mesh: {}", detail),
            Self::CoefficientLength { expected, found } => write!(f, "Expected a coefficient vector of length {}, found {}!", expected, found),
            Self::EmptyCandidateMenu(elem_id) => write!(f, "No refinement candidates are available for Elem {}!", elem_id),
            Self::NoViableCandidate { elem_id, detail } => write!(f, "No refinement candidate for Elem {} could be scored: {}", elem_id, detail),
            Self::Refinement(err) => write!(f, "Failed to apply refinements: {}", err),
            Self::Newton(err) => write!(f, "Newton iteration failed: {}", err),
            Self::Solver(msg) => write!(f, "Solver failed: {}", msg),
        }
    }
}

impl std::error::Error for AdaptError {}

impl From<RefinementError> for AdaptError {
    fn from(err: RefinementError) -> Self {
        Self::Refinement(err)
    }
}

impl From<NewtonError> for AdaptError {
    fn from(err: NewtonError) -> Self {
        Self::Newton(err)
    }
}

pub(crate) fn check_coefficients(mesh: &Mesh, y: &[f64]) -> Result<(), AdaptError> {
    if mesh.n_dof() != y.len() {
        Err(AdaptError::CoefficientLength {
            expected: mesh.n_dof(),
            found: y.len(),
        })
    } else {
        Ok(())
    }
}

// ----------------------------------------------------------------------------------------------------
// Single adaptivity step
// ----------------------------------------------------------------------------------------------------

/// Choose a refinement for every flagged Elem of `coarse` without modifying it
///
/// Elems are flagged when their estimated error exceeds `config.threshold` times the largest Elem error.
/// Selections are returned in domain order.
pub fn select_refinements(
    coarse: &Mesh,
    reference: &Mesh,
    y_ref: &[f64],
    estimate: &ErrorEstimate,
    config: &AdaptConfig,
) -> Result<Vec<Selection>, AdaptError> {
    check_coefficients(reference, y_ref)?;
    let flagged: BTreeSet<usize> = estimate.flagged(config.threshold).into_iter().collect();
    let menu = config.candidate_menu();

    elem_pairs(coarse, reference)?
        .into_iter()
        .filter(|(elem, _)| flagged.contains(&elem.id))
        .map(|(elem, patch)| {
            let candidates = menu.resolve(elem.poly_order);
            select(
                config.norm,
                &candidates,
                elem,
                &patch,
                y_ref,
                reference.bc(),
                config,
            )
        })
        .collect()
}

/// Parallel version of [select_refinements]; flagged Elems are scored concurrently
pub fn select_refinements_parallel(
    coarse: &Mesh,
    reference: &Mesh,
    y_ref: &[f64],
    estimate: &ErrorEstimate,
    config: &AdaptConfig,
) -> Result<Vec<Selection>, AdaptError> {
    check_coefficients(reference, y_ref)?;
    let flagged: BTreeSet<usize> = estimate.flagged(config.threshold).into_iter().collect();
    let menu = config.candidate_menu();

    let pairs: Vec<_> = elem_pairs(coarse, reference)?
        .into_iter()
        .filter(|(elem, _)| flagged.contains(&elem.id))
        .collect();

    pairs
        .par_iter()
        .map(|(elem, patch)| {
            let candidates = menu.resolve(elem.poly_order);
            select(
                config.norm,
                &candidates,
                elem,
                patch,
                y_ref,
                reference.bc(),
                config,
            )
        })
        .collect()
}

/// Apply a set of selections to `mesh` all at once
pub fn apply_refinements(mesh: &mut Mesh, selections: &[Selection]) -> Result<(), AdaptError> {
    let mut p_refinements = Vec::new();
    let mut h_refinements = Vec::new();

    for selection in selections {
        match selection.candidate {
            Candidate::P { p } => p_refinements.push((selection.elem_id, p)),
            Candidate::Split { p_left, p_right } => {
                h_refinements.push((selection.elem_id, HRef::BisectWith([p_left, p_right])))
            }
        }
    }

    mesh.set_expansion_orders(p_refinements)
        .map_err(RefinementError::from)?;
    mesh.execute_h_refinements(h_refinements)
        .map_err(RefinementError::from)?;

    Ok(())
}

/// Select refinements for the flagged Elems of `coarse`, then apply them
///
/// Every selection is made against the unmodified mesh before any refinement is applied.
pub fn adapt(
    coarse: &mut Mesh,
    reference: &Mesh,
    y_ref: &[f64],
    estimate: &ErrorEstimate,
    config: &AdaptConfig,
) -> Result<Vec<Selection>, AdaptError> {
    let selections = select_refinements(coarse, reference, y_ref, estimate, config)?;
    apply_refinements(coarse, &selections)?;
    Ok(selections)
}

// ----------------------------------------------------------------------------------------------------
// Adaptivity loop
// ----------------------------------------------------------------------------------------------------

/// Anything which can compute a coefficient vector on a [Mesh]
pub trait MeshSolver {
    /// Solve on `mesh`, optionally starting from `initial_guess` (which always matches `mesh.n_dof()`)
    fn solve(&mut self, mesh: &Mesh, initial_guess: Option<Vec<f64>>) -> Result<Vec<f64>, AdaptError>;
}

impl<F> MeshSolver for F
where
    F: FnMut(&Mesh, Option<Vec<f64>>) -> Result<Vec<f64>, AdaptError>,
{
    fn solve(&mut self, mesh: &Mesh, initial_guess: Option<Vec<f64>>) -> Result<Vec<f64>, AdaptError> {
        self(mesh, initial_guess)
    }
}

/// Summary of one iteration of the adaptivity loop
#[derive(Clone, Debug)]
pub struct AdaptStep {
    pub n_dof: usize,
    pub n_dof_ref: usize,
    /// Estimated error relative to the reference solution's norm (in percent)
    pub err_est_rel: f64,
    pub n_refined: usize,
}

/// Result of [HpAdaptivity::run]
#[derive(Clone, Debug)]
pub struct AdaptReport {
    pub history: Vec<AdaptStep>,
    pub converged: bool,
    /// Coarse solution on the final mesh
    pub solution: Vec<f64>,
    /// The final reference mesh and its solution
    pub reference: Mesh,
    pub reference_solution: Vec<f64>,
}

/// Drives the solve / estimate / refine loop
pub struct HpAdaptivity {
    pub config: AdaptConfig,
    /// Score candidates with rayon
    pub parallel: bool,
}

impl HpAdaptivity {
    pub fn new(config: AdaptConfig) -> Self {
        Self {
            config,
            parallel: false,
        }
    }

    /// Adapt `mesh` in place until the estimated relative error falls under `config.tol_err_rel`,
    /// or the iteration or DoF limits are reached
    pub fn run<S: MeshSolver>(&self, mesh: &mut Mesh, solver: &mut S) -> Result<AdaptReport, AdaptError> {
        let config = &self.config;
        let mut history = Vec::new();
        let mut previous: Option<(Mesh, Vec<f64>)> = None;

        let mut iteration = 0;
        loop {
            iteration += 1;
            let guess = previous
                .as_ref()
                .map(|(prev_ref, prev_y)| transfer_solution(prev_ref, prev_y, mesh));
            let y = solver.solve(mesh, guess)?;
            check_coefficients(mesh, &y)?;

            let reference = mesh.reference_refinement(config.reference)?;
            let y_ref = solver.solve(&reference, Some(transfer_solution(mesh, &y, &reference)))?;
            check_coefficients(&reference, &y_ref)?;

            let est = estimate(config.norm, mesh, &reference, &y, &y_ref)?;
            let err_est_rel = est.relative_to(est.reference_norm) * 100.0;

            info!(
                "adaptivity iteration {}: ndof = {}, ndof_ref = {}, err_est_rel = {:.3e}%",
                iteration,
                mesh.n_dof(),
                reference.n_dof(),
                err_est_rel
            );

            let mut step = AdaptStep {
                n_dof: mesh.n_dof(),
                n_dof_ref: reference.n_dof(),
                err_est_rel,
                n_refined: 0,
            };

            let converged = err_est_rel < config.tol_err_rel;
            if converged || iteration >= config.max_iterations || mesh.n_dof() >= config.max_dofs {
                history.push(step);
                if !converged {
                    info!("adaptivity stopped before reaching tolerance after {} iterations", iteration);
                }
                return Ok(AdaptReport {
                    history,
                    converged,
                    solution: y,
                    reference,
                    reference_solution: y_ref,
                });
            }

            let selections = if self.parallel {
                select_refinements_parallel(mesh, &reference, &y_ref, &est, config)?
            } else {
                select_refinements(mesh, &reference, &y_ref, &est, config)?
            };
            for s in selections.iter() {
                debug!("Elem {} -> {:?} (score {:.4})", s.elem_id, s.candidate, s.score);
            }
            apply_refinements(mesh, &selections)?;

            step.n_refined = selections.len();
            history.push(step);
            previous = Some((reference, y_ref));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::solution::project_function;

    fn sin_meshes(p: u8) -> (Mesh, Mesh, Vec<f64>, Vec<f64>) {
        let coarse = Mesh::new(0.0, std::f64::consts::PI * 2.0, 4, p, 1);
        let reference = coarse.reference_refinement(ReferenceRefinement::Hp).unwrap();
        let f = |x: f64| (vec![x.sin()], vec![x.cos()]);
        let y = project_function(&coarse, f, 8);
        let y_ref = project_function(&reference, f, 8);
        (coarse, reference, y, y_ref)
    }

    #[test]
    fn adapt_refines_flagged_elems_only() {
        let (mut coarse, reference, y, y_ref) = sin_meshes(1);
        let config = AdaptConfig::default();
        let est = estimate(config.norm, &coarse, &reference, &y, &y_ref).unwrap();
        let flagged = est.flagged(config.threshold);
        assert!(!flagged.is_empty());

        let n_dof_before = coarse.n_dof();
        let selections = adapt(&mut coarse, &reference, &y_ref, &est, &config).unwrap();

        assert_eq!(
            selections.iter().map(|s| s.elem_id).collect::<Vec<_>>(),
            flagged
        );
        assert!(coarse.n_dof() > n_dof_before);
        for s in selections.iter() {
            assert!(s.added_dof > 0);
        }
    }

    #[test]
    fn parallel_and_serial_selections_agree() {
        let (coarse, reference, y, y_ref) = sin_meshes(2);
        let config = AdaptConfig {
            threshold: 0.0,
            ..Default::default()
        };
        let est = estimate(config.norm, &coarse, &reference, &y, &y_ref).unwrap();

        let serial = select_refinements(&coarse, &reference, &y_ref, &est, &config).unwrap();
        let parallel = select_refinements_parallel(&coarse, &reference, &y_ref, &est, &config).unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn h_adaptivity_only_bisects() {
        let (mut coarse, reference, y, y_ref) = sin_meshes(2);
        let config = AdaptConfig {
            adapt_type: AdaptType::H,
            ..Default::default()
        };
        let est = estimate(config.norm, &coarse, &reference, &y, &y_ref).unwrap();
        let selections = adapt(&mut coarse, &reference, &y_ref, &est, &config).unwrap();

        assert!(selections
            .iter()
            .all(|s| s.candidate == Candidate::Split { p_left: 2, p_right: 2 }));
        assert!(coarse.active_elems().all(|e| e.poly_order == 2));
    }

    #[test]
    fn mismatched_coefficients_are_rejected() {
        let (coarse, reference, y, y_ref) = sin_meshes(1);
        let est = estimate(Norm::L2, &coarse, &reference, &y, &y_ref).unwrap();
        let err = select_refinements(&coarse, &reference, &y, &est, &AdaptConfig::default());
        assert!(matches!(err, Err(AdaptError::CoefficientLength { .. })));
    }

    #[test]
    fn loop_with_projection_solver_converges() {
        let mut mesh = Mesh::new(0.0, 3.0, 2, 1, 1);
        let mut solver = |m: &Mesh, _: Option<Vec<f64>>| -> Result<Vec<f64>, AdaptError> {
            Ok(project_function(m, |x| (vec![(2.0 * x).sin()], vec![2.0 * (2.0 * x).cos()]), 10))
        };
        let adaptivity = HpAdaptivity::new(AdaptConfig {
            tol_err_rel: 0.1,
            max_iterations: 30,
            ..Default::default()
        });

        let report = adaptivity.run(&mut mesh, &mut solver).unwrap();
        assert!(report.converged);
        assert!(report.history.last().unwrap().err_est_rel < 0.1);
        assert!(report.history.first().unwrap().err_est_rel > report.history.last().unwrap().err_est_rel);
        assert_eq!(report.solution.len(), mesh.n_dof());
    }

    #[test]
    fn loop_continues_with_elems_at_max_order() {
        use crate::domain::mesh::MAX_POLYNOMIAL_ORDER;

        let mut mesh = Mesh::new(0.0, 2.0, 2, 1, 1);
        mesh.set_expansion_orders(vec![(1, MAX_POLYNOMIAL_ORDER)]).unwrap();
        let mut solver = |m: &Mesh, _: Option<Vec<f64>>| -> Result<Vec<f64>, AdaptError> {
            Ok(project_function(m, |x| (vec![(3.0 * x).sin()], vec![3.0 * (3.0 * x).cos()]), 10))
        };
        let adaptivity = HpAdaptivity::new(AdaptConfig {
            tol_err_rel: 1e-12,
            max_iterations: 3,
            ..Default::default()
        });

        let report = adaptivity.run(&mut mesh, &mut solver).unwrap();
        assert_eq!(report.history.len(), 3);
        assert!(report.history[0].n_refined > 0);
        assert!(mesh.active_elems().all(|e| e.poly_order <= MAX_POLYNOMIAL_ORDER));
        assert!(report
            .reference
            .active_elems()
            .any(|e| e.poly_order == MAX_POLYNOMIAL_ORDER));
    }
}
