use super::Norm;
use crate::basis::{LegendreShapeFn, Placement, ShapeFn, Support};
use crate::domain::mesh::{
    elem::{Elem, ElemSolution},
    BoundaryConditions, MAX_POLYNOMIAL_ORDER,
};
use crate::integration::Quadrature;

use smallvec::{smallvec, SmallVec};

/// Candidates whose error falls below this fraction of the reference solution's norm on the patch count as exact
pub const EXACT_REL_TOL: f64 = 1e-10;

/// A way of refining one coarse Elem
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Candidate {
    /// Keep the Elem whole with expansion order `p`
    P { p: u8 },
    /// Bisect the Elem with the given expansion orders on each half
    Split { p_left: u8, p_right: u8 },
}

impl Candidate {
    /// Number of DoFs per equation of this candidate on an isolated Elem
    pub fn num_dofs(&self) -> i32 {
        match self {
            Self::P { p } => *p as i32 + 1,
            Self::Split { p_left, p_right } => *p_left as i32 + *p_right as i32 + 1,
        }
    }

    /// DoFs gained relative to an Elem of order `p`
    pub fn added_dof(&self, p: u8) -> i32 {
        self.num_dofs() - (p as i32 + 1)
    }

    /// The orthonormal projection spaces making up this candidate: `(support, degree)`
    fn spaces(&self) -> SmallVec<[(Support, u8); 2]> {
        match self {
            Self::P { p } => smallvec![(Support::Full, *p)],
            Self::Split { p_left, p_right } => {
                smallvec![(Support::Left, *p_left), (Support::Right, *p_right)]
            }
        }
    }
}

/// A candidate described relative to the expansion order of the Elem it is applied to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateTemplate {
    P(i8),
    Split(i8, i8),
}

impl CandidateTemplate {
    /// Concrete candidate for an Elem of order `p` (`None` if an order falls outside of `[1, MAX_POLYNOMIAL_ORDER]`)
    pub fn resolve(&self, p: u8) -> Option<Candidate> {
        let shift = |dp: i8| {
            let n = p as i16 + dp as i16;
            (1..=MAX_POLYNOMIAL_ORDER as i16).contains(&n).then(|| n as u8)
        };
        match self {
            Self::P(dp) => shift(*dp).map(|p| Candidate::P { p }),
            Self::Split(dl, dr) => Some(Candidate::Split {
                p_left: shift(*dl)?,
                p_right: shift(*dr)?,
            }),
        }
    }
}

/// The ordered list of candidate templates considered for every flagged Elem
///
/// Order matters: when two candidates score equally, the one listed first wins.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateMenu {
    templates: SmallVec<[CandidateTemplate; 10]>,
}

impl CandidateMenu {
    /// p-refinements and bisections with order changes of at most one per half
    pub fn hp() -> Self {
        use CandidateTemplate::*;
        Self::custom(&[
            P(1),
            P(2),
            Split(-1, -1),
            Split(0, -1),
            Split(-1, 0),
            Split(0, 0),
            Split(1, 0),
            Split(0, 1),
            Split(1, 1),
        ])
    }

    /// Bisection which keeps the expansion order
    pub fn h() -> Self {
        Self::custom(&[CandidateTemplate::Split(0, 0)])
    }

    /// Pure p-refinements
    pub fn p() -> Self {
        Self::custom(&[CandidateTemplate::P(1), CandidateTemplate::P(2)])
    }

    pub fn custom(templates: &[CandidateTemplate]) -> Self {
        Self {
            templates: SmallVec::from_slice(templates),
        }
    }

    pub fn templates(&self) -> &[CandidateTemplate] {
        &self.templates
    }

    /// Concrete candidates for an Elem of order `p`
    ///
    /// Candidates with orders outside of `[1, MAX_POLYNOMIAL_ORDER]`, or which would not add any DoFs, are dropped.
    /// Duplicates keep their first position.
    pub fn resolve(&self, p: u8) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = Vec::with_capacity(self.templates.len());
        for candidate in self.templates.iter().filter_map(|t| t.resolve(p)) {
            if candidate.added_dof(p) > 0 && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }
}

/// The reference mesh Elem(s) covering one coarse Elem
#[derive(Clone, Copy, Debug)]
pub enum RefPatch<'a> {
    /// The reference Elem coincides with the coarse Elem
    Whole(&'a Elem),
    /// The coarse Elem was bisected in the reference mesh: `(left, right)`
    Split(&'a Elem, &'a Elem),
}

impl<'a> RefPatch<'a> {
    pub fn elems(&self) -> SmallVec<[&'a Elem; 2]> {
        match self {
            Self::Whole(e) => smallvec![*e],
            Self::Split(l, r) => smallvec![*l, *r],
        }
    }

    /// Pieces over which a basis living on `support` of `elem` is integrated against this patch
    ///
    /// Each piece is `(reference Elem, where the piece lies within the support, piece interval)`
    fn pieces(&self, elem: &Elem, support: Support) -> SmallVec<[(&'a Elem, Placement, [f64; 2]); 2]> {
        let interval = support.interval(elem.x1, elem.x2);
        match (self, support) {
            (Self::Whole(e_ref), _) => smallvec![(*e_ref, Placement::Whole, interval)],
            (Self::Split(l, r), Support::Full) => smallvec![
                (*l, Placement::LeftHalf, [l.x1, l.x2]),
                (*r, Placement::RightHalf, [r.x1, r.x2])
            ],
            (Self::Split(l, _), Support::Left) => smallvec![(*l, Placement::Whole, [l.x1, l.x2])],
            (Self::Split(_, r), Support::Right) => smallvec![(*r, Placement::Whole, [r.x1, r.x2])],
        }
    }
}

/// Result of evaluating one candidate for one Elem
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CandidateScore {
    pub candidate: Candidate,
    /// Projection error of the reference solution onto the candidate space
    pub err: f64,
    /// Norm of the reference solution over the patch, in the same norm as `err`
    pub ref_norm: f64,
    pub added_dof: i32,
}

impl CandidateScore {
    /// `-ln(err) / added_dof`; `None` when the candidate adds no DoFs or reproduces the reference solution
    pub fn criterion(&self) -> Option<f64> {
        if self.added_dof <= 0 || self.is_exact() || !self.err.is_finite() {
            None
        } else {
            Some(-self.err.ln() / self.added_dof as f64)
        }
    }

    /// The candidate reproduces the reference solution up to round-off: `err <= EXACT_REL_TOL * ref_norm`
    pub fn is_exact(&self) -> bool {
        !(self.err > 0.0) || self.err <= EXACT_REL_TOL * self.ref_norm
    }
}

/// The reference solution and its projection sampled over one piece of a candidate
pub(crate) struct ProjectedPiece {
    pub quad: Quadrature,
    pub reference: ElemSolution,
    pub projection: ElemSolution,
}

/// Project the reference solution onto the orthonormal Legendre space of `degree` living on `support` of `elem`
pub(crate) fn project_reference(
    elem: &Elem,
    patch: &RefPatch,
    support: Support,
    degree: u8,
    y_ref: &[f64],
    bc: &BoundaryConditions,
) -> SmallVec<[ProjectedPiece; 2]> {
    let [s1, s2] = support.interval(elem.x1, elem.x2);
    let scale = (2.0 / (s2 - s1)).sqrt();
    let d_scale = scale * 2.0 / (s2 - s1);
    let n_basis = degree as usize + 1;
    let n_eq = elem.dof_size;

    let sampled: SmallVec<[_; 2]> = patch
        .pieces(elem, support)
        .into_iter()
        .map(|(e_ref, placement, [a, b])| {
            let order = 2 * e_ref.poly_order.max(degree) as usize;
            let quad = Quadrature::new(a, b, order);
            let reference = e_ref.get_solution(&quad.points, y_ref, bc);
            let shape = LegendreShapeFn::sampled(order, placement);
            (quad, reference, shape)
        })
        .collect();

    // projection coefficients are inner products with the orthonormal basis
    let mut coeffs = vec![vec![0.0; n_basis]; n_eq];
    for (quad, reference, shape) in sampled.iter() {
        for (eq, eq_coeffs) in coeffs.iter_mut().enumerate() {
            for (m, c) in eq_coeffs.iter_mut().enumerate() {
                *c += quad
                    .weights
                    .iter()
                    .enumerate()
                    .map(|(q, w)| reference.values[eq][q] * scale * shape.poly(m, q) * w)
                    .sum::<f64>();
            }
        }
    }

    sampled
        .into_iter()
        .map(|(quad, reference, shape)| {
            let n_pts = quad.num_points();
            let mut values = vec![vec![0.0; n_pts]; n_eq];
            let mut derivs = vec![vec![0.0; n_pts]; n_eq];
            for eq in 0..n_eq {
                for q in 0..n_pts {
                    for (m, c) in coeffs[eq].iter().enumerate() {
                        values[eq][q] += c * scale * shape.poly(m, q);
                        derivs[eq][q] += c * d_scale * shape.poly_d1(m, q);
                    }
                }
            }
            ProjectedPiece {
                quad,
                reference,
                projection: ElemSolution { values, derivs },
            }
        })
        .collect()
}

/// Score a refinement candidate for `elem` by projecting the reference solution on `patch` onto the candidate's space
///
/// The projection is an L2 projection; its error is measured in `norm`.
pub fn evaluate_candidate(
    norm: Norm,
    elem: &Elem,
    patch: &RefPatch,
    y_ref: &[f64],
    bc: &BoundaryConditions,
    candidate: Candidate,
) -> CandidateScore {
    let (err_sq, ref_norm_sq) = candidate
        .spaces()
        .into_iter()
        .flat_map(|(support, degree)| project_reference(elem, patch, support, degree, y_ref, bc))
        .map(|piece| {
            let zeros = vec![vec![0.0; piece.quad.num_points()]; elem.dof_size];
            let err_sq = super::error_est::squared_difference(
                norm,
                &piece.quad,
                &piece.reference.values,
                &piece.reference.derivs,
                &piece.projection.values,
                &piece.projection.derivs,
            );
            let ref_sq = super::error_est::squared_difference(
                norm,
                &piece.quad,
                &piece.reference.values,
                &piece.reference.derivs,
                &zeros,
                &zeros,
            );
            (err_sq, ref_sq)
        })
        .fold((0.0, 0.0), |(e, r), (e_piece, r_piece)| (e + e_piece, r + r_piece));

    CandidateScore {
        candidate,
        err: err_sq.sqrt(),
        ref_norm: ref_norm_sq.sqrt(),
        added_dof: candidate.added_dof(elem.poly_order),
    }
}

/// Pieces of every space making up `candidate`, for diagnostics
#[cfg(feature = "json_export")]
pub(crate) fn candidate_pieces(
    elem: &Elem,
    patch: &RefPatch,
    y_ref: &[f64],
    bc: &BoundaryConditions,
    candidate: Candidate,
) -> Vec<ProjectedPiece> {
    candidate
        .spaces()
        .into_iter()
        .flat_map(|(support, degree)| project_reference(elem, patch, support, degree, y_ref, bc))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mesh::{h_refinement::HRef, Mesh, ReferenceRefinement};
    use crate::domain::solution::project_function;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn single_elem_patch(p_ref: u8, split: bool, f: impl Fn(f64) -> (Vec<f64>, Vec<f64>)) -> (Mesh, Mesh, Vec<f64>) {
        let coarse = Mesh::new(-0.5, 1.5, 1, 1, 1);
        let mut reference = coarse.replicate();
        if split {
            reference
                .execute_h_refinements(vec![(0, HRef::BisectWith([p_ref, p_ref]))])
                .unwrap();
        } else {
            reference.set_expansion_orders(vec![(0, p_ref)]).unwrap();
        }
        let y_ref = project_function(&reference, f, 4);
        (coarse, reference, y_ref)
    }

    fn patch_of<'a>(coarse: &'a Mesh, reference: &'a Mesh) -> (&'a Elem, RefPatch<'a>) {
        crate::adapt::error_est::elem_pairs(coarse, reference)
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
    }

    #[test]
    fn menu_resolution() {
        let menu = CandidateMenu::hp();
        let for_p1 = menu.resolve(1);
        // Split(-1, ..) drops out; Split(0, 0) adds a single DoF
        assert_eq!(
            for_p1,
            vec![
                Candidate::P { p: 2 },
                Candidate::P { p: 3 },
                Candidate::Split { p_left: 1, p_right: 1 },
                Candidate::Split { p_left: 2, p_right: 1 },
                Candidate::Split { p_left: 1, p_right: 2 },
                Candidate::Split { p_left: 2, p_right: 2 },
            ]
        );
        assert!(for_p1.iter().all(|c| c.added_dof(1) > 0));

        let for_max = menu.resolve(MAX_POLYNOMIAL_ORDER);
        assert!(!for_max.iter().any(|c| matches!(c, Candidate::P { .. })));

        // a candidate identical to the current Elem adds no DoFs
        let same = CandidateMenu::custom(&[CandidateTemplate::P(0), CandidateTemplate::Split(-1, -2)]);
        assert!(same.resolve(3).is_empty());
    }

    #[test]
    fn polynomial_references_are_reproduced() {
        let cubic = |x: f64| (vec![2.0 * x.powi(3) - x + 0.25], vec![6.0 * x * x - 1.0]);

        for split in [false, true] {
            let (coarse, reference, y_ref) = single_elem_patch(3, split, cubic);
            let (elem, patch) = patch_of(&coarse, &reference);

            for norm in [Norm::L2, Norm::H1] {
                let exact = evaluate_candidate(norm, elem, &patch, &y_ref, reference.bc(), Candidate::P { p: 3 });
                assert!(exact.err < 1e-12, "split = {}, err = {}", split, exact.err);

                let halves = evaluate_candidate(
                    norm,
                    elem,
                    &patch,
                    &y_ref,
                    reference.bc(),
                    Candidate::Split { p_left: 3, p_right: 3 },
                );
                assert!(halves.err < 1e-12);

                let too_low = evaluate_candidate(norm, elem, &patch, &y_ref, reference.bc(), Candidate::P { p: 2 });
                assert!(too_low.err > 1e-3);
            }
        }
    }

    #[test]
    fn projection_error_of_linear_onto_constant() {
        // projecting x onto constants over [-0.5, 1.5] leaves x - 0.5, whose L2 norm squared is 2/3
        let (coarse, reference, y_ref) = single_elem_patch(2, false, |x| (vec![x], vec![1.0]));
        let (elem, patch) = patch_of(&coarse, &reference);

        let constant = evaluate_candidate(Norm::L2, elem, &patch, &y_ref, reference.bc(), Candidate::P { p: 0 });
        assert_relative_eq!(constant.err, (2.0_f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_eq!(constant.added_dof, -1);
        assert_eq!(constant.criterion(), None);

        // H1 adds the (unprojected) slope over the Elem length
        let h1 = evaluate_candidate(Norm::H1, elem, &patch, &y_ref, reference.bc(), Candidate::P { p: 0 });
        assert_relative_eq!(h1.err, (2.0_f64 / 3.0 + 2.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn error_decreases_with_degree() {
        let f = |x: f64| (vec![(3.0 * x).sin()], vec![3.0 * (3.0 * x).cos()]);
        for split in [false, true] {
            let (coarse, reference, y_ref) = single_elem_patch(10, split, f);
            let (elem, patch) = patch_of(&coarse, &reference);

            let mut prev = f64::MAX;
            for p in 1..=10 {
                let score = evaluate_candidate(Norm::L2, elem, &patch, &y_ref, reference.bc(), Candidate::P { p });
                assert!(score.err <= prev + 1e-14);
                prev = score.err;
            }

            let mut prev = f64::MAX;
            for p in 1..=10 {
                let score = evaluate_candidate(
                    Norm::L2,
                    elem,
                    &patch,
                    &y_ref,
                    reference.bc(),
                    Candidate::Split { p_left: p, p_right: p },
                );
                assert!(score.err <= prev + 1e-14);
                prev = score.err;
            }
        }
    }

    #[test]
    fn sin_degree_one_vs_five() {
        let coarse = Mesh::new(0.0, 2.0 * PI, 1, 1, 1);
        let mut reference = coarse.replicate();
        reference.set_expansion_orders(vec![(0, 12)]).unwrap();
        let y_ref = project_function(&reference, |x| (vec![x.sin()], vec![x.cos()]), 8);
        let (elem, patch) = patch_of(&coarse, &reference);

        let p1 = evaluate_candidate(Norm::L2, elem, &patch, &y_ref, reference.bc(), Candidate::P { p: 1 });
        let p5 = evaluate_candidate(Norm::L2, elem, &patch, &y_ref, reference.bc(), Candidate::P { p: 5 });
        assert!(p5.err < p1.err);

        // added dof of 4 for p = 5 against an Elem of order 1
        assert_eq!(p5.added_dof, 4);
        assert_relative_eq!(p5.criterion().unwrap(), -p5.err.ln() / 4.0);
    }

    #[test]
    fn split_reference_matches_refined_mesh() {
        // a uniformly h-refined reference mesh routes every Elem through the split paths
        let coarse = Mesh::new(0.0, 1.0, 2, 2, 1);
        let reference = coarse.reference_refinement(ReferenceRefinement::Hp).unwrap();
        let y_ref = project_function(&reference, |x| (vec![x.exp()], vec![x.exp()]), 6);

        let pairs = crate::adapt::error_est::elem_pairs(&coarse, &reference).unwrap();
        assert_eq!(pairs.len(), 2);
        for (elem, patch) in pairs.iter() {
            assert!(matches!(patch, RefPatch::Split(_, _)));
            let split = evaluate_candidate(
                Norm::H1,
                elem,
                patch,
                &y_ref,
                reference.bc(),
                Candidate::Split { p_left: 3, p_right: 3 },
            );
            // the reference is degree 3 on each half, so the split candidate is exact
            assert!(split.err < 1e-12);
            assert!(split.is_exact());
            assert_eq!(split.criterion(), None);
        }
    }

    #[test]
    fn round_off_error_counts_as_exact() {
        let coarse = Mesh::new(0.0, 2.0 * PI, 4, 1, 1);
        let reference = coarse.reference_refinement(ReferenceRefinement::Hp).unwrap();
        let y_ref = project_function(&reference, |x| (vec![x.sin()], vec![x.cos()]), 8);

        for (elem, patch) in crate::adapt::error_est::elem_pairs(&coarse, &reference).unwrap().iter() {
            // halves of order 2 match the reference exactly, up to round-off
            let halves = evaluate_candidate(
                Norm::H1,
                elem,
                patch,
                &y_ref,
                reference.bc(),
                Candidate::Split { p_left: 2, p_right: 2 },
            );
            assert!(halves.ref_norm > 0.1);
            assert!(halves.is_exact(), "err = {}", halves.err);
            assert_eq!(halves.criterion(), None);

            let p2 = evaluate_candidate(Norm::H1, elem, patch, &y_ref, reference.bc(), Candidate::P { p: 2 });
            assert!(!p2.is_exact());
            assert!(p2.criterion().unwrap() > 0.0);
        }
    }
}
