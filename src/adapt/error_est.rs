use super::candidates::RefPatch;
use super::{check_coefficients, AdaptError, Norm};
use crate::domain::mesh::{elem::Elem, BoundaryConditions, Mesh};
use crate::integration::{num_points_for_order, Quadrature};

/// Relative tolerance used when comparing Elem bounds between meshes
const GEOMETRY_TOL: f64 = 1e-12;

/// Elem errors at or below this fraction of the reference solution's norm are round-off and never flagged
pub const NEGLIGIBLE_ERR_REL: f64 = 1e-12;

/// Per-Elem and total error between a coarse and a reference solution
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorEstimate {
    /// Square root of the sum of all Elem errors squared
    pub total: f64,
    /// `(coarse Elem id, error squared)` in domain order
    pub elem_errors_squared: Vec<(usize, f64)>,
    /// Norm of the reference solution over the whole mesh
    pub reference_norm: f64,
}

impl ErrorEstimate {
    /// The error squared of one coarse Elem
    pub fn elem_error_squared(&self, elem_id: usize) -> Option<f64> {
        self.elem_errors_squared
            .iter()
            .find(|(id, _)| *id == elem_id)
            .map(|(_, err_sq)| *err_sq)
    }

    pub fn max_elem_error(&self) -> f64 {
        self.elem_errors_squared
            .iter()
            .map(|(_, err_sq)| err_sq.sqrt())
            .fold(0.0, f64::max)
    }

    /// `total` relative to some norm (the absolute error is returned when the norm vanishes)
    pub fn relative_to(&self, norm: f64) -> f64 {
        if norm > 0.0 {
            self.total / norm
        } else {
            self.total
        }
    }

    /// Ids (in domain order) of the Elems whose error exceeds `threshold` times the largest Elem error
    ///
    /// Nothing is flagged when the largest Elem error is negligible against the reference norm.
    pub fn flagged(&self, threshold: f64) -> Vec<usize> {
        let max_err = self.max_elem_error();
        if max_err == 0.0 || max_err <= NEGLIGIBLE_ERR_REL * self.reference_norm {
            return Vec::new();
        }

        self.elem_errors_squared
            .iter()
            .filter(|(_, err_sq)| err_sq.sqrt() > threshold * max_err)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Walk the active Elems of `coarse` and `reference` in lockstep, pairing each coarse Elem with its footprint in the reference mesh
///
/// Each coarse Elem must match either one reference Elem of the same level and bounds, or two consecutive reference Elems
/// one level deeper which bisect it. The reference mesh must not have Elems left over once the coarse mesh is exhausted.
pub fn elem_pairs<'a>(
    coarse: &'a Mesh,
    reference: &'a Mesh,
) -> Result<Vec<(&'a Elem, RefPatch<'a>)>, AdaptError> {
    if coarse.n_eq() != reference.n_eq() {
        return Err(AdaptError::MeshMismatch {
            elem_id: None,
            detail: format!(
                "coarse mesh has {} equations but reference mesh has {}",
                coarse.n_eq(),
                reference.n_eq()
            ),
        });
    }

    let mut ref_cursor = reference.active_elems();
    let mut pairs = Vec::with_capacity(coarse.n_active_elems());

    for elem in coarse.active_elems() {
        let mismatch = |detail: String| AdaptError::MeshMismatch {
            elem_id: Some(elem.id),
            detail,
        };
        let tol = GEOMETRY_TOL * elem.length().max(1.0);

        let e_ref = ref_cursor
            .next()
            .ok_or_else(|| mismatch(String::from("reference mesh ran out of Elems")))?;

        if e_ref.level == elem.level {
            if (e_ref.x1 - elem.x1).abs() > tol || (e_ref.x2 - elem.x2).abs() > tol {
                return Err(mismatch(format!(
                    "reference Elem {} covers [{}, {}] instead of [{}, {}]",
                    e_ref.id, e_ref.x1, e_ref.x2, elem.x1, elem.x2
                )));
            }
            pairs.push((elem, RefPatch::Whole(e_ref)));
        } else if e_ref.level == elem.level + 1 {
            let e_ref_right = ref_cursor
                .next()
                .ok_or_else(|| mismatch(String::from("missing right half in reference mesh")))?;

            if e_ref_right.level != elem.level + 1
                || (e_ref.x1 - elem.x1).abs() > tol
                || (e_ref.x2 - e_ref_right.x1).abs() > tol
                || (e_ref_right.x2 - elem.x2).abs() > tol
            {
                return Err(mismatch(format!(
                    "reference Elems {} and {} do not bisect [{}, {}]",
                    e_ref.id, e_ref_right.id, elem.x1, elem.x2
                )));
            }
            pairs.push((elem, RefPatch::Split(e_ref, e_ref_right)));
        } else {
            return Err(mismatch(format!(
                "reference Elem {} is on level {}, expected {} or {}",
                e_ref.id,
                e_ref.level,
                elem.level,
                elem.level + 1
            )));
        }
    }

    if let Some(extra) = ref_cursor.next() {
        return Err(AdaptError::MeshMismatch {
            elem_id: None,
            detail: format!("reference Elem {} is not covered by the coarse mesh", extra.id),
        });
    }

    Ok(pairs)
}

/// Norm squared of the solution on one Elem (quadrature of order `2p`)
pub fn elem_norm_squared(norm: Norm, elem: &Elem, y: &[f64], bc: &BoundaryConditions) -> f64 {
    let quad = Quadrature::new(elem.x1, elem.x2, 2 * elem.poly_order as usize);
    let sol = elem.get_solution(&quad.points, y, bc);

    (0..elem.dof_size)
        .map(|eq| {
            quad.weights
                .iter()
                .enumerate()
                .map(|(q, w)| {
                    let mut val = sol.values[eq][q].powi(2);
                    if norm == Norm::H1 {
                        val += sol.derivs[eq][q].powi(2);
                    }
                    val * w
                })
                .sum::<f64>()
        })
        .sum()
}

/// Error squared between the coarse solution on `elem` and the reference solution on its footprint
///
/// * `RefPatch::Whole`: one quadrature of order `2 * p_ref` over the Elem
/// * `RefPatch::Split`: each half integrated separately with order `2 * p_half`
pub fn elem_error_squared(
    norm: Norm,
    elem: &Elem,
    patch: &RefPatch,
    y: &[f64],
    y_ref: &[f64],
    bc: &BoundaryConditions,
) -> f64 {
    patch
        .elems()
        .iter()
        .map(|e_ref| {
            let quad = Quadrature::new(e_ref.x1, e_ref.x2, 2 * e_ref.poly_order as usize);
            let coarse_sol = elem.get_solution(&quad.points, y, bc);
            let ref_sol = e_ref.get_solution(&quad.points, y_ref, bc);
            squared_difference(norm, &quad, &coarse_sol.values, &coarse_sol.derivs, &ref_sol.values, &ref_sol.derivs)
        })
        .sum()
}

pub(crate) fn squared_difference(
    norm: Norm,
    quad: &Quadrature,
    values_a: &[Vec<f64>],
    derivs_a: &[Vec<f64>],
    values_b: &[Vec<f64>],
    derivs_b: &[Vec<f64>],
) -> f64 {
    let mut err_sq = 0.0;
    for eq in 0..values_a.len() {
        for (q, w) in quad.weights.iter().enumerate() {
            let mut diff_sq = (values_a[eq][q] - values_b[eq][q]).powi(2);
            if norm == Norm::H1 {
                diff_sq += (derivs_a[eq][q] - derivs_b[eq][q]).powi(2);
            }
            err_sq += diff_sq * w;
        }
    }
    err_sq
}

/// Estimate the error of the coarse solution `y` against the reference solution `y_ref`
///
/// The coarse and reference meshes share their boundary conditions.
pub fn estimate(
    norm: Norm,
    coarse: &Mesh,
    reference: &Mesh,
    y: &[f64],
    y_ref: &[f64],
) -> Result<ErrorEstimate, AdaptError> {
    check_coefficients(coarse, y)?;
    check_coefficients(reference, y_ref)?;

    let elem_errors_squared: Vec<(usize, f64)> = elem_pairs(coarse, reference)?
        .iter()
        .map(|(elem, patch)| {
            (
                elem.id,
                elem_error_squared(norm, elem, patch, y, y_ref, coarse.bc()),
            )
        })
        .collect();

    let total = elem_errors_squared
        .iter()
        .map(|(_, err_sq)| err_sq)
        .sum::<f64>()
        .sqrt();

    Ok(ErrorEstimate {
        total,
        elem_errors_squared,
        reference_norm: solution_norm(norm, reference, y_ref)?,
    })
}

/// Norm of a solution over a whole mesh
pub fn solution_norm(norm: Norm, mesh: &Mesh, y: &[f64]) -> Result<f64, AdaptError> {
    check_coefficients(mesh, y)?;
    Ok(mesh
        .active_elems()
        .map(|elem| elem_norm_squared(norm, elem, y, mesh.bc()))
        .sum::<f64>()
        .sqrt())
}

/// Error of a mesh solution against an exact solution `exact(x) -> (values, derivatives)`, with a fixed quadrature order per Elem
pub fn exact_error<F>(norm: Norm, mesh: &Mesh, y: &[f64], exact: F, order: usize) -> Result<f64, AdaptError>
where
    F: Fn(f64) -> (Vec<f64>, Vec<f64>),
{
    check_coefficients(mesh, y)?;
    let err_sq: f64 = mesh
        .active_elems()
        .map(|elem| {
            let quad = Quadrature::new(elem.x1, elem.x2, order);
            let sol = elem.get_solution(&quad.points, y, mesh.bc());
            let (values, derivs) = sample_exact(&exact, &quad.points, mesh.n_eq());
            squared_difference(norm, &quad, &sol.values, &sol.derivs, &values, &derivs)
        })
        .sum();

    Ok(err_sq.sqrt())
}

/// Norm of an exact solution over `[a, b]`, split into `subdivision` equal pieces integrated with a fixed order
pub fn exact_norm<F>(norm: Norm, exact: F, n_eq: usize, a: f64, b: f64, subdivision: usize, order: usize) -> f64
where
    F: Fn(f64) -> (Vec<f64>, Vec<f64>),
{
    let h = (b - a) / subdivision as f64;
    let zeros = vec![vec![0.0; num_points_for_order(order)]; n_eq];

    (0..subdivision)
        .map(|i| {
            let quad = Quadrature::new(a + h * i as f64, a + h * (i + 1) as f64, order);
            let (values, derivs) = sample_exact(&exact, &quad.points, n_eq);
            squared_difference(norm, &quad, &values, &derivs, &zeros, &zeros)
        })
        .sum::<f64>()
        .sqrt()
}

fn sample_exact<F>(exact: &F, points: &[f64], n_eq: usize) -> (Vec<Vec<f64>>, Vec<Vec<f64>>)
where
    F: Fn(f64) -> (Vec<f64>, Vec<f64>),
{
    let mut values = vec![Vec::with_capacity(points.len()); n_eq];
    let mut derivs = vec![Vec::with_capacity(points.len()); n_eq];
    for x in points {
        let (u, dudx) = exact(*x);
        for eq in 0..n_eq {
            values[eq].push(u[eq]);
            derivs[eq].push(dudx[eq]);
        }
    }
    (values, derivs)
}
