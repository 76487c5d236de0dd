use super::mesh::{
    elem::{Elem, ElemSolution},
    Mesh,
};
use crate::basis::{LobattoShapeFn, ShapeFn};
use crate::integration::canonical_rule;

/// Project a function onto the Finite Element space described by a `Mesh`
///
/// `f(x)` returns the values and first derivatives of every equation's component at `x`.
/// Vertex coefficients interpolate `f`; bubble coefficients come from an H1-seminorm projection of the remainder.
/// Functions which are polynomials of degree `<= p` on every Elem are reproduced exactly.
///
/// Constrained (Dirichlet) vertices are skipped; their values come from the Mesh's boundary conditions.
///
/// ```
/// use fem_1d::domain::{Mesh, solution::{project_function, evaluate_at}};
///
/// let mesh = Mesh::new(0.0, 1.0, 2, 3, 1);
/// let y = project_function(&mesh, |x| (vec![x.powi(3)], vec![3.0 * x * x]), 0);
///
/// let (u, dudx) = evaluate_at(&mesh, &y, 0.3).unwrap();
/// assert!((u[0] - 0.027).abs() < 1e-12);
/// assert!((dudx[0] - 0.27).abs() < 1e-12);
/// ```
pub fn project_function<F>(mesh: &Mesh, f: F, extra_order: usize) -> Vec<f64>
where
    F: Fn(f64) -> (Vec<f64>, Vec<f64>),
{
    project_with(mesh, extra_order, |_, points| {
        let n_eq = mesh.n_eq();
        let mut values = vec![Vec::with_capacity(points.len()); n_eq];
        let mut derivs = vec![Vec::with_capacity(points.len()); n_eq];
        for x in points {
            let (u, dudx) = f(*x);
            for eq in 0..n_eq {
                values[eq].push(u[eq]);
                derivs[eq].push(dudx[eq]);
            }
        }
        ElemSolution { values, derivs }
    })
}

/// Express a solution on `source` as a coefficient vector on `target`
///
/// The transfer is exact when every active Elem of `target` lies within one active Elem of `source` with an expansion
/// order no larger than its own (which is the case for reference meshes built with [Mesh::reference_refinement]).
/// Otherwise the source solution is projected onto the target space.
pub fn transfer_solution(source: &Mesh, y_source: &[f64], target: &Mesh) -> Vec<f64> {
    assert_eq!(
        y_source.len(),
        source.n_dof(),
        "Coefficient vector does not match the source Mesh; cannot transfer solution!"
    );
    assert_eq!(
        source.n_eq(),
        target.n_eq(),
        "Meshes describe different numbers of equations; cannot transfer solution!"
    );

    project_with(target, 0, |target_elem, points| {
        let n_eq = target.n_eq();
        let mut values = vec![Vec::with_capacity(points.len()); n_eq];
        let mut derivs = vec![Vec::with_capacity(points.len()); n_eq];

        let mut source_elem = source.active_elem_containing(target_elem.midpoint());
        for x in points {
            if !source_elem.map_or(false, |e| e.contains(*x)) {
                source_elem = source.active_elem_containing(*x);
            }
            let (u, dudx) = match source_elem {
                Some(elem) => {
                    let sol = elem.get_solution(&[*x], y_source, source.bc());
                    (
                        sol.values.iter().map(|v| v[0]).collect(),
                        sol.derivs.iter().map(|d| d[0]).collect(),
                    )
                }
                None => (vec![0.0; n_eq], vec![0.0; n_eq]),
            };
            for eq in 0..n_eq {
                values[eq].push(u[eq]);
                derivs[eq].push(dudx[eq]);
            }
        }

        ElemSolution { values, derivs }
    })
}

/// Values and first derivatives of every equation's component at `x` (`None` if `x` is outside of the Mesh)
pub fn evaluate_at(mesh: &Mesh, y: &[f64], x: f64) -> Option<(Vec<f64>, Vec<f64>)> {
    mesh.active_elem_containing(x).map(|elem| {
        let sol = elem.get_solution(&[x], y, mesh.bc());
        (
            sol.values.iter().map(|v| v[0]).collect(),
            sol.derivs.iter().map(|d| d[0]).collect(),
        )
    })
}

fn project_with<S>(mesh: &Mesh, extra_order: usize, sampler: S) -> Vec<f64>
where
    S: Fn(&Elem, &[f64]) -> ElemSolution,
{
    let mut y = vec![0.0; mesh.n_dof()];

    for elem in mesh.active_elems() {
        let p = elem.poly_order as usize;
        let rule = canonical_rule(2 * p + extra_order);
        let lobatto = LobattoShapeFn::with(p, &rule.points);

        let mut sample_points: Vec<f64> = rule.points.iter().map(|xi| elem.to_real(*xi)).collect();
        sample_points.push(elem.x1);
        sample_points.push(elem.x2);
        let sampled = sampler(elem, &sample_points);
        let n_quad = rule.points.len();

        for eq in 0..mesh.n_eq() {
            let dofs = elem.dofs(eq);
            if let Some(left) = dofs[0] {
                y[left] = sampled.values[eq][n_quad];
            }
            if let Some(right) = dofs[1] {
                y[right] = sampled.values[eq][n_quad + 1];
            }

            for (k, dof) in dofs.iter().enumerate().skip(2) {
                if let Some(dof) = dof {
                    y[*dof] = rule
                        .weights
                        .iter()
                        .enumerate()
                        .map(|(q, w)| sampled.derivs[eq][q] * elem.jacobian() * lobatto.poly_d1(k, q) * w)
                        .sum();
                }
            }
        }
    }

    y
}
