use nalgebra::{DMatrix, SymmetricEigen};

/// 1D Gauss Legendre Quadrature integral of some function F sampled at each quadrature point
/// ```
/// use fem_1d::integration::glq::*;
///
/// // define glq points over `(-1, 1)`
/// let (points, weights) = gauss_quadrature_points(10);
///
/// // compute the integral of x^4
/// let solution = real_gauss_quad(&weights, |p| points[p].powi(4));
///
/// assert!((solution - 2.0 / 5.0).abs() < 1e-12);
/// ```
pub fn real_gauss_quad<F>(weights: &[f64], integrand: F) -> f64
where
    F: Fn(usize) -> f64,
{
    weights
        .iter()
        .enumerate()
        .map(|(p, w)| integrand(p) * w)
        .sum()
}

/// Get a set of n Gauss-Legendre-Quadrature Integration points and weights over `(-1, 1)`
///
/// ```
/// use fem_1d::integration::glq::*;
///
/// // generate 10 GLQ points and weights over the range `(-1, 1)`
/// let (points, weights) = gauss_quadrature_points(10);
/// assert_eq!(points.len(), 10);
/// assert_eq!(weights.len(), 10);
/// assert!(points.iter().sum::<f64>().abs() < 1e-12);
/// assert!((weights.iter().sum::<f64>() - 2.0).abs() < 1e-12);
/// ```
// Golub-Welsch: points are the eigenvalues of the Jacobi matrix of the Legendre recurrence,
// weights are 2 * (first component of each normalized eigenvector)^2
pub fn gauss_quadrature_points(n: usize) -> (Vec<f64>, Vec<f64>) {
    if n == 1 {
        return (vec![0.0], vec![2.0]);
    }

    // off-diagonal entries k / sqrt(4k^2 - 1)
    let beta = |k: usize| {
        let k = k as f64;
        k / (4.0 * k * k - 1.0).sqrt()
    };
    let jacobi = DMatrix::from_fn(n, n, |r, c| match r.abs_diff(c) {
        1 => beta(r.max(c)),
        _ => 0.0,
    });

    let SymmetricEigen {
        eigenvalues,
        eigenvectors,
    } = SymmetricEigen::new(jacobi);

    let mut rule: Vec<(f64, f64)> = eigenvalues
        .iter()
        .zip(eigenvectors.row(0).iter())
        .map(|(x, v)| (*x, 2.0 * v * v))
        .collect();
    rule.sort_by(|a, b| a.0.total_cmp(&b.0));

    rule.into_iter().unzip()
}

/// Scale a set of Gauss-Legendre-Quadrature Integration points to fall within a specific range
///
/// ```
/// use fem_1d::integration::glq::*;
/// // generate 10 GLQ points and weights over the range `(-1, 1)`
/// let (points, weights) = gauss_quadrature_points(10);
///
/// // scale the points to the range `(-0.75, 0.25)`
/// let (scale, points_scaled) = scale_gauss_quad_points(&points, -0.75, 0.25);
///
/// assert!(points_scaled.iter().all(|x| *x > -0.75 && *x < 0.25));
/// assert!((0.5 - scale).abs() < 1e-12);
/// ```
pub fn scale_gauss_quad_points(points: &[f64], min: f64, max: f64) -> (f64, Vec<f64>) {
    let scale_factor = (max - min) / 2.0;
    let offset = (max + min) / 2.0;

    (
        scale_factor,
        points
            .iter()
            .map(|x| x * scale_factor + offset)
            .collect::<Vec<f64>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::legendre::legendre_value;

    #[test]
    fn single_point_rule() {
        let (points, weights) = gauss_quadrature_points(1);
        assert_eq!(points, vec![0.0]);
        assert_eq!(weights, vec![2.0]);
    }

    #[test]
    fn closed_form_rules() {
        let (points, weights) = gauss_quadrature_points(2);
        let x = 1.0 / 3.0_f64.sqrt();
        assert!((points[0] + x).abs() < 1e-14 && (points[1] - x).abs() < 1e-14);
        assert!(weights.iter().all(|w| (w - 1.0).abs() < 1e-14));

        let (points, weights) = gauss_quadrature_points(3);
        let x = 0.6_f64.sqrt();
        for (p, p_expected) in points.iter().zip([-x, 0.0, x]) {
            assert!((p - p_expected).abs() < 1e-14);
        }
        for (w, w_expected) in weights.iter().zip([5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0]) {
            assert!((w - w_expected).abs() < 1e-14);
        }
    }

    #[test]
    fn points_are_symmetric_roots_of_legendre() {
        for n in 2..=21 {
            let (points, weights) = gauss_quadrature_points(n);
            assert!(points.windows(2).all(|w| w[0] < w[1]));
            assert!(points.iter().all(|x| x.abs() < 1.0));
            assert!((weights.iter().sum::<f64>() - 2.0).abs() < 1e-13);

            for i in 0..n {
                assert!((points[i] + points[n - 1 - i]).abs() < 1e-13, "n = {}", n);
                assert!((weights[i] - weights[n - 1 - i]).abs() < 1e-13, "n = {}", n);
                assert!(legendre_value(n, points[i]).abs() < 1e-10, "n = {}, x = {}", n, points[i]);
            }
        }
    }

    #[test]
    fn n_point_rule_integrates_degree_2n_minus_1() {
        for n in 1..=21 {
            let (points, weights) = gauss_quadrature_points(n);
            for k in 0..(2 * n as i32) {
                let solution = real_gauss_quad(&weights, |p| points[p].powi(k));
                let expected = if k % 2 == 0 { 2.0 / (k + 1) as f64 } else { 0.0 };
                assert!((solution - expected).abs() < 1e-12, "n = {}, k = {}", n, k);
            }
        }
    }

    #[test]
    fn scaled_points_integrate_over_range() {
        let (points, weights) = gauss_quadrature_points(4);
        let (scale, scaled) = scale_gauss_quad_points(&points, 0.25, 0.5);
        assert!((scale - 0.125).abs() < 1e-15);

        // x^3 over [0.25, 0.5]
        let solution = real_gauss_quad(&weights, |p| scaled[p].powi(3)) * scale;
        let expected = (0.5_f64.powi(4) - 0.25_f64.powi(4)) / 4.0;
        assert!((solution - expected).abs() < 1e-15);
    }
}
