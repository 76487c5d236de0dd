use super::ShapeFn;
use crate::domain::mesh::MAX_POLYNOMIAL_ORDER;
use crate::integration::{canonical_rule, MAX_QUAD_ORDER};

use std::borrow::Cow;
use std::sync::OnceLock;

/// Standard (un-normalized) Legendre polynomials and their first derivatives for degrees `0..=max_n` at `x`
///
/// ```
/// use fem_1d::basis::legendre::standard_legendre_array;
///
/// let (vals, derivs) = standard_legendre_array(0.5, 3);
/// assert!((vals[2] - (3.0 * 0.25 - 1.0) / 2.0).abs() < 1e-14);
/// assert!((derivs[3] - (15.0 * 0.25 - 3.0) / 2.0).abs() < 1e-14);
/// ```
pub fn standard_legendre_array(x: f64, max_n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut vals = Vec::with_capacity(max_n + 1);
    let mut derivs = Vec::with_capacity(max_n + 1);

    vals.push(1.0);
    derivs.push(0.0);
    if max_n >= 1 {
        vals.push(x);
        derivs.push(1.0);
    }

    for n in 1..max_n {
        let n_ = n as f64;
        vals.push(((2.0 * n_ + 1.0) * x * vals[n] - n_ * vals[n - 1]) / (n_ + 1.0));
        derivs.push(
            ((2.0 * n_ + 1.0) * (vals[n] + x * derivs[n]) - n_ * derivs[n - 1]) / (n_ + 1.0),
        );
    }

    (vals, derivs)
}

/// Orthonormal Legendre polynomials (and first derivatives) of degrees `0..=max_n` at `x ∈ [-1, 1]`
///
/// Each standard polynomial `P_n` is divided by its norm `sqrt(2 / (2n + 1))`
pub fn fill_legendre_array(x: f64, max_n: usize) -> (Vec<f64>, Vec<f64>) {
    let (mut vals, mut derivs) = standard_legendre_array(x, max_n);
    for (n, (v, d)) in vals.iter_mut().zip(derivs.iter_mut()).enumerate() {
        let norm = legendre_norm(n);
        *v /= norm;
        *d /= norm;
    }
    (vals, derivs)
}

fn legendre_norm(n: usize) -> f64 {
    (2.0 / (2.0 * n as f64 + 1.0)).sqrt()
}

/// Orthonormal Legendre polynomial of degree `n` on `[-1, 1]`
pub fn legendre_value(n: usize, x: f64) -> f64 {
    fill_legendre_array(x, n).0[n]
}

/// Derivative of the orthonormal Legendre polynomial of degree `n` on `[-1, 1]`
pub fn legendre_derivative(n: usize, x: f64) -> f64 {
    fill_legendre_array(x, n).1[n]
}

/// Orthonormal Legendre polynomial of degree `n` living on the left half `[-1, 0]`
pub fn legendre_left(n: usize, x: f64) -> f64 {
    std::f64::consts::SQRT_2 * legendre_value(n, Support::Left.to_canonical(x))
}

/// Derivative of [legendre_left]
pub fn legendre_left_derivative(n: usize, x: f64) -> f64 {
    2.0 * std::f64::consts::SQRT_2 * legendre_derivative(n, Support::Left.to_canonical(x))
}

/// Orthonormal Legendre polynomial of degree `n` living on the right half `[0, 1]`
pub fn legendre_right(n: usize, x: f64) -> f64 {
    std::f64::consts::SQRT_2 * legendre_value(n, Support::Right.to_canonical(x))
}

/// Derivative of [legendre_right]
pub fn legendre_right_derivative(n: usize, x: f64) -> f64 {
    2.0 * std::f64::consts::SQRT_2 * legendre_derivative(n, Support::Right.to_canonical(x))
}

/// Orthonormal Legendre polynomial of degree `n` on an arbitrary interval `[a, b]`
///
/// ```
/// use fem_1d::basis::legendre::legendre;
///
/// // the constant function is 1 / sqrt(b - a)
/// assert!((legendre(0, 1.0, 5.0, 2.0) - 0.5).abs() < 1e-14);
/// ```
pub fn legendre(n: usize, a: f64, b: f64, x: f64) -> f64 {
    let eta = (2.0 * x - a - b) / (b - a);
    (2.0 / (b - a)).sqrt() * legendre_value(n, eta)
}

/// Derivative (w.r.t. `x`) of [legendre]
pub fn legendre_d1(n: usize, a: f64, b: f64, x: f64) -> f64 {
    let eta = (2.0 * x - a - b) / (b - a);
    (2.0 / (b - a)).sqrt() * (2.0 / (b - a)) * legendre_derivative(n, eta)
}

/// Portion of an element over which an orthonormal basis is defined
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Support {
    /// The entire element
    Full,
    /// The left half of the element
    Left,
    /// The right half of the element
    Right,
}

impl Support {
    /// Physical interval covered by this support on the element `[x1, x2]`
    pub fn interval(&self, x1: f64, x2: f64) -> [f64; 2] {
        let mid = (x1 + x2) / 2.0;
        match self {
            Self::Full => [x1, x2],
            Self::Left => [x1, mid],
            Self::Right => [mid, x2],
        }
    }

    /// Map an element coordinate `xi ∈ [-1, 1]` into the canonical coordinate of this support
    pub fn to_canonical(&self, xi: f64) -> f64 {
        match self {
            Self::Full => xi,
            Self::Left => 2.0 * xi + 1.0,
            Self::Right => 2.0 * xi - 1.0,
        }
    }
}

/// Where a set of canonical Gauss points lies relative to the support of the basis being sampled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// points cover the whole support
    Whole,
    /// points cover the left half of the support
    LeftHalf,
    /// points cover the right half of the support
    RightHalf,
}

impl Placement {
    /// Map a canonical point `t ∈ [-1, 1]` into the support's coordinate
    pub fn map(&self, t: f64) -> f64 {
        match self {
            Self::Whole => t,
            Self::LeftHalf => (t - 1.0) / 2.0,
            Self::RightHalf => (t + 1.0) / 2.0,
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::Whole => 0,
            Self::LeftHalf => 1,
            Self::RightHalf => 2,
        }
    }
}

/// Orthonormal Legendre polynomials sampled over a set of points in `[-1, 1]`
#[derive(Clone, Debug)]
pub struct LegendreShapeFn {
    polys: Vec<Vec<f64>>,
    polys_d1: Vec<Vec<f64>>,
}

impl LegendreShapeFn {
    /// Sampled values for canonical Gauss points of quadrature order `order` laid over the support according to `placement`
    ///
    /// Orders up to [MAX_QUAD_ORDER] are read from a table shared across the process; higher orders are computed directly
    pub fn sampled(order: usize, placement: Placement) -> Cow<'static, Self> {
        match legendre_table().get(order, placement) {
            Some(table) => Cow::Borrowed(table),
            None => {
                let points: Vec<f64> = canonical_rule(order)
                    .points
                    .iter()
                    .map(|t| placement.map(*t))
                    .collect();
                Cow::Owned(Self::with(MAX_POLYNOMIAL_ORDER as usize + 1, &points))
            }
        }
    }
}

impl ShapeFn for LegendreShapeFn {
    fn with(max_order: usize, points: &[f64]) -> Self {
        let mut polys = vec![Vec::with_capacity(points.len()); max_order + 1];
        let mut polys_d1 = vec![Vec::with_capacity(points.len()); max_order + 1];

        for x in points {
            let (vals, derivs) = fill_legendre_array(*x, max_order);
            for n in 0..=max_order {
                polys[n].push(vals[n]);
                polys_d1[n].push(derivs[n]);
            }
        }

        Self { polys, polys_d1 }
    }

    fn poly(&self, n: usize, p: usize) -> f64 {
        self.polys[n][p]
    }

    fn poly_d1(&self, n: usize, p: usize) -> f64 {
        self.polys_d1[n][p]
    }

    fn max_order(&self) -> usize {
        self.polys.len() - 1
    }

    fn num_points(&self) -> usize {
        self.polys.first().map_or(0, |p| p.len())
    }
}

/// Orthonormal Legendre values at the canonical Gauss points of every quadrature order up to [MAX_QUAD_ORDER]
///
/// Each order is sampled three times: over the whole support, and over its left and right halves.
pub struct LegendreTable {
    samples: Vec<[LegendreShapeFn; 3]>,
}

impl LegendreTable {
    fn build() -> Self {
        let max_degree = MAX_POLYNOMIAL_ORDER as usize + 1;
        let samples = (0..=MAX_QUAD_ORDER)
            .map(|order| {
                let points = &canonical_rule(order).points;
                [Placement::Whole, Placement::LeftHalf, Placement::RightHalf].map(|placement| {
                    let mapped: Vec<f64> = points.iter().map(|t| placement.map(*t)).collect();
                    LegendreShapeFn::with(max_degree, &mapped)
                })
            })
            .collect();

        Self { samples }
    }

    /// Look up the sampled polynomials for a quadrature order (`None` if the order is not tabulated)
    pub fn get(&self, order: usize, placement: Placement) -> Option<&LegendreShapeFn> {
        self.samples.get(order).map(|s| &s[placement.index()])
    }
}

static LEGENDRE_TABLE: OnceLock<LegendreTable> = OnceLock::new();

/// The process-wide [LegendreTable] (built on first use)
pub fn legendre_table() -> &'static LegendreTable {
    LEGENDRE_TABLE.get_or_init(LegendreTable::build)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::Quadrature;
    use approx::assert_relative_eq;

    #[test]
    fn recurrence_matches_closed_forms() {
        for x in [-1.0, -0.3, 0.0, 0.45, 1.0] {
            let (vals, derivs) = standard_legendre_array(x, 4);
            assert_relative_eq!(vals[3], (5.0 * x * x * x - 3.0 * x) / 2.0, epsilon = 1e-14);
            assert_relative_eq!(
                vals[4],
                (35.0 * x.powi(4) - 30.0 * x * x + 3.0) / 8.0,
                epsilon = 1e-14
            );
            assert_relative_eq!(derivs[4], (140.0 * x.powi(3) - 60.0 * x) / 8.0, epsilon = 1e-13);
        }
    }

    #[test]
    fn full_basis_orthonormal() {
        let n_max = MAX_POLYNOMIAL_ORDER as usize;
        let quad = Quadrature::new(-1.0, 1.0, 2 * n_max + 2);
        let shape = LegendreShapeFn::with(n_max, &quad.points);

        for m in 0..=n_max {
            for n in 0..=n_max {
                let ip: f64 = quad
                    .weights
                    .iter()
                    .enumerate()
                    .map(|(p, w)| shape.poly(m, p) * shape.poly(n, p) * w)
                    .sum();
                let expected = if m == n { 1.0 } else { 0.0 };
                assert!((ip - expected).abs() < 1e-10, "<L{}, L{}> = {}", m, n, ip);
            }
        }
    }

    #[test]
    fn half_bases_orthonormal() {
        let n_max = MAX_POLYNOMIAL_ORDER as usize;
        for (support, [a, b]) in [(Support::Left, [-1.0, 0.0]), (Support::Right, [0.0, 1.0])] {
            let quad = Quadrature::new(a, b, 2 * n_max + 2);
            for m in 0..=n_max {
                for n in m..=n_max {
                    let ip: f64 = quad
                        .points
                        .iter()
                        .zip(quad.weights.iter())
                        .map(|(x, w)| {
                            let (lm, ln) = match support {
                                Support::Left => (legendre_left(m, *x), legendre_left(n, *x)),
                                _ => (legendre_right(m, *x), legendre_right(n, *x)),
                            };
                            lm * ln * w
                        })
                        .sum();
                    let expected = if m == n { 1.0 } else { 0.0 };
                    assert!((ip - expected).abs() < 1e-10);
                }
            }
        }
    }

    #[test]
    fn half_basis_derivatives() {
        let h = 1e-6;
        for n in 0..6 {
            let x = -0.37;
            let fd = (legendre_left(n, x + h) - legendre_left(n, x - h)) / (2.0 * h);
            assert_relative_eq!(legendre_left_derivative(n, x), fd, epsilon = 1e-5);

            let x = 0.61;
            let fd = (legendre_right(n, x + h) - legendre_right(n, x - h)) / (2.0 * h);
            assert_relative_eq!(legendre_right_derivative(n, x), fd, epsilon = 1e-5);
        }
    }

    #[test]
    fn interval_basis_matches_half_bases() {
        for n in 0..5 {
            assert_relative_eq!(legendre(n, -1.0, 0.0, -0.2), legendre_left(n, -0.2), epsilon = 1e-13);
            assert_relative_eq!(legendre(n, 0.0, 1.0, 0.8), legendre_right(n, 0.8), epsilon = 1e-13);
            assert_relative_eq!(
                legendre_d1(n, 0.0, 1.0, 0.8),
                legendre_right_derivative(n, 0.8),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn interval_basis_normalization() {
        // the constant is 1 / sqrt(b - a); the linear function sqrt(3 / (b - a)) * (2x - a - b) / (b - a)
        assert_relative_eq!(legendre(0, 1.0, 5.0, 2.0), 0.5, epsilon = 1e-14);
        assert_relative_eq!(legendre(1, 1.0, 5.0, 5.0), 0.75_f64.sqrt(), epsilon = 1e-14);
        assert_relative_eq!(legendre_d1(1, 1.0, 5.0, 2.0), 0.75_f64.sqrt() / 2.0, epsilon = 1e-14);
    }

    #[test]
    fn table_matches_direct_evaluation() {
        let order = 12;
        let direct_points = &canonical_rule(order).points;
        let tabled = LegendreShapeFn::sampled(order, Placement::RightHalf);
        assert_eq!(tabled.num_points(), direct_points.len());
        assert_eq!(tabled.max_order(), MAX_POLYNOMIAL_ORDER as usize + 1);

        for (p, t) in direct_points.iter().enumerate() {
            let x = Placement::RightHalf.map(*t);
            assert_relative_eq!(tabled.poly(7, p), legendre_value(7, x), epsilon = 1e-12);
            assert_relative_eq!(tabled.poly_d1(7, p), legendre_derivative(7, x), epsilon = 1e-10);
        }

        // orders beyond the table fall back to direct computation
        let beyond = LegendreShapeFn::sampled(MAX_QUAD_ORDER + 4, Placement::Whole);
        assert!(matches!(beyond, Cow::Owned(_)));
        assert_eq!(beyond.num_points(), (MAX_QUAD_ORDER + 4) / 2 + 1);
    }
}
