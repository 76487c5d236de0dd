/// Methods to assist in Gauss-Legendre-Quadrature integration
pub mod glq;

use crate::domain::mesh::MAX_POLYNOMIAL_ORDER;
use glq::{gauss_quadrature_points, scale_gauss_quad_points};

use std::borrow::Cow;
use std::sync::OnceLock;

/// Largest quadrature order kept in the process-wide rule cache.
///
/// Products of two polynomials of degree `MAX_POLYNOMIAL_ORDER + 1` are integrated exactly by rules up to this order.
pub const MAX_QUAD_ORDER: usize = 2 * (MAX_POLYNOMIAL_ORDER as usize + 1);

/// A Gauss-Legendre quadrature rule over some interval
#[derive(Clone, Debug)]
pub struct Quadrature {
    pub points: Vec<f64>,
    pub weights: Vec<f64>,
}

impl Quadrature {
    /// Rule over `[a, b]` which integrates polynomials up to degree `order` exactly
    ///
    /// ```
    /// use fem_1d::integration::Quadrature;
    ///
    /// let quad = Quadrature::new(0.0, 2.0, 4);
    /// assert_eq!(quad.num_points(), 3);
    ///
    /// let integral: f64 = quad.integrate(|x| x.powi(4));
    /// assert!((integral - 32.0 / 5.0).abs() < 1e-12);
    /// ```
    pub fn new(a: f64, b: f64, order: usize) -> Self {
        let canonical = canonical_rule(order);
        let (scale, points) = scale_gauss_quad_points(&canonical.points, a, b);
        Self {
            points,
            weights: canonical.weights.iter().map(|w| w * scale).collect(),
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Integrate a function over the interval described by this rule
    pub fn integrate<F: Fn(f64) -> f64>(&self, f: F) -> f64 {
        glq::real_gauss_quad(&self.weights, |p| f(self.points[p]))
    }
}

/// Number of Gauss points needed to integrate polynomials of degree `order` exactly
pub fn num_points_for_order(order: usize) -> usize {
    order / 2 + 1
}

static CANONICAL_RULES: OnceLock<Vec<Quadrature>> = OnceLock::new();

/// Gauss-Legendre rule over `(-1, 1)` for a given quadrature order
///
/// Rules up to [MAX_QUAD_ORDER] are computed once and shared; higher orders are computed on demand.
pub fn canonical_rule(order: usize) -> Cow<'static, Quadrature> {
    let rules = CANONICAL_RULES.get_or_init(|| {
        (0..=MAX_QUAD_ORDER)
            .map(|order| {
                let (points, weights) = gauss_quadrature_points(num_points_for_order(order));
                Quadrature { points, weights }
            })
            .collect()
    });

    match rules.get(order) {
        Some(rule) => Cow::Borrowed(rule),
        None => {
            let (points, weights) = gauss_quadrature_points(num_points_for_order(order));
            Cow::Owned(Quadrature { points, weights })
        }
    }
}
