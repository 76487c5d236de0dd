/// Orthonormal Legendre polynomials used to build projection spaces for refinement candidates
pub mod legendre;
/// Hierarchic H1-conforming shape functions used to represent Finite Element solutions
pub mod lobatto;

pub use legendre::{LegendreShapeFn, Placement, Support};
pub use lobatto::LobattoShapeFn;

/// A family of 1D polynomials sampled over a fixed set of points on `[-1, 1]`
///
/// Implementors store the sampled values so that repeated lookups during integration are cheap.
pub trait ShapeFn {
    /// Sample all polynomials of degree `0..=max_order` at `points`
    fn with(max_order: usize, points: &[f64]) -> Self;

    /// Value of the degree `n` polynomial at point index `p`
    fn poly(&self, n: usize, p: usize) -> f64;

    /// First derivative of the degree `n` polynomial at point index `p`
    fn poly_d1(&self, n: usize, p: usize) -> f64;

    /// Highest sampled degree
    fn max_order(&self) -> usize;

    /// Number of sample points
    fn num_points(&self) -> usize;
}
