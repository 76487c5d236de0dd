//! 1D hp-adaptive Finite Element toolkit
//!
//! Systems of first order ODEs are discretized with hierarchic Lobatto shape functions on a [Mesh] of
//! variable order Elems, solved with a damped Newton iteration and adapted against a globally refined
//! reference solution. Refinement candidates for each flagged Elem are scored by projecting the reference
//! solution onto orthonormal Legendre spaces.

/// Error estimation, candidate selection and the adaptivity loop
pub mod adapt;
/// Legendre and Lobatto polynomials
pub mod basis;
/// The Mesh and solution coefficient vectors
pub mod domain;
/// Weak forms, assembly and Newton's method
pub mod fem_problem;
/// Gauss-Legendre quadrature
pub mod integration;

pub use adapt::{AdaptConfig, AdaptError, AdaptType, HpAdaptivity, MeshSolver, Norm};
pub use domain::{BoundaryConditions, Elem, Mesh, ReferenceRefinement};
pub use fem_problem::{newton::NewtonSolver, DiscreteProblem, NewtonMeshSolver};
