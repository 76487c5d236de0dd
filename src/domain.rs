/// The internal geometric structure of a 1D Domain
pub mod mesh;
/// Utilities to build and evaluate coefficient vectors over a Mesh
pub mod solution;

pub use mesh::{elem::Elem, BoundaryConditions, Mesh, ReferenceRefinement};
