use super::p_refinement::{checked_expansion, PRefError};
use std::fmt;

/// Description of an h-Refinement (bisection) of an `Elem`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HRef {
    /// Split into two halves which inherit the parent's expansion order
    Bisect,
    /// Split into two halves with the given `[left, right]` expansion orders
    BisectWith([u8; 2]),
}

impl HRef {
    /// Expansion orders of the `[left, right]` children given the parent's order
    pub fn child_orders(&self, parent_order: u8) -> Result<[u8; 2], PRefError> {
        match self {
            Self::Bisect => Ok([parent_order; 2]),
            Self::BisectWith([p_left, p_right]) => Ok([
                checked_expansion(*p_left as i16)?,
                checked_expansion(*p_right as i16)?,
            ]),
        }
    }
}

/// Location of a child `Elem` relative to its parent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bisection {
    Left,
    Right,
}

impl Bisection {
    pub fn index(&self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    /// Portion of the `parent_range` covered by this half
    pub fn sub_range(&self, [x1, x2]: [f64; 2]) -> [f64; 2] {
        let mid = (x1 + x2) / 2.0;
        match self {
            Self::Left => [x1, mid],
            Self::Right => [mid, x2],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HRefError {
    ElemDoesntExist(usize),
    ElemHasChildren(usize),
    DoubleRefinement(usize),
    MinLengthReached(usize, f64),
    InvalidChildExpansion(usize, PRefError),
}

impl fmt::Display for HRefError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ElemDoesntExist(elem_id) => write!(f, "Elem {} does not exist; Cannot apply h-Refinement!", elem_id),
            Self::ElemHasChildren(elem_id) => write!(f, "Elem {} already has children; Cannot apply h-Refinement!", elem_id),
            Self::DoubleRefinement(elem_id) => write!(f, "Multiple h-refinements were specified for Elem {}; Cannot apply h-Refinements", elem_id),
            Self::MinLengthReached(elem_id, length) => write!(f, "Elem {} has length {:e}; Children would be smaller than the minimum Elem length!", elem_id, length),
            Self::InvalidChildExpansion(elem_id, err) => write!(f, "Invalid expansion order for the children of Elem {}: {}", elem_id, err),
        }
    }
}

impl std::error::Error for HRefError {}
