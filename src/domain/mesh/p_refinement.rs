use super::MAX_POLYNOMIAL_ORDER;
use std::fmt;

/// Description of a relative p-Refinement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PRef {
    Increment(u8),
    Decrement(u8),
    None,
}

impl PRef {
    pub const fn from(d: i8) -> Self {
        match d {
            0 => Self::None,
            d if d > 0 => Self::Increment(d as u8),
            d => Self::Decrement(d.unsigned_abs()),
        }
    }

    /// Apply this refinement to an expansion order
    pub fn refine(&self, n: u8) -> Result<u8, PRefError> {
        match self {
            Self::Increment(delta) => checked_expansion(n as i16 + *delta as i16),
            Self::Decrement(delta) => checked_expansion(n as i16 - *delta as i16),
            Self::None => Ok(n),
        }
    }
}

/// Validate an absolute expansion order
///
/// H1-conforming elements need at least the two vertex functions, so orders must fall within `1..=MAX_POLYNOMIAL_ORDER`
pub fn checked_expansion(n: i16) -> Result<u8, PRefError> {
    if n < 1 {
        Err(PRefError::NegExpansion)
    } else if n > MAX_POLYNOMIAL_ORDER as i16 {
        Err(PRefError::ExceededMaxExpansion)
    } else {
        Ok(n as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PRefError {
    NegExpansion,
    ExceededMaxExpansion,
    ElemDoesntExist(usize),
    ElemHasChildren(usize),
    DoubleRefinement(usize),
}

impl fmt::Display for PRefError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NegExpansion => write!(f, "p-Refinement will result in an expansion order below 1; Cannot p-Refine!"),
            Self::ExceededMaxExpansion => write!(f, "p-Refinement will result in expansion order over maximum ({}); Cannot p-Refine!", MAX_POLYNOMIAL_ORDER),
            Self::ElemDoesntExist(elem_id) => write!(f, "Elem {} does not exist; Cannot apply p-Refinement!", elem_id),
            Self::ElemHasChildren(elem_id) => write!(f, "Elem {} has been h-Refined; Cannot apply p-Refinement to an inactive Elem!", elem_id),
            Self::DoubleRefinement(elem_id) => write!(f, "Multiple p-refinements were specified for Elem {}; Cannot apply p-Refinements", elem_id),
        }
    }
}

impl std::error::Error for PRefError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_refinements() {
        assert_eq!(PRef::from(2).refine(3).unwrap(), 5);
        assert_eq!(PRef::from(-2).refine(3).unwrap(), 1);
        assert_eq!(PRef::from(0).refine(7).unwrap(), 7);
        assert_eq!(PRef::from(-1).refine(1), Err(PRefError::NegExpansion));
        assert_eq!(
            PRef::from(1).refine(MAX_POLYNOMIAL_ORDER),
            Err(PRefError::ExceededMaxExpansion)
        );
    }

    #[test]
    #[should_panic]
    fn decrement_to_zero() {
        PRef::from(-3).refine(3).unwrap();
    }
}
