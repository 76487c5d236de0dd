use super::candidates::{evaluate_candidate, Candidate, CandidateScore, RefPatch};
use super::{AdaptConfig, AdaptError, Norm};
use crate::domain::mesh::{elem::Elem, BoundaryConditions};

use log::{debug, warn};

/// How to treat candidates which reproduce the reference solution (projection error at round-off level, see
/// [EXACT_REL_TOL](super::candidates::EXACT_REL_TOL))
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DegeneratePolicy {
    /// Exclude them; their score `-ln(err)` only measures round-off
    Reject,
    /// Pick the exact candidate with the fewest added DoFs (then the earliest in the menu)
    PreferExact,
}

/// The refinement chosen for one coarse Elem
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub elem_id: usize,
    pub candidate: Candidate,
    /// Projection error of the chosen candidate
    pub err: f64,
    pub added_dof: i32,
    /// `-ln(err) / added_dof` (infinite for an exact candidate chosen under [DegeneratePolicy::PreferExact])
    pub score: f64,
}

/// Evaluate every candidate for `elem` and choose the best one
pub fn select(
    norm: Norm,
    candidates: &[Candidate],
    elem: &Elem,
    patch: &RefPatch,
    y_ref: &[f64],
    bc: &BoundaryConditions,
    config: &AdaptConfig,
) -> Result<Selection, AdaptError> {
    if candidates.is_empty() {
        return Err(AdaptError::EmptyCandidateMenu(elem.id));
    }

    let scores: Vec<CandidateScore> = candidates
        .iter()
        .map(|candidate| evaluate_candidate(norm, elem, patch, y_ref, bc, *candidate))
        .collect();

    if config.diagnostics.trace {
        for score in scores.iter() {
            debug!(
                "Elem {} [{:.4}, {:.4}] p = {}: {:?} err = {:.6e}, added dof = {}",
                elem.id, elem.x1, elem.x2, elem.poly_order, score.candidate, score.err, score.added_dof
            );
        }
    }

    if let Some(dir) = config.diagnostics.dump_dir.as_ref() {
        dump_candidates(dir, &scores, elem, patch, y_ref, bc);
    }

    let selection = choose_best(elem.id, &scores, config.degenerate_policy)?;
    if config.diagnostics.trace {
        debug!("Elem {}: selected {:?}", elem.id, selection.candidate);
    }
    Ok(selection)
}

#[cfg(feature = "json_export")]
fn dump_candidates(
    dir: &str,
    scores: &[CandidateScore],
    elem: &Elem,
    patch: &RefPatch,
    y_ref: &[f64],
    bc: &BoundaryConditions,
) {
    for score in scores {
        let dump = super::diagnostics::CandidateDump::collect(elem, patch, y_ref, bc, score);
        if let Err(err) = dump.write_to_dir(dir) {
            warn!("Failed to write candidate dump for Elem {}: {}", elem.id, err);
        }
    }
}

#[cfg(not(feature = "json_export"))]
fn dump_candidates(_: &str, _: &[CandidateScore], elem: &Elem, _: &RefPatch, _: &[f64], _: &BoundaryConditions) {
    warn!("Elem {}: candidate dumps require the \"json_export\" feature", elem.id);
}

/// Choose the candidate with the largest `-ln(err) / added_dof`
///
/// Ties keep the candidate listed first. Candidates which add no DoFs are never chosen.
pub fn choose_best(
    elem_id: usize,
    scores: &[CandidateScore],
    policy: DegeneratePolicy,
) -> Result<Selection, AdaptError> {
    if scores.is_empty() {
        return Err(AdaptError::EmptyCandidateMenu(elem_id));
    }

    let as_selection = |score: &CandidateScore, value: f64| Selection {
        elem_id,
        candidate: score.candidate,
        err: score.err,
        added_dof: score.added_dof,
        score: value,
    };

    if policy == DegeneratePolicy::PreferExact {
        let mut exact: Option<&CandidateScore> = None;
        for score in scores.iter().filter(|s| s.is_exact() && s.added_dof > 0) {
            if exact.map_or(true, |best| score.added_dof < best.added_dof) {
                exact = Some(score);
            }
        }
        if let Some(score) = exact {
            return Ok(as_selection(score, f64::INFINITY));
        }
    }

    let mut best: Option<(&CandidateScore, f64)> = None;
    for score in scores {
        match score.criterion() {
            Some(value) => {
                if best.map_or(true, |(_, best_value)| value > best_value) {
                    best = Some((score, value));
                }
            }
            None if score.is_exact() && score.added_dof > 0 => {
                warn!(
                    "Elem {}: {:?} reproduces the reference solution; excluded from selection",
                    elem_id, score.candidate
                );
            }
            None => {}
        }
    }

    best.map(|(score, value)| as_selection(score, value))
        .ok_or_else(|| AdaptError::NoViableCandidate {
            elem_id,
            detail: format!(
                "all {} candidates were exact, non-finite, or added no DoFs",
                scores.len()
            ),
        })
}
