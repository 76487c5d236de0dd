#[cfg(feature = "json_export")]
use super::candidates::{candidate_pieces, CandidateScore, RefPatch};
use super::candidates::Candidate;
#[cfg(feature = "json_export")]
use crate::domain::mesh::{elem::Elem, BoundaryConditions};

#[cfg(feature = "json_export")]
use json::{array, object, JsonValue};
#[cfg(feature = "json_export")]
use std::fs::{create_dir_all, File};
#[cfg(feature = "json_export")]
use std::io::{self, BufWriter};
#[cfg(feature = "json_export")]
use std::path::Path;

/// Optional output produced while candidates are scored
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Diagnostics {
    /// Log every candidate's error and added DoFs at `debug` level
    pub trace: bool,
    /// Write the reference solution and each candidate's projection to this directory
    pub dump_dir: Option<String>,
}

/// The reference solution and a candidate's projection of it, sampled at the quadrature points of every piece
#[derive(Clone, Debug)]
pub struct CandidateDump {
    pub elem_id: usize,
    pub candidate: Candidate,
    pub err: f64,
    pub x: Vec<f64>,
    /// `reference[eq][point]`
    pub reference: Vec<Vec<f64>>,
    /// `projection[eq][point]`
    pub projection: Vec<Vec<f64>>,
}

#[cfg(feature = "json_export")]
impl CandidateDump {
    pub fn collect(
        elem: &Elem,
        patch: &RefPatch,
        y_ref: &[f64],
        bc: &BoundaryConditions,
        score: &CandidateScore,
    ) -> Self {
        let mut dump = Self {
            elem_id: elem.id,
            candidate: score.candidate,
            err: score.err,
            x: Vec::new(),
            reference: vec![Vec::new(); elem.dof_size],
            projection: vec![Vec::new(); elem.dof_size],
        };

        for piece in candidate_pieces(elem, patch, y_ref, bc, score.candidate) {
            dump.x.extend_from_slice(&piece.quad.points);
            for eq in 0..elem.dof_size {
                dump.reference[eq].extend_from_slice(&piece.reference.values[eq]);
                dump.projection[eq].extend_from_slice(&piece.projection.values[eq]);
            }
        }

        dump
    }

    pub fn to_json(&self) -> JsonValue {
        let candidate = match self.candidate {
            Candidate::P { p } => object! { "kind": "p", "orders": array![p] },
            Candidate::Split { p_left, p_right } => object! { "kind": "hp", "orders": array![p_left, p_right] },
        };

        object! {
            "elem": self.elem_id,
            "candidate": candidate,
            "err": self.err,
            "x": self.x.clone(),
            "reference": self.reference.clone(),
            "projection": self.projection.clone(),
        }
    }

    /// File name of this dump within a dump directory
    pub fn file_name(&self) -> String {
        match self.candidate {
            Candidate::P { p } => format!("elem_{}_p{}.json", self.elem_id, p),
            Candidate::Split { p_left, p_right } => {
                format!("elem_{}_split_{}_{}.json", self.elem_id, p_left, p_right)
            }
        }
    }

    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> io::Result<()> {
        create_dir_all(dir.as_ref())?;
        let file = File::create(dir.as_ref().join(self.file_name()))?;
        let mut writer = BufWriter::new(file);
        self.to_json().write_pretty(&mut writer, 4)
    }
}

#[cfg(all(test, feature = "json_export"))]
mod tests {
    use super::*;
    use crate::adapt::candidates::evaluate_candidate;
    use crate::adapt::error_est::elem_pairs;
    use crate::adapt::Norm;
    use crate::domain::mesh::{Mesh, ReferenceRefinement};
    use crate::domain::solution::project_function;

    #[test]
    fn dump_samples_every_piece() {
        let coarse = Mesh::new(0.0, 1.0, 1, 2, 1);
        let reference = coarse.reference_refinement(ReferenceRefinement::Hp).unwrap();
        let y_ref = project_function(&reference, |x| (vec![x.exp()], vec![x.exp()]), 4);
        let (elem, patch) = elem_pairs(&coarse, &reference).unwrap().remove(0);

        let candidate = Candidate::P { p: 3 };
        let score = evaluate_candidate(Norm::L2, elem, &patch, &y_ref, reference.bc(), candidate);
        let dump = CandidateDump::collect(elem, &patch, &y_ref, reference.bc(), &score);

        // two reference halves of order 3, each integrated with 4 points
        assert_eq!(dump.x.len(), 8);
        assert_eq!(dump.reference[0].len(), 8);
        assert!(dump.x.windows(2).all(|w| w[0] < w[1]));
        assert!(dump.reference[0].iter().zip(dump.x.iter()).all(|(r, x)| (r - x.exp()).abs() < 1e-3));

        let json = dump.to_json();
        assert_eq!(json["candidate"]["kind"], "p");
        assert_eq!(json["x"].len(), 8);
        assert_eq!(dump.file_name(), "elem_0_p3.json");
    }

    #[test]
    fn dump_is_written() {
        let coarse = Mesh::new(0.0, 1.0, 1, 1, 1);
        let reference = coarse.reference_refinement(ReferenceRefinement::P).unwrap();
        let y_ref = project_function(&reference, |x| (vec![x * x], vec![2.0 * x]), 2);
        let (elem, patch) = elem_pairs(&coarse, &reference).unwrap().remove(0);

        let score = evaluate_candidate(Norm::H1, elem, &patch, &y_ref, reference.bc(), Candidate::P { p: 2 });
        let dump = CandidateDump::collect(elem, &patch, &y_ref, reference.bc(), &score);
        dump.write_to_dir("./test_output/candidate_dumps").unwrap();

        assert!(Path::new("./test_output/candidate_dumps/elem_0_p2.json").exists());
    }
}
