/// A Finite Element interval
pub mod elem;
/// Structures and Functions to facilitate h-refinement by bisection
pub mod h_refinement;
/// Structures and Functions to facilitate p-refinement
pub mod p_refinement;

use elem::Elem;
use h_refinement::{HRef, HRefError};
use p_refinement::{checked_expansion, PRef, PRefError};

#[cfg(feature = "json_export")]
use json::object;
use json::JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::read_to_string;
#[cfg(feature = "json_export")]
use std::fs::File;
use std::io;
#[cfg(feature = "json_export")]
use std::io::BufWriter;

/// Minimum Elem length. h-Refinements will fail once children would be shorter than this value.
pub const MIN_ELEM_LENGTH: f64 = 3.0518e-5; // 15ish refinement layers with unit sized elems

/// The expected "h-Refinement" depth. This determines the stack allocation size of some `SmallVec`s related to h-Refinement
pub const EXPECTED_NUM_H_REFINEMENTS: usize = 8;

/// Maximum Polynomial expansion. p-Refinements will fail when Elem's expansion orders exceed this value.
pub const MAX_POLYNOMIAL_ORDER: u8 = 20;

/// Optional Dirichlet values for each equation at the two ends of the domain
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryConditions {
    pub left: Vec<Option<f64>>,
    pub right: Vec<Option<f64>>,
}

impl BoundaryConditions {
    fn free(n_eq: usize) -> Self {
        Self {
            left: vec![None; n_eq],
            right: vec![None; n_eq],
        }
    }
}

/// How a reference mesh is derived from a coarse mesh
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceRefinement {
    /// bisect every active Elem, keeping expansion orders
    H,
    /// raise every active Elem's expansion order by one (up to [MAX_POLYNOMIAL_ORDER])
    P,
    /// bisect every active Elem and raise both children's expansion orders by one (up to [MAX_POLYNOMIAL_ORDER])
    Hp,
}

impl Default for ReferenceRefinement {
    fn default() -> Self {
        Self::Hp
    }
}

/// Error produced by a batch of mixed refinements
#[derive(Debug, Clone, PartialEq)]
pub enum RefinementError {
    H(HRefError),
    P(PRefError),
}

impl From<HRefError> for RefinementError {
    fn from(err: HRefError) -> Self {
        Self::H(err)
    }
}

impl From<PRefError> for RefinementError {
    fn from(err: PRefError) -> Self {
        Self::P(err)
    }
}

impl fmt::Display for RefinementError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::H(err) => write!(f, "{}", err),
            Self::P(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for RefinementError {}

/// A 1D decomposition of the interval `[a, b]` into a forest of `Elem`s
///
/// The first `n_base` `Elem`s form the base layer in left-to-right order. h-Refinement appends children to `elems`,
/// so the active `Elem`s (those without children) always partition the domain.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub elems: Vec<Elem>,
    n_base: usize,
    n_eq: usize,
    bc: BoundaryConditions,
    n_dof: usize,
}

impl Mesh {
    /// Construct a Mesh over `[a, b]` with `n_elem` equally sized Elems of expansion order `p_init`, for a system of `n_eq` equations
    pub fn new(a: f64, b: f64, n_elem: usize, p_init: u8, n_eq: usize) -> Self {
        assert!(n_elem > 0, "A Mesh must have at least one Elem!");
        let h = (b - a) / n_elem as f64;
        let nodes: Vec<f64> = (0..=n_elem)
            .map(|i| if i == n_elem { b } else { a + h * i as f64 })
            .collect();
        Self::from_nodes(&nodes, &vec![p_init; n_elem], n_eq)
    }

    /// Construct a Mesh from a list of increasing node locations and one expansion order per Elem
    pub fn from_nodes(nodes: &[f64], orders: &[u8], n_eq: usize) -> Self {
        assert!(nodes.len() >= 2, "A Mesh needs at least two nodes!");
        assert_eq!(
            nodes.len() - 1,
            orders.len(),
            "Expected one expansion order per Elem; cannot construct Mesh!"
        );
        assert!(n_eq > 0, "A Mesh must describe at least one equation!");
        for p in orders {
            assert!(
                checked_expansion(*p as i16).is_ok(),
                "Expansion order {} is outside of [1, {}]; cannot construct Mesh!",
                p,
                MAX_POLYNOMIAL_ORDER
            );
        }

        let elems = nodes
            .windows(2)
            .zip(orders.iter())
            .enumerate()
            .map(|(id, (bounds, p))| Elem::new(id, [bounds[0], bounds[1]], *p, n_eq))
            .collect::<Vec<_>>();

        let mut mesh = Self {
            n_base: elems.len(),
            elems,
            n_eq,
            bc: BoundaryConditions::free(n_eq),
            n_dof: 0,
        };
        mesh.assign_dofs();
        mesh
    }

    /// Construct a Mesh from a JSON file with the following format
    ///
    /// The following describes a three Elem mesh for a two equation system with Dirichlet conditions on the left end:
    /// ```text
    ///   p=1         p=2         p=1
    /// *-----------*-----------*-----------*
    /// 0.0        1.0         2.5         4.0
    /// ```
    ///
    /// mesh.json
    /// ```JSON
    /// {
    ///     "Equations": 2,
    ///     "Nodes": [0.0, 1.0, 2.5, 4.0],
    ///     "Expansions": [1, 2, 1],
    ///     "Dirichlet": {
    ///         "left": [0.0, 1.0],
    ///         "right": [null, null]
    ///     }
    /// }
    /// ```
    pub fn from_file(path: impl AsRef<str>) -> io::Result<Self> {
        let mesh_file_contents = read_to_string(path.as_ref())?;
        let mesh_file_json = json::parse(&mesh_file_contents)
            .map_err(|err| invalid_mesh_file(format!("Unable to parse Mesh File as JSON: {}", err)))?;

        let n_eq = mesh_file_json["Equations"]
            .as_usize()
            .ok_or_else(|| invalid_mesh_file("Equations must be a positive integer!"))?;

        let nodes = parse_numbers(&mesh_file_json["Nodes"], "Nodes")?;
        let orders = parse_numbers(&mesh_file_json["Expansions"], "Expansions")?
            .iter()
            .map(|p| checked_expansion(*p as i16).map_err(|err| invalid_mesh_file(err.to_string())))
            .collect::<io::Result<Vec<u8>>>()?;

        if n_eq == 0 || nodes.len() < 2 || orders.len() + 1 != nodes.len() {
            return Err(invalid_mesh_file(
                "Mesh File must have one equation, two nodes, and one expansion per Elem at minimum!",
            ));
        }
        if nodes.windows(2).any(|w| w[1] <= w[0]) {
            return Err(invalid_mesh_file("Nodes must be strictly increasing!"));
        }

        let mut mesh = Self::from_nodes(&nodes, &orders, n_eq);

        let dirichlet = &mesh_file_json["Dirichlet"];
        for (side, is_left) in [("left", true), ("right", false)] {
            for (eq, value) in dirichlet[side].members().enumerate().take(n_eq) {
                if let Some(value) = value.as_f64() {
                    if is_left {
                        mesh.set_bc_left_dirichlet(eq, value);
                    } else {
                        mesh.set_bc_right_dirichlet(eq, value);
                    }
                }
            }
        }

        Ok(mesh)
    }

    /// Print the mesh to a JSON file specified by path.
    #[cfg(feature = "json_export")]
    pub fn export_to_json(&self, path: impl AsRef<str>) -> io::Result<()> {
        let f = File::create(path.as_ref())?;
        let mut w = BufWriter::new(&f);

        let mesh_object = object! {
            "Equations": self.n_eq,
            "Domain": JsonValue::from(self.domain().to_vec()),
            "Dirichlet": object! {
                "left": JsonValue::from(self.bc.left.clone()),
                "right": JsonValue::from(self.bc.right.clone()),
            },
            "NumDofs": self.n_dof,
            "Elems": JsonValue::from(self.elems.iter().map(|elem| elem.to_json()).collect::<Vec<_>>()),
        };

        mesh_object.write_pretty(&mut w, 4)?;

        Ok(())
    }

    // ----------------------------------------------------------------------------------------------------
    // General Data Retrieval
    // ----------------------------------------------------------------------------------------------------

    /// Number of equations in the system
    pub fn n_eq(&self) -> usize {
        self.n_eq
    }

    /// Number of unconstrained degrees of freedom
    pub fn n_dof(&self) -> usize {
        self.n_dof
    }

    /// The interval `[a, b]` covered by this Mesh
    pub fn domain(&self) -> [f64; 2] {
        [self.elems[0].x1, self.elems[self.n_base - 1].x2]
    }

    pub fn bc(&self) -> &BoundaryConditions {
        &self.bc
    }

    /// Iterate over the active `Elem`s (those without children) from left to right
    pub fn active_elems(&self) -> ActiveElems<'_> {
        ActiveElems {
            mesh: self,
            stack: (0..self.n_base).rev().collect(),
        }
    }

    pub fn n_active_elems(&self) -> usize {
        self.elems.iter().filter(|e| !e.has_children()).count()
    }

    /// The left-most active Elem whose interval contains `x`
    pub fn active_elem_containing(&self, x: f64) -> Option<&Elem> {
        self.active_elems().find(|e| e.contains(x))
    }

    /// Determine if this Elem can be h-refined
    /// * returns false if the Elem already has children
    /// * returns false if the Elem's children would be shorter than [MIN_ELEM_LENGTH]
    /// * returns an `Err` if the Mesh doesn't have `elem_id`
    pub fn elem_is_h_refineable(&self, elem_id: usize) -> Result<bool, HRefError> {
        match self.elems.get(elem_id) {
            Some(elem) => Ok(!elem.has_children() && elem.length() / 2.0 >= MIN_ELEM_LENGTH),
            None => Err(HRefError::ElemDoesntExist(elem_id)),
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // Boundary Conditions and Degrees of Freedom
    // ----------------------------------------------------------------------------------------------------

    /// Constrain equation `eq` to `value` at the left end of the domain
    pub fn set_bc_left_dirichlet(&mut self, eq: usize, value: f64) {
        assert!(eq < self.n_eq, "Equation {} does not exist; cannot set boundary condition!", eq);
        self.bc.left[eq] = Some(value);
        self.assign_dofs();
    }

    /// Constrain equation `eq` to `value` at the right end of the domain
    pub fn set_bc_right_dirichlet(&mut self, eq: usize, value: f64) {
        assert!(eq < self.n_eq, "Equation {} does not exist; cannot set boundary condition!", eq);
        self.bc.right[eq] = Some(value);
        self.assign_dofs();
    }

    /// Number the degrees of freedom of the active `Elem`s, returning the total count
    ///
    /// Equations are numbered one after the other. Within an equation, DoFs are numbered from left to right with
    /// neighboring `Elem`s sharing their common vertex. Vertices carrying a Dirichlet condition receive no DoF.
    pub fn assign_dofs(&mut self) -> usize {
        let active: Vec<usize> = self.active_elems().map(|e| e.id).collect();
        for elem in self.elems.iter_mut() {
            elem.dofs.clear();
        }
        for id in active.iter() {
            let elem = &mut self.elems[*id];
            elem.dofs = vec![vec![None; elem.num_local_dofs()]; self.n_eq];
        }

        let mut next_dof = 0;
        let mut take_dof = || {
            next_dof += 1;
            Some(next_dof - 1)
        };

        for eq in 0..self.n_eq {
            let mut shared_vertex = match self.bc.left[eq] {
                Some(_) => None,
                None => take_dof(),
            };

            for (i, id) in active.iter().enumerate() {
                let is_last = i + 1 == active.len();
                let elem = &mut self.elems[*id];

                elem.dofs[eq][0] = shared_vertex;
                for bubble in 2..elem.num_local_dofs() {
                    elem.dofs[eq][bubble] = take_dof();
                }
                shared_vertex = if is_last && self.bc.right[eq].is_some() {
                    None
                } else {
                    take_dof()
                };
                elem.dofs[eq][1] = shared_vertex;
            }
        }

        self.n_dof = next_dof;
        self.n_dof
    }

    // ----------------------------------------------------------------------------------------------------
    // Reference Meshes
    // ----------------------------------------------------------------------------------------------------

    /// An independent copy of this Mesh
    pub fn replicate(&self) -> Self {
        self.clone()
    }

    /// Construct a globally refined copy of this Mesh
    ///
    /// Elems already at [MAX_POLYNOMIAL_ORDER] keep their order under `P` and `Hp` refinements.
    pub fn reference_refinement(
        &self,
        kind: ReferenceRefinement,
    ) -> Result<Self, RefinementError> {
        let mut reference = self.replicate();
        let active: Vec<(usize, u8)> = self.active_elems().map(|e| (e.id, e.poly_order)).collect();

        match kind {
            ReferenceRefinement::H => {
                reference.execute_h_refinements(
                    active.iter().map(|(id, _)| (*id, HRef::Bisect)).collect(),
                )?;
            }
            ReferenceRefinement::P => {
                reference.set_expansion_orders(
                    active.iter().map(|(id, p)| (*id, raised_order(*p))).collect(),
                )?;
            }
            ReferenceRefinement::Hp => {
                reference.execute_h_refinements(
                    active
                        .iter()
                        .map(|(id, p)| (*id, HRef::BisectWith([raised_order(*p); 2])))
                        .collect(),
                )?;
            }
        }

        Ok(reference)
    }

    // ----------------------------------------------------------------------------------------------------
    // h-refinement methods
    // ----------------------------------------------------------------------------------------------------

    /// Apply an [HRef] to all active [Elem]s
    pub fn global_h_refinement(&mut self, refinement: HRef) -> Result<(), HRefError> {
        let active: Vec<usize> = self.active_elems().map(|e| e.id).collect();
        self.h_refine_elems(active, refinement)
    }

    /// Apply an [HRef] to a list of [Elem]s by their ID
    pub fn h_refine_elems(&mut self, elems: Vec<usize>, refinement: HRef) -> Result<(), HRefError> {
        self.execute_h_refinements(elems.iter().map(|elem_id| (*elem_id, refinement)).collect())
    }

    /// Execute a series of [HRef]s on [Elem]s specified by their id
    ///
    /// Every refinement is validated before any `Elem` is modified.
    pub fn execute_h_refinements(
        &mut self,
        refinements: Vec<(usize, HRef)>,
    ) -> Result<(), HRefError> {
        let mut refinements_map: BTreeMap<usize, HRef> = BTreeMap::new();
        for (elem_id, h_ref) in refinements {
            if !self.elem_is_h_refineable(elem_id)? {
                return Err(match self.elems[elem_id].has_children() {
                    true => HRefError::ElemHasChildren(elem_id),
                    false => HRefError::MinLengthReached(elem_id, self.elems[elem_id].length()),
                });
            }
            h_ref
                .child_orders(self.elems[elem_id].poly_order)
                .map_err(|err| HRefError::InvalidChildExpansion(elem_id, err))?;
            if refinements_map.insert(elem_id, h_ref).is_some() {
                return Err(HRefError::DoubleRefinement(elem_id));
            }
        }

        let mut id_counter = self.elems.len();
        for (elem_id, refinement) in refinements_map {
            let children = self.elems[elem_id].h_refine(refinement, &mut id_counter)?;
            self.elems.extend(children);
        }

        self.assign_dofs();
        Ok(())
    }

    // ----------------------------------------------------------------------------------------------------
    // p-refinement methods
    // ----------------------------------------------------------------------------------------------------

    /// Apply a [PRef] to all active [Elem]s
    pub fn global_p_refinement(&mut self, refinement: PRef) -> Result<(), PRefError> {
        let active: Vec<usize> = self.active_elems().map(|e| e.id).collect();
        self.p_refine_elems(active, refinement)
    }

    /// Apply a [PRef] to a list of [Elem]s by their ID
    pub fn p_refine_elems(&mut self, elems: Vec<usize>, refinement: PRef) -> Result<(), PRefError> {
        self.execute_p_refinements(elems.iter().map(|elem_id| (*elem_id, refinement)).collect())
    }

    /// Execute a series of [PRef]s on [Elem]s specified by their id
    pub fn execute_p_refinements(
        &mut self,
        refinements: Vec<(usize, PRef)>,
    ) -> Result<(), PRefError> {
        let mut orders = Vec::with_capacity(refinements.len());
        for (elem_id, p_ref) in refinements {
            let elem = self
                .elems
                .get(elem_id)
                .ok_or(PRefError::ElemDoesntExist(elem_id))?;
            orders.push((elem_id, p_ref.refine(elem.poly_order)?));
        }

        self.set_expansion_orders(orders)
    }

    /// Set absolute expansion orders on a series of active [Elem]s specified by their id
    pub fn set_expansion_orders(&mut self, poly_orders: Vec<(usize, u8)>) -> Result<(), PRefError> {
        let mut poly_orders_map: BTreeMap<usize, u8> = BTreeMap::new();
        for (elem_id, order) in poly_orders {
            match self.elems.get(elem_id) {
                None => return Err(PRefError::ElemDoesntExist(elem_id)),
                Some(elem) if elem.has_children() => {
                    return Err(PRefError::ElemHasChildren(elem_id))
                }
                Some(_) => (),
            }
            if poly_orders_map
                .insert(elem_id, checked_expansion(order as i16)?)
                .is_some()
            {
                return Err(PRefError::DoubleRefinement(elem_id));
            }
        }

        for (elem_id, order) in poly_orders_map {
            self.elems[elem_id].poly_order = order;
        }

        self.assign_dofs();
        Ok(())
    }
}

/// Sequential cursor over the active `Elem`s of a [Mesh] in domain order
///
/// Each cursor is independent, so two Meshes can be walked in lockstep.
#[derive(Clone)]
pub struct ActiveElems<'a> {
    mesh: &'a Mesh,
    stack: Vec<usize>,
}

impl<'a> Iterator for ActiveElems<'a> {
    type Item = &'a Elem;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            let elem = &self.mesh.elems[id];
            match elem.child_ids() {
                Some([left, right]) => {
                    self.stack.push(right);
                    self.stack.push(left);
                }
                None => return Some(elem),
            }
        }
        None
    }
}

// ----------------------------------------------------------------------------------------------------
// Mesh construction from JSON Utility functions
// ----------------------------------------------------------------------------------------------------

/// Expansion order of an Elem in a P or Hp reference mesh
fn raised_order(p: u8) -> u8 {
    p.saturating_add(1).min(MAX_POLYNOMIAL_ORDER)
}

fn invalid_mesh_file(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn parse_numbers(json_array: &JsonValue, name: &str) -> io::Result<Vec<f64>> {
    if !json_array.is_array() {
        return Err(invalid_mesh_file(format!("{} must be an Array!", name)));
    }
    json_array
        .members()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| invalid_mesh_file(format!("{} must only contain numbers!", name)))
        })
        .collect()
}
