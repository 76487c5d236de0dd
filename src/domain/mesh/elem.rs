use super::{
    h_refinement::{Bisection, HRef, HRefError},
    BoundaryConditions, EXPECTED_NUM_H_REFINEMENTS, MIN_ELEM_LENGTH,
};
use crate::basis::{LobattoShapeFn, ShapeFn};
#[cfg(feature = "json_export")]
use json::{array, object, JsonValue};
use smallvec::SmallVec;

/// `Elem`s are the basic geometric unit of a 1D `Mesh`
///
/// `Elem`s are responsible for keeping track of:
/// * Their interval `[x1, x2]` in real space
/// * Connections to their parent `Elem` (and their own h-refinement state)
/// * Connections to their child `Elem`s (if h-refined)
/// * Their polynomial expansion order (p-refinement state)
/// * The global ids of their local degrees of freedom
///
/// ## Local Degrees of Freedom
/// Each equation has `poly_order + 1` local slots ordered as:
/// ```text
///     [left vertex, right vertex, bubble 2, bubble 3, ..., bubble p]
/// ```
/// A vertex slot holding `None` is constrained by a Dirichlet condition.
#[derive(Debug, Clone)]
pub struct Elem {
    pub id: usize,
    pub x1: f64,
    pub x2: f64,
    /// Number of bisections separating this `Elem` from the base layer of the `Mesh`
    pub level: usize,
    pub poly_order: u8,
    /// Number of equations in the system
    pub dof_size: usize,
    pub(crate) dofs: Vec<Vec<Option<usize>>>,
    children: Option<[usize; 2]>,
    ancestors: SmallVec<[(usize, Bisection); EXPECTED_NUM_H_REFINEMENTS]>,
}

impl Elem {
    pub fn new(id: usize, [x1, x2]: [f64; 2], poly_order: u8, dof_size: usize) -> Self {
        assert!(
            x2 > x1,
            "Elem bounds must be increasing; cannot construct Elem {} over [{}, {}]!",
            id,
            x1,
            x2
        );

        Self {
            id,
            x1,
            x2,
            level: 0,
            poly_order,
            dof_size,
            dofs: Vec::new(),
            children: None,
            ancestors: SmallVec::new(),
        }
    }

    /// Construct the two children described by an [HRef] of this Elem
    pub(crate) fn h_refine(
        &mut self,
        refinement: HRef,
        id_counter: &mut usize,
    ) -> Result<[Elem; 2], HRefError> {
        if self.children.is_some() {
            return Err(HRefError::ElemHasChildren(self.id));
        }
        if self.length() / 2.0 < MIN_ELEM_LENGTH {
            return Err(HRefError::MinLengthReached(self.id, self.length()));
        }

        let orders = refinement
            .child_orders(self.poly_order)
            .map_err(|err| HRefError::InvalidChildExpansion(self.id, err))?;

        let children = [Bisection::Left, Bisection::Right].map(|loc| {
            let id = *id_counter;
            *id_counter += 1;

            let mut ancestors = self.ancestors.clone();
            ancestors.push((self.id, loc));

            Elem {
                id,
                x1: 0.0,
                x2: 0.0,
                level: self.level + 1,
                poly_order: orders[loc.index()],
                dof_size: self.dof_size,
                dofs: Vec::new(),
                children: None,
                ancestors,
            }
            .with_range(loc.sub_range([self.x1, self.x2]))
        });

        self.children = Some([children[0].id, children[1].id]);
        self.dofs.clear();

        Ok(children)
    }

    fn with_range(mut self, [x1, x2]: [f64; 2]) -> Self {
        self.x1 = x1;
        self.x2 = x2;
        self
    }

    /// Id of the Parent Elem if this Elem has a parent
    pub fn parent_id(&self) -> Option<usize> {
        self.ancestors.last().map(|(id, _)| *id)
    }

    /// Returns the ids of this Elem's `[left, right]` children. Returns `None` if this Elem has no children.
    pub fn child_ids(&self) -> Option<[usize; 2]> {
        self.children
    }

    /// Has this `Elem` been h-Refined
    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }

    pub fn length(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn midpoint(&self) -> f64 {
        (self.x1 + self.x2) / 2.0
    }

    /// Jacobian of the map from `[-1, 1]` onto `[x1, x2]`
    pub fn jacobian(&self) -> f64 {
        self.length() / 2.0
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.x1 && x <= self.x2
    }

    /// Map a real space point into this Elem's parametric coordinate `xi ∈ [-1, 1]`
    pub fn to_parametric(&self, x: f64) -> f64 {
        (x - self.midpoint()) / self.jacobian()
    }

    /// Map a parametric coordinate `xi ∈ [-1, 1]` into real space
    pub fn to_real(&self, xi: f64) -> f64 {
        self.midpoint() + xi * self.jacobian()
    }

    /// Number of local shape functions per equation
    pub fn num_local_dofs(&self) -> usize {
        self.poly_order as usize + 1
    }

    /// Global DoF ids of one equation's local shape functions (empty for inactive `Elem`s)
    pub fn dofs(&self, eq: usize) -> &[Option<usize>] {
        self.dofs.get(eq).map_or(&[], |d| d.as_slice())
    }

    /// Evaluate the solution and its first derivative on this Elem at a set of real space `points`
    ///
    /// Constrained vertex slots take their values from `bc`: the left vertex from `bc.left` and the right vertex from `bc.right`.
    pub fn get_solution(&self, points: &[f64], y: &[f64], bc: &BoundaryConditions) -> ElemSolution {
        let xis: Vec<f64> = points.iter().map(|x| self.to_parametric(*x)).collect();
        let shape = LobattoShapeFn::with(self.poly_order as usize, &xis);
        let inv_jac = 1.0 / self.jacobian();

        let mut values = vec![vec![0.0; points.len()]; self.dof_size];
        let mut derivs = vec![vec![0.0; points.len()]; self.dof_size];

        for (eq, (vals, ders)) in values.iter_mut().zip(derivs.iter_mut()).enumerate() {
            for (local, dof) in self.dofs(eq).iter().enumerate() {
                let coeff = match (dof, local) {
                    (Some(global), _) => y[*global],
                    (None, 0) => bc.left[eq].unwrap_or(0.0),
                    (None, _) => bc.right[eq].unwrap_or(0.0),
                };
                if coeff == 0.0 {
                    continue;
                }
                for p in 0..points.len() {
                    vals[p] += coeff * shape.poly(local, p);
                    ders[p] += coeff * shape.poly_d1(local, p) * inv_jac;
                }
            }
        }

        ElemSolution { values, derivs }
    }

    /// Produce a Json Object that describes this Elem
    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "id": self.id,
            "parent": self.parent_id(),
            "active": self.children.is_none(),
            "x": array![self.x1, self.x2],
            "level": self.level,
            "expansion": self.poly_order,
            "children": JsonValue::from(
                match &self.children {
                    Some(ids) => ids.to_vec(),
                    None => Vec::new(),
                }
            )
        }
    }
}

/// Values and first derivatives of each equation's solution component over a set of points
#[derive(Debug, Clone)]
pub struct ElemSolution {
    /// `values[eq][point]`
    pub values: Vec<Vec<f64>>,
    /// `derivs[eq][point]`
    pub derivs: Vec<Vec<f64>>,
}
