//! Built-in two-state empirical valence bond surface.
//!
//! The reactant and product topologies each get a [`ForceField`]; the
//! adiabatic ground state of their 2x2 coupling matrix is the model energy.
//! Useful for exercising the search without an external quantum chemistry
//! backend.

use super::{Evaluation, EvaluationRequest, Evaluator, EvaluatorError};
use crate::core::forcefield::params::ForceFieldParams;
use crate::core::forcefield::potentials::KCAL_PER_HARTREE;
use crate::core::forcefield::scoring::{ForceField, flatten_vectors};
use crate::core::models::geometry::Geometry;
use crate::core::models::graph::{GraphError, MolecularGraph};
use nalgebra::{DVector, Point3, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ModelParams {
    pub forcefield: ForceFieldParams,
    /// Off-diagonal coupling between the two diabatic states (kcal/mol).
    pub coupling: f64,
    /// Constant added to the product state (kcal/mol).
    pub product_offset: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            forcefield: ForceFieldParams::default(),
            coupling: 10.0,
            product_offset: 0.0,
        }
    }
}

/// EVB model of a reaction between two labeled topologies.
///
/// The product state follows the product graph's atom labels, so the surface
/// describes the reaction in which atom ids are conserved.
#[derive(Debug, Clone)]
pub struct ModelEvaluator {
    reactant: ForceField,
    product: ForceField,
    /// Reactant atom index of every product atom.
    product_order: Vec<usize>,
    params: ModelParams,
}

impl ModelEvaluator {
    pub fn new(
        reactant: &MolecularGraph,
        product: &MolecularGraph,
        params: &ModelParams,
    ) -> Result<Self, GraphError> {
        let product_order = product
            .atoms()
            .iter()
            .map(|atom| {
                reactant
                    .index_of(atom.id)
                    .filter(|&i| reactant.atom_at(i).element == atom.element)
                    .ok_or(GraphError::AtomMismatch { atom: atom.id })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(missing) = reactant.atoms().iter().find(|a| product.index_of(a.id).is_none()) {
            return Err(GraphError::AtomMismatch { atom: missing.id });
        }

        Ok(Self {
            reactant: ForceField::from_graph(reactant, &params.forcefield),
            product: ForceField::from_graph(product, &params.forcefield),
            product_order,
            params: params.clone(),
        })
    }

    /// Diabatic energies (kcal/mol) and gradients (kcal/mol/Å) at `coords`.
    fn diabatic(&self, coords: &[Point3<f64>]) -> ((f64, Vec<Vector3<f64>>), (f64, Vec<Vector3<f64>>)) {
        let (e_r, g_r) = self.reactant.energy_and_gradient(coords);

        let permuted: Vec<Point3<f64>> = self.product_order.iter().map(|&i| coords[i]).collect();
        let (e_p, g_p_permuted) = self.product.energy_and_gradient(&permuted);
        let mut g_p = vec![Vector3::zeros(); coords.len()];
        for (k, &i) in self.product_order.iter().enumerate() {
            g_p[i] = g_p_permuted[k];
        }

        (
            (e_r.total(), g_r),
            (e_p.total() + self.params.product_offset, g_p),
        )
    }
}

impl Evaluator for ModelEvaluator {
    fn name(&self) -> &str {
        "evb-model"
    }

    fn evaluate(
        &self,
        geometry: &Geometry,
        request: EvaluationRequest,
    ) -> Result<Evaluation, EvaluatorError> {
        if geometry.atom_count() != self.reactant.atom_count() {
            return Err(EvaluatorError::InvalidGeometry(format!(
                "expected {} atoms, got {}",
                self.reactant.atom_count(),
                geometry.atom_count()
            )));
        }

        let ((e_r, g_r), (e_p, g_p)) = self.diabatic(geometry.coords());
        let half_gap = 0.5 * (e_r - e_p);
        let root = (half_gap * half_gap + self.params.coupling * self.params.coupling).sqrt();
        let energy = 0.5 * (e_r + e_p) - root;

        let gradient = request.gradient.then(|| {
            let mix = if root > 0.0 { half_gap / root } else { 0.0 };
            let g_r = flatten_vectors(&g_r);
            let g_p = flatten_vectors(&g_p);
            let g: DVector<f64> = (&g_r + &g_p) * 0.5 - (g_r - g_p) * (0.5 * mix);
            g / KCAL_PER_HARTREE
        });

        Ok(Evaluation {
            energy: energy / KCAL_PER_HARTREE,
            gradient,
            hessian: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::element::Element;
    use crate::core::models::graph::Connectivity;
    use crate::core::models::topology::Bond;

    fn h3(bond: (usize, usize)) -> MolecularGraph {
        MolecularGraph::new(
            (0..3).map(|i| Atom::new(i, Element::H)).collect(),
            vec![Bond::single(bond.0, bond.1)],
            Connectivity::Complex,
        )
        .unwrap()
    }

    fn bent_h3() -> Geometry {
        Geometry::new(
            vec![Element::H; 3],
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.8, 0.1, 0.0),
                Point3::new(1.7, -0.2, 0.3),
            ],
        )
    }

    #[test]
    fn adiabatic_energy_lies_below_both_diabatic_states() {
        let model = ModelEvaluator::new(&h3((0, 1)), &h3((1, 2)), &ModelParams::default()).unwrap();
        let geometry = bent_h3();
        let ((e_r, _), (e_p, _)) = model.diabatic(geometry.coords());
        let e = model.evaluate(&geometry, EvaluationRequest::ENERGY).unwrap().energy;
        assert!(e * KCAL_PER_HARTREE <= e_r.min(e_p) + 1e-9);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let model = ModelEvaluator::new(&h3((0, 1)), &h3((1, 2)), &ModelParams::default()).unwrap();
        let geometry = bent_h3();
        let analytic = model
            .evaluate(&geometry, EvaluationRequest::GRADIENT)
            .unwrap()
            .gradient
            .unwrap();

        let x0 = geometry.to_flat();
        let h = 1e-5;
        for k in 0..x0.len() {
            let mut plus = x0.clone();
            plus[k] += h;
            let mut minus = x0.clone();
            minus[k] -= h;
            let e_plus = model
                .evaluate(&geometry.with_flat(&plus), EvaluationRequest::ENERGY)
                .unwrap()
                .energy;
            let e_minus = model
                .evaluate(&geometry.with_flat(&minus), EvaluationRequest::ENERGY)
                .unwrap()
                .energy;
            let numeric = (e_plus - e_minus) / (2.0 * h);
            assert!(
                (numeric - analytic[k]).abs() < 1e-6,
                "coordinate {k}: {numeric} vs {}",
                analytic[k]
            );
        }
    }

    #[test]
    fn product_atoms_are_matched_by_id_not_position() {
        let reactant = h3((0, 1));
        let product = MolecularGraph::new(
            vec![
                Atom::new(2, Element::H),
                Atom::new(0, Element::H),
                Atom::new(1, Element::H),
            ],
            vec![Bond::single(1, 2)],
            Connectivity::Complex,
        )
        .unwrap();
        let shuffled = ModelEvaluator::new(&reactant, &product, &ModelParams::default()).unwrap();
        let ordered = ModelEvaluator::new(&reactant, &h3((1, 2)), &ModelParams::default()).unwrap();
        let geometry = bent_h3();
        let a = shuffled.evaluate(&geometry, EvaluationRequest::ENERGY).unwrap().energy;
        let b = ordered.evaluate(&geometry, EvaluationRequest::ENERGY).unwrap().energy;
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn new_rejects_element_mismatch() {
        let reactant = h3((0, 1));
        let product = MolecularGraph::new(
            vec![
                Atom::new(0, Element::H),
                Atom::new(1, Element::H),
                Atom::new(2, Element::C),
            ],
            vec![Bond::single(1, 2)],
            Connectivity::Complex,
        )
        .unwrap();
        assert!(matches!(
            ModelEvaluator::new(&reactant, &product, &ModelParams::default()),
            Err(GraphError::AtomMismatch { atom }) if atom.value() == 2
        ));
    }

    #[test]
    fn wrong_atom_count_is_an_invalid_geometry() {
        let model = ModelEvaluator::new(&h3((0, 1)), &h3((1, 2)), &ModelParams::default()).unwrap();
        let geometry = Geometry::new(vec![Element::H], vec![Point3::origin()]);
        assert!(matches!(
            model.evaluate(&geometry, EvaluationRequest::ENERGY),
            Err(EvaluatorError::InvalidGeometry(_))
        ));
    }
}
