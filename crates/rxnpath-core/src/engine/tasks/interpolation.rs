use crate::core::forcefield::potentials::{harmonic, lower_wall};
use crate::core::forcefield::scoring::{bond_length_between, flatten, unflatten};
use crate::core::models::geometry::Geometry;
use crate::core::models::graph::MolecularGraph;
use crate::core::models::path::ReactionPath;
use crate::core::models::rearrangement::{ActiveBond, BondChange};
use crate::core::models::topology::{BondOrder, ideal_bond_length};
use crate::core::optimize::minimizer::{MinimizerSettings, minimize};
use crate::core::utils::geometry::align_onto;
use crate::engine::cancel::CancellationToken;
use crate::engine::config::PathConfig;
use crate::engine::error::EngineError;
use nalgebra::DVector;
use std::convert::Infallible;
use tracing::{debug, instrument};

const ACTIVE_WEIGHT: f64 = 10.0;
const BONDED_WEIGHT: f64 = 1.0;
const ANGLE_WEIGHT: f64 = 0.5;
const NONBONDED_WEIGHT: f64 = 0.05;
const WALL_FORCE_CONSTANT: f64 = 10.0;
/// Repulsive floor as a fraction of the van der Waals radius sum.
const FLOOR_SCALE: f64 = 0.5;

/// A distance restraint whose target moves linearly from `start` to `end`.
#[derive(Debug, Clone, Copy)]
struct PairRestraint {
    i: usize,
    j: usize,
    start: f64,
    end: f64,
    weight: f64,
    floor: Option<f64>,
}

impl PairRestraint {
    fn target(&self, t: f64) -> f64 {
        self.start + t * (self.end - self.start)
    }
}

/// Builds `config.num_images` geometries from the reactant-side conformer
/// towards the product side, driving the active bonds.
///
/// Both geometries share the reactant's atom order; `product_graph` is the
/// reactant graph with the rearrangement applied.
#[instrument(skip_all, name = "path_interpolation_task", fields(images = config.num_images))]
pub fn interpolate(
    reactant: &Geometry,
    product: &Geometry,
    reactant_graph: &MolecularGraph,
    product_graph: &MolecularGraph,
    active: &[ActiveBond],
    config: &PathConfig,
    cancel: &CancellationToken,
) -> Result<ReactionPath, EngineError> {
    if !reactant.is_compatible_with(product) {
        return Err(EngineError::Internal(
            "reactant and product geometries differ in atom order".to_string(),
        ));
    }
    let restraints = build_restraints(reactant, product, reactant_graph, product_graph, active, config);
    let settings = MinimizerSettings {
        max_iterations: config.restraint_steps,
        ..MinimizerSettings::default()
    };

    let m = config.num_images.max(2);
    let mut images = vec![reactant.clone()];
    for k in 1..m {
        cancel.check()?;
        let t = k as f64 / (m - 1) as f64;
        let previous = &images[k - 1];
        let objective = |x: &DVector<f64>| -> Result<(f64, DVector<f64>), Infallible> {
            Ok(restraint_energy(&restraints, x, t))
        };
        let minimum = match minimize(objective, flatten(previous.coords()), &settings) {
            Ok(minimum) => minimum,
            Err(never) => match never {},
        };
        let coords = align_onto(&unflatten(&minimum.x), previous.coords());
        debug!(image = k, t, residual = minimum.value, "Interpolated image.");
        images.push(reactant.with_coords(coords));
    }

    ReactionPath::new(images)
        .ok_or_else(|| EngineError::Internal("interpolated images are inconsistent".to_string()))
}

fn build_restraints(
    reactant: &Geometry,
    product: &Geometry,
    reactant_graph: &MolecularGraph,
    product_graph: &MolecularGraph,
    active: &[ActiveBond],
    config: &PathConfig,
) -> Vec<PairRestraint> {
    let n = reactant.atom_count();
    let elements = reactant.elements();
    let mut restraints = Vec::with_capacity(n * (n - 1) / 2);

    for i in 0..n {
        let hops_r = reactant_graph.topological_distances(i);
        let hops_p = product_graph.topological_distances(i);
        for j in (i + 1)..n {
            let (r_start, r_end) = (reactant.distance(i, j), product.distance(i, j));
            let change = active
                .iter()
                .find(|b| (b.i.min(b.j), b.i.max(b.j)) == (i, j))
                .map(|b| b.change);

            let restraint = match change {
                Some(BondChange::Breaking) => PairRestraint {
                    i,
                    j,
                    start: r_start,
                    end: config.breaking_stretch * bond_length_between(reactant_graph, i, j),
                    weight: ACTIVE_WEIGHT,
                    floor: None,
                },
                Some(BondChange::Forming) => PairRestraint {
                    i,
                    j,
                    start: r_start,
                    end: ideal_bond_length(elements[i], elements[j], BondOrder::Single),
                    weight: ACTIVE_WEIGHT,
                    floor: None,
                },
                None => {
                    let weight = match (hops_r[j], hops_p[j]) {
                        (Some(1), Some(1)) => BONDED_WEIGHT,
                        (Some(2), _) | (_, Some(2)) => ANGLE_WEIGHT,
                        _ => NONBONDED_WEIGHT,
                    };
                    let floor = (weight == NONBONDED_WEIGHT).then(|| {
                        FLOOR_SCALE * (elements[i].vdw_radius() + elements[j].vdw_radius())
                    });
                    PairRestraint {
                        i,
                        j,
                        start: r_start,
                        end: r_end,
                        weight,
                        floor,
                    }
                }
            };
            restraints.push(restraint);
        }
    }
    restraints
}

fn restraint_energy(restraints: &[PairRestraint], x: &DVector<f64>, t: f64) -> (f64, DVector<f64>) {
    let mut energy = 0.0;
    let mut gradient = DVector::zeros(x.len());
    for r in restraints {
        let delta = x.fixed_rows::<3>(3 * r.i) - x.fixed_rows::<3>(3 * r.j);
        let d = delta.norm();
        let (mut e, mut de) = harmonic(d, r.target(t), 2.0 * r.weight);
        if let Some(floor) = r.floor {
            let (ew, dew) = lower_wall(d, floor, WALL_FORCE_CONSTANT);
            e += ew;
            de += dew;
        }
        energy += e;
        if d > 1e-12 {
            let g = delta * (de / d);
            let mut gi = gradient.fixed_rows_mut::<3>(3 * r.i);
            gi += g;
            let mut gj = gradient.fixed_rows_mut::<3>(3 * r.j);
            gj -= g;
        }
    }
    (energy, gradient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::element::Element;
    use crate::core::models::graph::Connectivity;
    use crate::core::models::rearrangement::BondRearrangement;
    use crate::core::models::topology::{AtomPair, Bond};
    use nalgebra::Point3;

    fn hydrogen(bonded: bool) -> MolecularGraph {
        let bonds = if bonded { vec![Bond::single(0, 1)] } else { vec![] };
        MolecularGraph::new(
            vec![Atom::new(0, Element::H), Atom::new(1, Element::H)],
            bonds,
            Connectivity::Complex,
        )
        .unwrap()
    }

    fn h2_at(d: f64) -> Geometry {
        Geometry::new(
            vec![Element::H, Element::H],
            vec![Point3::origin(), Point3::new(d, 0.0, 0.0)],
        )
    }

    #[test]
    fn breaking_bond_is_stretched_monotonically() {
        let (r_graph, p_graph) = (hydrogen(true), hydrogen(false));
        let rearrangement = BondRearrangement::new(vec![AtomPair::new(0, 1)], vec![]).unwrap();
        let active = rearrangement.to_active_bonds(&r_graph).unwrap();
        let config = PathConfig {
            num_images: 5,
            ..PathConfig::default()
        };
        let path = interpolate(
            &h2_at(0.62),
            &h2_at(3.5),
            &r_graph,
            &p_graph,
            &active,
            &config,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(path.len(), 5);
        assert_eq!(path.first(), &h2_at(0.62));
        let distances: Vec<f64> = path.images().iter().map(|img| img.geometry.distance(0, 1)).collect();
        assert!(distances.windows(2).all(|w| w[1] > w[0]));
        assert!((distances[4] - 1.24).abs() < 1e-2);
        let arcs = path.arc_lengths();
        assert!(arcs.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn hydrogen_shift_moves_hydrogen_between_carbons() {
        let mut atoms = vec![Atom::new(0, Element::C), Atom::new(1, Element::C)];
        atoms.extend((2..8).map(|i| Atom::new(i, Element::H)));
        let mut bonds = vec![Bond::single(0, 1)];
        bonds.extend((2..5).map(|h| Bond::single(0, h)));
        bonds.extend((5..8).map(|h| Bond::single(1, h)));
        let r_graph = MolecularGraph::new(atoms, bonds, Connectivity::SingleMolecule).unwrap();
        let rearrangement =
            BondRearrangement::new(vec![AtomPair::new(0, 2)], vec![AtomPair::new(1, 2)]).unwrap();
        let p_graph = r_graph.apply(&rearrangement).unwrap();
        let active = rearrangement.to_active_bonds(&r_graph).unwrap();

        let coords = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.52, 0.0, 0.0),
            Point3::new(-0.36, 1.01, 0.0),
            Point3::new(-0.36, -0.5, 0.87),
            Point3::new(-0.36, -0.5, -0.87),
            Point3::new(1.88, -1.01, 0.0),
            Point3::new(1.88, 0.5, 0.87),
            Point3::new(1.88, 0.5, -0.87),
        ];
        let reactant = Geometry::for_graph(&r_graph, coords);
        let path = interpolate(
            &reactant,
            &reactant,
            &r_graph,
            &p_graph,
            &active,
            &PathConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();

        let last = path.last();
        assert!((last.distance(1, 2) - 1.07).abs() < 0.25);
        assert!(last.distance(0, 2) > path.first().distance(0, 2) + 0.5);
    }

    #[test]
    fn incompatible_geometries_are_rejected() {
        let graph = hydrogen(true);
        let other = Geometry::new(vec![Element::H, Element::F], vec![Point3::origin(); 2]);
        let result = interpolate(
            &h2_at(0.62),
            &other,
            &graph,
            &graph,
            &[],
            &PathConfig::default(),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(EngineError::Internal(_))));
    }
}
