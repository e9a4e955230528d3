use super::params::ForceFieldParams;
use super::potentials::{harmonic, morse, soft_repulsion};
use super::term::EnergyTerm;
use crate::core::models::graph::MolecularGraph;
use crate::core::models::topology::{BondOrder, ideal_bond_length};
use crate::core::optimize::minimizer::{MinimizerSettings, minimize};
use nalgebra::{DVector, Point3, Vector3};
use std::convert::Infallible;

#[derive(Debug, Clone, Copy, PartialEq)]
struct PairTerm {
    i: usize,
    j: usize,
    distance: f64,
}

/// Topology-derived force field: Morse bonds, harmonic 1-3 distances and a
/// soft repulsive wall between atoms three or more bonds apart.
#[derive(Debug, Clone)]
pub struct ForceField {
    params: ForceFieldParams,
    bonds: Vec<PairTerm>,
    angles: Vec<PairTerm>,
    repulsions: Vec<PairTerm>,
    atom_count: usize,
}

impl ForceField {
    pub fn from_graph(graph: &MolecularGraph, params: &ForceFieldParams) -> Self {
        let n = graph.atom_count();
        let bonds: Vec<PairTerm> = graph
            .bonds()
            .iter()
            .filter_map(|bond| {
                let i = graph.index_of(bond.atom1_id)?;
                let j = graph.index_of(bond.atom2_id)?;
                Some(PairTerm {
                    i,
                    j,
                    distance: ideal_bond_length(
                        graph.atom_at(i).element,
                        graph.atom_at(j).element,
                        bond.order,
                    ),
                })
            })
            .collect();

        let mut angles = Vec::new();
        for center in 0..n {
            let neighbors = graph.neighbor_indices(center);
            let theta = ideal_angle(graph, center).to_radians();
            for (a, &i) in neighbors.iter().enumerate() {
                for &j in &neighbors[a + 1..] {
                    let ri = bond_length_between(graph, i, center);
                    let rj = bond_length_between(graph, j, center);
                    let d13 = (ri * ri + rj * rj - 2.0 * ri * rj * theta.cos()).sqrt();
                    angles.push(PairTerm { i, j, distance: d13 });
                }
            }
        }

        let mut repulsions = Vec::new();
        for i in 0..n {
            let distances = graph.topological_distances(i);
            for (j, d) in distances.iter().enumerate().skip(i + 1) {
                if d.is_none_or(|d| d >= 3) {
                    let sigma = params.repulsion_radius_scale
                        * 0.5
                        * (graph.atom_at(i).element.vdw_radius()
                            + graph.atom_at(j).element.vdw_radius());
                    repulsions.push(PairTerm { i, j, distance: sigma });
                }
            }
        }

        Self {
            params: params.clone(),
            bonds,
            angles,
            repulsions,
            atom_count: n,
        }
    }

    pub fn atom_count(&self) -> usize {
        self.atom_count
    }

    pub fn energy(&self, coords: &[Point3<f64>]) -> EnergyTerm {
        self.evaluate(coords, None)
    }

    pub fn energy_and_gradient(&self, coords: &[Point3<f64>]) -> (EnergyTerm, Vec<Vector3<f64>>) {
        let mut gradient = vec![Vector3::zeros(); coords.len()];
        let energy = self.evaluate(coords, Some(&mut gradient));
        (energy, gradient)
    }

    fn evaluate(
        &self,
        coords: &[Point3<f64>],
        mut gradient: Option<&mut Vec<Vector3<f64>>>,
    ) -> EnergyTerm {
        let p = &self.params;
        let mut energy = EnergyTerm::default();

        let mut accumulate = |term: &PairTerm, f: &dyn Fn(f64, f64) -> (f64, f64)| -> f64 {
            let delta = coords[term.i] - coords[term.j];
            let r = delta.norm();
            let (e, de) = f(r, term.distance);
            if let Some(g) = gradient.as_deref_mut() {
                if r > 1e-12 {
                    let dir = delta * (de / r);
                    g[term.i] += dir;
                    g[term.j] -= dir;
                }
            }
            e
        };

        for term in &self.bonds {
            energy.bond += accumulate(term, &|r, r0| morse(r, r0, p.bond_well_depth, p.bond_width));
        }
        for term in &self.angles {
            energy.angle += accumulate(term, &|r, r0| harmonic(r, r0, p.angle_force_constant));
        }
        for term in &self.repulsions {
            energy.repulsion +=
                accumulate(term, &|r, sigma| soft_repulsion(r, sigma, p.repulsion_strength));
        }
        energy
    }

    /// Relaxes `coords` to the nearest force-field minimum.
    pub fn relax(&self, coords: &[Point3<f64>], settings: &MinimizerSettings) -> Vec<Point3<f64>> {
        let x0 = flatten(coords);
        let objective = |x: &DVector<f64>| -> Result<(f64, DVector<f64>), Infallible> {
            let points = unflatten(x);
            let (e, g) = self.energy_and_gradient(&points);
            Ok((e.total(), flatten_vectors(&g)))
        };
        match minimize(objective, x0, settings) {
            Ok(minimum) => unflatten(&minimum.x),
            Err(never) => match never {},
        }
    }
}

pub(crate) fn bond_length_between(graph: &MolecularGraph, i: usize, j: usize) -> f64 {
    let order = graph
        .bond_between(i, j)
        .map_or(BondOrder::Single, |b| b.order);
    ideal_bond_length(graph.atom_at(i).element, graph.atom_at(j).element, order)
}

/// Ideal valence angle (degrees) at `center`, from its degree and bond orders.
pub(crate) fn ideal_angle(graph: &MolecularGraph, center: usize) -> f64 {
    let neighbors = graph.neighbor_indices(center);
    let orders: Vec<BondOrder> = neighbors
        .iter()
        .filter_map(|&j| graph.bond_between(center, j).map(|b| b.order))
        .collect();
    let triple = orders.contains(&BondOrder::Triple);
    let multiple = orders.iter().filter(|o| **o != BondOrder::Single).count();
    match neighbors.len() {
        2 if triple || multiple >= 2 => 180.0,
        2 | 3 if multiple >= 1 => 120.0,
        _ => 109.47,
    }
}

pub(crate) fn flatten(coords: &[Point3<f64>]) -> DVector<f64> {
    DVector::from_iterator(3 * coords.len(), coords.iter().flat_map(|p| [p.x, p.y, p.z]))
}

pub(crate) fn flatten_vectors(vectors: &[Vector3<f64>]) -> DVector<f64> {
    DVector::from_iterator(3 * vectors.len(), vectors.iter().flat_map(|v| [v.x, v.y, v.z]))
}

pub(crate) fn unflatten(x: &DVector<f64>) -> Vec<Point3<f64>> {
    (0..x.len() / 3)
        .map(|i| Point3::new(x[3 * i], x[3 * i + 1], x[3 * i + 2]))
        .collect()
}
