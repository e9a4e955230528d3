use super::element::Element;
use super::graph::MolecularGraph;
use nalgebra::{DVector, Point3, Vector3};
use tracing::warn;

/// Cartesian structure handed to energy evaluators.
///
/// Coordinates are in Å and ordered like the atoms of the graph they were
/// built for.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    elements: Vec<Element>,
    coords: Vec<Point3<f64>>,
    charge: i32,
    multiplicity: u32,
}

impl Geometry {
    /// # Panics
    ///
    /// Panics if `elements` and `coords` differ in length.
    pub fn new(elements: Vec<Element>, coords: Vec<Point3<f64>>) -> Self {
        assert_eq!(
            elements.len(),
            coords.len(),
            "geometry needs one coordinate per element"
        );
        Self {
            elements,
            coords,
            charge: 0,
            multiplicity: 1,
        }
    }

    pub fn with_charge_and_multiplicity(mut self, charge: i32, multiplicity: u32) -> Self {
        self.charge = charge;
        self.multiplicity = multiplicity;
        self
    }

    /// Geometry of `graph` at the given coordinates, carrying the graph's
    /// charge and spin multiplicity.
    pub fn for_graph(graph: &MolecularGraph, coords: Vec<Point3<f64>>) -> Self {
        let multiplicity = spin_multiplicity(graph);
        Self::new(graph.elements(), coords)
            .with_charge_and_multiplicity(graph.total_charge(), multiplicity)
    }

    #[inline]
    pub fn atom_count(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn coords(&self) -> &[Point3<f64>] {
        &self.coords
    }

    pub fn charge(&self) -> i32 {
        self.charge
    }

    pub fn multiplicity(&self) -> u32 {
        self.multiplicity
    }

    pub fn masses(&self) -> Vec<f64> {
        self.elements.iter().map(|e| e.mass()).collect()
    }

    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        (self.coords[i] - self.coords[j]).norm()
    }

    /// Coordinates flattened to `[x0, y0, z0, x1, ...]`.
    pub fn to_flat(&self) -> DVector<f64> {
        DVector::from_iterator(
            3 * self.coords.len(),
            self.coords.iter().flat_map(|p| [p.x, p.y, p.z]),
        )
    }

    /// Copy of this geometry with coordinates taken from a flat vector.
    ///
    /// # Panics
    ///
    /// Panics if `flat` does not hold three values per atom.
    pub fn with_flat(&self, flat: &DVector<f64>) -> Self {
        assert_eq!(flat.len(), 3 * self.coords.len());
        let coords = (0..self.coords.len())
            .map(|i| Point3::new(flat[3 * i], flat[3 * i + 1], flat[3 * i + 2]))
            .collect();
        Self {
            elements: self.elements.clone(),
            coords,
            charge: self.charge,
            multiplicity: self.multiplicity,
        }
    }

    pub fn with_coords(&self, coords: Vec<Point3<f64>>) -> Self {
        assert_eq!(coords.len(), self.coords.len());
        Self {
            elements: self.elements.clone(),
            coords,
            charge: self.charge,
            multiplicity: self.multiplicity,
        }
    }

    pub fn displaced(&self, displacement: &[Vector3<f64>]) -> Self {
        let coords = self
            .coords
            .iter()
            .zip(displacement)
            .map(|(p, d)| p + d)
            .collect();
        self.with_coords(coords)
    }

    /// Same elements in the same order.
    pub fn is_compatible_with(&self, other: &Geometry) -> bool {
        self.elements == other.elements
    }
}

/// Lowest spin multiplicity consistent with the electron count: a doublet for
/// an odd number of electrons, otherwise a singlet (diradicals included).
pub fn spin_multiplicity(graph: &MolecularGraph) -> u32 {
    let electrons: i64 = graph
        .atoms()
        .iter()
        .map(|a| i64::from(a.element.atomic_number()))
        .sum::<i64>()
        - i64::from(graph.total_charge());

    let unpaired: usize = graph
        .atoms()
        .iter()
        .map(|a| {
            let deficit = i64::from(a.element.valence())
                - graph.degree(a.id) as i64
                - i64::from(a.formal_charge).abs();
            deficit.max(0) as usize
        })
        .sum();
    if unpaired >= 2 && electrons.rem_euclid(2) == 0 {
        warn!(
            unpaired,
            "Structure looks like a polyradical; assuming a singlet state."
        );
    }

    if electrons.rem_euclid(2) == 1 { 2 } else { 1 }
}

/// A geometry together with its evaluated energy (Hartree), when known.
#[derive(Debug, Clone, PartialEq)]
pub struct Conformer {
    geometry: Geometry,
    energy: Option<f64>,
}

impl Conformer {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            energy: None,
        }
    }

    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn energy(&self) -> Option<f64> {
        self.energy
    }

    pub fn into_geometry(self) -> Geometry {
        self.geometry
    }
}
