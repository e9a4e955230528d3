use super::atom::Atom;
use super::element::Element;
use super::ids::AtomId;
use super::isomorphism::{self, LabeledGraph};
use super::rearrangement::BondRearrangement;
use super::topology::{AtomPair, Bond, BondOrder};
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;

/// Whether a graph must form a single connected molecule or may be a
/// complex of several fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    #[default]
    SingleMolecule,
    Complex,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Graph contains no atoms")]
    Empty,
    #[error("Duplicate atom id {atom}")]
    DuplicateAtom { atom: AtomId },
    #[error("Reference to unknown atom {atom}")]
    UnknownAtom { atom: AtomId },
    #[error("Atom {atom} cannot be bonded to itself")]
    SelfLoop { atom: AtomId },
    #[error("Duplicate bond {pair}")]
    DuplicateBond { pair: AtomPair },
    #[error("Graph declared as a single molecule has {fragments} disconnected fragments")]
    Disconnected { fragments: usize },
    #[error("Cannot break bond {pair}: it is not present")]
    MissingBond { pair: AtomPair },
    #[error("Cannot form bond {pair}: it already exists")]
    BondExists { pair: AtomPair },
    #[error("Bond {pair} cannot be both broken and formed")]
    OverlappingRearrangement { pair: AtomPair },
    #[error("Atom {atom} has no coordinates")]
    MissingPosition { atom: AtomId },
    #[error("Atom {atom} is missing or has a different element on the other side")]
    AtomMismatch { atom: AtomId },
    #[error("Total charge differs: {reactant} vs {product}")]
    ChargeMismatch { reactant: i32, product: i32 },
}

/// Scale applied to the covalent radius sum when perceiving bonds from coordinates.
pub const DEFAULT_BOND_TOLERANCE: f64 = 1.25;

/// Atoms and bonds of one molecule or complex.
///
/// Atoms are stored sorted by id; that order is also the coordinate order of
/// every geometry built for the graph.
#[derive(Debug, Clone)]
pub struct MolecularGraph {
    atoms: Vec<Atom>,
    index: HashMap<AtomId, usize>,
    bonds: Vec<Bond>,
    bond_index: HashMap<AtomPair, usize>,
    adjacency: Vec<Vec<usize>>,
    connectivity: Connectivity,
}

impl MolecularGraph {
    pub fn new(
        mut atoms: Vec<Atom>,
        bonds: Vec<Bond>,
        connectivity: Connectivity,
    ) -> Result<Self, GraphError> {
        if atoms.is_empty() {
            return Err(GraphError::Empty);
        }
        atoms.sort_by_key(|a| a.id);

        let mut index = HashMap::with_capacity(atoms.len());
        for (i, atom) in atoms.iter().enumerate() {
            if index.insert(atom.id, i).is_some() {
                return Err(GraphError::DuplicateAtom { atom: atom.id });
            }
        }

        let mut adjacency = vec![Vec::new(); atoms.len()];
        let mut bond_index = HashMap::with_capacity(bonds.len());
        let mut sorted_bonds = bonds;
        sorted_bonds.sort_by_key(|b| b.pair());
        for (k, bond) in sorted_bonds.iter().enumerate() {
            let pair = bond.pair();
            if pair.is_self_loop() {
                return Err(GraphError::SelfLoop { atom: pair.first() });
            }
            let i = *index
                .get(&pair.first())
                .ok_or(GraphError::UnknownAtom { atom: pair.first() })?;
            let j = *index
                .get(&pair.second())
                .ok_or(GraphError::UnknownAtom { atom: pair.second() })?;
            if bond_index.insert(pair, k).is_some() {
                return Err(GraphError::DuplicateBond { pair });
            }
            adjacency[i].push(j);
            adjacency[j].push(i);
        }
        for neighbors in &mut adjacency {
            neighbors.sort_unstable();
        }

        let graph = Self {
            atoms,
            index,
            bonds: sorted_bonds,
            bond_index,
            adjacency,
            connectivity,
        };

        if connectivity == Connectivity::SingleMolecule {
            let fragments = graph.fragment_count();
            if fragments > 1 {
                return Err(GraphError::Disconnected { fragments });
            }
        }
        Ok(graph)
    }

    /// Builds a graph from atoms with coordinates, bonding every pair closer
    /// than `tolerance` times the sum of covalent radii.
    ///
    /// Hydrogen keeps only its closest partner; other atoms keep at most six
    /// bonds, preferring the shortest relative to the ideal length.
    pub fn from_coordinates(
        atoms: Vec<Atom>,
        tolerance: f64,
        connectivity: Connectivity,
    ) -> Result<Self, GraphError> {
        let positions: Vec<[f64; 3]> = atoms
            .iter()
            .map(|a| {
                a.position
                    .map(|p| [p.x, p.y, p.z])
                    .ok_or(GraphError::MissingPosition { atom: a.id })
            })
            .collect::<Result<_, _>>()?;

        let max_radius = atoms
            .iter()
            .map(|a| a.element.covalent_radius())
            .fold(0.0, f64::max);
        let cutoff = 2.0 * max_radius * tolerance;
        let kdtree: KdTree<f64, 3> = (&positions).into();

        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for (i, p) in positions.iter().enumerate() {
            for neighbour in kdtree.within_unsorted::<SquaredEuclidean>(p, cutoff * cutoff) {
                let j = neighbour.item as usize;
                if j <= i {
                    continue;
                }
                let d = neighbour.distance.sqrt();
                let ideal = atoms[i].element.covalent_radius() + atoms[j].element.covalent_radius();
                if d < ideal * tolerance {
                    candidates.push((d / ideal, i, j));
                }
            }
        }
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then((a.1, a.2).cmp(&(b.1, b.2))));

        let max_bonds = |e: Element| if e == Element::H { 1 } else { 6 };
        let mut degree = vec![0usize; atoms.len()];
        let mut bonds = Vec::new();
        for (_, i, j) in candidates {
            if degree[i] < max_bonds(atoms[i].element) && degree[j] < max_bonds(atoms[j].element) {
                degree[i] += 1;
                degree[j] += 1;
                bonds.push(Bond::single(atoms[i].id, atoms[j].id));
            }
        }

        Self::new(atoms, bonds, connectivity)
    }

    #[inline]
    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    #[inline]
    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn atom(&self, id: AtomId) -> Option<&Atom> {
        self.index.get(&id).map(|i| &self.atoms[*i])
    }

    #[inline]
    pub fn atom_at(&self, index: usize) -> &Atom {
        &self.atoms[index]
    }

    #[inline]
    pub fn index_of(&self, id: AtomId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    #[inline]
    pub fn id_at(&self, index: usize) -> AtomId {
        self.atoms[index].id
    }

    pub fn has_bond(&self, a: AtomId, b: AtomId) -> bool {
        self.bond_index.contains_key(&AtomPair::new(a, b))
    }

    pub fn bond(&self, a: AtomId, b: AtomId) -> Option<&Bond> {
        self.bond_index
            .get(&AtomPair::new(a, b))
            .map(|k| &self.bonds[*k])
    }

    /// Bond lookup by positions in the atom order.
    pub fn bond_between(&self, i: usize, j: usize) -> Option<&Bond> {
        self.bond(self.id_at(i), self.id_at(j))
    }

    #[inline]
    pub fn neighbor_indices(&self, index: usize) -> &[usize] {
        &self.adjacency[index]
    }

    pub fn neighbors(&self, id: AtomId) -> impl Iterator<Item = AtomId> + '_ {
        self.index_of(id)
            .map(|i| self.adjacency[i].as_slice())
            .unwrap_or_default()
            .iter()
            .map(|j| self.atoms[*j].id)
    }

    pub fn degree(&self, id: AtomId) -> usize {
        self.index_of(id).map_or(0, |i| self.adjacency[i].len())
    }

    pub fn elements(&self) -> Vec<Element> {
        self.atoms.iter().map(|a| a.element).collect()
    }

    pub fn total_charge(&self) -> i32 {
        self.atoms.iter().map(|a| i32::from(a.formal_charge)).sum()
    }

    pub fn element_counts(&self) -> BTreeMap<Element, usize> {
        let mut counts = BTreeMap::new();
        for atom in &self.atoms {
            *counts.entry(atom.element).or_insert(0) += 1;
        }
        counts
    }

    /// Number of bonds per unordered element pair.
    pub fn bond_type_counts(&self) -> BTreeMap<(Element, Element), usize> {
        let mut counts = BTreeMap::new();
        for bond in &self.bonds {
            let (i, j) = (self.index[&bond.atom1_id], self.index[&bond.atom2_id]);
            *counts.entry(self.bond_type(i, j)).or_insert(0) += 1;
        }
        counts
    }

    /// Element pair of the atoms at positions `i` and `j`, smaller element first.
    pub fn bond_type(&self, i: usize, j: usize) -> (Element, Element) {
        let (a, b) = (self.atoms[i].element, self.atoms[j].element);
        if a <= b { (a, b) } else { (b, a) }
    }

    /// Per-atom fragment labels, numbered in order of first appearance.
    pub fn fragment_labels(&self) -> Vec<usize> {
        let n = self.atoms.len();
        let mut labels = vec![usize::MAX; n];
        let mut next = 0;
        for start in 0..n {
            if labels[start] != usize::MAX {
                continue;
            }
            labels[start] = next;
            let mut queue = VecDeque::from([start]);
            while let Some(v) = queue.pop_front() {
                for &u in &self.adjacency[v] {
                    if labels[u] == usize::MAX {
                        labels[u] = next;
                        queue.push_back(u);
                    }
                }
            }
            next += 1;
        }
        labels
    }

    pub fn fragment_count(&self) -> usize {
        self.fragment_labels().into_iter().max().map_or(0, |m| m + 1)
    }

    pub fn fragments(&self) -> Vec<Vec<AtomId>> {
        let labels = self.fragment_labels();
        let mut fragments = vec![Vec::new(); labels.iter().max().map_or(0, |m| m + 1)];
        for (i, label) in labels.into_iter().enumerate() {
            fragments[label].push(self.atoms[i].id);
        }
        fragments
    }

    /// Bond-count distances from `source` to every atom (`None` when unreachable).
    pub fn topological_distances(&self, source: usize) -> Vec<Option<usize>> {
        let mut dist = vec![None; self.atoms.len()];
        dist[source] = Some(0);
        let mut queue = VecDeque::from([source]);
        while let Some(v) = queue.pop_front() {
            let dv = dist[v].unwrap_or(0);
            for &u in &self.adjacency[v] {
                if dist[u].is_none() {
                    dist[u] = Some(dv + 1);
                    queue.push_back(u);
                }
            }
        }
        dist
    }

    pub fn positions(&self) -> Result<Vec<Point3<f64>>, GraphError> {
        self.atoms
            .iter()
            .map(|a| a.position.ok_or(GraphError::MissingPosition { atom: a.id }))
            .collect()
    }

    /// Returns the graph obtained by breaking and forming the given bonds.
    ///
    /// Formed bonds are single bonds; the result may be a multi-fragment complex.
    pub fn apply(&self, rearrangement: &BondRearrangement) -> Result<Self, GraphError> {
        for pair in rearrangement.breaking().iter().chain(rearrangement.forming()) {
            for atom in [pair.first(), pair.second()] {
                if !self.index.contains_key(&atom) {
                    return Err(GraphError::UnknownAtom { atom });
                }
            }
        }
        if let Some(pair) = rearrangement
            .breaking()
            .iter()
            .find(|p| !self.bond_index.contains_key(p))
        {
            return Err(GraphError::MissingBond { pair: *pair });
        }
        if let Some(pair) = rearrangement
            .forming()
            .iter()
            .find(|p| self.bond_index.contains_key(p))
        {
            return Err(GraphError::BondExists { pair: *pair });
        }

        let bonds = self
            .bonds
            .iter()
            .filter(|b| rearrangement.breaking().binary_search(&b.pair()).is_err())
            .copied()
            .chain(
                rearrangement
                    .forming()
                    .iter()
                    .map(|p| Bond::new(p.first(), p.second(), BondOrder::Single)),
            )
            .collect();

        Self::new(self.atoms.clone(), bonds, Connectivity::Complex)
    }

    /// Element and sorted neighbour elements of the atom at `index`.
    pub fn environment_signature(&self, index: usize) -> (Element, Vec<Element>) {
        let mut neighbors: Vec<Element> = self.adjacency[index]
            .iter()
            .map(|j| self.atoms[*j].element)
            .collect();
        neighbors.sort_unstable();
        (self.atoms[index].element, neighbors)
    }

    fn node_labels(&self, include_charge: bool) -> Vec<u64> {
        self.atoms
            .iter()
            .map(|a| {
                let charge = if include_charge { a.formal_charge } else { 0 };
                (u64::from(a.element.atomic_number()) << 8) | u64::from(charge as u8)
            })
            .collect()
    }

    /// Labeled view over elements and bonds, optionally distinguishing formal charges.
    fn labeled(&self, include_charge: bool) -> LabeledGraph {
        let edges = self
            .bonds
            .iter()
            .map(|b| (self.index[&b.atom1_id], self.index[&b.atom2_id], 0u8));
        LabeledGraph::new(self.node_labels(include_charge), edges)
    }

    /// The active graph of a rearrangement: this graph with breaking bonds
    /// labeled 1 and forming bonds added with label 2.
    pub(crate) fn active_graph(&self, rearrangement: &BondRearrangement) -> LabeledGraph {
        let kept = self.bonds.iter().map(|b| {
            let label = if rearrangement.breaking().binary_search(&b.pair()).is_ok() {
                1u8
            } else {
                0u8
            };
            (self.index[&b.atom1_id], self.index[&b.atom2_id], label)
        });
        let formed = rearrangement.forming().iter().filter_map(|p| {
            Some((*self.index.get(&p.first())?, *self.index.get(&p.second())?, 2u8))
        });
        LabeledGraph::new(self.node_labels(false), kept.chain(formed))
    }

    /// Whether two rearrangements of this graph are related by a symmetry of it.
    pub fn rearrangements_equivalent(&self, a: &BondRearrangement, b: &BondRearrangement) -> bool {
        if a.breaking().len() != b.breaking().len() || a.forming().len() != b.forming().len() {
            return false;
        }
        let (ga, gb) = (self.active_graph(a), self.active_graph(b));
        ga.invariant_hash() == gb.invariant_hash() && isomorphism::find_isomorphism(&ga, &gb).is_some()
    }

    /// Isomorphism-invariant hash over elements and connectivity.
    pub fn invariant_hash(&self) -> u64 {
        self.labeled(false).invariant_hash()
    }

    /// Element-, charge- and connectivity-preserving atom mapping onto `other`, if any.
    pub fn isomorphism(&self, other: &MolecularGraph) -> Option<HashMap<AtomId, AtomId>> {
        self.mapping_onto(other, true)
    }

    pub fn is_isomorphic_to(&self, other: &MolecularGraph) -> bool {
        self.quick_match(other) && self.isomorphism(other).is_some()
    }

    /// Like [`Self::isomorphism`] but ignoring formal charges, which bond
    /// rearrangements never change.
    pub fn connectivity_isomorphism(
        &self,
        other: &MolecularGraph,
    ) -> Option<HashMap<AtomId, AtomId>> {
        self.mapping_onto(other, false)
    }

    pub fn has_same_connectivity(&self, other: &MolecularGraph) -> bool {
        self.quick_match(other) && self.connectivity_isomorphism(other).is_some()
    }

    fn quick_match(&self, other: &MolecularGraph) -> bool {
        self.atom_count() == other.atom_count()
            && self.bond_count() == other.bond_count()
            && self.element_counts() == other.element_counts()
    }

    fn mapping_onto(
        &self,
        other: &MolecularGraph,
        include_charge: bool,
    ) -> Option<HashMap<AtomId, AtomId>> {
        let mapping = isomorphism::find_isomorphism(
            &self.labeled(include_charge),
            &other.labeled(include_charge),
        )?;
        Some(
            mapping
                .into_iter()
                .enumerate()
                .map(|(i, j)| (self.atoms[i].id, other.atoms[j].id))
                .collect(),
        )
    }
}
