use crate::core::models::element::Element;
use crate::core::models::graph::{GraphError, MolecularGraph};
use crate::core::models::rearrangement::BondRearrangement;
use crate::core::models::topology::AtomPair;
use crate::engine::config::{EnumerationConfig, LocalityScore, SearchDepth};
use crate::engine::error::EngineError;
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

type BondType = (Element, Element);
type IndexPair = (usize, usize);

/// Checks that both graphs hold the same atom ids with the same elements and
/// carry the same total charge.
pub fn validate_correspondence(
    reactant: &MolecularGraph,
    product: &MolecularGraph,
) -> Result<(), GraphError> {
    for atom in reactant.atoms() {
        match product.atom(atom.id) {
            Some(other) if other.element == atom.element => {}
            _ => return Err(GraphError::AtomMismatch { atom: atom.id }),
        }
    }
    if let Some(extra) = product.atoms().iter().find(|a| reactant.atom(a.id).is_none()) {
        return Err(GraphError::AtomMismatch { atom: extra.id });
    }
    let (q_r, q_p) = (reactant.total_charge(), product.total_charge());
    if q_r != q_p {
        return Err(GraphError::ChargeMismatch {
            reactant: q_r,
            product: q_p,
        });
    }
    Ok(())
}

/// Bonds present in only one of the two graphs, read as a rearrangement.
pub fn symmetric_difference(
    reactant: &MolecularGraph,
    product: &MolecularGraph,
) -> Result<BondRearrangement, GraphError> {
    let breaking = reactant
        .bonds()
        .iter()
        .filter(|b| product.bond(b.atom1_id, b.atom2_id).is_none())
        .map(|b| b.pair());
    let forming = product
        .bonds()
        .iter()
        .filter(|b| reactant.bond(b.atom1_id, b.atom2_id).is_none())
        .map(|b| b.pair());
    BondRearrangement::new(breaking, forming)
}

/// Lower bound on the size of any rearrangement: the summed per-bond-type
/// count differences.
pub fn lower_bound(reactant: &MolecularGraph, product: &MolecularGraph) -> usize {
    let (r, p) = (reactant.bond_type_counts(), product.bond_type_counts());
    r.keys()
        .chain(p.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|t| r.get(t).copied().unwrap_or(0).abs_diff(p.get(t).copied().unwrap_or(0)))
        .sum()
}

/// Best-first stream of verified bond rearrangements turning `reactant` into
/// `product`.
///
/// Smaller rearrangements come first; within a size, more local ones, then
/// lexical order. Each size is searched only when the previous one is used up.
pub struct RearrangementEnumerator<'a> {
    reactant: &'a MolecularGraph,
    product: &'a MolecularGraph,
    config: EnumerationConfig,
    product_hash: u64,
    /// `n_R(t) - n_P(t)` per bond type.
    type_delta: BTreeMap<BondType, i64>,
    /// `|E_R| - |E_P|`.
    bond_delta: i64,
    next_size: usize,
    max_size: usize,
    minimal: Option<BondRearrangement>,
    queue: VecDeque<BondRearrangement>,
}

impl<'a> RearrangementEnumerator<'a> {
    /// Validates the pair and finds the first non-empty size.
    ///
    /// Fails with [`EngineError::NoRearrangementFound`] if no verified
    /// rearrangement exists within the configured depth.
    #[instrument(skip_all, name = "rearrangement_enumeration_task")]
    pub fn new(
        reactant: &'a MolecularGraph,
        product: &'a MolecularGraph,
        config: &EnumerationConfig,
    ) -> Result<Self, EngineError> {
        validate_correspondence(reactant, product)?;

        let (r_types, p_types) = (reactant.bond_type_counts(), product.bond_type_counts());
        let mut type_delta = BTreeMap::new();
        for (t, n) in &r_types {
            *type_delta.entry(*t).or_insert(0) += *n as i64;
        }
        for (t, n) in &p_types {
            *type_delta.entry(*t).or_insert(0) -= *n as i64;
        }
        type_delta.retain(|_, d| *d != 0);

        let mut enumerator = Self {
            reactant,
            product,
            config: config.clone(),
            product_hash: product.invariant_hash(),
            type_delta,
            bond_delta: reactant.bond_count() as i64 - product.bond_count() as i64,
            next_size: 1,
            max_size: 0,
            minimal: None,
            queue: VecDeque::new(),
        };

        if reactant.has_same_connectivity(product) {
            info!("Reactant and product share connectivity; only the empty rearrangement applies.");
            enumerator.queue.push_back(BondRearrangement::empty());
            return Ok(enumerator);
        }

        let difference = symmetric_difference(reactant, product)?;
        let lower = lower_bound(reactant, product);
        let depth_limit = match config.depth {
            SearchDepth::Bounded(k) => k,
            SearchDepth::Unbounded => difference.size(),
        };
        enumerator.max_size = depth_limit;
        enumerator.next_size = if lower == 0 { 2 } else { lower };

        info!(
            lower_bound = lower,
            symmetric_difference = difference.size(),
            max_size = depth_limit,
            "Enumerating bond rearrangements."
        );

        if difference.size() == lower && enumerator.verify(&difference) {
            debug!(rearrangement = %difference, "Symmetric difference is minimal.");
            enumerator.queue.push_back(difference.clone());
            enumerator.minimal = Some(difference);
        }

        enumerator.fill();
        if enumerator.queue.is_empty() {
            return Err(EngineError::NoRearrangementFound {
                max_size: depth_limit,
            });
        }
        Ok(enumerator)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn fill(&mut self) {
        while self.queue.is_empty() && self.next_size <= self.max_size {
            let size = self.next_size;
            self.next_size += 2;
            let found = self.candidates_of_size(size);
            debug!(size, candidates = found.len(), "Searched rearrangement size.");
            self.queue.extend(found);
        }
    }

    /// Breaking and forming counts for a rearrangement of `size` changes.
    fn split(&self, size: usize) -> Option<(usize, usize)> {
        let twice_breaking = size as i64 + self.bond_delta;
        if twice_breaking < 0 || twice_breaking % 2 != 0 {
            return None;
        }
        let breaking = (twice_breaking / 2) as usize;
        (breaking <= size).then(|| (breaking, size - breaking))
    }

    fn candidates_of_size(&self, size: usize) -> Vec<BondRearrangement> {
        let Some((breaking, forming)) = self.split(size) else {
            return Vec::new();
        };

        let changed = self.changed_environment_mask();
        let mut candidates = self.search(breaking, forming, &changed);
        if candidates.is_empty() && changed.iter().any(|c| !c) {
            let everything = vec![true; self.reactant.atom_count()];
            candidates = self.search(breaking, forming, &everything);
        }

        if self.config.locality == LocalityScore::GraphDistance {
            candidates.sort_by_cached_key(|r| (self.locality(r), r.clone()));
        } else {
            candidates.sort();
        }

        let mut kept: Vec<BondRearrangement> = Vec::new();
        for candidate in candidates {
            let duplicate = if self.config.collapse_equivalent {
                self.minimal
                    .iter()
                    .chain(kept.iter())
                    .any(|k| self.reactant.rearrangements_equivalent(k, &candidate))
            } else {
                self.minimal.as_ref() == Some(&candidate)
            };
            if !duplicate {
                kept.push(candidate);
            }
        }
        kept
    }

    /// Atoms whose environment class (element plus sorted neighbour elements)
    /// occurs a different number of times in reactant and product.
    fn changed_environment_mask(&self) -> Vec<bool> {
        let count = |graph: &MolecularGraph| {
            let mut counts = BTreeMap::new();
            for i in 0..graph.atom_count() {
                *counts.entry(graph.environment_signature(i)).or_insert(0usize) += 1;
            }
            counts
        };
        let (r, p) = (count(self.reactant), count(self.product));
        (0..self.reactant.atom_count())
            .map(|i| {
                let signature = self.reactant.environment_signature(i);
                r.get(&signature) != p.get(&signature)
            })
            .collect()
    }

    fn search(&self, breaking: usize, forming: usize, pool: &[bool]) -> Vec<BondRearrangement> {
        let reactant = self.reactant;
        let n = reactant.atom_count();

        let breaking_pool: Vec<IndexPair> = (0..n)
            .flat_map(|i| reactant.neighbor_indices(i).iter().map(move |&j| (i, j)))
            .filter(|&(i, j)| i < j && (pool[i] || pool[j]))
            .collect();

        let mut forming_pool: BTreeMap<BondType, Vec<IndexPair>> = BTreeMap::new();
        for (i, j) in (0..n).tuple_combinations() {
            if (pool[i] || pool[j]) && reactant.bond_between(i, j).is_none() {
                forming_pool.entry(reactant.bond_type(i, j)).or_default().push((i, j));
            }
        }

        let mut combinations: Vec<(Vec<IndexPair>, Vec<IndexPair>)> = Vec::new();
        let mut examined = 0usize;
        'outer: for broken in breaking_pool.iter().copied().combinations(breaking) {
            let mut needed: BTreeMap<BondType, i64> =
                self.type_delta.iter().map(|(t, d)| (*t, -d)).collect();
            for &(i, j) in &broken {
                *needed.entry(reactant.bond_type(i, j)).or_insert(0) += 1;
            }
            if needed.values().any(|n| *n < 0) || needed.values().sum::<i64>() != forming as i64 {
                continue;
            }

            let per_type: Vec<Vec<Vec<IndexPair>>> = needed
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(t, n)| {
                    forming_pool
                        .get(t)
                        .map(|pairs| pairs.iter().copied().combinations(*n as usize).collect())
                        .unwrap_or_default()
                })
                .collect();
            if per_type.iter().any(Vec::is_empty) {
                continue;
            }
            let formed_sets: Vec<Vec<IndexPair>> = if per_type.is_empty() {
                vec![Vec::new()]
            } else {
                per_type
                    .into_iter()
                    .multi_cartesian_product()
                    .map(|parts| parts.concat())
                    .collect()
            };

            for formed in formed_sets {
                examined += 1;
                if examined > self.config.max_combinations {
                    warn!(
                        limit = self.config.max_combinations,
                        "Combination budget exhausted; remaining candidates of this size are skipped."
                    );
                    break 'outer;
                }
                combinations.push((broken.clone(), formed));
            }
        }

        #[cfg(not(feature = "parallel"))]
        let iterator = combinations.iter();
        #[cfg(feature = "parallel")]
        let iterator = combinations.par_iter();

        iterator
            .filter_map(|(broken, formed)| {
                let to_pairs = |pairs: &[IndexPair]| {
                    pairs
                        .iter()
                        .map(|&(i, j)| AtomPair::new(reactant.id_at(i), reactant.id_at(j)))
                        .collect::<Vec<_>>()
                };
                let candidate = BondRearrangement::new(to_pairs(broken), to_pairs(formed)).ok()?;
                self.verify(&candidate).then_some(candidate)
            })
            .collect()
    }

    fn verify(&self, candidate: &BondRearrangement) -> bool {
        self.reactant.apply(candidate).is_ok_and(|applied| {
            applied.invariant_hash() == self.product_hash
                && applied.has_same_connectivity(self.product)
        })
    }

    /// Sum over pairs of changed bonds of their shortest endpoint distance in
    /// the reactant graph plus the formed bonds.
    fn locality(&self, candidate: &BondRearrangement) -> usize {
        let reactant = self.reactant;
        let n = reactant.atom_count();
        let Ok(active) = candidate.to_active_bonds(reactant) else {
            return usize::MAX;
        };

        let mut adjacency: Vec<Vec<usize>> =
            (0..n).map(|i| reactant.neighbor_indices(i).to_vec()).collect();
        for bond in &active {
            if !adjacency[bond.i].contains(&bond.j) {
                adjacency[bond.i].push(bond.j);
                adjacency[bond.j].push(bond.i);
            }
        }

        let endpoints: BTreeSet<usize> = active.iter().flat_map(|b| [b.i, b.j]).collect();
        let distances: BTreeMap<usize, Vec<usize>> = endpoints
            .into_iter()
            .map(|source| (source, breadth_first(&adjacency, source, n)))
            .collect();

        active
            .iter()
            .tuple_combinations()
            .map(|(a, b)| {
                let mut best = n;
                for x in [a.i, a.j] {
                    for y in [b.i, b.j] {
                        if let Some(d) = distances.get(&x) {
                            best = best.min(d[y]);
                        }
                    }
                }
                best
            })
            .sum()
    }
}

/// Hop counts from `source`; unreachable atoms get `unreachable`.
fn breadth_first(adjacency: &[Vec<usize>], source: usize, unreachable: usize) -> Vec<usize> {
    let mut dist = vec![unreachable; adjacency.len()];
    let mut seen = vec![false; adjacency.len()];
    dist[source] = 0;
    seen[source] = true;
    let mut queue = VecDeque::from([source]);
    while let Some(v) = queue.pop_front() {
        for &u in &adjacency[v] {
            if !seen[u] {
                seen[u] = true;
                dist[u] = dist[v] + 1;
                queue.push_back(u);
            }
        }
    }
    dist
}

impl Iterator for RearrangementEnumerator<'_> {
    type Item = BondRearrangement;

    fn next(&mut self) -> Option<Self::Item> {
        if self.queue.is_empty() {
            self.fill();
        }
        self.queue.pop_front()
    }
}
