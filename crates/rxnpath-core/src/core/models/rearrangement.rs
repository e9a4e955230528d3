use super::graph::{GraphError, MolecularGraph};
use super::ids::AtomId;
use super::topology::AtomPair;
use std::collections::BTreeSet;
use std::fmt;

/// A set of bonds to break and a disjoint set of bonds to form.
///
/// Both sets are kept sorted, so two rearrangements with the same bond
/// changes compare equal regardless of construction order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BondRearrangement {
    breaking: Vec<AtomPair>,
    forming: Vec<AtomPair>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondChange {
    Breaking,
    Forming,
}

/// A changing bond expressed in geometry indices rather than atom ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActiveBond {
    pub i: usize,
    pub j: usize,
    pub change: BondChange,
}

impl BondRearrangement {
    pub fn new(
        breaking: impl IntoIterator<Item = AtomPair>,
        forming: impl IntoIterator<Item = AtomPair>,
    ) -> Result<Self, GraphError> {
        let breaking: BTreeSet<AtomPair> = breaking.into_iter().collect();
        let forming: BTreeSet<AtomPair> = forming.into_iter().collect();

        if let Some(pair) = breaking.iter().chain(forming.iter()).find(|p| p.is_self_loop()) {
            return Err(GraphError::SelfLoop { atom: pair.first() });
        }
        if let Some(pair) = breaking.intersection(&forming).next() {
            return Err(GraphError::OverlappingRearrangement { pair: *pair });
        }

        Ok(Self {
            breaking: breaking.into_iter().collect(),
            forming: forming.into_iter().collect(),
        })
    }

    /// The rearrangement that changes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn breaking(&self) -> &[AtomPair] {
        &self.breaking
    }

    pub fn forming(&self) -> &[AtomPair] {
        &self.forming
    }

    pub fn is_empty(&self) -> bool {
        self.breaking.is_empty() && self.forming.is_empty()
    }

    /// Total number of bond changes.
    pub fn size(&self) -> usize {
        self.breaking.len() + self.forming.len()
    }

    pub fn active_pairs(&self) -> impl Iterator<Item = (AtomPair, BondChange)> + '_ {
        self.breaking
            .iter()
            .map(|p| (*p, BondChange::Breaking))
            .chain(self.forming.iter().map(|p| (*p, BondChange::Forming)))
    }

    pub fn active_atoms(&self) -> BTreeSet<AtomId> {
        self.breaking
            .iter()
            .chain(self.forming.iter())
            .flat_map(|p| [p.first(), p.second()])
            .collect()
    }

    /// The same rearrangement read in the product-to-reactant direction.
    pub fn reversed(&self) -> Self {
        Self {
            breaking: self.forming.clone(),
            forming: self.breaking.clone(),
        }
    }

    /// Resolves the changing bonds to positions in the graph's atom order.
    pub fn to_active_bonds(&self, graph: &MolecularGraph) -> Result<Vec<ActiveBond>, GraphError> {
        self.active_pairs()
            .map(|(pair, change)| {
                let i = graph
                    .index_of(pair.first())
                    .ok_or(GraphError::UnknownAtom { atom: pair.first() })?;
                let j = graph
                    .index_of(pair.second())
                    .ok_or(GraphError::UnknownAtom { atom: pair.second() })?;
                Ok(ActiveBond { i, j, change })
            })
            .collect()
    }
}

impl fmt::Display for BondRearrangement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |pairs: &[AtomPair]| {
            pairs
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            f,
            "break [{}] form [{}]",
            join(&self.breaking),
            join(&self.forming)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sorts_and_deduplicates_pairs() {
        let r = BondRearrangement::new(
            [AtomPair::new(3, 1), AtomPair::new(0, 2), AtomPair::new(1, 3)],
            [AtomPair::new(2, 1)],
        )
        .unwrap();
        assert_eq!(r.breaking(), &[AtomPair::new(0, 2), AtomPair::new(1, 3)]);
        assert_eq!(r.forming(), &[AtomPair::new(1, 2)]);
        assert_eq!(r.size(), 3);
    }

    #[test]
    fn new_rejects_pair_in_both_sets() {
        let err = BondRearrangement::new([AtomPair::new(0, 1)], [AtomPair::new(1, 0)]).unwrap_err();
        assert_eq!(
            err,
            GraphError::OverlappingRearrangement {
                pair: AtomPair::new(0, 1)
            }
        );
    }

    #[test]
    fn new_rejects_self_loop() {
        let err = BondRearrangement::new([AtomPair::new(4, 4)], []).unwrap_err();
        assert_eq!(err, GraphError::SelfLoop { atom: AtomId(4) });
    }

    #[test]
    fn reversed_swaps_breaking_and_forming() {
        let r = BondRearrangement::new([AtomPair::new(0, 1)], [AtomPair::new(1, 2)]).unwrap();
        let rev = r.reversed();
        assert_eq!(rev.breaking(), r.forming());
        assert_eq!(rev.forming(), r.breaking());
        assert_eq!(rev.reversed(), r);
    }

    #[test]
    fn active_atoms_collects_all_endpoints() {
        let r = BondRearrangement::new([AtomPair::new(0, 1)], [AtomPair::new(1, 2)]).unwrap();
        let atoms: Vec<_> = r.active_atoms().into_iter().collect();
        assert_eq!(atoms, vec![AtomId(0), AtomId(1), AtomId(2)]);
    }

    #[test]
    fn display_lists_both_sets() {
        let r = BondRearrangement::new([AtomPair::new(0, 1)], [AtomPair::new(1, 2)]).unwrap();
        assert_eq!(r.to_string(), "break [(0, 1)] form [(1, 2)]");
        assert_eq!(BondRearrangement::empty().to_string(), "break [] form []");
    }
}
