use crate::core::models::element::Element;
use crate::core::models::graph::MolecularGraph;
use crate::engine::error::EngineError;
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// Reaction class, from the number of molecules on each side.
///
/// The class always reads the reaction in the direction the caller wrote it,
/// even when [`Reaction`] searches the reverse: H + H -> H2 is an addition,
/// although its barrier is located along the H2 dissociation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionType {
    /// More molecules react than are produced (A + B -> C).
    Addition,
    /// One molecule falls apart (A -> B + C).
    Dissociation,
    /// Equal numbers of several molecules (A + B -> C + D).
    Substitution,
    /// Several molecules give even more (A + B -> C + D + E).
    Elimination,
    /// One molecule to one molecule.
    Rearrangement,
}

impl ReactionType {
    pub fn classify(reactant: &MolecularGraph, product: &MolecularGraph) -> Self {
        match (reactant.fragment_count(), product.fragment_count()) {
            (r, p) if r > p => ReactionType::Addition,
            (1, 1) => ReactionType::Rearrangement,
            (1, _) => ReactionType::Dissociation,
            (r, p) if r == p => ReactionType::Substitution,
            _ => ReactionType::Elimination,
        }
    }
}

impl fmt::Display for ReactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReactionType::Addition => "addition",
            ReactionType::Dissociation => "dissociation",
            ReactionType::Substitution => "substitution",
            ReactionType::Elimination => "elimination",
            ReactionType::Rearrangement => "rearrangement",
        };
        f.write_str(name)
    }
}

fn formula(counts: &BTreeMap<Element, usize>) -> String {
    counts
        .iter()
        .map(|(element, n)| if *n == 1 { element.to_string() } else { format!("{element}{n}") })
        .collect()
}

/// Fails with [`EngineError::UnbalancedReaction`] unless both sides hold the
/// same atoms and the same total charge.
pub fn check_balance(reactant: &MolecularGraph, product: &MolecularGraph) -> Result<(), EngineError> {
    let (r, p) = (reactant.element_counts(), product.element_counts());
    if r != p {
        return Err(EngineError::UnbalancedReaction(format!(
            "reactant is {} but product is {}",
            formula(&r),
            formula(&p)
        )));
    }
    let (q_r, q_p) = (reactant.total_charge(), product.total_charge());
    if q_r != q_p {
        return Err(EngineError::UnbalancedReaction(format!(
            "total charge changes from {q_r} to {q_p}"
        )));
    }
    Ok(())
}

/// A balanced reaction, oriented for the search.
///
/// The search always runs in the bond-breaking direction: when the product
/// has more bonds than the reactant the two sides are swapped and
/// [`Reaction::is_reversed`] reports it.
#[derive(Debug, Clone)]
pub struct Reaction<'a> {
    reactant: &'a MolecularGraph,
    product: &'a MolecularGraph,
    reaction_type: ReactionType,
    reversed: bool,
}

impl<'a> Reaction<'a> {
    pub fn new(reactant: &'a MolecularGraph, product: &'a MolecularGraph) -> Result<Self, EngineError> {
        check_balance(reactant, product)?;
        let reaction_type = ReactionType::classify(reactant, product);
        let reversed = product.bond_count() > reactant.bond_count();
        if reversed {
            info!(
                reactant_bonds = reactant.bond_count(),
                product_bonds = product.bond_count(),
                "Product has more bonds; searching the reverse reaction."
            );
        }
        Ok(Self {
            reactant,
            product,
            reaction_type,
            reversed,
        })
    }

    /// Classification in the direction the caller gave.
    pub fn reaction_type(&self) -> ReactionType {
        self.reaction_type
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// The (start, end) graphs the search runs between.
    pub fn search_pair(&self) -> (&'a MolecularGraph, &'a MolecularGraph) {
        if self.reversed {
            (self.product, self.reactant)
        } else {
            (self.reactant, self.product)
        }
    }
}
