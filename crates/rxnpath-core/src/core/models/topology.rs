use super::element::Element;
use super::ids::AtomId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum BondOrder {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Fractional shortening applied to the single-bond covalent length.
    pub fn length_factor(self) -> f64 {
        match self {
            BondOrder::Single => 1.0,
            BondOrder::Double => 0.87,
            BondOrder::Triple => 0.78,
            BondOrder::Aromatic => 0.92,
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid bond order string")]
pub struct ParseBondOrderError;

impl FromStr for BondOrder {
    type Err = ParseBondOrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "s" | "single" => Ok(Self::Single),
            "2" | "d" | "double" => Ok(Self::Double),
            "3" | "t" | "triple" => Ok(Self::Triple),
            "ar" | "aromatic" => Ok(Self::Aromatic),
            _ => Err(ParseBondOrderError),
        }
    }
}

impl fmt::Display for BondOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Single => "Single",
                Self::Double => "Double",
                Self::Triple => "Triple",
                Self::Aromatic => "Aromatic",
            }
        )
    }
}

/// Unordered pair of atom ids, stored with the smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AtomPair(AtomId, AtomId);

impl AtomPair {
    pub fn new(a: impl Into<AtomId>, b: impl Into<AtomId>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b { Self(a, b) } else { Self(b, a) }
    }

    #[inline]
    pub fn first(&self) -> AtomId {
        self.0
    }

    #[inline]
    pub fn second(&self) -> AtomId {
        self.1
    }

    #[inline]
    pub fn contains(&self, atom_id: AtomId) -> bool {
        self.0 == atom_id || self.1 == atom_id
    }

    #[inline]
    pub fn is_self_loop(&self) -> bool {
        self.0 == self.1
    }
}

impl fmt::Display for AtomPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bond {
    pub atom1_id: AtomId, // Smaller of the two atom ids
    pub atom2_id: AtomId, // Larger of the two atom ids
    pub order: BondOrder, // Estimated bond order
}

impl Bond {
    pub fn new(atom1_id: impl Into<AtomId>, atom2_id: impl Into<AtomId>, order: BondOrder) -> Self {
        let pair = AtomPair::new(atom1_id, atom2_id);
        Self {
            atom1_id: pair.first(),
            atom2_id: pair.second(),
            order,
        }
    }

    pub fn single(atom1_id: impl Into<AtomId>, atom2_id: impl Into<AtomId>) -> Self {
        Self::new(atom1_id, atom2_id, BondOrder::Single)
    }

    pub fn contains(&self, atom_id: AtomId) -> bool {
        self.atom1_id == atom_id || self.atom2_id == atom_id
    }

    pub fn pair(&self) -> AtomPair {
        AtomPair(self.atom1_id, self.atom2_id)
    }

    pub fn other(&self, atom_id: AtomId) -> Option<AtomId> {
        if self.atom1_id == atom_id {
            Some(self.atom2_id)
        } else if self.atom2_id == atom_id {
            Some(self.atom1_id)
        } else {
            None
        }
    }
}

/// Ideal bond length (Å) between two elements for a given bond order.
pub fn ideal_bond_length(a: Element, b: Element, order: BondOrder) -> f64 {
    (a.covalent_radius() + b.covalent_radius()) * order.length_factor()
}
