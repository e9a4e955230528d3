use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of an atom inside a molecular graph.
///
/// Identifiers are chosen by the caller and survive bond rearrangements, so a
/// reactant atom and the matching product atom carry the same id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AtomId(pub usize);

impl AtomId {
    #[inline]
    pub fn value(self) -> usize {
        self.0
    }
}

impl From<usize> for AtomId {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
