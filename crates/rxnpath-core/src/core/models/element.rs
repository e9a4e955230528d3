use phf::phf_map;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Chemical elements supported by the built-in tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Element {
    H,
    He,
    Li,
    B,
    C,
    N,
    O,
    F,
    Na,
    Mg,
    Si,
    P,
    S,
    Cl,
    K,
    Br,
    I,
}

#[derive(Debug, Clone, Copy)]
struct ElementData {
    atomic_number: u8,
    mass: f64,
    covalent_radius: f64,
    vdw_radius: f64,
}

static ELEMENT_BY_SYMBOL: phf::Map<&'static str, Element> = phf_map! {
    "H" => Element::H,
    "He" => Element::He,
    "Li" => Element::Li,
    "B" => Element::B,
    "C" => Element::C,
    "N" => Element::N,
    "O" => Element::O,
    "F" => Element::F,
    "Na" => Element::Na,
    "Mg" => Element::Mg,
    "Si" => Element::Si,
    "P" => Element::P,
    "S" => Element::S,
    "Cl" => Element::Cl,
    "K" => Element::K,
    "Br" => Element::Br,
    "I" => Element::I,
};

// Covalent radii (Å) from Cordero et al. 2008, van der Waals radii (Å) from Bondi 1964.
static ELEMENT_DATA: phf::Map<&'static str, ElementData> = phf_map! {
    "H" => ElementData { atomic_number: 1, mass: 1.008, covalent_radius: 0.31, vdw_radius: 1.20 },
    "He" => ElementData { atomic_number: 2, mass: 4.0026, covalent_radius: 0.28, vdw_radius: 1.40 },
    "Li" => ElementData { atomic_number: 3, mass: 6.94, covalent_radius: 1.28, vdw_radius: 1.82 },
    "B" => ElementData { atomic_number: 5, mass: 10.81, covalent_radius: 0.84, vdw_radius: 1.92 },
    "C" => ElementData { atomic_number: 6, mass: 12.011, covalent_radius: 0.76, vdw_radius: 1.70 },
    "N" => ElementData { atomic_number: 7, mass: 14.007, covalent_radius: 0.71, vdw_radius: 1.55 },
    "O" => ElementData { atomic_number: 8, mass: 15.999, covalent_radius: 0.66, vdw_radius: 1.52 },
    "F" => ElementData { atomic_number: 9, mass: 18.998, covalent_radius: 0.57, vdw_radius: 1.47 },
    "Na" => ElementData { atomic_number: 11, mass: 22.990, covalent_radius: 1.66, vdw_radius: 2.27 },
    "Mg" => ElementData { atomic_number: 12, mass: 24.305, covalent_radius: 1.41, vdw_radius: 1.73 },
    "Si" => ElementData { atomic_number: 14, mass: 28.085, covalent_radius: 1.11, vdw_radius: 2.10 },
    "P" => ElementData { atomic_number: 15, mass: 30.974, covalent_radius: 1.07, vdw_radius: 1.80 },
    "S" => ElementData { atomic_number: 16, mass: 32.06, covalent_radius: 1.05, vdw_radius: 1.80 },
    "Cl" => ElementData { atomic_number: 17, mass: 35.45, covalent_radius: 1.02, vdw_radius: 1.75 },
    "K" => ElementData { atomic_number: 19, mass: 39.098, covalent_radius: 2.03, vdw_radius: 2.75 },
    "Br" => ElementData { atomic_number: 35, mass: 79.904, covalent_radius: 1.20, vdw_radius: 1.85 },
    "I" => ElementData { atomic_number: 53, mass: 126.90, covalent_radius: 1.39, vdw_radius: 1.98 },
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown element symbol: '{0}'")]
pub struct ParseElementError(pub String);

impl Element {
    pub fn symbol(self) -> &'static str {
        match self {
            Element::H => "H",
            Element::He => "He",
            Element::Li => "Li",
            Element::B => "B",
            Element::C => "C",
            Element::N => "N",
            Element::O => "O",
            Element::F => "F",
            Element::Na => "Na",
            Element::Mg => "Mg",
            Element::Si => "Si",
            Element::P => "P",
            Element::S => "S",
            Element::Cl => "Cl",
            Element::K => "K",
            Element::Br => "Br",
            Element::I => "I",
        }
    }

    fn data(self) -> &'static ElementData {
        // Every variant has an entry in the table.
        &ELEMENT_DATA[self.symbol()]
    }

    pub fn atomic_number(self) -> u8 {
        self.data().atomic_number
    }

    /// Standard atomic mass in amu.
    pub fn mass(self) -> f64 {
        self.data().mass
    }

    /// Single-bond covalent radius in Å.
    pub fn covalent_radius(self) -> f64 {
        self.data().covalent_radius
    }

    /// Van der Waals radius in Å.
    pub fn vdw_radius(self) -> f64 {
        self.data().vdw_radius
    }

    /// Typical number of bonds formed by a neutral atom of this element.
    pub fn valence(self) -> u8 {
        match self {
            Element::H | Element::He | Element::Li | Element::F | Element::Na => 1,
            Element::Cl | Element::K | Element::Br | Element::I => 1,
            Element::O | Element::Mg | Element::S => 2,
            Element::B | Element::N | Element::P => 3,
            Element::C | Element::Si => 4,
        }
    }
}

impl FromStr for Element {
    type Err = ParseElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(element) = ELEMENT_BY_SYMBOL.get(trimmed) {
            return Ok(*element);
        }
        // Accept "CL", "cl" and friends.
        let mut chars = trimmed.chars();
        let normalized: String = match chars.next() {
            Some(first) => first
                .to_uppercase()
                .chain(chars.flat_map(|c| c.to_lowercase()))
                .collect(),
            None => String::new(),
        };
        ELEMENT_BY_SYMBOL
            .get(normalized.as_str())
            .copied()
            .ok_or_else(|| ParseElementError(s.to_string()))
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_parses_standard_and_uppercase_symbols() {
        assert_eq!("C".parse::<Element>().unwrap(), Element::C);
        assert_eq!("Cl".parse::<Element>().unwrap(), Element::Cl);
        assert_eq!("CL".parse::<Element>().unwrap(), Element::Cl);
        assert_eq!(" br ".parse::<Element>().unwrap(), Element::Br);
    }

    #[test]
    fn from_str_rejects_unknown_symbol() {
        let err = "Xx".parse::<Element>().unwrap_err();
        assert_eq!(err, ParseElementError("Xx".to_string()));
    }

    #[test]
    fn tables_cover_every_element() {
        for symbol in ELEMENT_BY_SYMBOL.keys() {
            let element: Element = symbol.parse().unwrap();
            assert_eq!(element.symbol(), *symbol);
            assert!(element.covalent_radius() > 0.0);
            assert!(element.vdw_radius() > element.covalent_radius());
            assert!(element.mass() > 0.0);
        }
    }

    #[test]
    fn carbon_properties_match_reference_values() {
        assert_eq!(Element::C.atomic_number(), 6);
        assert_eq!(Element::C.valence(), 4);
        assert!((Element::C.covalent_radius() - 0.76).abs() < 1e-12);
    }
}
