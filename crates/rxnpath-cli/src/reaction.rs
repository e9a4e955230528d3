//! Reaction descriptions: a TOML file with `[reactant]` and `[product]`
//! tables, each giving atoms and bonds inline or pointing at an XYZ file.
//!
//! ```toml
//! [reactant]
//! xyz = "ethane.xyz"          # bonds perceived from coordinates
//!
//! [product]
//! connectivity = "complex"
//! atoms = [{ element = "H" }, { element = "H", charge = 0 }]
//! bonds = []
//! ```

use crate::error::{CliError, Result};
use nalgebra::Point3;
use rxnpath::core::io::traits::MolecularFile;
use rxnpath::core::io::xyz::XyzFile;
use rxnpath::core::models::atom::Atom;
use rxnpath::core::models::element::Element;
use rxnpath::core::models::graph::{Connectivity, DEFAULT_BOND_TOLERANCE, MolecularGraph};
use rxnpath::core::models::topology::{Bond, BondOrder};
use rxnpath::engine::error::EngineError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum ConnectivitySpec {
    #[default]
    SingleMolecule,
    Complex,
}

impl From<ConnectivitySpec> for Connectivity {
    fn from(spec: ConnectivitySpec) -> Self {
        match spec {
            ConnectivitySpec::SingleMolecule => Connectivity::SingleMolecule,
            ConnectivitySpec::Complex => Connectivity::Complex,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct AtomSpec {
    /// Defaults to the atom's position in the list.
    id: Option<usize>,
    element: String,
    #[serde(default)]
    charge: i8,
    position: Option<[f64; 3]>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct BondSpec {
    atoms: [usize; 2],
    order: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SpeciesSpec {
    xyz: Option<PathBuf>,
    atoms: Option<Vec<AtomSpec>>,
    bonds: Option<Vec<BondSpec>>,
    /// `[atom id, formal charge]` pairs for atoms read from XYZ.
    #[serde(default)]
    charges: Vec<(usize, i8)>,
    #[serde(default)]
    connectivity: ConnectivitySpec,
    perception_tolerance: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct ReactionFile {
    reactant: SpeciesSpec,
    product: SpeciesSpec,
}

/// Reactant and product graphs of a reaction description.
pub struct ReactionInput {
    pub reactant: MolecularGraph,
    pub product: MolecularGraph,
}

impl ReactionInput {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading reaction description from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let file: ReactionFile = toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let reactant = file.reactant.to_graph(base_dir, "reactant")?;
        let product = file.product.to_graph(base_dir, "product")?;
        info!(
            atoms = reactant.atom_count(),
            reactant_bonds = reactant.bond_count(),
            product_bonds = product.bond_count(),
            "Reaction loaded."
        );
        Ok(Self { reactant, product })
    }
}

impl SpeciesSpec {
    fn to_graph(&self, base_dir: &Path, side: &str) -> Result<MolecularGraph> {
        let mut atoms = match (&self.xyz, &self.atoms) {
            (Some(_), Some(_)) => {
                return Err(CliError::Reaction(format!(
                    "{side}: give either `xyz` or `atoms`, not both"
                )));
            }
            (None, None) => {
                return Err(CliError::Reaction(format!(
                    "{side}: one of `xyz` or `atoms` is required"
                )));
            }
            (Some(xyz), None) => read_xyz_atoms(&base_dir.join(xyz))?,
            (None, Some(specs)) => specs
                .iter()
                .enumerate()
                .map(|(index, spec)| spec.to_atom(index, side))
                .collect::<Result<Vec<_>>>()?,
        };

        for &(id, charge) in &self.charges {
            let atom = atoms
                .iter_mut()
                .find(|a| a.id.value() == id)
                .ok_or_else(|| {
                    CliError::Reaction(format!("{side}: charge given for unknown atom {id}"))
                })?;
            atom.formal_charge = charge;
        }

        let connectivity = self.connectivity.into();
        let graph = match &self.bonds {
            Some(specs) => {
                let bonds = specs
                    .iter()
                    .map(|spec| spec.to_bond(side))
                    .collect::<Result<Vec<_>>>()?;
                MolecularGraph::new(atoms, bonds, connectivity)
            }
            None if atoms.iter().all(|a| a.position.is_some()) => {
                let tolerance = self.perception_tolerance.unwrap_or(DEFAULT_BOND_TOLERANCE);
                debug!(side, tolerance, "Perceiving bonds from coordinates.");
                MolecularGraph::from_coordinates(atoms, tolerance, connectivity)
            }
            None => MolecularGraph::new(atoms, Vec::new(), connectivity),
        };
        graph.map_err(|e| CliError::Engine(EngineError::InvalidStructure(e)))
    }
}

impl AtomSpec {
    fn to_atom(&self, index: usize, side: &str) -> Result<Atom> {
        let element: Element = self.element.parse().map_err(|_| {
            CliError::Reaction(format!("{side}: unknown element '{}'", self.element))
        })?;
        let mut atom = Atom::new(self.id.unwrap_or(index), element).with_charge(self.charge);
        if let Some([x, y, z]) = self.position {
            atom = atom.with_position(Point3::new(x, y, z));
        }
        Ok(atom)
    }
}

impl BondSpec {
    fn to_bond(&self, side: &str) -> Result<Bond> {
        let [a, b] = self.atoms;
        let order = match &self.order {
            Some(order) => order.parse().map_err(|_| {
                CliError::Reaction(format!("{side}: unknown bond order '{order}'"))
            })?,
            None => BondOrder::Single,
        };
        Ok(Bond::new(a, b, order))
    }
}

fn read_xyz_atoms(path: &Path) -> Result<Vec<Atom>> {
    let frames = XyzFile::read_from_path(path).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    let frame = frames.into_iter().next().ok_or_else(|| CliError::FileParsing {
        path: path.to_path_buf(),
        source: anyhow::anyhow!("file holds no structure"),
    })?;
    let geometry = frame.geometry;
    Ok(geometry
        .elements()
        .iter()
        .zip(geometry.coords())
        .enumerate()
        .map(|(i, (&element, &position))| Atom::new(i, element).with_position(position))
        .collect())
}
