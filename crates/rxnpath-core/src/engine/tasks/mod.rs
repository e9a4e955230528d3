//! Computational units of a reaction search.
//!
//! Each submodule performs one stage: enumerating bond rearrangements,
//! embedding conformers, interpolating and refining paths, and locating and
//! validating saddle points. Workflows compose them; tasks never call each
//! other except through [`saddle_search`].

pub mod bond_scan;
pub mod conformers;
pub mod embedding;
pub mod frequencies;
pub mod interpolation;
pub mod path_refinement;
pub mod rearrangement;
pub mod saddle_optimization;
pub mod saddle_search;
