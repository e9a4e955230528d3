//! # Core Models Module
//!
//! Data structures describing molecules and reactions.
//!
//! - [`element`] - Element table with radii and masses
//! - [`atom`] - Atoms with identifiers, charges and optional coordinates
//! - [`topology`] - Bonds, bond orders and unordered atom pairs
//! - [`graph`] - Molecular graphs, fragments and isomorphism
//! - [`rearrangement`] - Sets of bonds to break and form
//! - [`geometry`] - Cartesian geometries and conformers
//! - [`path`] - Reaction paths made of geometry images

pub mod atom;
pub mod element;
pub mod geometry;
pub mod graph;
pub mod ids;
pub(crate) mod isomorphism;
pub mod path;
pub mod rearrangement;
pub mod topology;
