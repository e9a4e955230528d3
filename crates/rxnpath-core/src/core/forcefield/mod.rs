//! # Force Field Module
//!
//! A small molecular-mechanics force field built directly from a molecular
//! graph. It is used to relax embedded conformers and as the diabatic states
//! of the built-in model evaluator.
//!
//! - [`potentials`] - Pair potentials with analytic derivatives
//! - [`params`] - Tunable parameters
//! - [`scoring`] - Term assembly, energy and gradient evaluation
//! - [`term`] - Energy breakdown by interaction class

pub mod params;
pub(crate) mod potentials;
pub mod scoring;
pub mod term;
