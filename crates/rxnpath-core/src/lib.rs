//! # rxnpath Core Library
//!
//! Automated reaction-mechanism search: from the molecular graphs of a
//! reactant and a product to a reaction profile with a validated transition
//! state and relative energies.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`MolecularGraph`,
//!   `BondRearrangement`, `Geometry`, `ReactionPath`), a connectivity-derived
//!   force field, numerical optimizers and XYZ I/O.
//!
//! - **[`engine`]: The Logic Core.** The search tasks (rearrangement
//!   enumeration, distance-geometry conformers, path interpolation, nudged
//!   elastic band, P-RFO and vibrational validation) together with the
//!   evaluator boundary through which every energy is computed.
//!
//! - **[`workflows`]: The Public API.** Ties `engine` and `core` together:
//!   [`workflows::profile::run`] assembles a full reaction profile, and
//!   [`workflows::explore`] exposes enumeration and conformer generation on
//!   their own.
//!
//! Energies are in Hartree, lengths in Å; relative energies reported by a
//! profile are in kcal/mol.

pub mod core;
pub mod engine;
pub mod workflows;
