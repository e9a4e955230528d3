//! # Core Module
//!
//! Stateless building blocks of the reaction search: molecular graphs and
//! geometries, a topology-derived force field, numerical optimizers, geometry
//! utilities and coordinate file I/O.
//!
//! - **Molecular Representation** ([`models`]) - Elements, atoms, bonds, graphs, rearrangements, paths
//! - **Energy Model** ([`forcefield`]) - Morse/harmonic/repulsive terms derived from connectivity
//! - **Optimization** ([`optimize`]) - L-BFGS minimizer and quasi-Newton Hessian updates
//! - **Geometry** ([`utils`]) - Superposition, RMSD and rigid-body projections
//! - **File I/O** ([`io`]) - XYZ reading and writing

pub mod forcefield;
pub mod io;
pub mod models;
pub mod optimize;
pub mod utils;
