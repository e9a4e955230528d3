//! # Workflows Module
//!
//! End-to-end entry points of the library.
//!
//! - **Reaction setup** ([`reaction`]) - Balance checks, classification and search direction
//! - **Profile search** ([`profile`]) - Rearrangement enumeration through validated transition state
//! - **Exploration** ([`explore`]) - Stand-alone rearrangement listing and conformer generation

pub mod explore;
pub mod profile;
pub mod reaction;
