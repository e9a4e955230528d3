//! Numerical optimizers shared by the engine tasks.

pub mod hessian;
pub mod minimizer;
