//! The energy-evaluation boundary.
//!
//! Backends implement [`Evaluator`]; engine tasks reach them only through an
//! [`pool::EvaluatorPool`], which bounds concurrency and caches results.

pub mod model;
pub mod pool;
#[cfg(test)]
pub(crate) mod testing;

use crate::core::models::geometry::Geometry;
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Quantities requested from an evaluator. The energy is always computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvaluationRequest {
    pub gradient: bool,
    pub hessian: bool,
}

impl EvaluationRequest {
    pub const ENERGY: Self = Self {
        gradient: false,
        hessian: false,
    };
    pub const GRADIENT: Self = Self {
        gradient: true,
        hessian: false,
    };
    pub const HESSIAN: Self = Self {
        gradient: true,
        hessian: true,
    };
}

/// Result of one evaluation: energy in Hartree, gradient in Ha/Å (flat,
/// `3N`), Hessian in Ha/Å² (`3N x 3N`).
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub energy: f64,
    pub gradient: Option<DVector<f64>>,
    pub hessian: Option<DMatrix<f64>>,
}

impl Evaluation {
    pub fn energy_only(energy: f64) -> Self {
        Self {
            energy,
            gradient: None,
            hessian: None,
        }
    }

    pub fn with_gradient(energy: f64, gradient: DVector<f64>) -> Self {
        Self {
            energy,
            gradient: Some(gradient),
            hessian: None,
        }
    }

    pub fn satisfies(&self, request: EvaluationRequest) -> bool {
        (!request.gradient || self.gradient.is_some()) && (!request.hessian || self.hessian.is_some())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvaluatorError {
    #[error("Evaluator backend failed: {0}")]
    Backend(String),
    #[error("Evaluator did not return the requested {0}")]
    MissingQuantity(&'static str),
    #[error("Evaluator returned a {quantity} of dimension {found}, expected {expected}")]
    DimensionMismatch {
        quantity: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Evaluator returned a non-finite {0}")]
    NonFinite(&'static str),
    #[error("Geometry rejected by evaluator: {0}")]
    InvalidGeometry(String),
}

/// An energy backend. Implementations must be callable from several threads.
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        geometry: &Geometry,
        request: EvaluationRequest,
    ) -> Result<Evaluation, EvaluatorError>;

    /// Whether `evaluate` can return an analytic Hessian.
    fn provides_hessian(&self) -> bool {
        false
    }
}

/// Checks that an evaluation is finite and sized for `atom_count` atoms.
pub(crate) fn check_evaluation(
    evaluation: &Evaluation,
    atom_count: usize,
    request: EvaluationRequest,
) -> Result<(), EvaluatorError> {
    let dim = 3 * atom_count;
    if !evaluation.energy.is_finite() {
        return Err(EvaluatorError::NonFinite("energy"));
    }
    if request.gradient {
        let g = evaluation
            .gradient
            .as_ref()
            .ok_or(EvaluatorError::MissingQuantity("gradient"))?;
        if g.len() != dim {
            return Err(EvaluatorError::DimensionMismatch {
                quantity: "gradient",
                expected: dim,
                found: g.len(),
            });
        }
        if g.iter().any(|x| !x.is_finite()) {
            return Err(EvaluatorError::NonFinite("gradient"));
        }
    }
    if request.hessian {
        let h = evaluation
            .hessian
            .as_ref()
            .ok_or(EvaluatorError::MissingQuantity("hessian"))?;
        if h.nrows() != dim || h.ncols() != dim {
            return Err(EvaluatorError::DimensionMismatch {
                quantity: "hessian",
                expected: dim,
                found: h.nrows(),
            });
        }
        if h.iter().any(|x| !x.is_finite()) {
            return Err(EvaluatorError::NonFinite("hessian"));
        }
    }
    Ok(())
}
