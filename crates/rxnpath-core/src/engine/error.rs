use thiserror::Error;

use super::config::ConfigError;
use super::evaluator::EvaluatorError;
use super::state::SearchTrace;
use crate::core::models::graph::GraphError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid structure: {0}")]
    InvalidStructure(#[from] GraphError),

    #[error("Unbalanced reaction: {0}")]
    UnbalancedReaction(String),

    #[error("No bond rearrangement found with at most {max_size} bond changes")]
    NoRearrangementFound { max_size: usize },

    #[error("No valid conformer generated after {attempts} embedding attempts")]
    NoValidConformer { attempts: usize },

    #[error(
        "Saddle optimization did not converge after {iterations} iterations (|g| = {gradient_norm:.3e} Ha/Å)"
    )]
    NotConverged {
        iterations: usize,
        gradient_norm: f64,
        energy_trace: Vec<f64>,
    },

    #[error("Not a valid transition state: {reason}")]
    WrongTransitionState {
        reason: String,
        imaginary_frequencies: Vec<f64>,
    },

    #[error("Energy evaluation failed: {source}")]
    EvaluatorFailure {
        #[from]
        source: EvaluatorError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Search was cancelled")]
    Cancelled,

    #[error("No reaction profile found: {trace}")]
    NoProfileFound { trace: SearchTrace },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
