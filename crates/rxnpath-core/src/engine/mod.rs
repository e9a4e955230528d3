//! # Engine Module
//!
//! The search engine behind reaction-profile assembly: configuration,
//! evaluator access, result state and the individual search tasks.
//!
//! ## Overview
//!
//! Every task receives a [`context::SearchContext`] bundling the
//! configuration, the [`evaluator::pool::EvaluatorPool`] through which all
//! energies are computed, a progress reporter and a cancellation token.
//! Tasks report failures as [`error::EngineError`]; the assembler decides
//! which of them end a single candidate and which end the search.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Search parameters and their builder
//! - **Evaluators** ([`evaluator`]) - The energy backend boundary, pooling and the built-in model
//! - **State** ([`state`]) - Transition states, candidate outcomes and the search trace
//! - **Progress** ([`progress`]) - Callback-based progress reporting
//! - **Cancellation** ([`cancel`]) - Cooperative cancellation shared across tasks
//! - **Errors** ([`error`]) - Engine error types

pub(crate) mod cache;
pub mod cancel;
pub mod config;
pub(crate) mod context;
pub mod error;
pub mod evaluator;
pub mod progress;
pub mod state;
pub(crate) mod tasks;
