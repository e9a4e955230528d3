use super::reaction::Reaction;
use crate::core::models::geometry::Conformer;
use crate::core::models::graph::MolecularGraph;
use crate::core::models::rearrangement::BondRearrangement;
use crate::engine::cancel::CancellationToken;
use crate::engine::config::{EnumerationConfig, SearchConfig};
use crate::engine::error::EngineError;
use crate::engine::evaluator::Evaluator;
use crate::engine::evaluator::pool::EvaluatorPool;
use crate::engine::tasks::conformers;
use crate::engine::tasks::rearrangement::RearrangementEnumerator;
use tracing::{info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// The first `limit` rearrangements turning `reactant` into `product`, best first.
///
/// Rearrangements are expressed in the caller's direction even when the
/// enumeration itself ran in reverse.
#[instrument(skip_all, name = "enumeration_workflow")]
pub fn enumerate(
    reactant: &MolecularGraph,
    product: &MolecularGraph,
    config: &EnumerationConfig,
    limit: usize,
) -> Result<Vec<BondRearrangement>, EngineError> {
    let reaction = Reaction::new(reactant, product)?;
    let (start, end) = reaction.search_pair();
    let found: Vec<BondRearrangement> = RearrangementEnumerator::new(start, end, config)?
        .take(limit)
        .map(|r| if reaction.is_reversed() { r.reversed() } else { r })
        .collect();
    info!(count = found.len(), "Enumeration finished.");
    Ok(found)
}

/// Conformers of `graph`, optionally evaluated and energy-stripped.
///
/// Without an evaluator the force-field-relaxed conformers come back in
/// generation order without energies.
#[instrument(skip_all, name = "conformer_workflow")]
pub fn generate_conformers(
    graph: &MolecularGraph,
    config: &SearchConfig,
    evaluator: Option<&dyn Evaluator>,
    cancel: &CancellationToken,
) -> Result<Vec<Conformer>, EngineError> {
    let generated = conformers::generate(
        graph,
        config.conformers.num_conformers,
        &config.conformers,
        &config.forcefield,
        cancel,
    )?;
    let Some(evaluator) = evaluator else {
        return Ok(generated);
    };

    let pool = EvaluatorPool::new(evaluator, config.evaluator_slots, config.cache_evaluations);

    #[cfg(not(feature = "parallel"))]
    let iterator = generated.into_iter();
    #[cfg(feature = "parallel")]
    let iterator = generated.into_par_iter();

    let evaluated = iterator
        .map(|c| -> Result<Conformer, EngineError> {
            let energy = pool.energy(c.geometry())?;
            Ok(c.with_energy(energy))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(conformers::strip_by_energy(
        evaluated,
        config.conformers.energy_window,
    ))
}
