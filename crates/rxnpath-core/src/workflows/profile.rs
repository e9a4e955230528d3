use super::reaction::{Reaction, ReactionType};
use crate::core::forcefield::potentials::KCAL_PER_HARTREE;
use crate::core::io::traits::Frame;
use crate::core::models::geometry::{Conformer, Geometry};
use crate::core::models::graph::MolecularGraph;
use crate::core::models::rearrangement::BondRearrangement;
use crate::engine::cancel::CancellationToken;
use crate::engine::config::{EvaluatorPolicy, SearchConfig, SearchPolicy};
use crate::engine::context::SearchContext;
use crate::engine::error::EngineError;
use crate::engine::evaluator::Evaluator;
use crate::engine::evaluator::pool::EvaluatorPool;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::state::{
    CandidateFailure, CandidateSuccess, FailureKind, SearchTrace, TransitionState,
};
use crate::engine::tasks::{conformers, interpolation, rearrangement::RearrangementEnumerator, saddle_search};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Reactant, transition state and product of the lowest-barrier mechanism found.
#[derive(Debug, Clone)]
pub struct ReactionProfile {
    pub reaction_type: ReactionType,
    pub rearrangement: BondRearrangement,
    pub reactant: Conformer,
    /// `None` when reactant and product share their connectivity.
    pub transition_state: Option<TransitionState>,
    pub product: Conformer,
    pub trace: SearchTrace,
}

impl ReactionProfile {
    /// Reaction energy in kcal/mol.
    pub fn delta_e(&self) -> Option<f64> {
        Some((self.product.energy()? - self.reactant.energy()?) * KCAL_PER_HARTREE)
    }

    /// Forward barrier in kcal/mol.
    pub fn delta_e_ddagger(&self) -> Option<f64> {
        let ts = self.transition_state.as_ref()?;
        Some((ts.energy - self.reactant.energy()?) * KCAL_PER_HARTREE)
    }

    /// Reactant, TS (if any) and product as coordinate frames.
    pub fn frames(&self) -> Vec<Frame> {
        let label = |name: &str, energy: Option<f64>| match energy {
            Some(e) => format!("{name} E={e:.8}"),
            None => name.to_string(),
        };
        let mut frames = vec![Frame::new(
            label("reactant", self.reactant.energy()),
            self.reactant.geometry().clone(),
        )];
        if let Some(ts) = &self.transition_state {
            frames.push(Frame::new(
                format!(
                    "transition_state E={:.8} imag={:.1}",
                    ts.energy,
                    ts.imaginary_frequency()
                ),
                ts.geometry.clone(),
            ));
        }
        frames.push(Frame::new(
            label("product", self.product.energy()),
            self.product.geometry().clone(),
        ));
        frames
    }

    fn reversed(self) -> Self {
        Self {
            rearrangement: self.rearrangement.reversed(),
            reactant: self.product,
            product: self.reactant,
            ..self
        }
    }
}

/// Searches the mechanism turning `reactant` into `product`.
///
/// Rearrangements are tried best-first, in batches of
/// `parallel_rearrangements`. Each one gets its own conformer pools, paths
/// and saddle searches; failures that only concern one rearrangement or
/// pairing are recorded in the trace and the search moves on.
#[instrument(skip_all, name = "reaction_profile_workflow")]
pub fn run(
    reactant: &MolecularGraph,
    product: &MolecularGraph,
    evaluator: &dyn Evaluator,
    config: &SearchConfig,
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
) -> Result<ReactionProfile, EngineError> {
    // === Phase 0: Reaction setup ===
    reporter.report(Progress::PhaseStart { name: "Preparation" });
    let reaction = Reaction::new(reactant, product)?;
    let (start, end) = reaction.search_pair();
    let pool = EvaluatorPool::new(evaluator, config.evaluator_slots, config.cache_evaluations);
    let ctx = SearchContext::new(config, &pool, reporter, cancel);
    info!(
        reaction_type = %reaction.reaction_type(),
        reversed = reaction.is_reversed(),
        evaluator = pool.evaluator_name(),
        "Starting reaction profile search."
    );
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Rearrangement enumeration ===
    reporter.report(Progress::PhaseStart {
        name: "Enumerating Rearrangements",
    });
    let mut enumerator = RearrangementEnumerator::new(start, end, &config.enumeration)?.peekable();
    reporter.report(Progress::PhaseFinish);

    let profile = if enumerator.peek().is_some_and(BondRearrangement::is_empty) {
        // === Phase 2a: Same connectivity, no barrier to locate ===
        info!("No bonds change; building a profile without a transition state.");
        same_connectivity_profile(start, end, reaction.reaction_type(), &ctx)?
    } else {
        // === Phase 2: Candidate search ===
        reporter.report(Progress::PhaseStart {
            name: "Searching Transition States",
        });
        let budget = match config.policy {
            SearchPolicy::FirstSuccess => usize::MAX,
            SearchPolicy::Exhaustive { max_rearrangements } => max_rearrangements,
        };
        let mut trace = SearchTrace::default();
        let mut successes: Vec<CandidateSuccess> = Vec::new();
        let mut next_rank = 0;

        while next_rank < budget {
            cancel.check()?;
            let take = config.parallel_rearrangements.min(budget - next_rank);
            let batch: Vec<(usize, BondRearrangement)> = enumerator
                .by_ref()
                .take(take)
                .enumerate()
                .map(|(k, r)| (next_rank + k, r))
                .collect();
            if batch.is_empty() {
                break;
            }
            next_rank += batch.len();

            let (batch_successes, batch_trace) = search_batch(&batch, start, &ctx)?;
            trace.merge(batch_trace);
            successes.extend(batch_successes);
            if config.policy == SearchPolicy::FirstSuccess && !successes.is_empty() {
                break;
            }
        }
        reporter.report(Progress::PhaseFinish);

        // === Phase 3: Ranking ===
        let Some(best) = select_best(successes, config.policy) else {
            warn!(%trace, "No rearrangement produced a validated transition state.");
            return Err(EngineError::NoProfileFound { trace });
        };
        info!(
            rank = best.rank,
            rearrangement = %best.rearrangement,
            energy = best.transition_state.energy,
            "Selected transition state."
        );
        ReactionProfile {
            reaction_type: reaction.reaction_type(),
            rearrangement: best.rearrangement,
            reactant: best.reactant,
            transition_state: Some(best.transition_state),
            product: best.product,
            trace,
        }
    };

    let profile = if reaction.is_reversed() {
        profile.reversed()
    } else {
        profile
    };
    info!(
        delta_e = ?profile.delta_e(),
        barrier = ?profile.delta_e_ddagger(),
        evaluator_calls = pool.calls(),
        cache_hits = pool.cache_hits(),
        "Reaction profile complete."
    );
    Ok(profile)
}

fn same_connectivity_profile(
    start: &MolecularGraph,
    end: &MolecularGraph,
    reaction_type: ReactionType,
    ctx: &SearchContext,
) -> Result<ReactionProfile, EngineError> {
    let empty = BondRearrangement::empty();
    let mut trace = SearchTrace {
        rearrangements_attempted: 1,
        ..SearchTrace::default()
    };
    let pools = conformer_pool(start, ctx).and_then(|r| Ok((r, conformer_pool(end, ctx)?)));
    let (reactants, products) = match pools {
        Ok(pools) => pools,
        Err(error) => {
            let (kind, reason) = into_failure(error, ctx.config.evaluator_policy)?;
            trace.record(CandidateFailure {
                rearrangement: empty,
                pairing: None,
                kind,
                reason,
            });
            return Err(EngineError::NoProfileFound { trace });
        }
    };
    let (Some(reactant), Some(product)) = (reactants.into_iter().next(), products.into_iter().next())
    else {
        return Err(EngineError::Internal("conformer pool came back empty".to_string()));
    };
    Ok(ReactionProfile {
        reaction_type,
        rearrangement: empty,
        reactant,
        transition_state: None,
        product,
        trace,
    })
}

/// Runs one batch of rearrangements concurrently.
///
/// Under [`SearchPolicy::FirstSuccess`] a success cancels every member
/// ranked after it. Those members still count as attempted and are traced
/// as [`FailureKind::Superseded`].
fn search_batch(
    batch: &[(usize, BondRearrangement)],
    start: &MolecularGraph,
    ctx: &SearchContext,
) -> Result<(Vec<CandidateSuccess>, SearchTrace), EngineError> {
    let first_success = ctx.config.policy == SearchPolicy::FirstSuccess;
    let tokens: Vec<CancellationToken> = batch.iter().map(|_| ctx.cancel.child()).collect();
    ctx.reporter.report(Progress::TaskStart {
        total: batch.len() as u64,
    });

    let indexed: Vec<usize> = (0..batch.len()).collect();
    #[cfg(not(feature = "parallel"))]
    let iterator = indexed.iter();
    #[cfg(feature = "parallel")]
    let iterator = indexed.par_iter();

    let outcomes: Vec<(Result<Option<CandidateSuccess>, EngineError>, SearchTrace)> = iterator
        .map(|&k| {
            let (rank, rearrangement) = &batch[k];
            let local = ctx.with_cancel(&tokens[k]);
            let mut trace = SearchTrace {
                rearrangements_attempted: 1,
                ..SearchTrace::default()
            };
            let result = search_candidate(*rank, rearrangement, start, &local, &mut trace);
            if first_success && matches!(&result, Ok(Some(_))) {
                tokens[k + 1..].iter().for_each(CancellationToken::cancel);
            }
            ctx.reporter.report(Progress::TaskIncrement);
            (result, trace)
        })
        .collect();
    ctx.reporter.report(Progress::TaskFinish);

    let mut successes = Vec::new();
    let mut trace = SearchTrace::default();
    for ((result, mut candidate_trace), (rank, rearrangement)) in outcomes.into_iter().zip(batch) {
        match result {
            Ok(success) => successes.extend(success),
            Err(EngineError::Cancelled) if !ctx.cancel.is_cancelled() => {
                debug!(rank, %rearrangement, "Candidate superseded by a better-ranked success.");
                candidate_trace.record(CandidateFailure {
                    rearrangement: rearrangement.clone(),
                    pairing: None,
                    kind: FailureKind::Superseded,
                    reason: "cancelled after a better-ranked rearrangement succeeded".to_string(),
                });
            }
            Err(error) => return Err(error),
        }
        trace.merge(candidate_trace);
    }
    Ok((successes, trace))
}

/// The winning candidate: the best-ranked success under
/// [`SearchPolicy::FirstSuccess`], the lowest transition state under
/// [`SearchPolicy::Exhaustive`].
fn select_best(successes: Vec<CandidateSuccess>, policy: SearchPolicy) -> Option<CandidateSuccess> {
    match policy {
        SearchPolicy::FirstSuccess => successes.into_iter().min_by_key(|s| s.rank),
        SearchPolicy::Exhaustive { .. } => successes.into_iter().min(),
    }
}

/// Maps a candidate-level error to a trace entry, or hands back errors that
/// must end the whole search.
fn into_failure(
    error: EngineError,
    policy: EvaluatorPolicy,
) -> Result<(FailureKind, String), EngineError> {
    let reason = error.to_string();
    let kind = match error {
        EngineError::EvaluatorFailure { .. } if matches!(policy, EvaluatorPolicy::Retry { .. }) => {
            FailureKind::Evaluator
        }
        EngineError::NoValidConformer { .. } => FailureKind::NoValidConformer,
        EngineError::NotConverged { .. } => FailureKind::NotConverged,
        EngineError::WrongTransitionState { .. } => FailureKind::WrongTransitionState,
        other => return Err(other),
    };
    Ok((kind, reason))
}

#[instrument(skip_all, name = "candidate_search_task", fields(rank = rank, rearrangement = %rearrangement))]
fn search_candidate(
    rank: usize,
    rearrangement: &BondRearrangement,
    start: &MolecularGraph,
    ctx: &SearchContext,
    trace: &mut SearchTrace,
) -> Result<Option<CandidateSuccess>, EngineError> {
    let policy = ctx.config.evaluator_policy;
    let product_graph = start.apply(rearrangement)?;
    let active = rearrangement.to_active_bonds(start)?;

    let pools = conformer_pool(start, ctx).and_then(|r| Ok((r, conformer_pool(&product_graph, ctx)?)));
    let (reactants, products) = match pools {
        Ok(pools) => pools,
        Err(error) => {
            let (kind, reason) = into_failure(error, policy)?;
            trace.record(CandidateFailure {
                rearrangement: rearrangement.clone(),
                pairing: None,
                kind,
                reason,
            });
            return Ok(None);
        }
    };

    let mut best: Option<CandidateSuccess> = None;
    for (i, j) in pairings(&reactants, &products, ctx.config.conformer_pairs) {
        ctx.cancel.check()?;
        trace.pairings_attempted += 1;
        let (r, p) = (&reactants[i], &products[j]);

        let attempt = with_retries(policy, |perturbation| {
            let (r_geometry, p_geometry) = match &perturbation {
                Some(perturbation) => (
                    perturbation.apply(r.geometry()),
                    perturbation.apply(p.geometry()),
                ),
                None => (r.geometry().clone(), p.geometry().clone()),
            };
            let path = interpolation::interpolate(
                &r_geometry,
                &p_geometry,
                start,
                &product_graph,
                &active,
                &ctx.config.path,
                ctx.cancel,
            )?;
            saddle_search::run(path, start, &active, ctx)
        });

        match attempt {
            Ok(transition_state) => {
                let success = CandidateSuccess {
                    rank,
                    rearrangement: rearrangement.clone(),
                    reactant_index: i,
                    product_index: j,
                    reactant: r.clone(),
                    product: p.clone(),
                    transition_state,
                };
                if best.as_ref().is_none_or(|b| success < *b) {
                    best = Some(success);
                }
            }
            Err(error) => {
                let (kind, reason) = into_failure(error, policy)?;
                debug!(pairing = ?(i, j), %kind, %reason, "Pairing failed.");
                trace.record(CandidateFailure {
                    rearrangement: rearrangement.clone(),
                    pairing: Some((i, j)),
                    kind,
                    reason,
                });
            }
        }
    }
    Ok(best)
}

/// Conformer index pairs ordered by summed energy, at most `limit` of them.
fn pairings(reactants: &[Conformer], products: &[Conformer], limit: usize) -> Vec<(usize, usize)> {
    let energy = |c: &Conformer| c.energy().unwrap_or(f64::INFINITY);
    let mut pairs: Vec<(usize, usize)> = (0..reactants.len())
        .flat_map(|i| (0..products.len()).map(move |j| (i, j)))
        .collect();
    pairs.sort_by(|a, b| {
        let ea = energy(&reactants[a.0]) + energy(&products[a.1]);
        let eb = energy(&reactants[b.0]) + energy(&products[b.1]);
        ea.total_cmp(&eb).then(a.cmp(b))
    });
    pairs.truncate(limit);
    pairs
}

/// Generated, evaluated and energy-stripped conformers of `graph`, lowest first.
fn conformer_pool(graph: &MolecularGraph, ctx: &SearchContext) -> Result<Vec<Conformer>, EngineError> {
    let config = &ctx.config.conformers;
    let generated = conformers::generate(
        graph,
        config.num_conformers,
        config,
        &ctx.config.forcefield,
        ctx.cancel,
    )?;

    #[cfg(not(feature = "parallel"))]
    let iterator = generated.iter();
    #[cfg(feature = "parallel")]
    let iterator = generated.par_iter();

    let evaluated = iterator
        .map(|conformer| {
            with_retries(ctx.config.evaluator_policy, |perturbation| {
                let geometry = match &perturbation {
                    Some(perturbation) => perturbation.apply(conformer.geometry()),
                    None => conformer.geometry().clone(),
                };
                let energy = ctx.pool.energy(&geometry)?;
                Ok(Conformer::new(geometry).with_energy(energy))
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;
    Ok(conformers::strip_by_energy(evaluated, config.energy_window))
}

/// Seeded random displacement used to step around evaluator failures.
struct Perturbation {
    amplitude: f64,
    seed: u64,
}

impl Perturbation {
    fn apply(&self, geometry: &Geometry) -> Geometry {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let a = self.amplitude;
        let displacement: Vec<Vector3<f64>> = (0..geometry.atom_count())
            .map(|_| {
                Vector3::new(
                    rng.gen_range(-a..=a),
                    rng.gen_range(-a..=a),
                    rng.gen_range(-a..=a),
                )
            })
            .collect();
        geometry.displaced(&displacement)
    }
}

/// Runs `op` once, then again from perturbed geometries while the evaluator
/// keeps failing and the policy allows retries.
fn with_retries<T>(
    policy: EvaluatorPolicy,
    mut op: impl FnMut(Option<Perturbation>) -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let (retries, amplitude) = match policy {
        EvaluatorPolicy::FailFast => (0, 0.0),
        EvaluatorPolicy::Retry {
            attempts,
            perturbation,
        } => (attempts, perturbation),
    };
    let mut result = op(None);
    for attempt in 1..=retries {
        let Err(EngineError::EvaluatorFailure { source }) = &result else {
            break;
        };
        warn!(attempt, error = %source, "Evaluator failed; retrying from a perturbed geometry.");
        result = op(Some(Perturbation {
            amplitude,
            seed: attempt as u64,
        }));
    }
    result
}
