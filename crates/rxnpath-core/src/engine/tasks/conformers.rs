use super::embedding::{DistanceBounds, embed, refine};
use crate::core::forcefield::params::ForceFieldParams;
use crate::core::forcefield::scoring::{ForceField, bond_length_between};
use crate::core::models::geometry::{Conformer, Geometry};
use crate::core::models::graph::MolecularGraph;
use crate::core::optimize::minimizer::MinimizerSettings;
use crate::core::utils::geometry::aligned_rmsd;
use crate::engine::cancel::CancellationToken;
use crate::engine::config::ConformerConfig;
use crate::engine::error::EngineError;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::cmp::Ordering;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const REFINEMENT_STEPS: usize = 200;
const SEED_STRIDE: u64 = 97;

/// Generates up to `count` distinct conformers of `graph`.
///
/// Single atoms and diatomics always give exactly one conformer. Otherwise
/// attempts run in parallel batches until `count` survive or the attempt
/// budget is spent.
#[instrument(skip_all, name = "conformer_generation_task", fields(atoms = graph.atom_count(), count = count))]
pub fn generate(
    graph: &MolecularGraph,
    count: usize,
    config: &ConformerConfig,
    forcefield: &ForceFieldParams,
    cancel: &CancellationToken,
) -> Result<Vec<Conformer>, EngineError> {
    if graph.atom_count() <= 2 {
        return Ok(vec![trivial_conformer(graph, config)]);
    }

    let mut bounds = DistanceBounds::from_graph(graph, config.fragment_gap);
    let crossed = bounds.smooth();
    if crossed > 0 {
        warn!(pairs = crossed, "Distance bounds are inconsistent; collapsed to lower bounds.");
    }
    let field = ForceField::from_graph(graph, forcefield);
    let relaxation = MinimizerSettings {
        max_iterations: config.relaxation_steps,
        ..MinimizerSettings::default()
    };

    let target = count.max(1);
    let mut accepted: Vec<Vec<Point3<f64>>> = Vec::new();
    let mut attempts = 0;
    let mut clashes = 0;

    while accepted.len() < target && attempts < config.max_attempts {
        cancel.check()?;
        let batch_end = (attempts + target).min(config.max_attempts);
        let batch: Vec<usize> = (attempts..batch_end).collect();

        #[cfg(not(feature = "parallel"))]
        let iterator = batch.iter();
        #[cfg(feature = "parallel")]
        let iterator = batch.par_iter();

        let results: Vec<Option<Vec<Point3<f64>>>> = iterator
            .map(|&attempt| {
                let coords = embed_attempt(&bounds, &field, &relaxation, config, attempt);
                (!has_clash(graph, &coords, config.clash_distance)).then_some(coords)
            })
            .collect();

        for coords in results {
            let Some(coords) = coords else {
                clashes += 1;
                continue;
            };
            if accepted.len() >= target {
                break;
            }
            let distinct = accepted
                .iter()
                .all(|kept| aligned_rmsd(kept, &coords).is_some_and(|r| r > config.rmsd_threshold));
            if distinct {
                accepted.push(coords);
            }
        }
        attempts = batch_end;
    }

    if accepted.is_empty() {
        return Err(EngineError::NoValidConformer { attempts });
    }
    info!(
        generated = accepted.len(),
        attempts,
        rejected_clashes = clashes,
        "Conformer generation finished."
    );
    Ok(accepted
        .into_iter()
        .map(|coords| Conformer::new(Geometry::for_graph(graph, coords)))
        .collect())
}

fn embed_attempt(
    bounds: &DistanceBounds,
    field: &ForceField,
    relaxation: &MinimizerSettings,
    config: &ConformerConfig,
    attempt: usize,
) -> Vec<Point3<f64>> {
    let seed = config
        .random_seed
        .wrapping_add((attempt as u64).wrapping_mul(SEED_STRIDE));
    let mut rng = StdRng::seed_from_u64(seed);
    let distances = bounds.sample(&mut rng);
    let coords = refine(bounds, &embed(&distances, &mut rng), REFINEMENT_STEPS);
    field.relax(&coords, relaxation)
}

fn trivial_conformer(graph: &MolecularGraph, config: &ConformerConfig) -> Conformer {
    let coords = if graph.atom_count() == 1 {
        vec![Point3::origin()]
    } else {
        let d = if graph.bond_between(0, 1).is_some() {
            bond_length_between(graph, 0, 1)
        } else {
            DistanceBounds::from_graph(graph, config.fragment_gap).lower[(0, 1)]
        };
        vec![Point3::origin(), Point3::new(d, 0.0, 0.0)]
    };
    debug!("Single conformer for a structure with at most two atoms.");
    Conformer::new(Geometry::for_graph(graph, coords))
}

/// Whether two atoms that are not bonded to each other sit closer than
/// `clash_distance`.
pub fn has_clash(graph: &MolecularGraph, coords: &[Point3<f64>], clash_distance: f64) -> bool {
    let points: Vec<[f64; 3]> = coords.iter().map(|p| [p.x, p.y, p.z]).collect();
    let tree: KdTree<f64, 3> = (&points).into();
    let radius2 = clash_distance * clash_distance;
    points.iter().enumerate().any(|(i, p)| {
        tree.within_unsorted::<SquaredEuclidean>(p, radius2)
            .into_iter()
            .map(|n| n.item as usize)
            .any(|j| j > i && graph.bond_between(i, j).is_none())
    })
}

/// Sorts evaluated conformers by energy and drops any within `window`
/// (Hartree) of one already kept. Conformers without an energy are kept
/// after the evaluated ones.
pub fn strip_by_energy(mut conformers: Vec<Conformer>, window: f64) -> Vec<Conformer> {
    conformers.sort_by(|a, b| match (a.energy(), b.energy()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    let mut kept: Vec<Conformer> = Vec::with_capacity(conformers.len());
    for conformer in conformers {
        let duplicate = conformer.energy().is_some_and(|e| {
            kept.iter()
                .filter_map(Conformer::energy)
                .any(|k| (e - k).abs() < window)
        });
        if !duplicate {
            kept.push(conformer);
        }
    }
    kept
}
