use super::{bond_scan, frequencies, path_refinement, saddle_optimization};
use crate::core::models::geometry::Geometry;
use crate::core::models::graph::MolecularGraph;
use crate::core::models::path::ReactionPath;
use crate::core::models::rearrangement::ActiveBond;
use crate::engine::context::SearchContext;
use crate::engine::error::EngineError;
use crate::engine::state::TransitionState;
use nalgebra::DVector;
use tracing::{info, instrument};

/// Unit vector stretching every active bond, used when the path gives no tangent.
fn active_stretch(geometry: &Geometry, active: &[ActiveBond]) -> DVector<f64> {
    let coords = geometry.coords();
    let mut direction = DVector::zeros(3 * coords.len());
    for bond in active {
        let axis = (coords[bond.i] - coords[bond.j]).normalize();
        let mut at_i = direction.fixed_rows_mut::<3>(3 * bond.i);
        at_i += axis;
        let mut at_j = direction.fixed_rows_mut::<3>(3 * bond.j);
        at_j -= axis;
    }
    let norm = direction.norm();
    if norm > 1e-12 { direction / norm } else { direction }
}

/// Locates and validates the transition state along `path`.
///
/// `graph` is the reactant-side graph the path starts from and `active` its
/// changing bonds. Paths shorter than three images are first expanded by a
/// bond-drive scan.
#[instrument(skip_all, name = "saddle_search_task", fields(images = path.len(), active = active.len()))]
pub fn run(
    path: ReactionPath,
    graph: &MolecularGraph,
    active: &[ActiveBond],
    ctx: &SearchContext,
) -> Result<TransitionState, EngineError> {
    // === Phase 1: Path preparation ===
    let path = if path.len() < 3 {
        bond_scan::scan(path.first(), graph, active, ctx)?
    } else {
        path
    };

    // === Phase 2: Band refinement ===
    let path = if ctx.config.refinement.enabled {
        path_refinement::refine(path, ctx)?
    } else {
        let mut path = path;
        path_refinement::evaluate_energies(&mut path, ctx)?;
        path
    };

    // === Phase 3: Peak selection ===
    let peak = path
        .peak_index()
        .ok_or_else(|| EngineError::WrongTransitionState {
            reason: "path has no interior energy maximum".to_string(),
            imaginary_frequencies: Vec::new(),
        })?;
    let start = &path.images()[peak].geometry;
    let guess = path
        .tangent_at(peak)
        .unwrap_or_else(|| active_stretch(start, active));
    ctx.reporter.status(format!("Optimizing saddle from image {peak}"));

    // === Phase 4: Saddle optimization ===
    let saddle = saddle_optimization::optimize(start, &guess, ctx)?;

    // === Phase 5: Vibrational validation ===
    let hessian = ctx.pool.hessian(&saddle.geometry, ctx.config.saddle.hessian_step)?;
    let validated = frequencies::validate(&saddle.geometry, &hessian, active, &ctx.config.validation)?;

    let state = TransitionState {
        geometry: saddle.geometry,
        energy: saddle.energy,
        gradient_norm: saddle.gradient_norm,
        frequencies: validated.frequencies,
        imaginary_mode: validated.mode,
        mode_projection: validated.projection,
        iterations: saddle.iterations,
    };
    info!(
        energy = state.energy,
        imaginary_frequency = state.imaginary_frequency(),
        projection = state.mode_projection,
        "Transition state validated."
    );
    Ok(state)
}
