use crate::core::forcefield::scoring::bond_length_between;
use crate::core::models::geometry::Geometry;
use crate::core::models::graph::MolecularGraph;
use crate::core::models::path::ReactionPath;
use crate::core::models::rearrangement::{ActiveBond, BondChange};
use crate::core::models::topology::{BondOrder, ideal_bond_length};
use crate::core::optimize::minimizer::{MinimizerSettings, minimize};
use crate::engine::context::SearchContext;
use crate::engine::error::EngineError;
use crate::engine::evaluator::EvaluatorError;
use nalgebra::DVector;
use tracing::{debug, info, instrument};

/// Final length of an active bond at the end of the drive.
pub(crate) fn drive_target(
    graph: &MolecularGraph,
    geometry: &Geometry,
    bond: &ActiveBond,
    breaking_stretch: f64,
) -> f64 {
    match bond.change {
        BondChange::Breaking => breaking_stretch * bond_length_between(graph, bond.i, bond.j),
        BondChange::Forming => {
            let elements = geometry.elements();
            ideal_bond_length(elements[bond.i], elements[bond.j], BondOrder::Single)
        }
    }
}

/// Expands a single geometry into a path by driving the active bonds to
/// their targets, relaxing every other coordinate on the evaluator surface
/// under harmonic restraints.
#[instrument(skip_all, name = "bond_scan_task", fields(active = active.len()))]
pub fn scan(
    start: &Geometry,
    graph: &MolecularGraph,
    active: &[ActiveBond],
    ctx: &SearchContext,
) -> Result<ReactionPath, EngineError> {
    let path_config = &ctx.config.path;
    let m = path_config.num_images.max(3);
    let k = path_config.scan_force_constant;
    let settings = MinimizerSettings {
        max_iterations: path_config.scan_relaxation_steps,
        gradient_tolerance: 1e-4,
        max_step: 0.1,
        ..MinimizerSettings::default()
    };

    let drives: Vec<(usize, usize, f64, f64)> = active
        .iter()
        .map(|b| {
            let target = drive_target(graph, start, b, path_config.breaking_stretch);
            (b.i, b.j, start.distance(b.i, b.j), target)
        })
        .collect();
    info!(images = m, "Driving active bonds from a single geometry.");

    let mut images = vec![start.clone()];
    for step in 1..m {
        ctx.cancel.check()?;
        let t = step as f64 / (m - 1) as f64;
        let previous = &images[step - 1];

        let objective = |x: &DVector<f64>| -> Result<(f64, DVector<f64>), EvaluatorError> {
            let geometry = previous.with_flat(x);
            let (mut energy, mut gradient) = ctx.pool.energy_and_gradient(&geometry)?;
            for &(i, j, from, to) in &drives {
                let target = from + t * (to - from);
                let delta = x.fixed_rows::<3>(3 * i) - x.fixed_rows::<3>(3 * j);
                let d = delta.norm();
                energy += k * (d - target).powi(2);
                if d > 1e-12 {
                    let g = delta * (2.0 * k * (d - target) / d);
                    let mut gi = gradient.fixed_rows_mut::<3>(3 * i);
                    gi += g;
                    let mut gj = gradient.fixed_rows_mut::<3>(3 * j);
                    gj -= g;
                }
            }
            Ok((energy, gradient))
        };
        let minimum = minimize(objective, previous.to_flat(), &settings)?;
        let geometry = previous.with_flat(&minimum.x);
        debug!(image = step, t, converged = minimum.converged, "Scan point relaxed.");
        images.push(geometry);
    }

    let mut path = ReactionPath::new(images)
        .ok_or_else(|| EngineError::Internal("scan produced inconsistent images".to_string()))?;
    for image in path.images_mut() {
        image.energy = Some(ctx.pool.energy(&image.geometry)?);
    }
    Ok(path)
}
