use crate::core::models::geometry::Geometry;
use crate::core::utils::geometry::{complement_projector, rigid_body_basis};
use crate::engine::context::SearchContext;
use crate::engine::error::EngineError;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use tracing::{debug, info, instrument, trace};

const MIN_DENOMINATOR: f64 = 1e-8;
const MIN_PREDICTED_CHANGE: f64 = 1e-12;

/// A converged first-order saddle point, not yet validated.
#[derive(Debug, Clone)]
pub struct SaddlePoint {
    pub geometry: Geometry,
    pub energy: f64,
    pub gradient_norm: f64,
    pub iterations: usize,
}

/// Internal (non-rigid) eigenpairs of a projected Hessian, ascending.
struct Modes {
    values: Vec<f64>,
    vectors: Vec<DVector<f64>>,
}

fn internal_modes(hessian: &DMatrix<f64>, basis: &[DVector<f64>]) -> Modes {
    let projector = complement_projector(basis, hessian.nrows());
    let eigen = SymmetricEigen::new(&projector * hessian * &projector);
    let mut pairs: Vec<(f64, DVector<f64>)> = (0..hessian.nrows())
        .filter_map(|k| {
            let v = eigen.eigenvectors.column(k).into_owned();
            let rigid: f64 = basis.iter().map(|b| b.dot(&v).powi(2)).sum();
            (rigid < 0.5).then_some((eigen.eigenvalues[k], v))
        })
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (values, vectors) = pairs.into_iter().unzip();
    Modes { values, vectors }
}

/// Index of the mode overlapping most with `direction`.
fn followed_mode(modes: &Modes, direction: &DVector<f64>) -> usize {
    modes
        .vectors
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.dot(direction).abs().total_cmp(&b.1.dot(direction).abs()))
        .map_or(0, |(k, _)| k)
}

fn guarded(denominator: f64) -> f64 {
    if denominator.abs() < MIN_DENOMINATOR {
        MIN_DENOMINATOR.copysign(denominator)
    } else {
        denominator
    }
}

/// Partitioned rational-function step: uphill along mode `follow`,
/// downhill along every other mode.
fn prfo_step(modes: &Modes, gradient: &DVector<f64>, follow: usize) -> DVector<f64> {
    let forces: Vec<f64> = modes.vectors.iter().map(|v| v.dot(gradient)).collect();
    let (b_p, f_p) = (modes.values[follow], forces[follow]);
    let lambda_p = 0.5 * b_p + 0.5 * (b_p * b_p + 4.0 * f_p * f_p).sqrt();

    let others: Vec<usize> = (0..modes.values.len()).filter(|&k| k != follow).collect();
    let lambda_n = if others.is_empty() {
        0.0
    } else {
        let m = others.len();
        let mut augmented = DMatrix::zeros(m + 1, m + 1);
        for (row, &k) in others.iter().enumerate() {
            augmented[(row, row)] = modes.values[k];
            augmented[(row, m)] = forces[k];
            augmented[(m, row)] = forces[k];
        }
        SymmetricEigen::new(augmented).eigenvalues.min()
    };

    let mut step = &modes.vectors[follow] * (-f_p / guarded(b_p - lambda_p));
    for &k in &others {
        step += &modes.vectors[k] * (-forces[k] / guarded(modes.values[k] - lambda_n));
    }
    step
}

/// P-RFO search for a first-order saddle point starting at `start`.
///
/// `guess` is the reaction-coordinate direction (flat Cartesian); the
/// Hessian mode overlapping it most is maximized and, on later iterations,
/// the mode overlapping the previously followed one. Rigid translations
/// and rotations are projected out of the gradient and Hessian.
#[instrument(skip_all, name = "saddle_optimization_task", fields(atoms = start.atom_count()))]
pub fn optimize(
    start: &Geometry,
    guess: &DVector<f64>,
    ctx: &SearchContext,
) -> Result<SaddlePoint, EngineError> {
    let config = &ctx.config.saddle;
    let mut geometry = start.clone();
    let (mut energy, mut gradient) = ctx.pool.energy_and_gradient(&geometry)?;
    let mut hessian = ctx.pool.hessian(&geometry, config.hessian_step)?;
    let mut direction = guess.clone();
    let mut trust = config.trust_radius;
    let mut energy_trace = vec![energy];
    let mut gradient_norm = f64::INFINITY;

    for iteration in 0..config.max_iterations {
        ctx.cancel.check()?;

        let basis = rigid_body_basis(geometry.coords(), None);
        let projector = complement_projector(&basis, gradient.len());
        let projected_gradient = &projector * &gradient;
        gradient_norm = projected_gradient.norm();
        if gradient_norm < config.gradient_tolerance {
            info!(iterations = iteration, energy, gradient_norm, "Saddle point converged.");
            return Ok(SaddlePoint {
                geometry,
                energy,
                gradient_norm,
                iterations: iteration,
            });
        }

        let modes = internal_modes(&hessian, &basis);
        if modes.values.is_empty() {
            return Err(EngineError::Internal(
                "no internal coordinates left to optimize".to_string(),
            ));
        }
        let follow = followed_mode(&modes, &direction);
        direction = modes.vectors[follow].clone();

        let mut step = prfo_step(&modes, &projected_gradient, follow);
        let step_norm = step.norm();
        if step_norm > trust {
            step *= trust / step_norm;
        }
        let predicted = projected_gradient.dot(&step) + 0.5 * step.dot(&(&hessian * &step));

        let next = geometry.with_flat(&(geometry.to_flat() + &step));
        let (next_energy, next_gradient) = ctx.pool.energy_and_gradient(&next)?;

        if predicted.abs() > MIN_PREDICTED_CHANGE {
            let ratio = (next_energy - energy) / predicted;
            if (0.75..=1.25).contains(&ratio) {
                trust = (trust * 2.0).min(config.max_trust_radius);
            } else if !(0.25..=1.75).contains(&ratio) {
                trust = (trust * 0.5).max(config.min_trust_radius);
            }
            trace!(iteration, ratio, trust, "Trust radius updated.");
        }

        let recompute = config
            .recompute_hessian_every
            .is_some_and(|every| every > 0 && (iteration + 1) % every == 0);
        if recompute {
            hessian = ctx.pool.hessian(&next, config.hessian_step)?;
        } else {
            config
                .hessian_update
                .apply(&mut hessian, &step, &(&next_gradient - &gradient));
        }

        debug!(
            iteration,
            energy = next_energy,
            gradient_norm,
            eigenvalue = modes.values[follow],
            "P-RFO step taken."
        );
        geometry = next;
        energy = next_energy;
        gradient = next_gradient;
        energy_trace.push(energy);
    }

    let basis = rigid_body_basis(geometry.coords(), None);
    let final_norm = (complement_projector(&basis, gradient.len()) * &gradient).norm();
    if final_norm < config.gradient_tolerance {
        return Ok(SaddlePoint {
            geometry,
            energy,
            gradient_norm: final_norm,
            iterations: config.max_iterations,
        });
    }
    gradient_norm = gradient_norm.min(final_norm);
    Err(EngineError::NotConverged {
        iterations: config.max_iterations,
        gradient_norm,
        energy_trace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use crate::engine::cancel::CancellationToken;
    use crate::engine::config::SearchConfig;
    use crate::engine::evaluator::pool::EvaluatorPool;
    use crate::engine::evaluator::testing::CappedWell;
    use crate::engine::progress::ProgressReporter;
    use nalgebra::Point3;

    fn h2_at(d: f64) -> Geometry {
        Geometry::new(
            vec![Element::H, Element::H],
            vec![Point3::origin(), Point3::new(d, 0.0, 0.0)],
        )
    }

    fn stretch_direction() -> DVector<f64> {
        DVector::from_vec(vec![-1.0, 0.0, 0.0, 1.0, 0.0, 0.0]) / 2f64.sqrt()
    }

    #[test]
    fn prfo_step_climbs_followed_mode_and_descends_others() {
        let modes = Modes {
            values: vec![-1.0, 2.0],
            vectors: vec![
                DVector::from_vec(vec![1.0, 0.0]),
                DVector::from_vec(vec![0.0, 1.0]),
            ],
        };
        let gradient = DVector::from_vec(vec![-0.1, 0.2]);
        let step = prfo_step(&modes, &gradient, 0);
        assert!(step[0] < 0.0, "uphill along negative gradient component");
        assert!(step[1] < 0.0, "downhill against positive gradient component");
    }

    #[test]
    fn converges_to_the_top_of_a_double_well() {
        let well = CappedWell::hydrogen();
        let config = SearchConfig::builder().build().unwrap();
        let pool = EvaluatorPool::new(&well, 2, true);
        let reporter = ProgressReporter::new();
        let cancel = CancellationToken::new();
        let ctx = SearchContext::new(&config, &pool, &reporter, &cancel);

        let saddle = optimize(&h2_at(0.97), &stretch_direction(), &ctx).unwrap();
        assert!((saddle.geometry.distance(0, 1) - 0.93).abs() < 2e-3);
        assert!((saddle.energy - well.barrier()).abs() < 1e-6);
        assert!(saddle.gradient_norm < config.saddle.gradient_tolerance);
    }

    #[test]
    fn cancelled_search_stops_before_stepping() {
        let well = CappedWell::hydrogen();
        let config = SearchConfig::builder().build().unwrap();
        let pool = EvaluatorPool::new(&well, 1, false);
        let reporter = ProgressReporter::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = SearchContext::new(&config, &pool, &reporter, &cancel);

        let result = optimize(&h2_at(0.97), &stretch_direction(), &ctx);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
