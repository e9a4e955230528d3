use crate::core::models::path::ReactionPath;
use crate::engine::context::SearchContext;
use crate::engine::error::EngineError;
use crate::engine::evaluator::EvaluatorError;
use nalgebra::DVector;
use tracing::{debug, info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Iterations of plain NEB before the highest image starts climbing.
const CLIMB_AFTER: usize = 5;

/// Energies of every image, evaluated in parallel.
pub fn evaluate_energies(path: &mut ReactionPath, ctx: &SearchContext) -> Result<(), EngineError> {
    #[cfg(not(feature = "parallel"))]
    let iterator = path.images().iter();
    #[cfg(feature = "parallel")]
    let iterator = path.images().par_iter();

    let energies = iterator
        .map(|image| match image.energy {
            Some(e) => Ok(e),
            None => ctx.pool.energy(&image.geometry),
        })
        .collect::<Result<Vec<_>, EvaluatorError>>()?;
    for (image, energy) in path.images_mut().iter_mut().zip(energies) {
        image.energy = Some(energy);
    }
    Ok(())
}

/// Improved tangent at interior image `i`, pointing uphill in energy.
fn improved_tangent(x: &[DVector<f64>], e: &[f64], i: usize) -> DVector<f64> {
    let forward = &x[i + 1] - &x[i];
    let backward = &x[i] - &x[i - 1];
    let (e_prev, e_here, e_next) = (e[i - 1], e[i], e[i + 1]);

    let tangent = if e_next > e_here && e_here > e_prev {
        forward
    } else if e_next < e_here && e_here < e_prev {
        backward
    } else {
        let d_max = (e_next - e_here).abs().max((e_prev - e_here).abs());
        let d_min = (e_next - e_here).abs().min((e_prev - e_here).abs());
        if e_next > e_prev {
            forward * d_max + backward * d_min
        } else {
            forward * d_min + backward * d_max
        }
    };
    let norm = tangent.norm();
    if norm > 1e-12 { tangent / norm } else { tangent }
}

/// Nudged elastic band relaxation of the interior images.
///
/// Endpoints stay fixed. Stops after `max_iterations` or once the largest
/// image energy change stays below the threshold for `patience_iterations`
/// consecutive iterations. Every image carries an energy on return.
#[instrument(skip_all, name = "path_refinement_task", fields(images = path.len()))]
pub fn refine(mut path: ReactionPath, ctx: &SearchContext) -> Result<ReactionPath, EngineError> {
    let config = &ctx.config.refinement;
    let n = path.len();
    evaluate_energies(&mut path, ctx)?;
    if n < 3 {
        return Ok(path);
    }

    let mut x: Vec<DVector<f64>> = path.images().iter().map(|img| img.geometry.to_flat()).collect();
    let mut energies: Vec<f64> = path.energies().unwrap_or_default();
    let mut previous: Option<Vec<f64>> = None;
    let mut quiet_iterations = 0;
    let mut iterations = 0;

    for iteration in 0..config.max_iterations {
        ctx.cancel.check()?;
        iterations = iteration + 1;

        let interior: Vec<usize> = (1..n - 1).collect();
        #[cfg(not(feature = "parallel"))]
        let iterator = interior.iter();
        #[cfg(feature = "parallel")]
        let iterator = interior.par_iter();

        let evaluations = iterator
            .map(|&i| ctx.pool.energy_and_gradient(&path.images()[i].geometry.with_flat(&x[i])))
            .collect::<Result<Vec<_>, EvaluatorError>>()?;

        let mut gradients = vec![DVector::zeros(x[0].len()); n];
        for (&i, (e, g)) in interior.iter().zip(evaluations) {
            energies[i] = e;
            gradients[i] = g;
        }

        let max_change = previous.as_ref().map_or(f64::INFINITY, |prev| {
            (1..n - 1)
                .map(|i| (energies[i] - prev[i]).abs())
                .fold(0.0, f64::max)
        });
        if max_change < config.convergence.energy_threshold {
            quiet_iterations += 1;
            if quiet_iterations >= config.convergence.patience_iterations {
                debug!(iteration, "Band energies converged.");
                break;
            }
        } else {
            quiet_iterations = 0;
        }
        previous = Some(energies.clone());

        let climber = (config.climbing_image && iteration >= CLIMB_AFTER)
            .then(|| {
                (1..n - 1).max_by(|a, b| energies[*a].total_cmp(&energies[*b]))
            })
            .flatten();

        let mut updated = x.clone();
        for i in 1..n - 1 {
            let tangent = improved_tangent(&x, &energies, i);
            let g = &gradients[i];
            let along = g.dot(&tangent);
            let force = if climber == Some(i) {
                -g + &tangent * (2.0 * along)
            } else {
                let perpendicular = -(g - &tangent * along);
                let spring = config.spring_constant
                    * ((&x[i + 1] - &x[i]).norm() - (&x[i] - &x[i - 1]).norm());
                perpendicular + &tangent * spring
            };

            let mut step = force * config.step_size;
            let largest = (0..step.len() / 3)
                .map(|a| step.fixed_rows::<3>(3 * a).norm())
                .fold(0.0, f64::max);
            if largest > config.max_displacement {
                step *= config.max_displacement / largest;
            }
            updated[i] = &x[i] + step;
        }
        x = updated;
    }

    for (i, image) in path.images_mut().iter_mut().enumerate().take(n - 1).skip(1) {
        image.geometry = image.geometry.with_flat(&x[i]);
        image.energy = None;
    }
    evaluate_energies(&mut path, ctx)?;
    info!(
        iterations,
        peak = ?path.peak_index(),
        "Band refinement finished."
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tangent_points_towards_higher_neighbour() {
        let x = vec![
            DVector::from_vec(vec![0.0]),
            DVector::from_vec(vec![1.0]),
            DVector::from_vec(vec![3.0]),
        ];
        let uphill = improved_tangent(&x, &[0.0, 1.0, 2.0], 1);
        assert!((uphill[0] - 1.0).abs() < 1e-12);
        let downhill = improved_tangent(&x, &[2.0, 1.0, 0.0], 1);
        assert!((downhill[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tangent_at_a_maximum_blends_both_sides() {
        let x = vec![
            DVector::from_vec(vec![0.0, 0.0]),
            DVector::from_vec(vec![1.0, 0.0]),
            DVector::from_vec(vec![1.0, 1.0]),
        ];
        let t = improved_tangent(&x, &[0.0, 2.0, 1.0], 1);
        assert!((t.norm() - 1.0).abs() < 1e-12);
        assert!(t[1] > t[0]);
    }
}
