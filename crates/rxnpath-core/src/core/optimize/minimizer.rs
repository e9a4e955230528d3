use nalgebra::DVector;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizerSettings {
    pub max_iterations: usize,
    /// Convergence threshold on the RMS gradient component.
    pub gradient_tolerance: f64,
    /// Largest allowed change of any single coordinate per step.
    pub max_step: f64,
    /// Number of correction pairs kept by L-BFGS.
    pub memory: usize,
}

impl Default for MinimizerSettings {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            gradient_tolerance: 1e-4,
            max_step: 0.2,
            memory: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: DVector<f64>,
    pub value: f64,
    pub gradient_norm: f64,
    pub iterations: usize,
    pub converged: bool,
}

const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 20;

/// L-BFGS with backtracking line search and a per-coordinate step cap.
///
/// `objective` returns the value and gradient at a point; its errors abort the
/// minimization and are returned unchanged.
pub fn minimize<E>(
    mut objective: impl FnMut(&DVector<f64>) -> Result<(f64, DVector<f64>), E>,
    x0: DVector<f64>,
    settings: &MinimizerSettings,
) -> Result<Minimum, E> {
    let n = x0.len().max(1) as f64;
    let mut x = x0;
    let (mut f, mut g) = objective(&x)?;
    let mut history: VecDeque<(DVector<f64>, DVector<f64>)> = VecDeque::new();

    for iteration in 0..settings.max_iterations {
        if g.norm() / n.sqrt() < settings.gradient_tolerance {
            return Ok(Minimum {
                gradient_norm: g.norm(),
                x,
                value: f,
                iterations: iteration,
                converged: true,
            });
        }

        let mut direction = -two_loop(&g, &history);
        if direction.dot(&g) >= 0.0 {
            history.clear();
            direction = -g.clone();
        }
        let largest = direction.amax();
        if largest > settings.max_step {
            direction *= settings.max_step / largest;
        }

        let slope = direction.dot(&g);
        let mut alpha = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let trial = &x + &direction * alpha;
            let (f_trial, g_trial) = objective(&trial)?;
            if f_trial.is_finite() && f_trial <= f + ARMIJO * alpha * slope {
                accepted = Some((trial, f_trial, g_trial));
                break;
            }
            alpha *= 0.5;
        }
        let Some((x_new, f_new, g_new)) = accepted else {
            return Ok(Minimum {
                gradient_norm: g.norm(),
                x,
                value: f,
                iterations: iteration,
                converged: false,
            });
        };

        let s = &x_new - &x;
        let y = &g_new - &g;
        if s.dot(&y) > 1e-12 {
            history.push_back((s, y));
            if history.len() > settings.memory {
                history.pop_front();
            }
        }
        x = x_new;
        f = f_new;
        g = g_new;
    }

    let converged = g.norm() / n.sqrt() < settings.gradient_tolerance;
    Ok(Minimum {
        gradient_norm: g.norm(),
        x,
        value: f,
        iterations: settings.max_iterations,
        converged,
    })
}

fn two_loop(g: &DVector<f64>, history: &VecDeque<(DVector<f64>, DVector<f64>)>) -> DVector<f64> {
    let mut q = g.clone();
    let mut alphas = Vec::with_capacity(history.len());
    for (s, y) in history.iter().rev() {
        let rho = 1.0 / y.dot(s);
        let a = rho * s.dot(&q);
        q -= y * a;
        alphas.push(a);
    }
    let gamma = history
        .back()
        .map_or(1.0, |(s, y)| s.dot(y) / y.dot(y));
    let mut r = q * gamma;
    for ((s, y), a) in history.iter().zip(alphas.iter().rev()) {
        let rho = 1.0 / y.dot(s);
        let b = rho * y.dot(&r);
        r += s * (a - b);
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn rosenbrock(x: &DVector<f64>) -> Result<(f64, DVector<f64>), Infallible> {
        let (a, b) = (x[0], x[1]);
        let f = (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2);
        let g = DVector::from_vec(vec![
            -2.0 * (1.0 - a) - 400.0 * a * (b - a * a),
            200.0 * (b - a * a),
        ]);
        Ok((f, g))
    }

    #[test]
    fn minimize_finds_quadratic_minimum() {
        let objective = |x: &DVector<f64>| -> Result<_, Infallible> {
            let d = x - DVector::from_vec(vec![1.0, -2.0, 0.5]);
            Ok((d.norm_squared(), d * 2.0))
        };
        let result = minimize(objective, DVector::zeros(3), &MinimizerSettings::default()).unwrap();
        assert!(result.converged);
        assert!((result.x[1] + 2.0).abs() < 1e-4);
    }

    #[test]
    fn minimize_solves_rosenbrock() {
        let settings = MinimizerSettings {
            max_iterations: 2000,
            gradient_tolerance: 1e-6,
            ..Default::default()
        };
        let result =
            minimize(rosenbrock, DVector::from_vec(vec![-1.2, 1.0]), &settings).unwrap();
        assert!(result.converged);
        assert!((result.x[0] - 1.0).abs() < 1e-3);
        assert!((result.x[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn minimize_propagates_objective_errors() {
        let objective = |_: &DVector<f64>| -> Result<(f64, DVector<f64>), &'static str> { Err("boom") };
        let err = minimize(objective, DVector::zeros(2), &MinimizerSettings::default()).unwrap_err();
        assert_eq!(err, "boom");
    }

    #[test]
    fn start_at_minimum_takes_no_steps() {
        let objective =
            |x: &DVector<f64>| -> Result<_, Infallible> { Ok((x.norm_squared(), x * 2.0)) };
        let result = minimize(objective, DVector::zeros(4), &MinimizerSettings::default()).unwrap();
        assert_eq!(result.iterations, 0);
        assert!(result.converged);
    }
}
