use super::{Evaluation, EvaluationRequest, Evaluator, EvaluatorError, check_evaluation};
use crate::engine::cache::{EvaluationCache, GeometryFingerprint};
use crate::core::models::geometry::Geometry;
use nalgebra::{DMatrix, DVector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use tracing::trace;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Counting semaphore bounding in-flight evaluator calls.
#[derive(Debug)]
struct Slots {
    available: Mutex<usize>,
    freed: Condvar,
}

struct SlotGuard<'a> {
    slots: &'a Slots,
}

impl Slots {
    fn new(count: usize) -> Self {
        Self {
            available: Mutex::new(count.max(1)),
            freed: Condvar::new(),
        }
    }

    fn acquire(&self) -> SlotGuard<'_> {
        let mut available = self.available.lock().unwrap_or_else(PoisonError::into_inner);
        while *available == 0 {
            available = self
                .freed
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        SlotGuard { slots: self }
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut available = self
            .slots
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *available += 1;
        self.slots.freed.notify_one();
    }
}

/// Shared access point to an [`Evaluator`].
///
/// At most `slots` calls reach the backend at once; results are validated
/// and, when enabled, memoized by geometry fingerprint.
pub struct EvaluatorPool<'a> {
    evaluator: &'a dyn Evaluator,
    slots: Slots,
    cache: Option<EvaluationCache>,
    calls: AtomicUsize,
}

impl<'a> EvaluatorPool<'a> {
    pub fn new(evaluator: &'a dyn Evaluator, slots: usize, cache: bool) -> Self {
        Self {
            evaluator,
            slots: Slots::new(slots),
            cache: cache.then(EvaluationCache::new),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn evaluator_name(&self) -> &str {
        self.evaluator.name()
    }

    /// Number of calls that reached the backend.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> usize {
        self.cache.as_ref().map_or(0, EvaluationCache::hits)
    }

    pub fn evaluate(
        &self,
        geometry: &Geometry,
        request: EvaluationRequest,
    ) -> Result<Evaluation, EvaluatorError> {
        let fingerprint = self.cache.as_ref().map(|_| GeometryFingerprint::of(geometry));
        if let (Some(cache), Some(key)) = (&self.cache, &fingerprint) {
            if let Some(hit) = cache.get(key, request) {
                return Ok(hit);
            }
        }

        let evaluation = {
            let _slot = self.slots.acquire();
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.evaluator.evaluate(geometry, request)?
        };
        check_evaluation(&evaluation, geometry.atom_count(), request)?;

        if let (Some(cache), Some(key)) = (&self.cache, fingerprint) {
            cache.insert(key, evaluation.clone());
        }
        Ok(evaluation)
    }

    pub fn energy(&self, geometry: &Geometry) -> Result<f64, EvaluatorError> {
        Ok(self.evaluate(geometry, EvaluationRequest::ENERGY)?.energy)
    }

    pub fn energy_and_gradient(
        &self,
        geometry: &Geometry,
    ) -> Result<(f64, DVector<f64>), EvaluatorError> {
        let evaluation = self.evaluate(geometry, EvaluationRequest::GRADIENT)?;
        let gradient = evaluation
            .gradient
            .ok_or(EvaluatorError::MissingQuantity("gradient"))?;
        Ok((evaluation.energy, gradient))
    }

    /// Cartesian Hessian at `geometry`.
    ///
    /// Uses the backend's analytic Hessian when it has one, otherwise central
    /// differences of gradients with displacement `step` (Å).
    pub fn hessian(&self, geometry: &Geometry, step: f64) -> Result<DMatrix<f64>, EvaluatorError> {
        if self.evaluator.provides_hessian() {
            return self
                .evaluate(geometry, EvaluationRequest::HESSIAN)?
                .hessian
                .ok_or(EvaluatorError::MissingQuantity("hessian"));
        }

        let x0 = geometry.to_flat();
        let dim = x0.len();
        trace!(dimension = dim, step, "Computing finite-difference Hessian");

        let column = |k: usize| -> Result<DVector<f64>, EvaluatorError> {
            let mut plus = x0.clone();
            plus[k] += step;
            let mut minus = x0.clone();
            minus[k] -= step;
            let (_, g_plus) = self.energy_and_gradient(&geometry.with_flat(&plus))?;
            let (_, g_minus) = self.energy_and_gradient(&geometry.with_flat(&minus))?;
            Ok((g_plus - g_minus) / (2.0 * step))
        };

        #[cfg(not(feature = "parallel"))]
        let iterator = (0..dim).into_iter();
        #[cfg(feature = "parallel")]
        let iterator = (0..dim).into_par_iter();

        let columns = iterator.map(column).collect::<Result<Vec<_>, _>>()?;

        let mut hessian = DMatrix::from_columns(&columns);
        let transpose = hessian.transpose();
        hessian = (hessian + transpose) * 0.5;

        if let Some(cache) = &self.cache {
            let (energy, gradient) = self.energy_and_gradient(geometry)?;
            cache.insert(
                GeometryFingerprint::of(geometry),
                Evaluation {
                    energy,
                    gradient: Some(gradient),
                    hessian: Some(hessian.clone()),
                },
            );
        }
        Ok(hessian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use nalgebra::Point3;
    use std::time::Duration;

    /// E = sum over coordinates of k x^2 / 2, with an optional delay.
    struct Quadratic {
        k: f64,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Quadratic {
        fn new(k: f64) -> Self {
            Self {
                k,
                delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl Evaluator for Quadratic {
        fn name(&self) -> &str {
            "quadratic"
        }

        fn evaluate(
            &self,
            geometry: &Geometry,
            request: EvaluationRequest,
        ) -> Result<Evaluation, EvaluatorError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            let x = geometry.to_flat();
            let energy = 0.5 * self.k * x.norm_squared();
            let gradient = request.gradient.then(|| &x * self.k);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Evaluation {
                energy,
                gradient,
                hessian: None,
            })
        }
    }

    struct Broken;

    impl Evaluator for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn evaluate(&self, _: &Geometry, _: EvaluationRequest) -> Result<Evaluation, EvaluatorError> {
            Ok(Evaluation::energy_only(f64::INFINITY))
        }
    }

    fn atom_at(x: f64) -> Geometry {
        Geometry::new(vec![Element::H], vec![Point3::new(x, 0.5, -0.25)])
    }

    #[test]
    fn cached_pool_reuses_results_for_repeated_geometries() {
        let evaluator = Quadratic::new(2.0);
        let pool = EvaluatorPool::new(&evaluator, 2, true);
        let first = pool.energy(&atom_at(1.0)).unwrap();
        let second = pool.energy(&atom_at(1.0)).unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.calls(), 1);
        assert_eq!(pool.cache_hits(), 1);
    }

    #[test]
    fn uncached_pool_calls_backend_every_time() {
        let evaluator = Quadratic::new(2.0);
        let pool = EvaluatorPool::new(&evaluator, 2, false);
        pool.energy(&atom_at(1.0)).unwrap();
        pool.energy(&atom_at(1.0)).unwrap();
        assert_eq!(pool.calls(), 2);
    }

    #[test]
    fn non_finite_energy_is_rejected() {
        let pool = EvaluatorPool::new(&Broken, 1, true);
        assert_eq!(
            pool.energy(&atom_at(0.0)),
            Err(EvaluatorError::NonFinite("energy"))
        );
    }

    #[test]
    fn finite_difference_hessian_matches_analytic_curvature() {
        let evaluator = Quadratic::new(3.0);
        let pool = EvaluatorPool::new(&evaluator, 4, true);
        let h = pool.hessian(&atom_at(0.3), 1e-3).unwrap();
        let expected = DMatrix::<f64>::identity(3, 3) * 3.0;
        assert!((h - expected).abs().max() < 1e-6);
    }

    #[test]
    fn concurrent_calls_never_exceed_slot_count() {
        let mut evaluator = Quadratic::new(1.0);
        evaluator.delay = Duration::from_millis(5);
        let pool = EvaluatorPool::new(&evaluator, 2, false);
        std::thread::scope(|scope| {
            for i in 0..6 {
                let pool = &pool;
                scope.spawn(move || pool.energy(&atom_at(i as f64)).unwrap());
            }
        });
        assert_eq!(pool.calls(), 6);
        assert!(evaluator.peak.load(Ordering::SeqCst) <= 2);
    }
}
