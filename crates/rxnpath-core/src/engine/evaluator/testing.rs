use super::{Evaluation, EvaluationRequest, Evaluator, EvaluatorError};
use crate::core::models::geometry::Geometry;
use nalgebra::DVector;

/// Capped double well in the distance between atoms 0 and 1:
/// `A (r - a)^2 (r - b)^2` for `r < b`, zero beyond.
///
/// The barrier sits at `(a + b) / 2`, the dissociated plateau at `r >= b`.
pub(crate) struct CappedWell {
    pub a: f64,
    pub b: f64,
    pub height: f64,
}

impl CappedWell {
    pub(crate) fn hydrogen() -> Self {
        Self {
            a: 0.62,
            b: 1.24,
            height: 2.0,
        }
    }

    pub(crate) fn barrier(&self) -> f64 {
        self.height * ((self.b - self.a) / 2.0).powi(4)
    }

    fn profile(&self, r: f64) -> (f64, f64) {
        if r >= self.b {
            return (0.0, 0.0);
        }
        let (p, q) = (r - self.a, r - self.b);
        (
            self.height * p * p * q * q,
            2.0 * self.height * p * q * (p + q),
        )
    }
}

impl Evaluator for CappedWell {
    fn name(&self) -> &str {
        "capped-well"
    }

    fn evaluate(
        &self,
        geometry: &Geometry,
        request: EvaluationRequest,
    ) -> Result<Evaluation, EvaluatorError> {
        let coords = geometry.coords();
        let delta = coords[0] - coords[1];
        let r = delta.norm();
        let (energy, slope) = self.profile(r);
        if !request.gradient {
            return Ok(Evaluation::energy_only(energy));
        }
        let mut gradient = DVector::zeros(3 * coords.len());
        if r > 1e-12 {
            let g = delta * (slope / r);
            gradient.fixed_rows_mut::<3>(0).copy_from(&g);
            gradient.fixed_rows_mut::<3>(3).copy_from(&(-g));
        }
        Ok(Evaluation::with_gradient(energy, gradient))
    }
}
