use super::evaluator::{Evaluation, EvaluationRequest};
use crate::core::models::element::Element;
use crate::core::models::geometry::Geometry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Coordinate quantum used for fingerprints, in Å.
pub const FINGERPRINT_RESOLUTION: f64 = 1e-6;

/// Hashable identity of a geometry: elements, charge, multiplicity and
/// coordinates rounded to [`FINGERPRINT_RESOLUTION`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeometryFingerprint {
    elements: Vec<Element>,
    charge: i32,
    multiplicity: u32,
    coords: Vec<i64>,
}

impl GeometryFingerprint {
    pub fn of(geometry: &Geometry) -> Self {
        let coords = geometry
            .coords()
            .iter()
            .flat_map(|p| [p.x, p.y, p.z])
            .map(|x| (x / FINGERPRINT_RESOLUTION).round() as i64)
            .collect();
        Self {
            elements: geometry.elements().to_vec(),
            charge: geometry.charge(),
            multiplicity: geometry.multiplicity(),
            coords,
        }
    }
}

/// Thread-safe memo of evaluator results keyed by geometry fingerprint.
#[derive(Debug, Default)]
pub struct EvaluationCache {
    entries: Mutex<HashMap<GeometryFingerprint, Evaluation>>,
    hits: AtomicUsize,
}

impl EvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached evaluation carrying at least the requested quantities.
    pub fn get(
        &self,
        fingerprint: &GeometryFingerprint,
        request: EvaluationRequest,
    ) -> Option<Evaluation> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let hit = entries
            .get(fingerprint)
            .filter(|e| e.satisfies(request))
            .cloned();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Stores `evaluation`, keeping any derivative the existing entry already has.
    pub fn insert(&self, fingerprint: GeometryFingerprint, evaluation: Evaluation) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(&fingerprint) {
            Some(existing) => {
                existing.energy = evaluation.energy;
                if evaluation.gradient.is_some() {
                    existing.gradient = evaluation.gradient;
                }
                if evaluation.hessian.is_some() {
                    existing.hessian = evaluation.hessian;
                }
            }
            None => {
                entries.insert(fingerprint, evaluation);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }
}
