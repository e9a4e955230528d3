use crate::core::models::geometry::{Conformer, Geometry};
use crate::core::models::rearrangement::BondRearrangement;
use nalgebra::DVector;
use std::fmt;

/// A validated first-order saddle point.
#[derive(Debug, Clone)]
pub struct TransitionState {
    pub geometry: Geometry,
    /// Hartree.
    pub energy: f64,
    /// Ha/Å.
    pub gradient_norm: f64,
    /// Harmonic frequencies in cm⁻¹, ascending; imaginary ones are negative.
    pub frequencies: Vec<f64>,
    /// Cartesian displacement of the imaginary mode, unit norm.
    pub imaginary_mode: DVector<f64>,
    /// Overlap of the imaginary mode with the active bond stretches.
    pub mode_projection: f64,
    pub iterations: usize,
}

impl TransitionState {
    pub fn imaginary_frequency(&self) -> f64 {
        self.frequencies.first().copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NoValidConformer,
    NotConverged,
    WrongTransitionState,
    Evaluator,
    /// Cancelled because a better-ranked rearrangement succeeded first.
    Superseded,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureKind::NoValidConformer => "no valid conformer",
            FailureKind::NotConverged => "not converged",
            FailureKind::WrongTransitionState => "wrong transition state",
            FailureKind::Evaluator => "evaluator failure",
            FailureKind::Superseded => "superseded",
        };
        f.write_str(text)
    }
}

/// Why one rearrangement, or one conformer pairing of it, produced no TS.
#[derive(Debug, Clone)]
pub struct CandidateFailure {
    pub rearrangement: BondRearrangement,
    /// Reactant and product conformer indices, if the failure is pairing-specific.
    pub pairing: Option<(usize, usize)>,
    pub kind: FailureKind,
    pub reason: String,
}

/// Record of everything the assembler tried.
#[derive(Debug, Clone, Default)]
pub struct SearchTrace {
    pub rearrangements_attempted: usize,
    pub pairings_attempted: usize,
    pub failures: Vec<CandidateFailure>,
}

impl SearchTrace {
    pub fn record(&mut self, failure: CandidateFailure) {
        self.failures.push(failure);
    }

    pub fn merge(&mut self, other: SearchTrace) {
        self.rearrangements_attempted += other.rearrangements_attempted;
        self.pairings_attempted += other.pairings_attempted;
        self.failures.extend(other.failures);
    }
}

impl fmt::Display for SearchTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rearrangement(s) and {} pairing(s) attempted",
            self.rearrangements_attempted, self.pairings_attempted
        )?;
        for failure in &self.failures {
            write!(f, "; [{}]", failure.rearrangement)?;
            if let Some((r, p)) = failure.pairing {
                write!(f, " pairing {r}/{p}")?;
            }
            write!(f, " {}: {}", failure.kind, failure.reason)?;
        }
        Ok(())
    }
}

/// A located TS for one rearrangement, ordered by barrier height, then rank.
#[derive(Debug, Clone)]
pub struct CandidateSuccess {
    /// Position of the rearrangement in best-first order.
    pub rank: usize,
    pub rearrangement: BondRearrangement,
    pub reactant_index: usize,
    pub product_index: usize,
    pub reactant: Conformer,
    pub product: Conformer,
    pub transition_state: TransitionState,
}

impl PartialEq for CandidateSuccess {
    fn eq(&self, other: &Self) -> bool {
        self.transition_state.energy == other.transition_state.energy && self.rank == other.rank
    }
}
impl Eq for CandidateSuccess {}

impl PartialOrd for CandidateSuccess {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CandidateSuccess {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.transition_state
            .energy
            .total_cmp(&other.transition_state.energy)
            .then(self.rank.cmp(&other.rank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use crate::core::models::topology::AtomPair;
    use nalgebra::Point3;

    fn success(rank: usize, energy: f64) -> CandidateSuccess {
        CandidateSuccess {
            rank,
            rearrangement: BondRearrangement::empty(),
            reactant_index: 0,
            product_index: 0,
            reactant: Conformer::new(Geometry::new(vec![Element::H], vec![Point3::origin()])),
            product: Conformer::new(Geometry::new(vec![Element::H], vec![Point3::origin()])),
            transition_state: TransitionState {
                geometry: Geometry::new(vec![Element::H], vec![Point3::origin()]),
                energy,
                gradient_norm: 0.0,
                frequencies: vec![-500.0, 1200.0],
                imaginary_mode: DVector::zeros(3),
                mode_projection: 1.0,
                iterations: 1,
            },
        }
    }

    #[test]
    fn successes_order_by_energy_then_rank() {
        let mut all = vec![success(0, -1.0), success(1, -1.5), success(2, -1.0)];
        all.sort();
        let ranks: Vec<usize> = all.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 0, 2]);
    }

    #[test]
    fn imaginary_frequency_is_the_lowest() {
        assert_eq!(success(0, 0.0).transition_state.imaginary_frequency(), -500.0);
    }

    #[test]
    fn trace_display_lists_failures() {
        let mut trace = SearchTrace {
            rearrangements_attempted: 1,
            pairings_attempted: 1,
            failures: vec![],
        };
        trace.record(CandidateFailure {
            rearrangement: BondRearrangement::new(vec![AtomPair::new(0, 1)], vec![]).unwrap(),
            pairing: Some((0, 0)),
            kind: FailureKind::NotConverged,
            reason: "gradient stalled".to_string(),
        });
        let text = trace.to_string();
        assert!(text.starts_with("1 rearrangement(s) and 1 pairing(s) attempted"));
        assert!(text.contains("pairing 0/0 not converged: gradient stalled"));
    }
}
