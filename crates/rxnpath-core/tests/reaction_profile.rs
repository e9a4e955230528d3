use nalgebra::DVector;
use rxnpath::core::models::atom::Atom;
use rxnpath::core::models::element::Element;
use rxnpath::core::models::geometry::Geometry;
use rxnpath::core::models::graph::{Connectivity, MolecularGraph};
use rxnpath::core::models::rearrangement::BondRearrangement;
use rxnpath::core::models::topology::{AtomPair, Bond};
use rxnpath::engine::cancel::CancellationToken;
use rxnpath::engine::config::{EnumerationConfig, EvaluatorPolicy, SearchConfig, SearchPolicy};
use rxnpath::engine::error::EngineError;
use rxnpath::engine::evaluator::model::{ModelEvaluator, ModelParams};
use rxnpath::engine::evaluator::{Evaluation, EvaluationRequest, Evaluator, EvaluatorError};
use rxnpath::engine::progress::{Progress, ProgressReporter};
use rxnpath::engine::state::FailureKind;
use rxnpath::workflows::explore;
use rxnpath::workflows::profile;
use rxnpath::workflows::reaction::ReactionType;
use std::sync::Mutex;

/// Capped double well in the H–H distance: barrier at 0.93 Å, flat beyond 1.24 Å.
struct CappedWell;

const WELL_A: f64 = 0.62;
const WELL_B: f64 = 1.24;
const WELL_HEIGHT: f64 = 2.0;

fn barrier(height: f64) -> f64 {
    height * ((WELL_B - WELL_A) / 2.0).powi(4)
}

/// Energy and radial slope of a well of `height` at distance `r`.
fn well(r: f64, height: f64) -> (f64, f64) {
    if r >= WELL_B {
        return (0.0, 0.0);
    }
    let (p, q) = (r - WELL_A, r - WELL_B);
    (height * p * p * q * q, 2.0 * height * p * q * (p + q))
}

/// Sum of capped wells, one per `(i, j, height)` atom pair.
fn wells(
    geometry: &Geometry,
    request: EvaluationRequest,
    pairs: &[(usize, usize, f64)],
) -> Evaluation {
    let coords = geometry.coords();
    let mut energy = 0.0;
    let mut gradient = DVector::zeros(3 * coords.len());
    for &(i, j, height) in pairs {
        let delta = coords[i] - coords[j];
        let r = delta.norm();
        let (e, slope) = well(r, height);
        energy += e;
        if r > 1e-12 {
            let g = delta * (slope / r);
            let gi = gradient.fixed_rows::<3>(3 * i) + g;
            let gj = gradient.fixed_rows::<3>(3 * j) - g;
            gradient.fixed_rows_mut::<3>(3 * i).copy_from(&gi);
            gradient.fixed_rows_mut::<3>(3 * j).copy_from(&gj);
        }
    }
    if request.gradient {
        Evaluation::with_gradient(energy, gradient)
    } else {
        Evaluation::energy_only(energy)
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
        Ok(wells(geometry, request, &[(0, 1, WELL_HEIGHT)]))
    }
}

const SHALLOW: f64 = 1.0;
const DEEP: f64 = 2.0;

/// Two independent H2 wells: a shallow one on H0–H1 and a deep one on H2–H3.
struct TwoWells;

impl Evaluator for TwoWells {
    fn name(&self) -> &str {
        "two-wells"
    }

    fn evaluate(
        &self,
        geometry: &Geometry,
        request: EvaluationRequest,
    ) -> Result<Evaluation, EvaluatorError> {
        Ok(wells(geometry, request, &[(0, 1, SHALLOW), (2, 3, DEEP)]))
    }
}

/// Zero everywhere.
struct Flat;

impl Evaluator for Flat {
    fn name(&self) -> &str {
        "flat"
    }

    fn evaluate(
        &self,
        geometry: &Geometry,
        request: EvaluationRequest,
    ) -> Result<Evaluation, EvaluatorError> {
        let gradient = request
            .gradient
            .then(|| DVector::zeros(3 * geometry.atom_count()));
        Ok(Evaluation {
            energy: 0.0,
            gradient,
            hessian: None,
        })
    }
}

/// Fails on every call.
struct Broken;

impl Evaluator for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn evaluate(&self, _: &Geometry, _: EvaluationRequest) -> Result<Evaluation, EvaluatorError> {
        Err(EvaluatorError::Backend("SCF did not converge".to_string()))
    }
}

fn hydrogen(bonded: bool) -> MolecularGraph {
    let bonds = if bonded { vec![Bond::single(0, 1)] } else { vec![] };
    MolecularGraph::new(
        vec![Atom::new(0, Element::H), Atom::new(1, Element::H)],
        bonds,
        Connectivity::Complex,
    )
    .unwrap()
}

fn ethane_atoms() -> Vec<Atom> {
    let mut atoms = vec![Atom::new(0, Element::C), Atom::new(1, Element::C)];
    atoms.extend((2..8).map(|i| Atom::new(i, Element::H)));
    atoms
}

fn ethane() -> MolecularGraph {
    let mut bonds = vec![Bond::single(0, 1)];
    bonds.extend((2..5).map(|h| Bond::single(0, h)));
    bonds.extend((5..8).map(|h| Bond::single(1, h)));
    MolecularGraph::new(ethane_atoms(), bonds, Connectivity::SingleMolecule).unwrap()
}

fn shifted_ethane() -> MolecularGraph {
    let mut bonds = vec![Bond::single(0, 1), Bond::single(0, 3), Bond::single(0, 4)];
    bonds.extend([2, 5, 6, 7].into_iter().map(|h| Bond::single(1, h)));
    MolecularGraph::new(ethane_atoms(), bonds, Connectivity::SingleMolecule).unwrap()
}

fn config() -> SearchConfig {
    SearchConfig::builder().build().unwrap()
}

#[test]
fn hydrogen_shift_is_found_as_the_smallest_rearrangement() {
    let found = explore::enumerate(&ethane(), &shifted_ethane(), &EnumerationConfig::default(), 1)
        .unwrap();
    let expected =
        BondRearrangement::new(vec![AtomPair::new(0usize, 2usize)], vec![AtomPair::new(1usize, 2usize)])
            .unwrap();
    assert_eq!(found, vec![expected]);
}

#[test]
fn enumeration_is_deterministic() {
    let first = explore::enumerate(&ethane(), &shifted_ethane(), &EnumerationConfig::default(), 10)
        .unwrap();
    let second = explore::enumerate(&ethane(), &shifted_ethane(), &EnumerationConfig::default(), 10)
        .unwrap();
    assert_eq!(first, second);
    assert!(first.windows(2).all(|w| w[0].size() <= w[1].size()));
}

#[test]
fn identical_graphs_short_circuit_without_transition_state() {
    let found =
        explore::enumerate(&ethane(), &ethane(), &EnumerationConfig::default(), 10).unwrap();
    assert_eq!(found, vec![BondRearrangement::empty()]);

    let profile = profile::run(
        &ethane(),
        &ethane(),
        &Flat,
        &config(),
        &ProgressReporter::new(),
        &CancellationToken::new(),
    )
    .unwrap();
    assert!(profile.rearrangement.is_empty());
    assert!(profile.transition_state.is_none());
    assert_eq!(profile.delta_e(), Some(0.0));
    assert_eq!(profile.delta_e_ddagger(), None);
    assert_eq!(profile.reaction_type, ReactionType::Rearrangement);
}

#[test]
fn homolysis_profile_has_barrier_above_both_endpoints() {
    let phases = Mutex::new(Vec::new());
    let reporter = ProgressReporter::with_callback(Box::new(|event: Progress| {
        if let Progress::PhaseStart { name } = event {
            phases.lock().unwrap().push(name);
        }
    }));

    let profile = profile::run(
        &hydrogen(true),
        &hydrogen(false),
        &CappedWell,
        &config(),
        &reporter,
        &CancellationToken::new(),
    )
    .unwrap();

    let ts = profile.transition_state.as_ref().unwrap();
    assert!((ts.geometry.distance(0, 1) - 0.93).abs() < 2e-3);
    assert!(ts.energy > profile.reactant.energy().unwrap());
    assert!(ts.energy > profile.product.energy().unwrap());
    assert!(ts.imaginary_frequency() < -50.0);
    assert_eq!(ts.frequencies.iter().filter(|f| **f < -50.0).count(), 1);

    let barrier = profile.delta_e_ddagger().unwrap();
    assert!((barrier - self::barrier(WELL_HEIGHT) * 627.509).abs() < 0.01);
    assert_eq!(profile.reaction_type, ReactionType::Dissociation);
    assert_eq!(profile.frames().len(), 3);
    assert_eq!(
        phases.lock().unwrap().first().copied(),
        Some("Preparation")
    );
}

#[test]
fn bond_forming_direction_is_reversed_back() {
    let profile = profile::run(
        &hydrogen(false),
        &hydrogen(true),
        &CappedWell,
        &config(),
        &ProgressReporter::new(),
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(profile.reaction_type, ReactionType::Addition);
    assert!(profile.rearrangement.breaking().is_empty());
    assert_eq!(profile.rearrangement.forming().len(), 1);
    assert!(profile.reactant.geometry().distance(0, 1) > profile.product.geometry().distance(0, 1));
}

#[test]
fn failing_evaluator_with_retries_ends_in_no_profile() {
    let config = SearchConfig::builder()
        .evaluator_policy(EvaluatorPolicy::Retry {
            attempts: 2,
            perturbation: 0.05,
        })
        .build()
        .unwrap();
    let result = profile::run(
        &hydrogen(true),
        &hydrogen(false),
        &Broken,
        &config,
        &ProgressReporter::new(),
        &CancellationToken::new(),
    );
    let trace = match result {
        Err(EngineError::NoProfileFound { trace }) => trace,
        other => panic!("expected NoProfileFound, got {other:?}"),
    };
    assert_eq!(trace.rearrangements_attempted, 1);
    assert_eq!(trace.failures.len(), 1);
    assert_eq!(trace.failures[0].kind, FailureKind::Evaluator);
}

#[test]
fn failing_evaluator_fails_fast_by_default() {
    let result = profile::run(
        &hydrogen(true),
        &hydrogen(false),
        &Broken,
        &config(),
        &ProgressReporter::new(),
        &CancellationToken::new(),
    );
    assert!(matches!(result, Err(EngineError::EvaluatorFailure { .. })));
}

fn two_hydrogen_molecules(bonds: Vec<Bond>) -> MolecularGraph {
    MolecularGraph::new(
        (0..4usize).map(|i| Atom::new(i, Element::H)).collect(),
        bonds,
        Connectivity::Complex,
    )
    .unwrap()
}

/// H2 + H2 -> H2 + 2 H with either molecule allowed to break: the deep
/// H2–H3 bond is the symmetric difference and ranks first, the shallow
/// H0–H1 bond second.
fn competing_dissociations(policy: SearchPolicy) -> profile::ReactionProfile {
    let reactant = two_hydrogen_molecules(vec![Bond::single(0, 1), Bond::single(2, 3)]);
    let product = two_hydrogen_molecules(vec![Bond::single(0, 1)]);
    let config = SearchConfig::builder()
        .enumeration(EnumerationConfig {
            collapse_equivalent: false,
            ..EnumerationConfig::default()
        })
        .policy(policy)
        .parallel_rearrangements(2)
        .build()
        .unwrap();
    profile::run(
        &reactant,
        &product,
        &TwoWells,
        &config,
        &ProgressReporter::new(),
        &CancellationToken::new(),
    )
    .unwrap()
}

fn broken_pair(profile: &profile::ReactionProfile) -> AtomPair {
    assert!(profile.rearrangement.forming().is_empty());
    assert_eq!(profile.rearrangement.breaking().len(), 1);
    profile.rearrangement.breaking()[0]
}

#[test]
fn first_success_in_parallel_batches_keeps_the_best_ranked_rearrangement() {
    let profile = competing_dissociations(SearchPolicy::FirstSuccess);

    assert_eq!(broken_pair(&profile), AtomPair::new(2usize, 3usize));
    let barrier = profile.delta_e_ddagger().unwrap();
    assert!((barrier - self::barrier(DEEP) * 627.509).abs() < 0.05);
    assert_eq!(profile.trace.rearrangements_attempted, 2);
}

#[test]
fn exhaustive_search_keeps_the_lowest_barrier() {
    let profile = competing_dissociations(SearchPolicy::Exhaustive {
        max_rearrangements: 2,
    });

    assert_eq!(broken_pair(&profile), AtomPair::new(0usize, 1usize));
    let barrier = profile.delta_e_ddagger().unwrap();
    assert!((barrier - self::barrier(SHALLOW) * 627.509).abs() < 0.05);
    assert_eq!(profile.trace.rearrangements_attempted, 2);
    assert!(profile.trace.failures.is_empty());
}

#[test]
fn ethane_hydrogen_shift_converges_to_a_first_order_saddle() {
    let (reactant, product) = (ethane(), shifted_ethane());
    let evaluator = ModelEvaluator::new(&reactant, &product, &ModelParams::default()).unwrap();
    let config = config();
    let profile = profile::run(
        &reactant,
        &product,
        &evaluator,
        &config,
        &ProgressReporter::new(),
        &CancellationToken::new(),
    )
    .unwrap();

    let ts = profile.transition_state.as_ref().unwrap();
    let threshold = config.validation.imaginary_threshold;
    assert_eq!(ts.frequencies.iter().filter(|f| **f < -threshold).count(), 1);
    assert!(ts.gradient_norm < config.saddle.gradient_tolerance);
    assert!(ts.energy > profile.reactant.energy().unwrap());
    assert!(ts.energy > profile.product.energy().unwrap());
    assert_eq!(profile.reaction_type, ReactionType::Rearrangement);
    assert_eq!(profile.rearrangement.size(), 2);
}

#[test]
fn unbalanced_reaction_is_rejected() {
    let three = MolecularGraph::new(
        (0..3usize).map(|i| Atom::new(i, Element::H)).collect(),
        vec![Bond::single(0, 1)],
        Connectivity::Complex,
    )
    .unwrap();
    let result = profile::run(
        &hydrogen(true),
        &three,
        &Flat,
        &config(),
        &ProgressReporter::new(),
        &CancellationToken::new(),
    );
    assert!(matches!(result, Err(EngineError::UnbalancedReaction(_))));
}

#[test]
fn cancelled_search_reports_cancellation() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = profile::run(
        &hydrogen(true),
        &hydrogen(false),
        &CappedWell,
        &config(),
        &ProgressReporter::new(),
        &cancel,
    );
    assert!(matches!(result, Err(EngineError::Cancelled)));
}
