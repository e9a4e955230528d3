use crate::core::forcefield::params::ForceFieldParams;
use crate::core::optimize::hessian::HessianUpdate;
use thiserror::Error;

/// Hartree per kJ/mol.
const HARTREE_PER_KJ_MOL: f64 = 1.0 / 2625.4996;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

/// Largest rearrangement size the enumerator will search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDepth {
    Bounded(usize),
    /// Search up to the size of the symmetric difference.
    Unbounded,
}

impl Default for SearchDepth {
    fn default() -> Self {
        SearchDepth::Bounded(3)
    }
}

/// Ordering of equal-size rearrangements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalityScore {
    /// Sum of pairwise graph distances between the changed bonds.
    #[default]
    GraphDistance,
    /// Lexical order only.
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumerationConfig {
    pub depth: SearchDepth,
    pub locality: LocalityScore,
    pub collapse_equivalent: bool,
    /// Combinations examined per rearrangement size before the size is abandoned.
    pub max_combinations: usize,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            depth: SearchDepth::default(),
            locality: LocalityScore::default(),
            collapse_equivalent: true,
            max_combinations: 2_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConformerConfig {
    pub num_conformers: usize,
    /// Embedding attempts before giving up.
    pub max_attempts: usize,
    /// Conformers closer than this aligned RMSD (Å) are duplicates.
    pub rmsd_threshold: f64,
    /// Minimum distance (Å) between atoms that are not bonded.
    pub clash_distance: f64,
    pub random_seed: u64,
    pub relaxation_steps: usize,
    /// Conformers within this energy (Hartree) of a kept one are stripped.
    pub energy_window: f64,
    /// Minimum gap (Å) between fragments of a complex, beyond contact.
    pub fragment_gap: f64,
}

impl Default for ConformerConfig {
    fn default() -> Self {
        Self {
            num_conformers: 5,
            max_attempts: 40,
            rmsd_threshold: 0.3,
            clash_distance: 0.9,
            random_seed: 42,
            relaxation_steps: 300,
            energy_window: HARTREE_PER_KJ_MOL,
            fragment_gap: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathConfig {
    pub num_images: usize,
    /// Breaking bonds are driven to this multiple of their ideal length.
    pub breaking_stretch: f64,
    pub restraint_steps: usize,
    /// Force constant (Ha/Å²) of the bond-drive restraints.
    pub scan_force_constant: f64,
    pub scan_relaxation_steps: usize,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            num_images: 8,
            breaking_stretch: 2.0,
            restraint_steps: 300,
            scan_force_constant: 2.0,
            scan_relaxation_steps: 40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceConfig {
    pub energy_threshold: f64,
    pub patience_iterations: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefinementConfig {
    pub enabled: bool,
    pub max_iterations: usize,
    /// Spring constant (Ha/Å²) between neighbouring images.
    pub spring_constant: f64,
    /// Steepest-descent step (Å²/Ha).
    pub step_size: f64,
    /// Largest displacement (Å) of any atom per iteration.
    pub max_displacement: f64,
    pub climbing_image: bool,
    pub convergence: ConvergenceConfig,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_iterations: 60,
            spring_constant: 0.1,
            step_size: 0.5,
            max_displacement: 0.05,
            climbing_image: true,
            convergence: ConvergenceConfig {
                energy_threshold: 1e-5,
                patience_iterations: 3,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaddleConfig {
    pub max_iterations: usize,
    /// Convergence threshold on the gradient norm (Ha/Å).
    pub gradient_tolerance: f64,
    pub trust_radius: f64,
    pub min_trust_radius: f64,
    pub max_trust_radius: f64,
    /// Displacement (Å) for finite-difference Hessians.
    pub hessian_step: f64,
    pub hessian_update: HessianUpdate,
    /// Recompute the full Hessian every this many iterations.
    pub recompute_hessian_every: Option<usize>,
}

impl Default for SaddleConfig {
    fn default() -> Self {
        Self {
            max_iterations: 80,
            gradient_tolerance: 1e-3,
            trust_radius: 0.1,
            min_trust_radius: 0.01,
            max_trust_radius: 0.3,
            hessian_step: 5e-3,
            hessian_update: HessianUpdate::Bofill,
            recompute_hessian_every: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    /// Imaginary frequencies (cm⁻¹) smaller than this in magnitude are ignored.
    pub imaginary_threshold: f64,
    pub min_mode_projection: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            imaginary_threshold: 50.0,
            min_mode_projection: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchPolicy {
    /// Stop at the first validated transition state in best-first order.
    #[default]
    FirstSuccess,
    /// Try up to `max_rearrangements` and keep the lowest-energy transition state.
    Exhaustive { max_rearrangements: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EvaluatorPolicy {
    /// Any evaluator failure aborts the search.
    #[default]
    FailFast,
    /// Retry from geometries perturbed by up to `perturbation` Å, then record
    /// the failure and move on.
    Retry { attempts: usize, perturbation: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub enumeration: EnumerationConfig,
    pub conformers: ConformerConfig,
    pub path: PathConfig,
    pub refinement: RefinementConfig,
    pub saddle: SaddleConfig,
    pub validation: ValidationConfig,
    pub forcefield: ForceFieldParams,
    pub policy: SearchPolicy,
    pub evaluator_policy: EvaluatorPolicy,
    /// Reactant/product conformer pairings tried per rearrangement.
    pub conformer_pairs: usize,
    pub evaluator_slots: usize,
    pub cache_evaluations: bool,
    pub parallel_rearrangements: usize,
}

impl SearchConfig {
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::new()
    }
}

#[derive(Default)]
pub struct SearchConfigBuilder {
    enumeration: Option<EnumerationConfig>,
    conformers: Option<ConformerConfig>,
    path: Option<PathConfig>,
    refinement: Option<RefinementConfig>,
    saddle: Option<SaddleConfig>,
    validation: Option<ValidationConfig>,
    forcefield: Option<ForceFieldParams>,
    policy: Option<SearchPolicy>,
    evaluator_policy: Option<EvaluatorPolicy>,
    conformer_pairs: Option<usize>,
    evaluator_slots: Option<usize>,
    cache_evaluations: Option<bool>,
    parallel_rearrangements: Option<usize>,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enumeration(mut self, config: EnumerationConfig) -> Self {
        self.enumeration = Some(config);
        self
    }
    pub fn conformers(mut self, config: ConformerConfig) -> Self {
        self.conformers = Some(config);
        self
    }
    pub fn path(mut self, config: PathConfig) -> Self {
        self.path = Some(config);
        self
    }
    pub fn refinement(mut self, config: RefinementConfig) -> Self {
        self.refinement = Some(config);
        self
    }
    pub fn saddle(mut self, config: SaddleConfig) -> Self {
        self.saddle = Some(config);
        self
    }
    pub fn validation(mut self, config: ValidationConfig) -> Self {
        self.validation = Some(config);
        self
    }
    pub fn forcefield(mut self, params: ForceFieldParams) -> Self {
        self.forcefield = Some(params);
        self
    }
    pub fn policy(mut self, policy: SearchPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
    pub fn evaluator_policy(mut self, policy: EvaluatorPolicy) -> Self {
        self.evaluator_policy = Some(policy);
        self
    }
    pub fn conformer_pairs(mut self, n: usize) -> Self {
        self.conformer_pairs = Some(n);
        self
    }
    pub fn evaluator_slots(mut self, n: usize) -> Self {
        self.evaluator_slots = Some(n);
        self
    }
    pub fn cache_evaluations(mut self, enabled: bool) -> Self {
        self.cache_evaluations = Some(enabled);
        self
    }
    pub fn parallel_rearrangements(mut self, n: usize) -> Self {
        self.parallel_rearrangements = Some(n);
        self
    }

    pub fn build(self) -> Result<SearchConfig, ConfigError> {
        let config = SearchConfig {
            enumeration: self.enumeration.unwrap_or_default(),
            conformers: self.conformers.unwrap_or_default(),
            path: self.path.unwrap_or_default(),
            refinement: self.refinement.unwrap_or_default(),
            saddle: self.saddle.unwrap_or_default(),
            validation: self.validation.unwrap_or_default(),
            forcefield: self.forcefield.unwrap_or_default(),
            policy: self.policy.unwrap_or_default(),
            evaluator_policy: self.evaluator_policy.unwrap_or_default(),
            conformer_pairs: self.conformer_pairs.unwrap_or(1),
            evaluator_slots: self.evaluator_slots.unwrap_or(4),
            cache_evaluations: self.cache_evaluations.unwrap_or(true),
            parallel_rearrangements: self.parallel_rearrangements.unwrap_or(1),
        };
        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &SearchConfig) -> Result<(), ConfigError> {
    let positive = |name: &'static str, value: f64| {
        if value > 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(invalid(name, format!("must be positive, got {value}")))
        }
    };
    let at_least_one = |name: &'static str, value: usize| {
        if value >= 1 {
            Ok(())
        } else {
            Err(invalid(name, "must be at least 1"))
        }
    };

    at_least_one("num_conformers", config.conformers.num_conformers)?;
    at_least_one("max_attempts", config.conformers.max_attempts)?;
    positive("clash_distance", config.conformers.clash_distance)?;
    if config.conformers.rmsd_threshold < 0.0 {
        return Err(invalid("rmsd_threshold", "must not be negative"));
    }
    if config.conformers.energy_window < 0.0 {
        return Err(invalid("energy_window", "must not be negative"));
    }

    if config.path.num_images < 3 {
        return Err(invalid(
            "num_images",
            format!("a path needs at least 3 images, got {}", config.path.num_images),
        ));
    }
    if config.path.breaking_stretch <= 1.0 {
        return Err(invalid("breaking_stretch", "must exceed 1.0"));
    }
    positive("scan_force_constant", config.path.scan_force_constant)?;

    positive("spring_constant", config.refinement.spring_constant)?;
    positive("step_size", config.refinement.step_size)?;
    positive("max_displacement", config.refinement.max_displacement)?;

    positive("gradient_tolerance", config.saddle.gradient_tolerance)?;
    positive("hessian_step", config.saddle.hessian_step)?;
    positive("min_trust_radius", config.saddle.min_trust_radius)?;
    let s = &config.saddle;
    if !(s.min_trust_radius <= s.trust_radius && s.trust_radius <= s.max_trust_radius) {
        return Err(invalid(
            "trust_radius",
            format!(
                "must lie within [{}, {}], got {}",
                s.min_trust_radius, s.max_trust_radius, s.trust_radius
            ),
        ));
    }
    if s.recompute_hessian_every == Some(0) {
        return Err(invalid("recompute_hessian_every", "must be at least 1"));
    }

    if !(0.0..=1.0).contains(&config.validation.min_mode_projection) {
        return Err(invalid("min_mode_projection", "must lie within [0, 1]"));
    }
    if config.validation.imaginary_threshold < 0.0 {
        return Err(invalid("imaginary_threshold", "must not be negative"));
    }

    if let SearchPolicy::Exhaustive { max_rearrangements } = config.policy {
        at_least_one("max_rearrangements", max_rearrangements)?;
    }
    if let EvaluatorPolicy::Retry {
        attempts,
        perturbation,
    } = config.evaluator_policy
    {
        at_least_one("attempts", attempts)?;
        positive("perturbation", perturbation)?;
    }
    at_least_one("conformer_pairs", config.conformer_pairs)?;
    at_least_one("evaluator_slots", config.evaluator_slots)?;
    at_least_one("parallel_rearrangements", config.parallel_rearrangements)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_without_settings_uses_defaults() {
        let config = SearchConfigBuilder::new().build().unwrap();
        assert_eq!(config.enumeration.depth, SearchDepth::Bounded(3));
        assert_eq!(config.policy, SearchPolicy::FirstSuccess);
        assert_eq!(config.evaluator_policy, EvaluatorPolicy::FailFast);
        assert_eq!(config.conformer_pairs, 1);
        assert!(config.refinement.enabled);
        assert!((config.conformers.energy_window - 3.8088e-4).abs() < 1e-7);
    }

    #[test]
    fn builder_applies_overrides() {
        let config = SearchConfig::builder()
            .policy(SearchPolicy::Exhaustive {
                max_rearrangements: 4,
            })
            .conformer_pairs(2)
            .evaluator_slots(8)
            .build()
            .unwrap();
        assert_eq!(
            config.policy,
            SearchPolicy::Exhaustive {
                max_rearrangements: 4
            }
        );
        assert_eq!(config.conformer_pairs, 2);
        assert_eq!(config.evaluator_slots, 8);
    }

    #[test]
    fn build_rejects_too_few_images() {
        let err = SearchConfig::builder()
            .path(PathConfig {
                num_images: 2,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter {
                name: "num_images",
                ..
            }
        ));
    }

    #[test]
    fn build_rejects_trust_radius_outside_bounds() {
        let err = SearchConfig::builder()
            .saddle(SaddleConfig {
                trust_radius: 1.0,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter {
                name: "trust_radius",
                ..
            }
        ));
    }

    #[test]
    fn build_rejects_zero_retry_attempts() {
        let err = SearchConfig::builder()
            .evaluator_policy(EvaluatorPolicy::Retry {
                attempts: 0,
                perturbation: 0.01,
            })
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidParameter {
                name: "attempts",
                reason: "must be at least 1".to_string()
            }
        );
    }
}
