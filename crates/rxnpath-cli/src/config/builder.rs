use super::file::{
    FileConfig, FileConformerConfig, FileEnumerationConfig, FileHessianUpdate, FileLocality,
    FilePathConfig, FilePolicy, FileRefinementConfig, FileSaddleConfig, FileSearchConfig,
    FileValidationConfig,
};
use super::models::{AppConfig, CliOverrides};
use crate::cli::ConfigArgs;
use crate::error::{CliError, Result};
use rxnpath::core::optimize::hessian::HessianUpdate;
use rxnpath::engine::config::{
    ConformerConfig, ConvergenceConfig, EnumerationConfig, EvaluatorPolicy, LocalityScore,
    PathConfig, RefinementConfig, SaddleConfig, SearchConfig, SearchDepth, SearchPolicy,
    ValidationConfig,
};
use rxnpath::engine::evaluator::model::ModelParams;
use tracing::debug;

const KJ_MOL_PER_HARTREE: f64 = 2625.4996;

pub fn build_config(args: &ConfigArgs, overrides: &CliOverrides) -> Result<AppConfig> {
    let mut file_config = FileConfig::load(args.config.as_deref(), &args.set_values)?;

    let search_file = file_config.search.take().unwrap_or_default();
    let policy = merge_policy(&search_file, overrides)?;
    let evaluator_policy = merge_evaluator_policy(&search_file, overrides);

    let mut enumeration = merge_enumeration(file_config.enumeration.take().unwrap_or_default());
    if let Some(depth) = overrides.max_depth {
        enumeration.depth = SearchDepth::Bounded(depth);
    }

    let mut conformers = merge_conformers(file_config.conformers.take().unwrap_or_default());
    if let Some(seed) = args.seed {
        conformers.random_seed = seed;
    }
    if let Some(n) = overrides.num_conformers {
        conformers.num_conformers = n;
    }

    let mut path = merge_path(file_config.path.take().unwrap_or_default());
    if let Some(n) = overrides.num_images {
        path.num_images = n;
    }

    let mut refinement = merge_refinement(file_config.refinement.take().unwrap_or_default());
    if overrides.no_refinement {
        refinement.enabled = false;
    }

    let forcefield = file_config.forcefield.take().unwrap_or_default();
    let model_file = file_config.model.take().unwrap_or_default();
    let model_defaults = ModelParams::default();
    let model = ModelParams {
        forcefield: forcefield.clone(),
        coupling: model_file.coupling.unwrap_or(model_defaults.coupling),
        product_offset: model_file
            .product_offset
            .unwrap_or(model_defaults.product_offset),
    };

    let mut builder = SearchConfig::builder()
        .enumeration(enumeration)
        .conformers(conformers)
        .path(path)
        .refinement(refinement)
        .saddle(merge_saddle(file_config.saddle.take().unwrap_or_default()))
        .validation(merge_validation(
            file_config.validation.take().unwrap_or_default(),
        ))
        .forcefield(forcefield)
        .policy(policy)
        .evaluator_policy(evaluator_policy);

    if let Some(n) = overrides.conformer_pairs.or(search_file.conformer_pairs) {
        builder = builder.conformer_pairs(n);
    }
    if let Some(n) = search_file.evaluator_slots {
        builder = builder.evaluator_slots(n);
    }
    if let Some(enabled) = search_file.cache_evaluations {
        builder = builder.cache_evaluations(enabled);
    }
    if let Some(n) = search_file.parallel_rearrangements {
        builder = builder.parallel_rearrangements(n);
    }

    let search = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;
    debug!(
        policy = ?search.policy,
        evaluator_policy = ?search.evaluator_policy,
        "Search configuration built."
    );

    Ok(AppConfig { search, model })
}

fn merge_policy(file: &FileSearchConfig, overrides: &CliOverrides) -> Result<SearchPolicy> {
    if let Some(max_rearrangements) = overrides.exhaustive {
        return Ok(SearchPolicy::Exhaustive { max_rearrangements });
    }
    match file.policy {
        None | Some(FilePolicy::FirstSuccess) => {
            if file.max_rearrangements.is_some() {
                return Err(CliError::Config(
                    "`search.max-rearrangements` requires `search.policy = \"exhaustive\"`"
                        .to_string(),
                ));
            }
            Ok(SearchPolicy::FirstSuccess)
        }
        Some(FilePolicy::Exhaustive) => Ok(SearchPolicy::Exhaustive {
            max_rearrangements: file.max_rearrangements.ok_or_else(|| {
                CliError::Config(
                    "`search.policy = \"exhaustive\"` requires `search.max-rearrangements`"
                        .to_string(),
                )
            })?,
        }),
    }
}

fn merge_evaluator_policy(file: &FileSearchConfig, overrides: &CliOverrides) -> EvaluatorPolicy {
    match overrides.retry.or(file.retry_attempts) {
        Some(attempts) if attempts > 0 => EvaluatorPolicy::Retry {
            attempts,
            perturbation: file.retry_perturbation.unwrap_or(0.05),
        },
        _ => EvaluatorPolicy::FailFast,
    }
}

fn merge_enumeration(file: FileEnumerationConfig) -> EnumerationConfig {
    let defaults = EnumerationConfig::default();
    let depth = match (file.unbounded, file.max_depth) {
        (Some(true), _) => SearchDepth::Unbounded,
        (_, Some(depth)) => SearchDepth::Bounded(depth),
        _ => defaults.depth,
    };
    let locality = match file.locality {
        Some(FileLocality::GraphDistance) => LocalityScore::GraphDistance,
        Some(FileLocality::None) => LocalityScore::None,
        None => defaults.locality,
    };
    EnumerationConfig {
        depth,
        locality,
        collapse_equivalent: file
            .collapse_equivalent
            .unwrap_or(defaults.collapse_equivalent),
        max_combinations: file.max_combinations.unwrap_or(defaults.max_combinations),
    }
}

fn merge_conformers(file: FileConformerConfig) -> ConformerConfig {
    let defaults = ConformerConfig::default();
    ConformerConfig {
        num_conformers: file.num_conformers.unwrap_or(defaults.num_conformers),
        max_attempts: file.max_attempts.unwrap_or(defaults.max_attempts),
        rmsd_threshold: file.rmsd_threshold.unwrap_or(defaults.rmsd_threshold),
        clash_distance: file.clash_distance.unwrap_or(defaults.clash_distance),
        random_seed: file.random_seed.unwrap_or(defaults.random_seed),
        relaxation_steps: file.relaxation_steps.unwrap_or(defaults.relaxation_steps),
        energy_window: file
            .energy_window
            .map(|kj| kj / KJ_MOL_PER_HARTREE)
            .unwrap_or(defaults.energy_window),
        fragment_gap: file.fragment_gap.unwrap_or(defaults.fragment_gap),
    }
}

fn merge_path(file: FilePathConfig) -> PathConfig {
    let defaults = PathConfig::default();
    PathConfig {
        num_images: file.num_images.unwrap_or(defaults.num_images),
        breaking_stretch: file.breaking_stretch.unwrap_or(defaults.breaking_stretch),
        restraint_steps: file.restraint_steps.unwrap_or(defaults.restraint_steps),
        scan_force_constant: file
            .scan_force_constant
            .unwrap_or(defaults.scan_force_constant),
        scan_relaxation_steps: file
            .scan_relaxation_steps
            .unwrap_or(defaults.scan_relaxation_steps),
    }
}

fn merge_refinement(file: FileRefinementConfig) -> RefinementConfig {
    let defaults = RefinementConfig::default();
    RefinementConfig {
        enabled: file.enabled.unwrap_or(defaults.enabled),
        max_iterations: file.max_iterations.unwrap_or(defaults.max_iterations),
        spring_constant: file.spring_constant.unwrap_or(defaults.spring_constant),
        step_size: file.step_size.unwrap_or(defaults.step_size),
        max_displacement: file.max_displacement.unwrap_or(defaults.max_displacement),
        climbing_image: file.climbing_image.unwrap_or(defaults.climbing_image),
        convergence: ConvergenceConfig {
            energy_threshold: file
                .energy_threshold
                .unwrap_or(defaults.convergence.energy_threshold),
            patience_iterations: file
                .patience_iterations
                .unwrap_or(defaults.convergence.patience_iterations),
        },
    }
}

fn merge_saddle(file: FileSaddleConfig) -> SaddleConfig {
    let defaults = SaddleConfig::default();
    let hessian_update = match file.hessian_update {
        Some(FileHessianUpdate::Bfgs) => HessianUpdate::Bfgs,
        Some(FileHessianUpdate::Powell) => HessianUpdate::Powell,
        Some(FileHessianUpdate::Bofill) => HessianUpdate::Bofill,
        None => defaults.hessian_update,
    };
    SaddleConfig {
        max_iterations: file.max_iterations.unwrap_or(defaults.max_iterations),
        gradient_tolerance: file
            .gradient_tolerance
            .unwrap_or(defaults.gradient_tolerance),
        trust_radius: file.trust_radius.unwrap_or(defaults.trust_radius),
        min_trust_radius: file.min_trust_radius.unwrap_or(defaults.min_trust_radius),
        max_trust_radius: file.max_trust_radius.unwrap_or(defaults.max_trust_radius),
        hessian_step: file.hessian_step.unwrap_or(defaults.hessian_step),
        hessian_update,
        recompute_hessian_every: file
            .recompute_hessian_every
            .or(defaults.recompute_hessian_every),
    }
}

fn merge_validation(file: FileValidationConfig) -> ValidationConfig {
    let defaults = ValidationConfig::default();
    ValidationConfig {
        imaginary_threshold: file
            .imaginary_threshold
            .unwrap_or(defaults.imaginary_threshold),
        min_mode_projection: file
            .min_mode_projection
            .unwrap_or(defaults.min_mode_projection),
    }
}
