use super::CommandContext;
use crate::cli::SearchArgs;
use crate::config::{CliOverrides, build_config};
use crate::error::{CliError, Result};
use crate::reaction::ReactionInput;
use rxnpath::core::io::traits::MolecularFile;
use rxnpath::core::io::xyz::XyzFile;
use rxnpath::engine::error::EngineError;
use rxnpath::engine::evaluator::model::ModelEvaluator;
use rxnpath::engine::progress::ProgressReporter;
use rxnpath::engine::state::FailureKind;
use rxnpath::workflows::profile::{self, ReactionProfile};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info, warn};

pub fn run(args: SearchArgs, ctx: CommandContext) -> Result<()> {
    let app = build_config(&args.config, &CliOverrides::from(&args))?;
    let input = ReactionInput::from_file(&args.reaction)?;

    let evaluator = ModelEvaluator::new(&input.reactant, &input.product, &app.model)
        .map_err(|e| CliError::Engine(EngineError::InvalidStructure(e)))?;
    let reporter = ProgressReporter::with_callback(ctx.progress.get_callback());

    println!("Searching reaction mechanism...");
    info!("Invoking the reaction profile workflow...");
    let result = profile::run(
        &input.reactant,
        &input.product,
        &evaluator,
        &app.search,
        &reporter,
        &ctx.cancel,
    );
    ctx.progress.finish();
    let profile = result?;

    for failure in &profile.trace.failures {
        if failure.kind == FailureKind::Superseded {
            debug!(rearrangement = %failure.rearrangement, "Candidate superseded.");
            continue;
        }
        warn!(
            rearrangement = %failure.rearrangement,
            kind = %failure.kind,
            "Candidate failed: {}",
            failure.reason
        );
    }

    print!("{}", summarize(&profile));
    write_profile(&profile, &args.output)?;
    println!("✓ Profile written to: {}", args.output.display());
    Ok(())
}

fn write_profile(profile: &ReactionProfile, path: &Path) -> Result<()> {
    info!("Writing profile to {:?}", path);
    XyzFile::write_to_path(&profile.frames(), path).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

/// Human-readable report of a finished search.
pub fn summarize(profile: &ReactionProfile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Reaction type:  {}", profile.reaction_type);
    if profile.rearrangement.is_empty() {
        let _ = writeln!(out, "Rearrangement:  none (same connectivity)");
    } else {
        let _ = writeln!(out, "Rearrangement:  {}", profile.rearrangement);
    }
    match profile.delta_e() {
        Some(de) => {
            let _ = writeln!(out, "ΔE:             {de:.2} kcal/mol");
        }
        None => {
            let _ = writeln!(out, "ΔE:             n/a");
        }
    }
    if let (Some(ts), Some(barrier)) = (&profile.transition_state, profile.delta_e_ddagger()) {
        let _ = writeln!(out, "ΔE‡:            {barrier:.2} kcal/mol");
        let _ = writeln!(
            out,
            "TS frequency:   {:.1} cm⁻¹ ({} saddle iterations)",
            ts.imaginary_frequency(),
            ts.iterations
        );
    }
    let _ = writeln!(out, "Search:         {}", profile.trace);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ConfigArgs;
    use nalgebra::Point3;
    use rxnpath::core::io::traits::Frame;
    use rxnpath::core::models::element::Element;
    use rxnpath::core::models::geometry::{Conformer, Geometry};
    use rxnpath::core::models::rearrangement::BondRearrangement;
    use rxnpath::engine::state::SearchTrace;
    use rxnpath::workflows::reaction::ReactionType;

    fn h2(d: f64) -> Geometry {
        Geometry::new(
            vec![Element::H, Element::H],
            vec![Point3::origin(), Point3::new(d, 0.0, 0.0)],
        )
    }

    fn trivial_profile() -> ReactionProfile {
        ReactionProfile {
            reaction_type: ReactionType::Rearrangement,
            rearrangement: BondRearrangement::empty(),
            reactant: Conformer::new(h2(0.74)).with_energy(-1.0),
            transition_state: None,
            product: Conformer::new(h2(0.75)).with_energy(-0.99),
            trace: SearchTrace::default(),
        }
    }

    #[test]
    fn summary_reports_energies_in_kcal_per_mol() {
        let text = summarize(&trivial_profile());
        assert!(text.contains("rearrangement"));
        assert!(text.contains("none (same connectivity)"));
        assert!(text.contains("ΔE:             6.28 kcal/mol"));
        assert!(!text.contains("ΔE‡"));
    }

    #[test]
    fn profile_is_written_as_multi_frame_xyz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.xyz");
        write_profile(&trivial_profile(), &path).unwrap();

        let frames: Vec<Frame> = XyzFile::read_from_path(&path).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].comment.starts_with("reactant"));
        assert!(frames[1].comment.starts_with("product"));
    }

    #[test]
    fn identical_sides_short_circuit_and_write_two_frames() {
        let dir = tempfile::tempdir().unwrap();
        let reaction = dir.path().join("reaction.toml");
        std::fs::write(
            &reaction,
            r#"
[reactant]
atoms = [{ element = "H" }, { element = "H" }]
bonds = [{ atoms = [0, 1] }]

[product]
atoms = [{ element = "H" }, { element = "H" }]
bonds = [{ atoms = [0, 1] }]
"#,
        )
        .unwrap();
        let output = dir.path().join("out.xyz");
        let args = SearchArgs {
            reaction,
            output: output.clone(),
            config: ConfigArgs::default(),
            exhaustive: None,
            conformer_pairs: None,
            num_images: None,
            retry: None,
            no_refinement: false,
        };

        run(args, CommandContext::quiet()).unwrap();
        let frames = XyzFile::read_from_path(&output).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn cancelled_search_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let reaction = dir.path().join("reaction.toml");
        std::fs::write(
            &reaction,
            r#"
[reactant]
atoms = [{ element = "H" }, { element = "H" }]
bonds = [{ atoms = [0, 1] }]

[product]
connectivity = "complex"
atoms = [{ element = "H" }, { element = "H" }]
"#,
        )
        .unwrap();
        let args = SearchArgs {
            reaction,
            output: dir.path().join("out.xyz"),
            config: ConfigArgs::default(),
            exhaustive: None,
            conformer_pairs: None,
            num_images: None,
            retry: None,
            no_refinement: false,
        };
        let ctx = CommandContext::quiet();
        ctx.cancel.cancel();

        let result = run(args, ctx);
        assert!(matches!(
            result,
            Err(CliError::Engine(EngineError::Cancelled))
        ));
    }
}
