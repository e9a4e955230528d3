use super::CommandContext;
use crate::cli::{ConformersArgs, Side};
use crate::config::{CliOverrides, build_config};
use crate::error::{CliError, Result};
use crate::reaction::ReactionInput;
use rxnpath::core::io::traits::{Frame, MolecularFile};
use rxnpath::core::io::xyz::XyzFile;
use rxnpath::core::models::geometry::Conformer;
use rxnpath::engine::error::EngineError;
use rxnpath::engine::evaluator::Evaluator;
use rxnpath::engine::evaluator::model::ModelEvaluator;
use rxnpath::workflows::explore;
use tracing::info;

pub fn run(args: ConformersArgs, ctx: CommandContext) -> Result<()> {
    let app = build_config(&args.config, &CliOverrides::from(&args))?;
    let input = ReactionInput::from_file(&args.reaction)?;
    let graph = match args.side {
        Side::Reactant => &input.reactant,
        Side::Product => &input.product,
    };

    // Both diabatic states share one topology, so the surface is that
    // topology's force field.
    let evaluator = if args.evaluate {
        Some(
            ModelEvaluator::new(graph, graph, &app.model)
                .map_err(|e| CliError::Engine(EngineError::InvalidStructure(e)))?,
        )
    } else {
        None
    };

    info!(side = ?args.side, "Generating conformers...");
    let conformers = explore::generate_conformers(
        graph,
        &app.search,
        evaluator.as_ref().map(|e| e as &dyn Evaluator),
        &ctx.cancel,
    )?;

    XyzFile::write_to_path(&frames(&conformers), &args.output).map_err(|e| {
        CliError::FileParsing {
            path: args.output.clone(),
            source: e.into(),
        }
    })?;
    println!(
        "✓ {} conformer(s) written to: {}",
        conformers.len(),
        args.output.display()
    );
    Ok(())
}

fn frames(conformers: &[Conformer]) -> Vec<Frame> {
    conformers
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let comment = match c.energy() {
                Some(e) => format!("conformer {} E={e:.8}", i + 1),
                None => format!("conformer {}", i + 1),
            };
            Frame::new(comment, c.geometry().clone())
        })
        .collect()
}
