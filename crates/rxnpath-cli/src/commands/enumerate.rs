use super::CommandContext;
use crate::cli::EnumerateArgs;
use crate::config::{CliOverrides, build_config};
use crate::error::Result;
use crate::reaction::ReactionInput;
use rxnpath::core::models::rearrangement::BondRearrangement;
use rxnpath::workflows::explore;
use tracing::info;

pub fn run(args: EnumerateArgs, ctx: CommandContext) -> Result<()> {
    let app = build_config(&args.config, &CliOverrides::from(&args))?;
    let input = ReactionInput::from_file(&args.reaction)?;
    ctx.cancel.check()?;

    info!(limit = args.limit, "Enumerating bond rearrangements...");
    let found = explore::enumerate(
        &input.reactant,
        &input.product,
        &app.search.enumeration,
        args.limit,
    )?;

    print!("{}", format_listing(&found));
    Ok(())
}

fn format_listing(found: &[BondRearrangement]) -> String {
    found
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{:>3}. ({} change(s)) {}\n", i + 1, r.size(), r))
        .collect()
}
