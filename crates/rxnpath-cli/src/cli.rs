use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "rxnpath - reaction mechanism search and transition-state location from reactant and product graphs.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the mechanism and locate the transition state of a reaction.
    Search(SearchArgs),
    /// List the bond rearrangements that turn the reactant into the product.
    Enumerate(EnumerateArgs),
    /// Generate conformers for one side of a reaction.
    Conformers(ConformersArgs),
}

/// Settings shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to a search configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the random seed used for conformer embedding.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S saddle.max-iterations=120
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `search` subcommand.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Path to the reaction description (TOML with `reactant` and `product` tables).
    #[arg(required = true, value_name = "REACTION")]
    pub reaction: PathBuf,

    /// Path for the output XYZ file holding reactant, transition state and product.
    #[arg(short, long, default_value = "profile.xyz", value_name = "PATH")]
    pub output: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,

    // --- Search Overrides ---
    /// Try up to this many rearrangements and keep the lowest barrier,
    /// instead of stopping at the first transition state.
    #[arg(long, value_name = "INT")]
    pub exhaustive: Option<usize>,

    /// Override the number of reactant/product conformer pairings per rearrangement.
    #[arg(long, value_name = "INT")]
    pub conformer_pairs: Option<usize>,

    /// Override the number of images in interpolated paths.
    #[arg(long, value_name = "INT")]
    pub num_images: Option<usize>,

    /// Retry failed energy evaluations this many times before skipping a candidate.
    #[arg(long, value_name = "INT")]
    pub retry: Option<usize>,

    /// Disable elastic band refinement of interpolated paths.
    #[arg(long)]
    pub no_refinement: bool,
}

/// Arguments for the `enumerate` subcommand.
#[derive(Args, Debug)]
pub struct EnumerateArgs {
    /// Path to the reaction description (TOML with `reactant` and `product` tables).
    #[arg(required = true, value_name = "REACTION")]
    pub reaction: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Maximum number of rearrangements to list.
    #[arg(short = 'n', long, default_value_t = 10, value_name = "INT")]
    pub limit: usize,

    /// Override the largest rearrangement size searched.
    #[arg(long, value_name = "INT")]
    pub max_depth: Option<usize>,
}

/// Which side of the reaction to use.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Reactant,
    Product,
}

/// Arguments for the `conformers` subcommand.
#[derive(Args, Debug)]
pub struct ConformersArgs {
    /// Path to the reaction description (TOML with `reactant` and `product` tables).
    #[arg(required = true, value_name = "REACTION")]
    pub reaction: PathBuf,

    /// Path for the output multi-frame XYZ file.
    #[arg(short, long, default_value = "conformers.xyz", value_name = "PATH")]
    pub output: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Side of the reaction to generate conformers for.
    #[arg(long, value_enum, default_value_t = Side::Reactant)]
    pub side: Side,

    /// Override the number of conformers to generate.
    #[arg(short = 'n', long, value_name = "INT")]
    pub num_conformers: Option<usize>,

    /// Evaluate conformers with the model surface and strip near-duplicates by energy.
    #[arg(long)]
    pub evaluate: bool,
}
