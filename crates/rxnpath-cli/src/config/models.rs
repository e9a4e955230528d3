use crate::cli::{ConformersArgs, EnumerateArgs, SearchArgs};
use rxnpath::engine::config::SearchConfig;
use rxnpath::engine::evaluator::model::ModelParams;

pub struct AppConfig {
    pub search: SearchConfig,
    pub model: ModelParams,
}

/// Per-command flags that take precedence over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub exhaustive: Option<usize>,
    pub conformer_pairs: Option<usize>,
    pub num_images: Option<usize>,
    pub retry: Option<usize>,
    pub no_refinement: bool,
    pub max_depth: Option<usize>,
    pub num_conformers: Option<usize>,
}

impl From<&SearchArgs> for CliOverrides {
    fn from(args: &SearchArgs) -> Self {
        Self {
            exhaustive: args.exhaustive,
            conformer_pairs: args.conformer_pairs,
            num_images: args.num_images,
            retry: args.retry,
            no_refinement: args.no_refinement,
            ..Self::default()
        }
    }
}

impl From<&EnumerateArgs> for CliOverrides {
    fn from(args: &EnumerateArgs) -> Self {
        Self {
            max_depth: args.max_depth,
            ..Self::default()
        }
    }
}

impl From<&ConformersArgs> for CliOverrides {
    fn from(args: &ConformersArgs) -> Self {
        Self {
            num_conformers: args.num_conformers,
            ..Self::default()
        }
    }
}
