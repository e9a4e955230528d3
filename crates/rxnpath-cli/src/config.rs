//! Search configuration assembled from a TOML file, `-S` settings and
//! command-line flags, in increasing order of precedence.

mod builder;
mod file;
mod models;

pub use builder::build_config;
pub use models::{AppConfig, CliOverrides};
