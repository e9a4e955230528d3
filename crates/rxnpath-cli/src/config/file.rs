use crate::error::{CliError, Result};
use rxnpath::core::forcefield::params::ForceFieldParams;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FilePolicy {
    FirstSuccess,
    Exhaustive,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileLocality {
    GraphDistance,
    None,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileHessianUpdate {
    Bfgs,
    Powell,
    Bofill,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSearchConfig {
    pub policy: Option<FilePolicy>,
    pub max_rearrangements: Option<usize>,
    pub conformer_pairs: Option<usize>,
    pub evaluator_slots: Option<usize>,
    pub cache_evaluations: Option<bool>,
    pub parallel_rearrangements: Option<usize>,
    pub retry_attempts: Option<usize>,
    pub retry_perturbation: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileEnumerationConfig {
    pub max_depth: Option<usize>,
    pub unbounded: Option<bool>,
    pub locality: Option<FileLocality>,
    pub collapse_equivalent: Option<bool>,
    pub max_combinations: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConformerConfig {
    pub num_conformers: Option<usize>,
    pub max_attempts: Option<usize>,
    pub rmsd_threshold: Option<f64>,
    pub clash_distance: Option<f64>,
    pub random_seed: Option<u64>,
    pub relaxation_steps: Option<usize>,
    /// In kJ/mol.
    pub energy_window: Option<f64>,
    pub fragment_gap: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FilePathConfig {
    pub num_images: Option<usize>,
    pub breaking_stretch: Option<f64>,
    pub restraint_steps: Option<usize>,
    pub scan_force_constant: Option<f64>,
    pub scan_relaxation_steps: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileRefinementConfig {
    pub enabled: Option<bool>,
    pub max_iterations: Option<usize>,
    pub spring_constant: Option<f64>,
    pub step_size: Option<f64>,
    pub max_displacement: Option<f64>,
    pub climbing_image: Option<bool>,
    pub energy_threshold: Option<f64>,
    pub patience_iterations: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSaddleConfig {
    pub max_iterations: Option<usize>,
    pub gradient_tolerance: Option<f64>,
    pub trust_radius: Option<f64>,
    pub min_trust_radius: Option<f64>,
    pub max_trust_radius: Option<f64>,
    pub hessian_step: Option<f64>,
    pub hessian_update: Option<FileHessianUpdate>,
    pub recompute_hessian_every: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileValidationConfig {
    pub imaginary_threshold: Option<f64>,
    pub min_mode_projection: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileModelConfig {
    pub coupling: Option<f64>,
    pub product_offset: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub search: Option<FileSearchConfig>,
    pub enumeration: Option<FileEnumerationConfig>,
    pub conformers: Option<FileConformerConfig>,
    pub path: Option<FilePathConfig>,
    pub refinement: Option<FileRefinementConfig>,
    pub saddle: Option<FileSaddleConfig>,
    pub validation: Option<FileValidationConfig>,
    pub forcefield: Option<ForceFieldParams>,
    pub model: Option<FileModelConfig>,
}

impl FileConfig {
    /// Reads `path` (if any) and applies `KEY=VALUE` settings on top.
    ///
    /// Keys are dotted paths into the file's tables, so `-S saddle.trust-radius=0.2`
    /// behaves exactly like writing the value under `[saddle]`.
    pub fn load(path: Option<&Path>, set_values: &[String]) -> Result<Self> {
        let mut table = match path {
            Some(path) => {
                debug!("Loading configuration from file: {:?}", path);
                let content = std::fs::read_to_string(path)?;
                toml::from_str::<toml::Table>(&content).map_err(|e| CliError::FileParsing {
                    path: path.to_path_buf(),
                    source: e.into(),
                })?
            }
            None => toml::Table::new(),
        };

        for kv_pair in set_values {
            apply_set_value(&mut table, kv_pair)?;
        }

        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| CliError::Config(e.to_string()))
    }
}

/// Typed TOML value for `raw`, falling back to a bare string.
fn parse_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("value = {raw}"))
        .ok()
        .and_then(|mut t| t.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

fn apply_set_value(table: &mut toml::Table, kv_pair: &str) -> Result<()> {
    let (key, value) = kv_pair.split_once('=').ok_or_else(|| {
        CliError::Config(format!(
            "Invalid --set format: '{}'. Expected KEY=VALUE.",
            kv_pair
        ))
    })?;
    let segments: Vec<&str> = key.trim().split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(CliError::Config(format!("Invalid --set key: '{}'", key)));
    }

    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| CliError::Config(format!("Invalid --set key: '{}'", key)))?;
    let mut current = table;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        current = match entry {
            toml::Value::Table(inner) => inner,
            _ => {
                return Err(CliError::Config(format!(
                    "Cannot set '{}': '{}' is not a table",
                    key, segment
                )));
            }
        };
    }
    current.insert(last.to_string(), parse_value(value.trim()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_typed_when_possible() {
        assert_eq!(parse_value("3"), toml::Value::Integer(3));
        assert_eq!(parse_value("0.25"), toml::Value::Float(0.25));
        assert_eq!(parse_value("false"), toml::Value::Boolean(false));
        assert_eq!(
            parse_value("exhaustive"),
            toml::Value::String("exhaustive".to_string())
        );
    }

    #[test]
    fn set_values_create_nested_tables() {
        let config = FileConfig::load(
            None,
            &[
                "saddle.max-iterations=120".to_string(),
                "search.policy=exhaustive".to_string(),
                "forcefield.bond-width=2.0".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(config.saddle.unwrap().max_iterations, Some(120));
        assert_eq!(config.search.unwrap().policy, Some(FilePolicy::Exhaustive));
        assert_eq!(config.forcefield.unwrap().bond_width, 2.0);
    }

    #[test]
    fn set_values_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.toml");
        std::fs::write(&path, "[path]\nnum-images = 10\nbreaking-stretch = 1.8\n").unwrap();

        let config = FileConfig::load(Some(&path), &["path.num-images=6".to_string()]).unwrap();
        let section = config.path.unwrap();
        assert_eq!(section.num_images, Some(6));
        assert_eq!(section.breaking_stretch, Some(1.8));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = FileConfig::load(None, &["saddle.trust=0.2".to_string()]);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn malformed_set_value_is_rejected() {
        assert!(matches!(
            FileConfig::load(None, &["saddle.max-iterations".to_string()]),
            Err(CliError::Config(_))
        ));
        assert!(matches!(
            FileConfig::load(None, &["saddle..x=1".to_string()]),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn setting_below_a_scalar_is_rejected() {
        let result = FileConfig::load(
            None,
            &["model=1".to_string(), "model.coupling=2".to_string()],
        );
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn invalid_toml_reports_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[saddle\n").unwrap();
        assert!(matches!(
            FileConfig::load(Some(&path), &[]),
            Err(CliError::FileParsing { .. })
        ));
    }
}
