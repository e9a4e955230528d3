use serde::{Deserialize, Serialize};

/// Parameters of the topology-derived force field (kcal/mol and Å).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ForceFieldParams {
    /// Morse well depth of every bond.
    pub bond_well_depth: f64,
    /// Morse width parameter (1/Å).
    pub bond_width: f64,
    /// Force constant of the 1-3 distance terms that hold valence angles.
    pub angle_force_constant: f64,
    /// Repulsion energy at contact for atoms three or more bonds apart.
    pub repulsion_strength: f64,
    /// Contact distance as a fraction of the mean van der Waals diameter.
    pub repulsion_radius_scale: f64,
}

impl Default for ForceFieldParams {
    fn default() -> Self {
        Self {
            bond_well_depth: 100.0,
            bond_width: 1.8,
            angle_force_constant: 50.0,
            repulsion_strength: 5.0,
            repulsion_radius_scale: 0.85,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let params: ForceFieldParams = toml::from_str("bond-well-depth = 80.0").unwrap();
        assert_eq!(params.bond_well_depth, 80.0);
        assert_eq!(params.bond_width, ForceFieldParams::default().bond_width);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<ForceFieldParams>("dielectric = 4.0").is_err());
    }
}
