use crate::core::models::geometry::Geometry;
use crate::core::models::rearrangement::ActiveBond;
use crate::core::utils::geometry::{complement_projector, rigid_body_basis};
use crate::engine::config::ValidationConfig;
use crate::engine::error::EngineError;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use tracing::{debug, instrument};

/// cm⁻¹ per sqrt(Ha / (Å² amu)).
pub const WAVENUMBER_PER_SQRT_HESSIAN: f64 = 2720.21;

/// Harmonic frequencies with rigid-body motion removed.
#[derive(Debug, Clone)]
pub struct VibrationalAnalysis {
    /// cm⁻¹, ascending; imaginary frequencies are negative.
    pub frequencies: Vec<f64>,
    /// Cartesian displacement of each mode, unit norm, same order.
    pub modes: Vec<DVector<f64>>,
}

/// Mass-weights and projects a Cartesian Hessian (Ha/Å²) and diagonalizes it.
pub fn analyse(geometry: &Geometry, hessian: &DMatrix<f64>) -> VibrationalAnalysis {
    let masses = geometry.masses();
    let dim = 3 * geometry.atom_count();
    let inv_sqrt_mass = DVector::from_iterator(dim, masses.iter().flat_map(|m| [1.0 / m.sqrt(); 3]));

    let weighted = DMatrix::from_fn(dim, dim, |i, j| {
        hessian[(i, j)] * inv_sqrt_mass[i] * inv_sqrt_mass[j]
    });
    let basis = rigid_body_basis(geometry.coords(), Some(&masses));
    let projector = complement_projector(&basis, dim);
    let projected = &projector * weighted * &projector;
    let eigen = SymmetricEigen::new(projected);

    let mut vibrations: Vec<(f64, DVector<f64>)> = (0..dim)
        .filter_map(|k| {
            let v = eigen.eigenvectors.column(k).into_owned();
            let rigid: f64 = basis.iter().map(|b| b.dot(&v).powi(2)).sum();
            (rigid < 0.5).then_some((eigen.eigenvalues[k], v))
        })
        .collect();
    vibrations.sort_by(|a, b| a.0.total_cmp(&b.0));

    let (frequencies, modes) = vibrations
        .into_iter()
        .map(|(lambda, v)| {
            let frequency = WAVENUMBER_PER_SQRT_HESSIAN * lambda.signum() * lambda.abs().sqrt();
            let cartesian = v.component_mul(&inv_sqrt_mass);
            let norm = cartesian.norm();
            let mode = if norm > 0.0 { cartesian / norm } else { cartesian };
            (frequency, mode)
        })
        .unzip();
    VibrationalAnalysis { frequencies, modes }
}

/// How strongly a Cartesian mode stretches the active bonds, in `[0, 1]`.
///
/// A pure stretch of a single bond scores 1.
pub fn mode_projection(geometry: &Geometry, mode: &DVector<f64>, active: &[ActiveBond]) -> f64 {
    let coords = geometry.coords();
    let stretch2: f64 = active
        .iter()
        .map(|b| {
            let axis = (coords[b.i] - coords[b.j]).normalize();
            let relative = mode.fixed_rows::<3>(3 * b.i) - mode.fixed_rows::<3>(3 * b.j);
            axis.dot(&relative).powi(2)
        })
        .sum();
    (stretch2.sqrt() / std::f64::consts::SQRT_2).min(1.0)
}

/// The validated imaginary mode of a candidate saddle point.
#[derive(Debug, Clone)]
pub struct ValidatedMode {
    pub frequencies: Vec<f64>,
    pub mode: DVector<f64>,
    pub projection: f64,
}

/// Checks for exactly one significant imaginary frequency whose mode
/// stretches the active bonds.
#[instrument(skip_all, name = "frequency_validation_task")]
pub fn validate(
    geometry: &Geometry,
    hessian: &DMatrix<f64>,
    active: &[ActiveBond],
    config: &ValidationConfig,
) -> Result<ValidatedMode, EngineError> {
    let analysis = analyse(geometry, hessian);
    let imaginary: Vec<f64> = analysis
        .frequencies
        .iter()
        .copied()
        .filter(|f| *f < -config.imaginary_threshold)
        .collect();
    debug!(imaginary = ?imaginary, "Harmonic analysis finished.");

    if imaginary.len() != 1 {
        return Err(EngineError::WrongTransitionState {
            reason: format!(
                "expected one imaginary frequency beyond {} cm⁻¹, found {}",
                config.imaginary_threshold,
                imaginary.len()
            ),
            imaginary_frequencies: imaginary,
        });
    }

    let mode = analysis.modes[0].clone();
    let projection = mode_projection(geometry, &mode, active);
    if projection < config.min_mode_projection {
        return Err(EngineError::WrongTransitionState {
            reason: format!(
                "imaginary mode projects {projection:.2} onto the active bonds (minimum {:.2})",
                config.min_mode_projection
            ),
            imaginary_frequencies: imaginary,
        });
    }

    Ok(ValidatedMode {
        frequencies: analysis.frequencies,
        mode,
        projection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::element::Element;
    use crate::core::models::rearrangement::BondChange;
    use nalgebra::Point3;

    /// Cartesian Hessian of a diatomic with stretch curvature `k` along x.
    fn diatomic(k: f64) -> (Geometry, DMatrix<f64>) {
        let geometry = Geometry::new(
            vec![Element::H, Element::H],
            vec![Point3::origin(), Point3::new(0.9, 0.0, 0.0)],
        );
        let mut h = DMatrix::zeros(6, 6);
        h[(0, 0)] = k;
        h[(3, 3)] = k;
        h[(0, 3)] = -k;
        h[(3, 0)] = -k;
        (geometry, h)
    }

    fn stretch() -> Vec<ActiveBond> {
        vec![ActiveBond {
            i: 0,
            j: 1,
            change: BondChange::Breaking,
        }]
    }

    #[test]
    fn diatomic_stretch_frequency_matches_reduced_mass() {
        let (geometry, h) = diatomic(0.5);
        let analysis = analyse(&geometry, &h);
        assert_eq!(analysis.frequencies.len(), 1);
        let expected = WAVENUMBER_PER_SQRT_HESSIAN * (0.5 * 2.0 / 1.008f64).sqrt();
        assert!((analysis.frequencies[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn negative_curvature_gives_validated_imaginary_stretch() {
        let (geometry, h) = diatomic(-0.5);
        let validated = validate(&geometry, &h, &stretch(), &ValidationConfig::default()).unwrap();
        assert!(validated.frequencies[0] < -50.0);
        assert!((validated.projection - 1.0).abs() < 1e-9);
    }

    #[test]
    fn real_frequencies_only_are_rejected() {
        let (geometry, h) = diatomic(0.5);
        let result = validate(&geometry, &h, &stretch(), &ValidationConfig::default());
        assert!(matches!(
            result,
            Err(EngineError::WrongTransitionState { imaginary_frequencies, .. })
                if imaginary_frequencies.is_empty()
        ));
    }

    #[test]
    fn mode_perpendicular_to_active_bond_does_not_project() {
        let (geometry, _) = diatomic(1.0);
        let mode = DVector::from_vec(vec![0.0, 0.5, 0.0, 0.0, -0.5, 0.0]);
        assert!(mode_projection(&geometry, &mode, &stretch()) < 1e-12);
    }
}
