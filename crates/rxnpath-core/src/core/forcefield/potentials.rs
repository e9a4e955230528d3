//! Pair potentials returning `(energy, dE/dr)`.

pub const KCAL_PER_HARTREE: f64 = 627.509;

const MIN_DISTANCE: f64 = 1e-6;

/// Morse bond, zero at dissociation and `-well_depth` at `r0`.
#[inline]
pub fn morse(dist: f64, r0: f64, well_depth: f64, width: f64) -> (f64, f64) {
    let x = (-width * (dist - r0)).exp();
    let one_minus = 1.0 - x;
    (
        well_depth * (one_minus * one_minus - 1.0),
        2.0 * well_depth * width * x * one_minus,
    )
}

/// Harmonic restraint `0.5 k (r - r0)^2`.
#[inline]
pub fn harmonic(dist: f64, r0: f64, force_constant: f64) -> (f64, f64) {
    let dr = dist - r0;
    (0.5 * force_constant * dr * dr, force_constant * dr)
}

/// Purely repulsive inverse twelfth power wall, `strength` at `r = sigma`.
#[inline]
pub fn soft_repulsion(dist: f64, sigma: f64, strength: f64) -> (f64, f64) {
    if dist < MIN_DISTANCE {
        return (1e10, 0.0);
    }
    let rho = sigma / dist;
    let rho6 = rho.powi(6);
    let energy = strength * rho6 * rho6;
    (energy, -12.0 * energy / dist)
}

/// One-sided harmonic wall acting only below `floor`.
#[inline]
pub fn lower_wall(dist: f64, floor: f64, force_constant: f64) -> (f64, f64) {
    if dist >= floor {
        return (0.0, 0.0);
    }
    let dr = floor - dist;
    (force_constant * dr * dr, -2.0 * force_constant * dr)
}
