//! Distance-geometry embedding of molecular graphs.

use crate::core::forcefield::scoring::{bond_length_between, flatten, ideal_angle, unflatten};
use crate::core::models::graph::MolecularGraph;
use crate::core::optimize::minimizer::{MinimizerSettings, minimize};
use nalgebra::{DMatrix, DVector, Point3, SymmetricEigen};
use rand::Rng;
use std::convert::Infallible;

/// Half-width of the bonded distance window (Å).
const BOND_TOLERANCE: f64 = 0.05;
/// Half-width of the valence angle window (degrees).
const ANGLE_TOLERANCE: f64 = 10.0;
/// Lower bound for atoms three or more bonds apart, as a fraction of the vdW sum.
const VDW_SCALE: f64 = 0.65;
/// Lower bound between fragments, as a fraction of the vdW sum, before the gap.
const INTERFRAGMENT_SCALE: f64 = 0.8;
const INTERFRAGMENT_SPAN: f64 = 4.0;
const MAX_DISTANCE: f64 = 100.0;
const EMBEDDING_NOISE: f64 = 0.05;

/// Symmetric lower/upper interatomic distance bounds.
#[derive(Debug, Clone)]
pub struct DistanceBounds {
    pub lower: DMatrix<f64>,
    pub upper: DMatrix<f64>,
}

impl DistanceBounds {
    /// Bounds from topology: bonds near their ideal length, 1-3 pairs from
    /// the ideal valence angle, other pairs kept apart by scaled van der
    /// Waals radii and separate fragments by an extra `fragment_gap`.
    pub fn from_graph(graph: &MolecularGraph, fragment_gap: f64) -> Self {
        let n = graph.atom_count();
        let mut lower = DMatrix::zeros(n, n);
        let mut upper = DMatrix::from_element(n, n, MAX_DISTANCE);
        for i in 0..n {
            upper[(i, i)] = 0.0;
        }

        for i in 0..n {
            let hops = graph.topological_distances(i);
            for j in (i + 1)..n {
                let vdw = graph.atom_at(i).element.vdw_radius() + graph.atom_at(j).element.vdw_radius();
                let (l, u) = match hops[j] {
                    Some(1) => {
                        let r0 = bond_length_between(graph, i, j);
                        (r0 - BOND_TOLERANCE, r0 + BOND_TOLERANCE)
                    }
                    Some(2) => one_three_bounds(graph, i, j).unwrap_or((VDW_SCALE * vdw, MAX_DISTANCE)),
                    Some(_) => (VDW_SCALE * vdw, MAX_DISTANCE),
                    None => {
                        let l = INTERFRAGMENT_SCALE * vdw + fragment_gap;
                        (l, l + INTERFRAGMENT_SPAN)
                    }
                };
                lower[(i, j)] = l;
                lower[(j, i)] = l;
                upper[(i, j)] = u;
                upper[(j, i)] = u;
            }
        }
        Self { lower, upper }
    }

    pub fn atom_count(&self) -> usize {
        self.lower.nrows()
    }

    /// Triangle-inequality smoothing. Returns the number of pairs whose
    /// bounds crossed and were collapsed onto the lower bound.
    pub fn smooth(&mut self) -> usize {
        let n = self.atom_count();
        for k in 0..n {
            for i in 0..n {
                for j in (i + 1)..n {
                    let through_k = self.upper[(i, k)] + self.upper[(k, j)];
                    if through_k < self.upper[(i, j)] {
                        self.upper[(i, j)] = through_k;
                        self.upper[(j, i)] = through_k;
                    }
                    let l = (self.lower[(i, k)] - self.upper[(k, j)])
                        .max(self.lower[(j, k)] - self.upper[(k, i)]);
                    if l > self.lower[(i, j)] {
                        self.lower[(i, j)] = l;
                        self.lower[(j, i)] = l;
                    }
                }
            }
        }

        let mut crossed = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                if self.lower[(i, j)] > self.upper[(i, j)] {
                    self.upper[(i, j)] = self.lower[(i, j)];
                    self.upper[(j, i)] = self.lower[(i, j)];
                    crossed += 1;
                }
            }
        }
        crossed
    }

    /// A distance matrix drawn uniformly within the bounds.
    pub fn sample(&self, rng: &mut impl Rng) -> DMatrix<f64> {
        let n = self.atom_count();
        let mut d = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in (i + 1)..n {
                let (l, u) = (self.lower[(i, j)], self.upper[(i, j)]);
                let x = if u > l { rng.gen_range(l..=u) } else { l };
                d[(i, j)] = x;
                d[(j, i)] = x;
            }
        }
        d
    }

    /// Distance-geometry error function and its gradient at flat coordinates.
    pub fn error(&self, x: &DVector<f64>) -> (f64, DVector<f64>) {
        let n = self.atom_count();
        let mut value = 0.0;
        let mut gradient = DVector::zeros(x.len());
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = x.fixed_rows::<3>(3 * i) - x.fixed_rows::<3>(3 * j);
                let s = dx.norm_squared();
                let (l2, u2) = (self.lower[(i, j)].powi(2), self.upper[(i, j)].powi(2));
                let de_ds = if s > u2 {
                    let t = s / u2 - 1.0;
                    value += t * t;
                    2.0 * t / u2
                } else if s < l2 {
                    let q = l2 + s;
                    let t = 2.0 * l2 / q - 1.0;
                    value += t * t;
                    -4.0 * t * l2 / (q * q)
                } else {
                    continue;
                };
                let g = dx * (2.0 * de_ds);
                let mut gi = gradient.fixed_rows_mut::<3>(3 * i);
                gi += g;
                let mut gj = gradient.fixed_rows_mut::<3>(3 * j);
                gj -= g;
            }
        }
        (value, gradient)
    }
}

fn one_three_bounds(graph: &MolecularGraph, i: usize, j: usize) -> Option<(f64, f64)> {
    let center = graph
        .neighbor_indices(i)
        .iter()
        .copied()
        .find(|k| graph.neighbor_indices(j).contains(k))?;
    let theta = ideal_angle(graph, center);
    let ri = bond_length_between(graph, i, center);
    let rj = bond_length_between(graph, j, center);
    let at = |deg: f64| {
        let rad = deg.clamp(0.0, 180.0).to_radians();
        (ri * ri + rj * rj - 2.0 * ri * rj * rad.cos()).sqrt()
    };
    Some((at(theta - ANGLE_TOLERANCE), at(theta + ANGLE_TOLERANCE)))
}

/// Metric-matrix embedding of a distance matrix into three dimensions.
pub fn embed(distances: &DMatrix<f64>, rng: &mut impl Rng) -> Vec<Point3<f64>> {
    let n = distances.nrows();
    if n == 0 {
        return Vec::new();
    }
    let d2 = distances.map(|d| d * d);
    let nf = n as f64;
    let pair_sum: f64 = (0..n)
        .flat_map(|j| ((j + 1)..n).map(move |k| (j, k)))
        .map(|(j, k)| d2[(j, k)])
        .sum();
    let to_centroid: Vec<f64> = (0..n)
        .map(|i| d2.row(i).sum() / nf - pair_sum / (nf * nf))
        .collect();

    let metric = DMatrix::from_fn(n, n, |i, j| 0.5 * (to_centroid[i] + to_centroid[j] - d2[(i, j)]));
    let eigen = SymmetricEigen::new(metric);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| eigen.eigenvalues[*b].total_cmp(&eigen.eigenvalues[*a]));

    (0..n)
        .map(|i| {
            let mut p = [0.0; 3];
            for (axis, &k) in order.iter().take(3).enumerate() {
                let scale = eigen.eigenvalues[k].max(0.0).sqrt();
                p[axis] = scale * eigen.eigenvectors[(i, k)];
            }
            for x in &mut p {
                *x += rng.gen_range(-EMBEDDING_NOISE..EMBEDDING_NOISE);
            }
            Point3::new(p[0], p[1], p[2])
        })
        .collect()
}

/// Minimizes the bounds error starting from `coords`.
pub fn refine(bounds: &DistanceBounds, coords: &[Point3<f64>], max_iterations: usize) -> Vec<Point3<f64>> {
    let settings = MinimizerSettings {
        max_iterations,
        gradient_tolerance: 1e-5,
        ..MinimizerSettings::default()
    };
    let objective = |x: &DVector<f64>| -> Result<(f64, DVector<f64>), Infallible> { Ok(bounds.error(x)) };
    match minimize(objective, flatten(coords), &settings) {
        Ok(minimum) => unflatten(&minimum.x),
        Err(never) => match never {},
    }
}
