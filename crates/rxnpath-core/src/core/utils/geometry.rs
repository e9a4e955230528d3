use nalgebra::{DMatrix, DVector, Matrix3, Point3, Vector3};

pub fn centroid(coords: &[Point3<f64>]) -> Point3<f64> {
    if coords.is_empty() {
        return Point3::origin();
    }
    let sum: Vector3<f64> = coords.iter().map(|p| p.coords).sum();
    Point3::from(sum / coords.len() as f64)
}

pub fn weighted_centroid(coords: &[Point3<f64>], weights: &[f64]) -> Point3<f64> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return centroid(coords);
    }
    let sum: Vector3<f64> = coords.iter().zip(weights).map(|(p, w)| p.coords * *w).sum();
    Point3::from(sum / total)
}

pub fn calculate_rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len() as f64;
    let squared_dist_sum: f64 = coords1
        .iter()
        .zip(coords2.iter())
        .map(|(p1, p2)| (p1 - p2).norm_squared())
        .sum();
    Some((squared_dist_sum / n).sqrt())
}

/// Proper rotation that best superimposes centred `moving` onto centred `reference` (Kabsch).
pub fn kabsch_rotation(moving: &[Point3<f64>], reference: &[Point3<f64>]) -> Matrix3<f64> {
    let cm = centroid(moving);
    let cr = centroid(reference);
    let mut h = Matrix3::zeros();
    for (p, q) in moving.iter().zip(reference) {
        h += (p - cm) * (q - cr).transpose();
    }
    let svd = h.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Matrix3::identity();
    };
    let v = v_t.transpose();
    let d = (v * u.transpose()).determinant().signum();
    v * Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, d)) * u.transpose()
}

/// `moving` rotated and translated onto `reference`.
pub fn align_onto(moving: &[Point3<f64>], reference: &[Point3<f64>]) -> Vec<Point3<f64>> {
    if moving.len() != reference.len() || moving.is_empty() {
        return moving.to_vec();
    }
    let cm = centroid(moving);
    let cr = centroid(reference);
    let r = kabsch_rotation(moving, reference);
    moving.iter().map(|p| cr + r * (p - cm)).collect()
}

/// RMSD after optimal superposition.
pub fn aligned_rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    calculate_rmsd(&align_onto(coords1, coords2), coords2)
}

/// Orthonormal basis of rigid translations and rotations in flat Cartesian
/// space, optionally mass-weighted (`sqrt(m)` scaling).
///
/// Linear and single-atom structures yield fewer than six vectors.
pub fn rigid_body_basis(coords: &[Point3<f64>], masses: Option<&[f64]>) -> Vec<DVector<f64>> {
    let n = coords.len();
    let weights: Vec<f64> = match masses {
        Some(m) => m.iter().map(|x| x.sqrt()).collect(),
        None => vec![1.0; n],
    };
    let center = match masses {
        Some(m) => weighted_centroid(coords, m),
        None => centroid(coords),
    };

    let mut raw = Vec::with_capacity(6);
    for axis in 0..3 {
        let mut t = DVector::zeros(3 * n);
        for i in 0..n {
            t[3 * i + axis] = weights[i];
        }
        raw.push(t);
    }
    for axis in [Vector3::x(), Vector3::y(), Vector3::z()] {
        let mut r = DVector::zeros(3 * n);
        for i in 0..n {
            let v = axis.cross(&(coords[i] - center)) * weights[i];
            r[3 * i] = v.x;
            r[3 * i + 1] = v.y;
            r[3 * i + 2] = v.z;
        }
        raw.push(r);
    }

    let mut basis: Vec<DVector<f64>> = Vec::with_capacity(6);
    for mut v in raw {
        for b in &basis {
            let overlap = b.dot(&v);
            v -= b * overlap;
        }
        let norm = v.norm();
        if norm > 1e-6 {
            basis.push(v / norm);
        }
    }
    basis
}

/// Removes the components of `v` lying in the span of an orthonormal `basis`.
pub fn project_out(v: &DVector<f64>, basis: &[DVector<f64>]) -> DVector<f64> {
    let mut out = v.clone();
    for b in basis {
        let overlap = b.dot(&out);
        out -= b * overlap;
    }
    out
}

/// Matrix projecting onto the orthogonal complement of an orthonormal `basis`.
pub fn complement_projector(basis: &[DVector<f64>], dim: usize) -> DMatrix<f64> {
    let mut p = DMatrix::identity(dim, dim);
    for b in basis {
        p -= b * b.transpose();
    }
    p
}
