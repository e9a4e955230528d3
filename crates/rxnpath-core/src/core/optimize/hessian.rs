use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

const SMALL: f64 = 1e-14;
const RMIN2: f64 = 1e-12;

/// Quasi-Newton Hessian update applied after each saddle-optimization step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HessianUpdate {
    Bfgs,
    Powell,
    #[default]
    Bofill,
}

impl HessianUpdate {
    /// Updates `hessian` in place from a step `dx` and the gradient change `dg`.
    pub fn apply(self, hessian: &mut DMatrix<f64>, dx: &DVector<f64>, dg: &DVector<f64>) {
        let delta = match self {
            HessianUpdate::Bfgs => bfgs(hessian, dx, dg),
            HessianUpdate::Powell => powell(hessian, dx, dg),
            HessianUpdate::Bofill => bofill(hessian, dx, dg),
        };
        if let Some(delta) = delta {
            *hessian += delta;
            symmetrize(hessian);
        }
    }
}

fn symmetrize(m: &mut DMatrix<f64>) {
    let t = m.transpose();
    *m += t;
    *m *= 0.5;
}

fn bfgs(h: &DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>) -> Option<DMatrix<f64>> {
    let ys = y.dot(s);
    let hs = h * s;
    let shs = s.dot(&hs);
    if ys <= SMALL || shs <= SMALL {
        return None;
    }
    Some(y * y.transpose() / ys - &hs * hs.transpose() / shs)
}

fn powell(h: &DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>) -> Option<DMatrix<f64>> {
    let r = y - h * s;
    let ss = s.dot(s);
    if ss < RMIN2 {
        return None;
    }
    let rs = r.dot(s);
    Some((&r * s.transpose() + s * r.transpose()) / ss - s * s.transpose() * (rs / (ss * ss)))
}

fn murtagh_sargent(h: &DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>) -> Option<DMatrix<f64>> {
    let r = y - h * s;
    let rs = r.dot(s);
    if rs.abs() < SMALL {
        return None;
    }
    Some(&r * r.transpose() / rs)
}

/// Bofill mix of Murtagh-Sargent and Powell, weighted by
/// `phi = (r.s)^2 / (|r|^2 |s|^2)`.
fn bofill(h: &DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>) -> Option<DMatrix<f64>> {
    let r = y - h * s;
    let rr = r.dot(&r);
    let ss = s.dot(s);
    if rr < RMIN2 || ss < RMIN2 {
        return None;
    }
    let rs = r.dot(s);
    let phi = rs * rs / (rr * ss);
    let powell_part = powell(h, s, y)?;
    match murtagh_sargent(h, s, y) {
        Some(ms) => Some(ms * phi + powell_part * (1.0 - phi)),
        None => Some(powell_part),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic_hessian() -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, -1.0])
    }

    fn secant_holds(update: HessianUpdate) {
        let exact = quadratic_hessian();
        let mut h = DMatrix::identity(2, 2);
        let s = DVector::from_vec(vec![0.1, -0.05]);
        let y = &exact * &s;
        update.apply(&mut h, &s, &y);
        let residual = (&h * &s - &y).norm();
        assert!(residual < 1e-10, "{update:?} residual {residual}");
        assert!((&h - h.transpose()).norm() < 1e-12);
    }

    #[test]
    fn powell_and_bofill_satisfy_secant_condition() {
        secant_holds(HessianUpdate::Powell);
        secant_holds(HessianUpdate::Bofill);
    }

    #[test]
    fn bfgs_satisfies_secant_condition_for_positive_curvature() {
        let exact = DMatrix::from_row_slice(2, 2, &[3.0, 0.2, 0.2, 1.0]);
        let mut h = DMatrix::identity(2, 2);
        let s = DVector::from_vec(vec![0.1, 0.2]);
        let y = &exact * &s;
        HessianUpdate::Bfgs.apply(&mut h, &s, &y);
        assert!((&h * &s - &y).norm() < 1e-10);
    }

    #[test]
    fn bfgs_skips_negative_curvature_step() {
        let mut h = DMatrix::identity(2, 2);
        let s = DVector::from_vec(vec![0.1, 0.0]);
        let y = DVector::from_vec(vec![-0.1, 0.0]);
        HessianUpdate::Bfgs.apply(&mut h, &s, &y);
        assert_eq!(h, DMatrix::identity(2, 2));
    }

    #[test]
    fn tiny_steps_leave_hessian_unchanged() {
        let mut h = quadratic_hessian();
        let s = DVector::from_vec(vec![1e-9, 0.0]);
        let y = DVector::from_vec(vec![1.0, 0.0]);
        HessianUpdate::Bofill.apply(&mut h, &s, &y);
        assert_eq!(h, quadratic_hessian());
    }
}
