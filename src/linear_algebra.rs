//! Small dense solves for the LPPL fit.
//!
//! Two systems appear in every iteration of the fit: the 4x4 normal equations of
//! the linear coefficients `(a, b, c1, c2)` and the 3x3 damped Gauss-Newton step
//! for `(tc, m, w)`. Both matrices are symmetric positive semi-definite, so both
//! are solved by Cholesky after symmetric diagonal scaling, which makes the
//! rank check independent of the column magnitudes.

use crate::errors::{LpplError, LpplResult};
use nalgebra::{Matrix4, SMatrix, SVector, Vector4};

/// Smallest accepted squared Cholesky pivot of the unit-diagonal scaled matrix.
const MIN_SCALED_PIVOT: f64 = 1e-12;

/// Floor applied to diagonal entries before scaling a damped system.
const DIAGONAL_FLOOR: f64 = 1e-300;

fn singular(operation: &str, detail: String) -> LpplError {
    LpplError::NumericalError {
        reason: format!("{}: singular system ({})", operation, detail),
    }
}

fn ensure_finite<const D: usize>(
    a: &SMatrix<f64, D, D>,
    b: &SVector<f64, D>,
    operation: &str,
) -> LpplResult<()> {
    if a.iter().chain(b.iter()).all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(LpplError::NumericalError {
            reason: format!("{}: non-finite entry in linear system", operation),
        })
    }
}

/// Solve the symmetric positive definite system `a x = b`.
///
/// The matrix is scaled to unit diagonal first; a zero diagonal entry or a tiny
/// Cholesky pivot of the scaled matrix is reported as a singular system.
pub fn solve_spd<const D: usize>(
    a: &SMatrix<f64, D, D>,
    b: &SVector<f64, D>,
    operation: &str,
) -> LpplResult<SVector<f64, D>> {
    ensure_finite(a, b, operation)?;

    let mut scale = SVector::<f64, D>::zeros();
    for i in 0..D {
        let d = a[(i, i)];
        if !(d > 0.0) {
            return Err(singular(operation, format!("column {} has no variance", i)));
        }
        scale[i] = 1.0 / d.sqrt();
    }

    let scaled = SMatrix::<f64, D, D>::from_fn(|i, j| a[(i, j)] * scale[i] * scale[j]);
    let chol = scaled
        .cholesky()
        .ok_or_else(|| singular(operation, "not positive definite".to_string()))?;

    let l = chol.l();
    if let Some(i) = (0..D).find(|&i| l[(i, i)] * l[(i, i)] < MIN_SCALED_PIVOT) {
        return Err(singular(
            operation,
            format!("collinear column {} (pivot {:.3e})", i, l[(i, i)]),
        ));
    }

    let rhs = b.component_mul(&scale);
    let x = chol.solve(&rhs).component_mul(&scale);

    if x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err(singular(operation, "non-finite solution".to_string()))
    }
}

/// Solve the Marquardt-damped step `(jtj + lambda * diag(jtj)) delta = -gradient`.
///
/// Diagonal entries are floored so a parameter without influence yields a zero
/// step component instead of a failure.
pub fn solve_damped_step<const D: usize>(
    jtj: &SMatrix<f64, D, D>,
    gradient: &SVector<f64, D>,
    lambda: f64,
) -> LpplResult<SVector<f64, D>> {
    let mut damped = *jtj;
    for i in 0..D {
        let d = jtj[(i, i)].max(DIAGONAL_FLOOR);
        damped[(i, i)] = d * (1.0 + lambda);
    }
    solve_spd(&damped, &(-gradient), "damped_step")
}

/// Least-squares coefficients for the four LPPL regressors.
///
/// `rows` yields one regressor row `[1, f, f cos, f sin]` together with the
/// observed value; the normal equations are accumulated in one pass.
pub fn lppl_normal_equations<I>(rows: I) -> LpplResult<[f64; 4]>
where
    I: IntoIterator<Item = ([f64; 4], f64)>,
{
    let mut xtx = Matrix4::<f64>::zeros();
    let mut xty = Vector4::<f64>::zeros();

    for (row, y) in rows {
        let x = Vector4::from(row);
        xtx += x * x.transpose();
        xty += x * y;
    }

    let beta = solve_spd(&xtx, &xty, "lppl_linear_coefficients")?;
    Ok([beta[0], beta[1], beta[2], beta[3]])
}
