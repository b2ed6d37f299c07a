//! Ridge-regularised least squares.
//!
//! The ridge baseline solves
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2 + λ Σ_{j ≥ 1} β_j^2
//! ```
//!
//! by stacking `sqrt(λ) * I` under the design matrix (leaving the intercept
//! column unpenalised) and solving the resulting ordinary least squares problem
//! with SVD. Feature counts are small (at most a few dozen columns), so the
//! augmented matrix stays cheap.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Progressively looser tolerances for near-collinear feature columns
    // (lat, lat², lat·lon and friends).
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Ridge solve. Column 0 of `x` is treated as the intercept and not penalised.
pub fn solve_ridge(x: &DMatrix<f64>, y: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    if lambda <= 0.0 {
        return solve_least_squares(x, y);
    }

    let (n, p) = x.shape();
    let penalised = p.saturating_sub(1);
    let mut aug = DMatrix::<f64>::zeros(n + penalised, p);
    aug.view_mut((0, 0), (n, p)).copy_from(x);
    let root = lambda.sqrt();
    for j in 0..penalised {
        aug[(n + j, j + 1)] = root;
    }

    let mut y_aug = DVector::<f64>::zeros(n + penalised);
    y_aug.rows_mut(0, n).copy_from(y);

    solve_least_squares(&aug, &y_aug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn ridge_shrinks_slope_but_not_intercept() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, -1.5, 1.0, -0.5, 1.0, 0.5, 1.0, 1.5]);
        let y = DVector::from_row_slice(&[7.0, 9.0, 11.0, 13.0]);

        let ols = solve_ridge(&x, &y, 0.0).unwrap();
        let ridge = solve_ridge(&x, &y, 5.0).unwrap();

        assert!((ols[1] - 2.0).abs() < 1e-9);
        assert!(ridge[1].abs() < ols[1].abs());
        // Centred column: the intercept is the mean regardless of λ.
        assert!((ridge[0] - 10.0).abs() < 1e-9);
    }
}
