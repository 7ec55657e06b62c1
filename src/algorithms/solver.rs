// src/algorithms/solver.rs

//! Weighted least squares with the efficiency constraint built in.
//!
//! Minimizes `sum_k w_k (y_k - sum_j z_kj phi_j)^2` subject to
//! `sum_j phi_j = total` by substituting `phi_M = total - sum_{j<M} phi_j`,
//! which turns the problem into an unconstrained regression on
//! `z_kj - z_kM` with targets `y_k - z_kM * total`.

use crate::core::AttributorError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
#[cfg(not(feature = "linalg"))]
use tracing::warn;

/// `masks` is coalitions x features (0/1), `targets` the link-space
/// coalition values minus the base value.
pub fn solve_constrained(
    masks: ArrayView2<'_, f64>,
    targets: ArrayView1<'_, f64>,
    weights: ArrayView1<'_, f64>,
    total: f64,
) -> Result<Array1<f64>, AttributorError> {
    let m = masks.ncols();
    if masks.nrows() != targets.len() || masks.nrows() != weights.len() {
        return Err(AttributorError::Solver(format!(
            "{} coalitions but {} targets and {} weights",
            masks.nrows(),
            targets.len(),
            weights.len()
        )));
    }
    match m {
        0 => return Ok(Array1::zeros(0)),
        1 => return Ok(Array1::from_elem(1, total)),
        _ => {}
    }

    let last = masks.column(m - 1);
    let x: Array2<f64> = &masks.slice(ndarray::s![.., ..m - 1]) - &last.insert_axis(Axis(1));
    let y: Array1<f64> = &targets - &(&last * total);

    let reduced = solve_weighted(x.view(), y.view(), weights)?;

    let mut phi = Array1::zeros(m);
    phi.slice_mut(ndarray::s![..m - 1]).assign(&reduced);
    phi[m - 1] = total - reduced.sum();
    Ok(phi)
}

#[cfg(feature = "linalg")]
fn solve_weighted(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    weights: ArrayView1<'_, f64>,
) -> Result<Array1<f64>, AttributorError> {
    use ndarray_linalg::LeastSquaresSvd;

    let sqrt_w = weights.mapv(f64::sqrt);
    let x_w = &x * &sqrt_w.view().insert_axis(Axis(1));
    let y_w = &y * &sqrt_w;
    let result = x_w
        .least_squares(&y_w)
        .map_err(|e| AttributorError::Solver(format!("SVD least squares failed: {}", e)))?;
    Ok(result.solution)
}

#[cfg(not(feature = "linalg"))]
fn solve_weighted(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    weights: ArrayView1<'_, f64>,
) -> Result<Array1<f64>, AttributorError> {
    let wx = &x * &weights.insert_axis(Axis(1));
    let normal = wx.t().dot(&x);
    let rhs = wx.t().dot(&y);

    if let Some(solution) = gaussian_elimination(normal.clone(), rhs.clone()) {
        return Ok(solution);
    }

    // Too few distinct coalitions for a unique solution: take the minimum
    // norm direction through a small ridge term.
    let n = normal.nrows();
    let scale = (normal.diag().sum() / n as f64).max(f64::MIN_POSITIVE);
    let mut ridged = normal;
    ridged.diag_mut().mapv_inplace(|d| d + 1e-8 * scale);
    warn!(
        coefficients = n,
        "normal matrix is singular, solving with ridge regularization"
    );
    gaussian_elimination(ridged, rhs).ok_or_else(|| {
        AttributorError::Solver(format!(
            "normal matrix of {} coefficients is singular; increase the number of coalition samples",
            n
        ))
    })
}

/// Solves `a * x = b` with partial pivoting; `None` when `a` is singular.
#[cfg(not(feature = "linalg"))]
fn gaussian_elimination(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    let tolerance = 1e-12 * a.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(1e-300);

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() <= tolerance {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
            }
            b.swap(pivot, col);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn recovers_an_exactly_additive_game() {
        // v(S) = 1*z0 + 2*z1 + 3*z2, all proper coalitions
        let masks = array![
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 1.0, 0.0],
            [1.0, 0.0, 1.0],
            [0.0, 1.0, 1.0]
        ];
        let targets = masks.dot(&array![1.0, 2.0, 3.0]);
        let weights = Array1::from_elem(6, 1.0 / 6.0);
        let phi = solve_constrained(masks.view(), targets.view(), weights.view(), 6.0).unwrap();
        assert_abs_diff_eq!(phi, array![1.0, 2.0, 3.0], epsilon = 1e-10);
    }

    #[test]
    fn efficiency_holds_even_for_a_non_additive_game() {
        let masks = array![[1.0, 0.0], [0.0, 1.0]];
        let targets = array![0.3, -0.1];
        let weights = array![0.5, 0.5];
        let phi = solve_constrained(masks.view(), targets.view(), weights.view(), 2.0).unwrap();
        assert_abs_diff_eq!(phi.sum(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn trivial_sizes() {
        let empty = Array2::<f64>::zeros((0, 1));
        let phi = solve_constrained(
            empty.view(),
            Array1::zeros(0).view(),
            Array1::zeros(0).view(),
            4.0,
        )
        .unwrap();
        assert_eq!(phi, array![4.0]);
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let masks = array![[1.0, 0.0]];
        let result =
            solve_constrained(masks.view(), array![1.0, 2.0].view(), array![1.0].view(), 1.0);
        assert!(matches!(result, Err(AttributorError::Solver(_))));
    }

    #[cfg(not(feature = "linalg"))]
    #[test]
    fn gaussian_elimination_detects_singular_systems() {
        assert!(gaussian_elimination(array![[1.0, 2.0], [2.0, 4.0]], array![1.0, 2.0]).is_none());
        let x = gaussian_elimination(array![[0.0, 1.0], [2.0, 0.0]], array![3.0, 4.0]).unwrap();
        assert_abs_diff_eq!(x, array![2.0, 3.0], epsilon = 1e-12);
    }
}
