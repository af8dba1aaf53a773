//! Dense-matrix glue between `ndarray` and `faer`.
//!
//! `ndarray` gives us storage, slicing and products; `faer` does the
//! factorization. The few pieces both models need beyond that live here:
//!
//! - dataset conversion and validation
//! - squared Euclidean distance
//! - scatter/covariance accumulation
//! - inversion of a symmetric positive-definite matrix, with its determinant
//!
//! # SPD inversion
//!
//! Covariances are symmetric positive definite when they are usable at all, so
//! we factor with `faer`'s Cholesky (`llt`), `Σ = L Lᵀ`, instead of a general LU:
//!
//! ```text
//! ln |Σ| = 2 Σᵢ ln Lᵢᵢ
//! Σ⁻¹    = solve(L Lᵀ, I)
//! ```
//!
//! A non-positive pivot means the matrix is singular or indefinite, which is
//! exactly the case the mixture model has to surface instead of producing NaN.

use crate::error::{Error, Result};
use faer::prelude::*;
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Relative pivot floor for the Cholesky factorization.
///
/// A squared pivot `Lᵢᵢ²` below `PIVOT_TOL * max|Σᵢᵢ|` is treated as zero.
pub const PIVOT_TOL: f64 = 1e-12;

/// Inverse and determinant of a symmetric positive-definite matrix.
#[derive(Debug, Clone)]
pub struct SpdInverse {
    /// `Σ⁻¹`.
    pub inverse: Array2<f64>,
    /// `|Σ|` (of the matrix itself, not of its inverse). Saturates to `0` or
    /// `inf` outside the f64 range; densities use `log_determinant`.
    pub determinant: f64,
    /// `ln |Σ|`, finite even when `determinant` saturates.
    pub log_determinant: f64,
}

/// Build an N×D dataset from row vectors.
pub fn dataset_from_rows(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    if rows.is_empty() {
        return Err(Error::EmptyInput);
    }

    let n = rows.len();
    let d = rows[0].len();

    let mut flat: Vec<f64> = Vec::with_capacity(n * d);
    for row in rows {
        if row.len() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: row.len(),
            });
        }
        flat.extend_from_slice(row);
    }

    let data = Array2::from_shape_vec((n, d), flat).map_err(|_| Error::DimensionMismatch {
        expected: n * d,
        found: rows.iter().map(Vec::len).sum(),
    })?;
    validate_dataset(&data)?;
    Ok(data)
}

/// Reject empty or non-finite datasets.
pub fn validate_dataset(data: &Array2<f64>) -> Result<()> {
    if data.nrows() == 0 || data.ncols() == 0 {
        return Err(Error::EmptyInput);
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(Error::NonFiniteInput);
    }
    Ok(())
}

/// Reject a query point of the wrong length or with non-finite entries.
pub fn validate_point(point: &ArrayView1<'_, f64>, dim: usize) -> Result<()> {
    if point.len() != dim {
        return Err(Error::DimensionMismatch {
            expected: dim,
            found: point.len(),
        });
    }
    if point.iter().any(|v| !v.is_finite()) {
        return Err(Error::NonFiniteInput);
    }
    Ok(())
}

/// Squared Euclidean distance.
pub fn squared_distance(a: &ArrayView1<'_, f64>, b: &ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Add `weight · (x − μ)(x − μ)ᵀ` to `acc`.
pub fn add_weighted_outer(
    acc: &mut Array2<f64>,
    x: &ArrayView1<'_, f64>,
    mean: &ArrayView1<'_, f64>,
    weight: f64,
) {
    let diff = x - mean;
    let d = diff.len();
    for r in 0..d {
        let wr = weight * diff[r];
        for c in 0..d {
            acc[[r, c]] += wr * diff[c];
        }
    }
}

/// Covariance of `rows` around `mean`, normalized by the row count.
///
/// Returns a zero matrix when `rows` is empty; callers check emptiness first.
pub fn scatter(data: &Array2<f64>, rows: &[usize], mean: &ArrayView1<'_, f64>) -> Array2<f64> {
    let d = data.ncols();
    let mut cov = Array2::zeros((d, d));
    if rows.is_empty() {
        return cov;
    }
    let w = 1.0 / rows.len() as f64;
    for &i in rows {
        add_weighted_outer(&mut cov, &data.row(i), mean, w);
    }
    cov
}

/// Covariance of the whole dataset around its column means.
pub fn pooled_covariance(data: &Array2<f64>) -> Array2<f64> {
    let mean: Array1<f64> = data
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(data.ncols()));
    let rows: Vec<usize> = (0..data.nrows()).collect();
    scatter(data, &rows, &mean.view())
}

/// Copy an `ndarray` matrix into a `faer` one.
fn to_faer(a: &ArrayView2<'_, f64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Copy a `faer` matrix back into `ndarray`.
fn from_faer(m: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Invert a symmetric positive-definite matrix and report its determinant.
///
/// Returns `None` for non-square or non-finite input, and when the Cholesky
/// factorization fails or has a pivot `Lᵢᵢ²` below the relative floor.
/// Singularity is judged on the pivots alone: `determinant` saturates to
/// `0` or `inf` for well-conditioned matrices of extreme scale, while
/// `log_determinant` stays finite.
pub fn invert_spd(a: &ArrayView2<'_, f64>) -> Option<SpdInverse> {
    let d = a.nrows();
    if d == 0 || a.ncols() != d || a.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let scale = (0..d).map(|i| a[[i, i]].abs()).fold(0.0, f64::max);
    if scale == 0.0 {
        return None;
    }
    let floor = PIVOT_TOL * scale;

    let llt = to_faer(a).llt(Side::Lower).ok()?;
    let l = llt.L();
    let mut log_determinant = 0.0;
    for i in 0..d {
        let pivot = l[(i, i)];
        if pivot.is_nan() || pivot * pivot <= floor {
            return None;
        }
        log_determinant += 2.0 * pivot.ln();
    }
    if !log_determinant.is_finite() {
        return None;
    }

    let identity = Mat::<f64>::identity(d, d);
    let mut inverse = from_faer(llt.solve(&identity).as_ref());
    // Round-off leaves tiny asymmetries; the quadratic form assumes symmetry.
    for r in 0..d {
        for c in (r + 1)..d {
            let avg = 0.5 * (inverse[[r, c]] + inverse[[c, r]]);
            inverse[[r, c]] = avg;
            inverse[[c, r]] = avg;
        }
    }
    if inverse.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(SpdInverse {
        inverse,
        determinant: log_determinant.exp(),
        log_determinant,
    })
}

/// `(x − μ)ᵀ P (x − μ)` for a precision matrix `P`.
pub fn mahalanobis_sq(
    x: &ArrayView1<'_, f64>,
    mean: &ArrayView1<'_, f64>,
    precision: &Array2<f64>,
) -> f64 {
    let diff = x - mean;
    diff.dot(&precision.dot(&diff))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_dataset_from_rows() {
        let data = dataset_from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(data.dim(), (2, 2));
        assert_eq!(data[[1, 0]], 3.0);
    }

    #[test]
    fn test_dataset_from_rows_rejects_ragged() {
        let err = dataset_from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_validate_dataset() {
        assert_eq!(
            validate_dataset(&Array2::zeros((0, 3))),
            Err(Error::EmptyInput)
        );
        assert_eq!(
            validate_dataset(&Array2::zeros((3, 0))),
            Err(Error::EmptyInput)
        );
        assert_eq!(
            validate_dataset(&array![[1.0, f64::NAN]]),
            Err(Error::NonFiniteInput)
        );
        assert!(validate_dataset(&array![[1.0, 2.0]]).is_ok());
    }

    #[test]
    fn test_squared_distance() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert_eq!(squared_distance(&a.view(), &b.view()), 25.0);
    }

    #[test]
    fn test_scatter_matches_hand_computation() {
        let data = array![[0.0, 0.0], [2.0, 0.0], [0.0, 2.0], [2.0, 2.0]];
        let mean = array![1.0, 1.0];
        let cov = scatter(&data, &[0, 1, 2, 3], &mean.view());
        assert!((cov[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((cov[[1, 1]] - 1.0).abs() < 1e-12);
        assert!(cov[[0, 1]].abs() < 1e-12);
    }

    #[test]
    fn test_invert_spd_identity_scaled() {
        let a = array![[4.0, 0.0], [0.0, 9.0]];
        let inv = invert_spd(&a.view()).unwrap();
        assert!((inv.determinant - 36.0).abs() < 1e-9);
        assert!((inv.inverse[[0, 0]] - 0.25).abs() < 1e-12);
        assert!((inv.inverse[[1, 1]] - 1.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_invert_spd_product_is_identity() {
        let a = array![[4.0, 2.0, 0.6], [2.0, 5.0, 1.0], [0.6, 1.0, 3.0]];
        let inv = invert_spd(&a.view()).unwrap();
        let prod = a.dot(&inv.inverse);
        let eye = Array2::<f64>::eye(3);
        for (p, e) in prod.iter().zip(eye.iter()) {
            assert!((p - e).abs() < 1e-10);
        }
        // det by cofactor expansion
        let det = 4.0 * (5.0 * 3.0 - 1.0 * 1.0) - 2.0 * (2.0 * 3.0 - 1.0 * 0.6)
            + 0.6 * (2.0 * 1.0 - 5.0 * 0.6);
        assert!((inv.determinant - det).abs() < 1e-9);
    }

    #[test]
    fn test_invert_spd_rejects_singular() {
        // Rank one.
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(invert_spd(&a.view()).is_none());
        assert!(invert_spd(&Array2::<f64>::zeros((2, 2)).view()).is_none());
    }

    #[test]
    fn test_invert_spd_rejects_indefinite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(invert_spd(&a.view()).is_none());
    }

    #[test]
    fn test_invert_spd_extreme_scale_identity() {
        for (c, d) in [(1e-4, 100), (1e9, 40)] {
            let a = Array2::<f64>::eye(d) * c;
            let inv = invert_spd(&a.view()).unwrap();
            let expected = d as f64 * f64::ln(c);
            assert!(inv.log_determinant.is_finite());
            assert!((inv.log_determinant - expected).abs() < 1e-9 * expected.abs());
            assert!((inv.inverse[[0, 0]] - 1.0 / c).abs() < 1e-9 / c);
            assert!(inv.inverse[[0, 1]].abs() < 1e-9 / c);
        }
    }

    #[test]
    fn test_invert_spd_rejects_near_singular_at_any_scale() {
        for c in [1e-6, 1.0, 1e8] {
            let a = array![[1.0, 1.0], [1.0, 1.0 + 1e-14]] * c;
            assert!(invert_spd(&a.view()).is_none());
        }
    }

    #[test]
    fn test_mahalanobis_sq() {
        let p = array![[0.25, 0.0], [0.0, 1.0]];
        let x = array![2.0, 1.0];
        let mu = array![0.0, 0.0];
        assert!((mahalanobis_sq(&x.view(), &mu.view(), &p) - 2.0).abs() < 1e-12);
    }
}
