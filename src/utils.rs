//! Weighted moments, standardization and ranking helpers.
//!
//! Every method in the crate uses the same weighting convention: moments are
//! normalized weighted moments, `Σ w·f(x) / Σ w`, with unit weights when the
//! analysis is unweighted. Correlations and standardized coefficients are
//! therefore identical whichever divisor a caller would prefer.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Weighted arithmetic mean.
pub fn weighted_mean(x: &ArrayView1<f64>, w: &ArrayView1<f64>) -> f64 {
    let total = w.sum();
    if total <= 0.0 {
        return f64::NAN;
    }
    x.dot(w) / total
}

/// Normalized weighted variance, `Σ w (x - μ)² / Σ w`.
pub fn weighted_variance(x: &ArrayView1<f64>, w: &ArrayView1<f64>) -> f64 {
    let mean = weighted_mean(x, w);
    let total = w.sum();
    x.iter()
        .zip(w.iter())
        .map(|(&xi, &wi)| wi * (xi - mean).powi(2))
        .sum::<f64>()
        / total
}

/// Weighted standard deviation.
pub fn weighted_std(x: &ArrayView1<f64>, w: &ArrayView1<f64>) -> f64 {
    weighted_variance(x, w).sqrt()
}

/// Weighted Pearson correlation between two columns.
pub fn weighted_correlation(x: &ArrayView1<f64>, y: &ArrayView1<f64>, w: &ArrayView1<f64>) -> f64 {
    let mx = weighted_mean(x, w);
    let my = weighted_mean(y, w);
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for ((&xi, &yi), &wi) in x.iter().zip(y.iter()).zip(w.iter()) {
        let dx = xi - mx;
        let dy = yi - my;
        sxy += wi * dx * dy;
        sxx += wi * dx * dx;
        syy += wi * dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return 0.0;
    }
    sxy / (sxx * syy).sqrt()
}

/// Column-wise weighted standardization scaled for cross products.
///
/// Row `i` of the result is `sqrt(w_i / Σw) · (x_i - μ) / σ`, so that
/// `Zᵀ Z` is the weighted correlation matrix of the columns. Returns the
/// scaled matrix with the column means and standard deviations.
pub fn weighted_standardize(
    data: &ArrayView2<f64>,
    w: &ArrayView1<f64>,
) -> (Array2<f64>, Array1<f64>, Array1<f64>) {
    let total = w.sum();
    let means: Array1<f64> = data
        .axis_iter(Axis(1))
        .map(|col| weighted_mean(&col, w))
        .collect();
    let stds: Array1<f64> = data
        .axis_iter(Axis(1))
        .map(|col| weighted_std(&col, w))
        .collect();

    let mut z = data.to_owned();
    for (mut row, &wi) in z.axis_iter_mut(Axis(0)).zip(w.iter()) {
        let scale = (wi / total).sqrt();
        for ((v, &m), &s) in row.iter_mut().zip(means.iter()).zip(stds.iter()) {
            *v = if s > 0.0 { scale * (*v - m) / s } else { 0.0 };
        }
    }
    (z, means, stds)
}

/// Copy an ndarray matrix into a nalgebra matrix.
pub fn to_dmatrix(a: &ArrayView2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Express non-negative contributions as percentages of their total.
///
/// A zero total yields all zeros.
pub fn to_percentages(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| 100.0 * v / total).collect()
}

/// Competition ranks ("1224"), highest score first.
///
/// Scores within `1e-12` of each other share the better rank.
pub fn competition_ranks(scores: &[f64]) -> Vec<usize> {
    scores
        .iter()
        .map(|&s| 1 + scores.iter().filter(|&&other| other > s + 1e-12).count())
        .collect()
}
