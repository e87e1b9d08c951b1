//! Johnson's relative weights.
//!
//! The weighted-standardized drivers are replaced by their closest
//! orthonormal counterpart `Z = U Vᵀ`, obtained from the singular value
//! decomposition `X̃ = U Σ Vᵀ`. The outcome is regressed on `Z`, which is a
//! plain projection since `Zᵀ Z = I`, and the loadings `Λ = V Σ Vᵀ` that
//! relate `Z` back to `X̃` (`X̃ = Z Λ`) share each orthogonal contribution
//! among the original drivers:
//!
//! ```text
//! RW_j = Σ_i (Λ_ji · β_Zi)²
//! ```
//!
//! Because every row of `Λ` has unit norm on the correlation scale, the raw
//! weights add up to the model R². They are rescaled to the model's R² to
//! remove floating point drift, so all weights are non-negative and the
//! percentage shares sum to 100 however collinear the drivers are.

use super::{ImportanceMethod, ImportanceResult};
use crate::error::{KeyDriverError, Result};
use crate::regression::RegressionModel;
use crate::types::AnalysisDataset;
use crate::utils::{to_dmatrix, weighted_standardize};
use nalgebra::{DMatrix, DVector};
use ndarray::{Axis, concatenate};
use tracing::debug;

/// Relative weight importance for the drivers of `model`.
///
/// `data` must be the dataset `model` was fitted on.
pub fn relative_weights(
    data: &AnalysisDataset,
    model: &RegressionModel,
) -> Result<ImportanceResult> {
    let k = data.k();
    let w = data.weights_or_unit();
    let outcome = data.outcome().insert_axis(Axis(1));
    let augmented = concatenate(Axis(1), &[data.drivers(), outcome])?;
    let (z, _, _) = weighted_standardize(&augmented.view(), &w.view());

    let x = to_dmatrix(&z.slice(ndarray::s![.., ..k]));
    let y = DVector::from_iterator(z.nrows(), z.column(k).iter().copied());

    let svd = x.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => {
            return Err(KeyDriverError::Numerical(
                "singular value decomposition of the driver matrix failed".to_string(),
            ));
        }
    };
    let v = v_t.transpose();

    let beta_z = &v * (u.transpose() * &y);
    let lambda = &v * DMatrix::from_diagonal(&svd.singular_values) * &v_t;

    let raw: Vec<f64> = (0..k)
        .map(|j| {
            (0..k)
                .map(|i| (lambda[(j, i)] * beta_z[i]).powi(2))
                .sum::<f64>()
        })
        .collect();

    let total: f64 = raw.iter().sum();
    let r_squared = model.r_squared();
    let weights = if total > 0.0 {
        raw.iter().map(|rw| rw * r_squared / total).collect()
    } else {
        raw
    };
    debug!(raw_total = total, r_squared, "Computed relative weights");

    Ok(ImportanceResult::from_raw(
        ImportanceMethod::RelativeWeights,
        model.driver_names(),
        weights,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisLimits;
    use crate::regression::ModelFitter;
    use ndarray::{Array1, Array2};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    fn fit(x: Array2<f64>, y: Array1<f64>) -> (AnalysisDataset, RegressionModel) {
        let names = (0..x.ncols()).map(|j| format!("x{}", j + 1)).collect();
        let data = AnalysisDataset::from_parts("y".into(), names, y, x, None).unwrap();
        let model = ModelFitter::new(&AnalysisLimits::default()).fit(&data).unwrap();
        (data, model)
    }

    #[test]
    fn test_orthogonal_drivers_get_squared_correlations() {
        // Centered, mutually orthogonal columns.
        let x = ndarray::array![
            [1.0, 1.0, 1.0],
            [1.0, -1.0, -1.0],
            [-1.0, 1.0, -1.0],
            [-1.0, -1.0, 1.0],
            [1.0, 1.0, 1.0],
            [1.0, -1.0, -1.0],
            [-1.0, 1.0, -1.0],
            [-1.0, -1.0, 1.0],
        ];
        let y = ndarray::array![3.1, 0.9, -0.8, -3.0, 2.9, 1.1, -1.2, -3.2];
        let (data, model) = fit(x, y);
        let result = relative_weights(&data, &model).unwrap();
        for j in 0..3 {
            let r = model.outcome_correlation(j);
            assert!((result.raw.values()[j] - r * r).abs() < 1e-10);
        }
    }

    #[test]
    fn test_collinear_weights_are_non_negative_and_sum_to_r2() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let n = 150;
        let base: Vec<f64> = (0..n).map(|_| normal.sample(&mut rng)).collect();
        let x = Array2::from_shape_fn((n, 4), |(i, j)| match j {
            0 => base[i],
            1 => base[i] + 0.1 * normal.sample(&mut rng),
            _ => normal.sample(&mut rng),
        });
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|r| r[0] - 0.5 * r[1] + 0.3 * r[2] + normal.sample(&mut rng))
            .collect();
        let (data, model) = fit(x, y);
        let result = relative_weights(&data, &model).unwrap();

        assert!(result.raw.values().iter().all(|&rw| rw >= 0.0));
        assert!((result.raw.sum() - model.r_squared()).abs() < 1e-10);
        assert!((result.percent.sum() - 100.0).abs() < 1e-6);
    }
}
