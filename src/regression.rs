//! Weighted least squares and the subset R² primitive.
//!
//! The fitter works on the weighted correlation scale. Once the augmented
//! correlation matrix of drivers and outcome is known, the R² of any
//! regression among those columns is a small dense solve, so every subset
//! fit is a pure function of an immutable matrix. That is what lets the
//! Shapley engine call [`RegressionModel::fit_r2`] from many threads at once.

use crate::config::AnalysisLimits;
use crate::error::{KeyDriverError, Result};
use crate::types::AnalysisDataset;
use crate::utils::weighted_standardize;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ndarray::{Array1, ArrayView1, Axis, concatenate};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Eigenvector loading above which a driver is implicated in a null direction.
const ALIAS_LOADING: f64 = 1e-3;

/// Solve the symmetric positive definite system `a x = b`.
///
/// Falls back to an SVD least-squares solve when the Cholesky factorization
/// breaks down.
fn solve_spd(a: DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    match a.clone().cholesky() {
        Some(chol) => Ok(chol.solve(b)),
        None => a
            .svd(true, true)
            .solve(b, 1e-12)
            .map_err(|e| KeyDriverError::Numerical(format!("SVD solve failed: {}", e))),
    }
}

/// Weighted correlation matrix of the drivers with the outcome appended as
/// the last row and column.
#[derive(Debug, Clone)]
struct CorrelationSystem {
    corr: DMatrix<f64>,
    k: usize,
}

impl CorrelationSystem {
    fn outcome_index(&self) -> usize {
        self.k
    }

    /// R² of column `target` regressed on the columns in `predictors`.
    fn r2(&self, target: usize, predictors: &[usize]) -> Result<f64> {
        let m = predictors.len();
        if m == 0 {
            return Ok(0.0);
        }
        let r_ss = DMatrix::from_fn(m, m, |a, b| self.corr[(predictors[a], predictors[b])]);
        let r_sy = DVector::from_fn(m, |a, _| self.corr[(predictors[a], target)]);
        let beta = solve_spd(r_ss, &r_sy)?;
        Ok(r_sy.dot(&beta).clamp(0.0, 1.0))
    }
}

/// Indices of the set bits of `mask`.
pub(crate) fn mask_indices(mask: u32) -> Vec<usize> {
    (0..u32::BITS as usize)
        .filter(|&j| mask & (1 << j) != 0)
        .collect()
}

/// A fitted weighted least squares model with intercept.
#[derive(Debug)]
pub struct RegressionModel {
    driver_names: Vec<String>,
    n: usize,
    coefficients: Array1<f64>,
    standardized: Array1<f64>,
    intercept: f64,
    r_squared: f64,
    adj_r_squared: f64,
    f_stat: f64,
    f_p_value: f64,
    rmse: f64,
    system: CorrelationSystem,
    fits: AtomicUsize,
}

impl RegressionModel {
    pub fn driver_names(&self) -> &[String] {
        &self.driver_names
    }

    /// Number of drivers.
    pub fn k(&self) -> usize {
        self.driver_names.len()
    }

    /// Number of respondents the model was fitted on.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Coefficients in the drivers' own units.
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    /// Coefficients for weighted-standardized drivers and outcome.
    pub fn standardized_coefficients(&self) -> ArrayView1<'_, f64> {
        self.standardized.view()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn r_squared(&self) -> f64 {
        self.r_squared
    }

    pub fn adj_r_squared(&self) -> f64 {
        self.adj_r_squared
    }

    pub fn f_stat(&self) -> f64 {
        self.f_stat
    }

    /// Upper-tail probability of the F statistic.
    pub fn f_p_value(&self) -> f64 {
        self.f_p_value
    }

    /// Weighted root mean squared residual.
    pub fn rmse(&self) -> f64 {
        self.rmse
    }

    /// Weighted correlation between driver `j` and the outcome.
    pub fn outcome_correlation(&self, j: usize) -> f64 {
        self.system.corr[(j, self.system.outcome_index())]
    }

    /// Weighted correlation between two drivers.
    pub fn driver_correlation(&self, i: usize, j: usize) -> f64 {
        self.system.corr[(i, j)]
    }

    /// Bitmask selecting every driver.
    pub fn full_mask(&self) -> u32 {
        if self.k() >= u32::BITS as usize {
            u32::MAX
        } else {
            (1u32 << self.k()) - 1
        }
    }

    /// Weighted R² of the outcome regressed on the drivers in `subset`.
    ///
    /// The empty subset has R² = 0. Takes `&self` and touches nothing but an
    /// atomic fit counter, so it is safe to call concurrently.
    pub fn fit_r2(&self, subset: &[usize]) -> Result<f64> {
        if subset.is_empty() {
            return Ok(0.0);
        }
        self.fits.fetch_add(1, Ordering::Relaxed);
        self.system.r2(self.system.outcome_index(), subset)
    }

    /// [`fit_r2`](Self::fit_r2) for a driver bitmask.
    pub fn fit_r2_mask(&self, mask: u32) -> Result<f64> {
        self.fit_r2(&mask_indices(mask))
    }

    /// Weighted R² of driver `target` regressed on the drivers in `predictors`.
    ///
    /// `target` is ignored if it also appears among the predictors.
    pub fn driver_r2(&self, target: usize, predictors: &[usize]) -> Result<f64> {
        let predictors: Vec<usize> = predictors.iter().copied().filter(|&p| p != target).collect();
        if predictors.is_empty() {
            return Ok(0.0);
        }
        self.fits.fetch_add(1, Ordering::Relaxed);
        self.system.r2(target, &predictors)
    }

    /// Number of non-empty subset regressions run against this model.
    pub fn fit_count(&self) -> usize {
        self.fits.load(Ordering::Relaxed)
    }
}

/// Fits [`RegressionModel`]s.
#[derive(Debug, Clone)]
pub struct ModelFitter<'a> {
    limits: &'a AnalysisLimits,
}

impl<'a> ModelFitter<'a> {
    pub fn new(limits: &'a AnalysisLimits) -> Self {
        Self { limits }
    }

    /// Fit the outcome on all drivers.
    pub fn fit(&self, data: &AnalysisDataset) -> Result<RegressionModel> {
        let n = data.n();
        let k = data.k();
        if n <= k + 1 {
            return Err(KeyDriverError::InsufficientData { n, required: k + 2 });
        }

        let w = data.weights_or_unit();
        let outcome = data.outcome().insert_axis(Axis(1));
        let augmented = concatenate(Axis(1), &[data.drivers(), outcome])?;
        let (z, means, stds) = weighted_standardize(&augmented.view(), &w.view());
        let cross = z.t().dot(&z);
        let mut corr = DMatrix::from_fn(k + 1, k + 1, |i, j| cross[[i, j]]);
        for i in 0..=k {
            corr[(i, i)] = 1.0;
        }

        self.check_aliasing(&corr, data.driver_names())?;

        let system = CorrelationSystem { corr, k };
        let r_xx = DMatrix::from_fn(k, k, |i, j| system.corr[(i, j)]);
        let r_xy = DVector::from_fn(k, |i, _| system.corr[(i, k)]);
        let beta_std = solve_spd(r_xx, &r_xy)?;
        let r_squared = r_xy.dot(&beta_std).clamp(0.0, 1.0);

        let sd_y = stds[k];
        let mean_y = means[k];
        let coefficients: Array1<f64> = (0..k).map(|j| beta_std[j] * sd_y / stds[j]).collect();
        let intercept = mean_y
            - coefficients
                .iter()
                .zip(means.iter())
                .map(|(b, m)| b * m)
                .sum::<f64>();

        let fitted = data.drivers().dot(&coefficients) + intercept;
        let residuals = &data.outcome() - &fitted;
        let rmse = (residuals.mapv(|e| e * e).dot(&w) / w.sum()).sqrt();

        let df_model = k as f64;
        let df_resid = (n - k - 1) as f64;
        let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df_resid;
        let (f_stat, f_p_value) = if r_squared < 1.0 {
            let f = (r_squared / df_model) / ((1.0 - r_squared) / df_resid);
            let dist = FisherSnedecor::new(df_model, df_resid)
                .map_err(|e| KeyDriverError::Numerical(e.to_string()))?;
            (f, dist.sf(f))
        } else {
            (f64::INFINITY, 0.0)
        };

        debug!(n, k, r_squared, f_stat, "Fitted weighted regression");

        Ok(RegressionModel {
            driver_names: data.driver_names().to_vec(),
            n,
            coefficients,
            standardized: beta_std.iter().copied().collect(),
            intercept,
            r_squared,
            adj_r_squared,
            f_stat,
            f_p_value,
            rmse,
            system,
            fits: AtomicUsize::new(0),
        })
    }

    /// Reject designs whose driver correlation matrix is (nearly) singular,
    /// naming the drivers that load on the null directions.
    fn check_aliasing(&self, corr: &DMatrix<f64>, names: &[String]) -> Result<()> {
        let k = names.len();
        let r_xx = DMatrix::from_fn(k, k, |i, j| corr[(i, j)]);
        let eigen = SymmetricEigen::new(r_xx);
        let lambda_max = eigen.eigenvalues.iter().copied().fold(0.0_f64, f64::max);
        let threshold = self.limits.collinearity_tolerance * lambda_max.max(1.0);

        let mut implicated = vec![false; k];
        for (idx, &lambda) in eigen.eigenvalues.iter().enumerate() {
            if lambda > threshold {
                continue;
            }
            for (j, flag) in implicated.iter_mut().enumerate() {
                if eigen.eigenvectors[(j, idx)].abs() > ALIAS_LOADING {
                    *flag = true;
                }
            }
        }

        let aliased: Vec<String> = names
            .iter()
            .zip(&implicated)
            .filter(|(_, flag)| **flag)
            .map(|(name, _)| name.clone())
            .collect();
        if aliased.is_empty() {
            Ok(())
        } else {
            Err(KeyDriverError::AliasedCoefficients(aliased))
        }
    }
}
