//! Squared weighted correlation shares.

use super::{ImportanceMethod, ImportanceResult};
use crate::regression::RegressionModel;

/// Importance from squared weighted Pearson correlations with the outcome.
///
/// `importance_j = 100 · r_j² / Σ r_i²`; the signed `r_j` is kept for direction.
pub fn correlation_importance(model: &RegressionModel) -> ImportanceResult {
    let names = model.driver_names();
    let r: Vec<f64> = (0..model.k()).map(|j| model.outcome_correlation(j)).collect();
    let r2 = r.iter().map(|v| v * v).collect();
    ImportanceResult::from_raw(ImportanceMethod::Correlation, names, r2).with_signed(names, r)
}
