//! Standardized regression coefficient shares.
//!
//! Under strong collinearity beta weights can be unstable and may take an
//! unexpected sign (suppressor effects). That is a property of the method,
//! not an error; the relative weights and Shapley methods are the stable
//! alternatives.

use super::{ImportanceMethod, ImportanceResult};
use crate::regression::RegressionModel;

/// Importance from absolute standardized coefficients.
///
/// `importance_j = 100 · |β*_j| / Σ |β*_i|`; the signed `β*_j` is kept.
pub fn beta_importance(model: &RegressionModel) -> ImportanceResult {
    let names = model.driver_names();
    let beta: Vec<f64> = model.standardized_coefficients().to_vec();
    let abs = beta.iter().map(|b| b.abs()).collect();
    ImportanceResult::from_raw(ImportanceMethod::Beta, names, abs).with_signed(names, beta)
}
