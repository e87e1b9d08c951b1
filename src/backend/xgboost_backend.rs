//! XGBoost explainer.
//!
//! Boosts squared-error regression trees one round at a time with a custom
//! objective so the row weights enter the gradients and hessians directly,
//! then asks XGBoost for its TreeSHAP contributions.

use super::traits::{ExplainerInput, TreeExplainer};
use crate::config::ShapParams;
use crate::error::{KeyDriverError, Result};
use ndarray::Array2;
use std::cell::RefCell;
use tracing::debug;

use xgb::parameters::tree::TreeBoosterParametersBuilder;
use xgb::parameters::{BoosterParametersBuilder, BoosterType};
use xgb::{Booster, DMatrix};

// Targets and weights of the matrix being boosted; `update_custom` only takes
// a plain function pointer.
thread_local! {
    static OBJECTIVE_DATA: RefCell<Option<(Vec<f32>, Vec<f32>)>> = const { RefCell::new(None) };
}

/// Weighted squared error: grad = w·(p − y), hess = w.
fn objective_trampoline(preds: &[f32], _dtrain: &DMatrix) -> (Vec<f32>, Vec<f32>) {
    OBJECTIVE_DATA.with(|data| match data.borrow().as_ref() {
        Some((targets, weights)) => preds
            .iter()
            .zip(targets)
            .zip(weights)
            .map(|((&p, &y), &w)| (w * (p - y), w))
            .unzip(),
        None => (vec![0.0; preds.len()], vec![1.0; preds.len()]),
    })
}

/// Gradient-boosted tree explainer backed by XGBoost.
#[derive(Debug, Clone, Copy, Default)]
pub struct XGBoostExplainer;

impl XGBoostExplainer {
    fn train(
        &self,
        dmat: &DMatrix,
        input: &ExplainerInput<'_>,
        params: &ShapParams,
    ) -> Result<Booster> {
        let tree_params = TreeBoosterParametersBuilder::default()
            .eta(params.learning_rate as f32)
            .max_depth(params.max_depth as u32)
            .build()
            .map_err(|e| KeyDriverError::Backend(format!("invalid tree parameters: {}", e)))?;
        let booster_params = BoosterParametersBuilder::default()
            .booster_type(BoosterType::Tree(tree_params))
            .verbose(false)
            .build()
            .map_err(|e| KeyDriverError::Backend(format!("invalid booster parameters: {}", e)))?;

        let mut booster = Booster::new_with_cached_dmats(&booster_params, &[dmat])
            .map_err(|e| KeyDriverError::Backend(format!("failed to create booster: {}", e)))?;

        let targets: Vec<f32> = input.target.iter().map(|&y| y as f32).collect();
        let weights: Vec<f32> = input.weights.iter().map(|&w| w as f32).collect();
        OBJECTIVE_DATA.with(|data| *data.borrow_mut() = Some((targets, weights)));

        for round in 0..params.n_trees {
            if let Err(e) = booster.update_custom(dmat, objective_trampoline) {
                OBJECTIVE_DATA.with(|data| *data.borrow_mut() = None);
                return Err(KeyDriverError::Backend(format!(
                    "boosting round {} failed: {}",
                    round, e
                )));
            }
        }
        OBJECTIVE_DATA.with(|data| *data.borrow_mut() = None);
        Ok(booster)
    }
}

impl TreeExplainer for XGBoostExplainer {
    fn name(&self) -> &str {
        "xgboost"
    }

    fn explain(&self, input: &ExplainerInput<'_>, params: &ShapParams) -> Result<Array2<f64>> {
        let n = input.n_rows();
        let k = input.n_features();
        let features: Vec<f32> = input.features.iter().map(|&x| x as f32).collect();
        let labels: Vec<f32> = input.target.iter().map(|&y| y as f32).collect();
        let weights: Vec<f32> = input.weights.iter().map(|&w| w as f32).collect();

        let mut dmat = DMatrix::from_dense(&features, n)
            .map_err(|e| KeyDriverError::Backend(format!("failed to create DMatrix: {}", e)))?;
        dmat.set_labels(&labels)
            .map_err(|e| KeyDriverError::Backend(format!("failed to set labels: {}", e)))?;
        dmat.set_weights(&weights)
            .map_err(|e| KeyDriverError::Backend(format!("failed to set weights: {}", e)))?;

        let booster = self.train(&dmat, input, params)?;
        let (contributions, (rows, cols)) = booster
            .predict_contributions(&dmat)
            .map_err(|e| KeyDriverError::Backend(format!("TreeSHAP failed: {}", e)))?;

        // Row-major, one column per feature plus a trailing bias column.
        if rows != n || cols != k + 1 || contributions.len() != rows * cols {
            return Err(KeyDriverError::ShapeMismatch {
                expected_shape: format!("({}, {})", n, k + 1),
                actual_shape: format!("({}, {})", rows, cols),
            });
        }
        let attributions =
            Array2::from_shape_fn((n, k), |(i, j)| contributions[i * cols + j] as f64);
        debug!(rows = n, trees = params.n_trees, "Computed TreeSHAP attributions");
        Ok(attributions)
    }
}
