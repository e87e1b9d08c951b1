//! Optional SHAP importance from a gradient-boosted tree model.
//!
//! The attribution backend is a [`ShapStrategy`] chosen once when the
//! analysis is built. A missing backend or a backend error never fails the
//! analysis: the SHAP sub-result degrades to `SKIPPED` or `FAILED` and a
//! warning records why.

use crate::backend::{ExplainerInput, TreeExplainer, check_attributions};
use crate::config::ShapParams;
use crate::error::Result;
use crate::importance::{ImportanceMethod, ImportanceResult};
use crate::types::AnalysisDataset;
use crate::utils::weighted_mean;
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Reason recorded when SHAP is switched off.
pub const SHAP_DISABLED: &str = "SHAP disabled in configuration";

/// How SHAP attributions are obtained.
pub enum ShapStrategy {
    /// No backend; SHAP is always skipped.
    Unavailable { capability: &'static str },
    /// Attributions come from this explainer.
    Explainer(Box<dyn TreeExplainer>),
}

impl ShapStrategy {
    /// The best backend compiled into this build.
    pub fn detect() -> Self {
        #[cfg(feature = "xgboost")]
        {
            ShapStrategy::Explainer(Box::new(crate::backend::XGBoostExplainer))
        }
        #[cfg(not(feature = "xgboost"))]
        {
            ShapStrategy::Unavailable {
                capability: "xgboost",
            }
        }
    }

    /// Use a specific explainer.
    pub fn with_explainer(explainer: impl TreeExplainer + 'static) -> Self {
        ShapStrategy::Explainer(Box::new(explainer))
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ShapStrategy::Explainer(_))
    }

    /// Backend or missing capability name.
    pub fn name(&self) -> &str {
        match self {
            ShapStrategy::Unavailable { capability } => capability,
            ShapStrategy::Explainer(explainer) => explainer.name(),
        }
    }
}

impl Default for ShapStrategy {
    fn default() -> Self {
        Self::detect()
    }
}

impl fmt::Debug for ShapStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapStrategy::Unavailable { capability } => f
                .debug_struct("Unavailable")
                .field("capability", capability)
                .finish(),
            ShapStrategy::Explainer(explainer) => f
                .debug_tuple("Explainer")
                .field(&explainer.name())
                .finish(),
        }
    }
}

/// SHAP sub-result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShapResult {
    Computed {
        importance: ImportanceResult,
        backend: String,
        rows_used: usize,
    },
    Skipped {
        reason: String,
    },
    Failed {
        reason: String,
    },
}

impl ShapResult {
    /// The importance result, if SHAP was computed.
    pub fn importance(&self) -> Option<&ImportanceResult> {
        match self {
            ShapResult::Computed { importance, .. } => Some(importance),
            _ => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, ShapResult::Computed { .. })
    }
}

/// SHAP result plus the warning to attach to the analysis, if any.
#[derive(Debug, Clone)]
pub struct ShapReport {
    pub result: ShapResult,
    pub warning: Option<String>,
}

/// Runs a [`ShapStrategy`] against a prepared dataset.
#[derive(Debug)]
pub struct ShapEngine<'a> {
    strategy: &'a ShapStrategy,
    params: &'a ShapParams,
}

impl<'a> ShapEngine<'a> {
    pub fn new(strategy: &'a ShapStrategy, params: &'a ShapParams) -> Self {
        Self { strategy, params }
    }

    /// Compute SHAP importance, or record why it was not computed.
    pub fn run(&self, data: &AnalysisDataset, enabled: bool) -> ShapReport {
        if !enabled {
            return ShapReport {
                result: ShapResult::Skipped {
                    reason: SHAP_DISABLED.to_string(),
                },
                warning: None,
            };
        }

        let explainer = match self.strategy {
            ShapStrategy::Unavailable { capability } => {
                let reason = format!("{} not available", capability);
                warn!(capability = *capability, "SHAP skipped");
                return ShapReport {
                    warning: Some(format!(
                        "SHAP importance skipped: {}. The other methods are unaffected.",
                        reason
                    )),
                    result: ShapResult::Skipped { reason },
                };
            }
            ShapStrategy::Explainer(explainer) => explainer,
        };

        match self.compute(explainer.as_ref(), data) {
            Ok((importance, rows_used)) => ShapReport {
                result: ShapResult::Computed {
                    importance,
                    backend: explainer.name().to_string(),
                    rows_used,
                },
                warning: None,
            },
            Err(e) => {
                warn!(backend = explainer.name(), error = %e, "SHAP failed");
                ShapReport {
                    warning: Some(format!(
                        "SHAP importance failed ({}): {}. Results are reported without SHAP.",
                        explainer.name(),
                        e
                    )),
                    result: ShapResult::Failed {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }

    fn compute(
        &self,
        explainer: &dyn TreeExplainer,
        data: &AnalysisDataset,
    ) -> Result<(ImportanceResult, usize)> {
        let rows = sample_rows(data.n(), self.params.sample_cap, self.params.seed);
        let weights = data.weights_or_unit();
        let features: Array2<f64> = data.drivers().select(Axis(0), &rows);
        let target: Array1<f64> = data.outcome().select(Axis(0), &rows);
        let weights: Array1<f64> = weights.select(Axis(0), &rows);

        let input = ExplainerInput::new(features.view(), target.view(), weights.view())?;
        let attributions = explainer.explain(&input, self.params)?;
        check_attributions(&input, &attributions)?;

        let mean_abs: Vec<f64> = attributions
            .axis_iter(Axis(1))
            .map(|col| weighted_mean(&col.mapv(f64::abs).view(), &weights.view()))
            .collect();
        debug!(rows = rows.len(), backend = explainer.name(), "Computed SHAP importance");

        Ok((
            ImportanceResult::from_raw(ImportanceMethod::Shap, data.driver_names(), mean_abs),
            rows.len(),
        ))
    }
}

/// Row indices to explain: all rows, or a seeded sample of `cap` of them in
/// ascending order.
fn sample_rows(n: usize, cap: usize, seed: u64) -> Vec<usize> {
    if cap == 0 || n <= cap {
        return (0..n).collect();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rows = index::sample(&mut rng, n, cap).into_vec();
    rows.sort_unstable();
    rows
}
