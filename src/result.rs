//! The analysis result handed to reporting.

use crate::consensus::ConsensusTable;
use crate::diagnostics::DiagnosticsReport;
use crate::error::Result;
use crate::importance::{DriverScores, ImportanceMethod, ImportanceResult};
use crate::prepare::ExclusionSummary;
use crate::shap::ShapResult;
use serde::Serialize;

/// Percentage importances per method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodImportances {
    pub correlation: DriverScores,
    pub beta: DriverScores,
    pub relative_weights: DriverScores,
    pub shapley: DriverScores,
    pub shap: ShapResult,
}

/// Everything one analysis run produces.
///
/// Driver-keyed maps serialize in driver order.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_name: Option<String>,
    pub outcome: String,
    pub drivers: Vec<String>,
    pub n: usize,
    /// Kish effective sample size; equals `n` when unweighted.
    pub effective_n: f64,
    pub excluded: ExclusionSummary,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_stat: f64,
    pub f_p_value: f64,
    pub rmse: f64,
    pub intercept: f64,
    pub coefficients: DriverScores,
    pub importance: MethodImportances,
    pub signed_beta: DriverScores,
    pub signed_correlation: DriverScores,
    pub vif: DriverScores,
    pub diagnostics: DiagnosticsReport,
    pub consensus: ConsensusTable,
    /// Distinct subset regressions used by the Shapley decomposition.
    pub shapley_fits: usize,
    pub labels: DriverLabels,
    pub warnings: Vec<String>,
    #[serde(skip)]
    pub(crate) methods: Vec<ImportanceResult>,
}

/// Display labels keyed by driver, in driver order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverLabels {
    entries: Vec<(String, String)>,
}

impl DriverLabels {
    pub(crate) fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, driver: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == driver)
            .map(|(_, label)| label.as_str())
    }
}

impl Serialize for DriverLabels {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, label) in &self.entries {
            map.serialize_entry(name, label)?;
        }
        map.end()
    }
}

impl AnalysisResult {
    /// Full result for `method`, if it was computed.
    pub fn method(&self, method: ImportanceMethod) -> Option<&ImportanceResult> {
        if method == ImportanceMethod::Shap {
            return self.importance.shap.importance();
        }
        self.methods.iter().find(|m| m.method == method)
    }

    /// Percentage share of `driver` under `method`.
    pub fn share(&self, method: ImportanceMethod, driver: &str) -> Option<f64> {
        self.method(method).and_then(|m| m.share(driver))
    }

    /// Drivers from most to least important by average rank.
    pub fn ordered_drivers(&self) -> Vec<&str> {
        self.consensus.ordered_drivers()
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serialize to a JSON value.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
