//! Analysis configuration and numeric limits.
//!
//! [`AnalysisConfig`] describes *what* to analyse (which columns play which
//! role) and is normally deserialized from the configuration collaborator.
//! [`AnalysisLimits`] gathers the sample-size floors, VIF thresholds and
//! driver-count limits into one immutable value handed to every component.

use crate::error::{KeyDriverError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Role a variable plays in the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableRole {
    /// The dependent variable being explained.
    Outcome,
    /// A candidate predictor.
    Driver,
    /// Per-respondent survey weight.
    Weight,
}

/// One row of a variable definition list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    /// Column name in the data table.
    pub name: String,
    /// Role of the variable.
    pub role: VariableRole,
    /// Display name for output.
    #[serde(default)]
    pub label: Option<String>,
}

impl VariableSpec {
    pub fn new(name: impl Into<String>, role: VariableRole) -> Self {
        Self {
            name: name.into(),
            role,
            label: None,
        }
    }

    /// Attach a display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Gradient boosted tree settings for the SHAP method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapParams {
    /// Number of boosting rounds.
    pub n_trees: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Shrinkage applied to each tree.
    pub learning_rate: f64,
    /// Maximum number of respondents used to fit and explain the model.
    pub sample_cap: usize,
    /// Seed for row sampling.
    pub seed: u64,
}

impl Default for ShapParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 4,
            learning_rate: 0.1,
            sample_cap: 1000,
            seed: 42,
        }
    }
}

/// Configuration of a single analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Descriptive name carried through to the result.
    #[serde(default)]
    pub analysis_name: Option<String>,
    /// Outcome column name.
    pub outcome_name: String,
    /// Driver column names, in reporting order.
    pub driver_names: Vec<String>,
    /// Optional weight column name.
    #[serde(default)]
    pub weight_name: Option<String>,
    /// Display labels keyed by driver name.
    #[serde(default)]
    pub driver_labels: HashMap<String, String>,
    /// Overrides [`AnalysisLimits::min_sample_floor`] when set.
    #[serde(default)]
    pub min_sample_size: Option<usize>,
    /// Whether to attempt the SHAP method.
    #[serde(default)]
    pub enable_shap: bool,
    /// Boosting parameters for SHAP.
    #[serde(default)]
    pub shap_params: ShapParams,
}

impl AnalysisConfig {
    /// Create a configuration for an unweighted analysis.
    pub fn new<S: Into<String>>(
        outcome_name: impl Into<String>,
        driver_names: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            analysis_name: None,
            outcome_name: outcome_name.into(),
            driver_names: driver_names.into_iter().map(Into::into).collect(),
            weight_name: None,
            driver_labels: HashMap::new(),
            min_sample_size: None,
            enable_shap: false,
            shap_params: ShapParams::default(),
        }
    }

    /// Build a configuration from a list of role-tagged variables.
    ///
    /// Exactly one outcome is required, and at most one weight.
    pub fn from_variables(variables: &[VariableSpec]) -> Result<Self> {
        let outcomes: Vec<&VariableSpec> = variables
            .iter()
            .filter(|v| v.role == VariableRole::Outcome)
            .collect();
        if outcomes.len() != 1 {
            return Err(KeyDriverError::InvalidDriverCount(format!(
                "expected exactly one outcome variable, found {}",
                outcomes.len()
            )));
        }

        let weights: Vec<&VariableSpec> = variables
            .iter()
            .filter(|v| v.role == VariableRole::Weight)
            .collect();
        if weights.len() > 1 {
            return Err(KeyDriverError::InvalidConfig(format!(
                "at most one weight variable is allowed, found {}",
                weights.len()
            )));
        }

        let mut config = Self::new(
            outcomes[0].name.clone(),
            variables
                .iter()
                .filter(|v| v.role == VariableRole::Driver)
                .map(|v| v.name.clone()),
        );
        config.weight_name = weights.first().map(|w| w.name.clone());
        config.driver_labels = variables
            .iter()
            .filter(|v| v.role == VariableRole::Driver)
            .filter_map(|v| v.label.clone().map(|l| (v.name.clone(), l)))
            .collect();
        Ok(config)
    }

    /// Set the weight column.
    pub fn with_weight(mut self, weight_name: impl Into<String>) -> Self {
        self.weight_name = Some(weight_name.into());
        self
    }

    /// Set the analysis name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.analysis_name = Some(name.into());
        self
    }

    /// Enable SHAP with the given parameters.
    pub fn with_shap(mut self, params: ShapParams) -> Self {
        self.enable_shap = true;
        self.shap_params = params;
        self
    }

    /// Override the minimum sample size floor.
    pub fn with_min_sample_size(mut self, min_sample_size: usize) -> Self {
        self.min_sample_size = Some(min_sample_size);
        self
    }

    /// Label for a driver, falling back to its column name.
    pub fn label_for<'a>(&'a self, driver: &'a str) -> &'a str {
        self.driver_labels
            .get(driver)
            .map(String::as_str)
            .unwrap_or(driver)
    }

    /// Check that variable roles do not overlap.
    ///
    /// Driver-count limits are enforced by the data preparer, which knows the
    /// [`AnalysisLimits`] in force.
    pub fn validate(&self) -> Result<()> {
        if self.outcome_name.is_empty() {
            return Err(KeyDriverError::InvalidDriverCount(
                "expected exactly one outcome variable, found 0".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.driver_names.len());
        for name in &self.driver_names {
            if !seen.insert(name.as_str()) {
                return Err(KeyDriverError::InvalidConfig(format!(
                    "driver '{}' is listed more than once",
                    name
                )));
            }
        }
        if seen.contains(self.outcome_name.as_str()) {
            return Err(KeyDriverError::InvalidConfig(format!(
                "outcome '{}' is also listed as a driver",
                self.outcome_name
            )));
        }
        if let Some(weight) = &self.weight_name {
            if seen.contains(weight.as_str()) || *weight == self.outcome_name {
                return Err(KeyDriverError::InvalidConfig(format!(
                    "weight '{}' is also used as an outcome or driver",
                    weight
                )));
            }
        }
        if self.enable_shap {
            let p = &self.shap_params;
            if p.n_trees == 0 || p.max_depth == 0 || p.sample_cap == 0 {
                return Err(KeyDriverError::InvalidConfig(
                    "shap_params n_trees, max_depth and sample_cap must be positive".to_string(),
                ));
            }
            if !(p.learning_rate > 0.0 && p.learning_rate.is_finite()) {
                return Err(KeyDriverError::InvalidConfig(format!(
                    "shap_params learning_rate must be positive, got {}",
                    p.learning_rate
                )));
            }
        }
        Ok(())
    }
}

/// Numeric limits and thresholds shared by every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisLimits {
    /// Fewest drivers an analysis accepts.
    pub min_drivers: usize,
    /// Most drivers exact Shapley enumeration accepts.
    pub max_exact_drivers: usize,
    /// Absolute minimum number of respondents.
    pub min_sample_floor: usize,
    /// Respondents required per driver.
    pub samples_per_driver: usize,
    /// VIF at or above which collinearity is moderate.
    pub vif_moderate: f64,
    /// VIF above which collinearity is high.
    pub vif_high: f64,
    /// Largest tolerated rank gap against the Shapley ranking.
    pub consensus_rank_gap: usize,
    /// Relative eigenvalue below which the design counts as singular.
    pub collinearity_tolerance: f64,
    /// Spread (max − min) relative to the largest magnitude below which a
    /// column counts as constant.
    pub zero_variance_tolerance: f64,
}

impl Default for AnalysisLimits {
    fn default() -> Self {
        Self {
            min_drivers: 3,
            max_exact_drivers: 15,
            min_sample_floor: 30,
            samples_per_driver: 10,
            vif_moderate: 5.0,
            vif_high: 10.0,
            consensus_rank_gap: 4,
            collinearity_tolerance: 1e-10,
            zero_variance_tolerance: 1e-12,
        }
    }
}

impl AnalysisLimits {
    /// Minimum usable respondents for `n_drivers` drivers.
    pub fn required_sample(&self, n_drivers: usize, floor_override: Option<usize>) -> usize {
        floor_override
            .unwrap_or(self.min_sample_floor)
            .max(self.samples_per_driver * n_drivers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_variables_roles() {
        let vars = vec![
            VariableSpec::new("overall_satisfaction", VariableRole::Outcome),
            VariableSpec::new("product_quality", VariableRole::Driver)
                .with_label("Product Quality"),
            VariableSpec::new("customer_service", VariableRole::Driver),
            VariableSpec::new("value_for_money", VariableRole::Driver),
            VariableSpec::new("wt", VariableRole::Weight),
        ];
        let config = AnalysisConfig::from_variables(&vars).unwrap();
        assert_eq!(config.outcome_name, "overall_satisfaction");
        assert_eq!(config.driver_names.len(), 3);
        assert_eq!(config.weight_name.as_deref(), Some("wt"));
        assert_eq!(config.label_for("product_quality"), "Product Quality");
        assert_eq!(config.label_for("customer_service"), "customer_service");
    }

    #[test]
    fn test_from_variables_requires_one_outcome() {
        let vars = vec![
            VariableSpec::new("a", VariableRole::Outcome),
            VariableSpec::new("b", VariableRole::Outcome),
            VariableSpec::new("c", VariableRole::Driver),
        ];
        assert!(matches!(
            AnalysisConfig::from_variables(&vars),
            Err(KeyDriverError::InvalidDriverCount(_))
        ));
    }

    #[test]
    fn test_validate_rejects_overlapping_roles() {
        let config = AnalysisConfig::new("y", ["x1", "x2", "y"]);
        assert!(matches!(
            config.validate(),
            Err(KeyDriverError::InvalidConfig(_))
        ));

        let config = AnalysisConfig::new("y", ["x1", "x1", "x2"]);
        assert!(matches!(
            config.validate(),
            Err(KeyDriverError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let json = r#"{"outcome_name": "y", "driver_names": ["a", "b", "c"]}"#;
        let config: AnalysisConfig = serde_json::from_str(json).unwrap();
        assert!(!config.enable_shap);
        assert_eq!(config.shap_params, ShapParams::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_required_sample() {
        let limits = AnalysisLimits::default();
        assert_eq!(limits.required_sample(3, None), 30);
        assert_eq!(limits.required_sample(5, None), 50);
        assert_eq!(limits.required_sample(3, Some(100)), 100);
    }
}
