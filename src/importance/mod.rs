//! Driver importance methods.
//!
//! Each method turns a fitted [`RegressionModel`](crate::regression::RegressionModel)
//! into an [`ImportanceResult`]: percentage shares per driver that sum to
//! 100, the raw statistic the shares were derived from, and for the
//! correlation and beta methods the signed statistic for direction.

pub mod beta;
pub mod correlation;
pub mod relative_weights;
pub mod shapley;

pub use beta::beta_importance;
pub use correlation::correlation_importance;
pub use relative_weights::relative_weights;
pub use shapley::{ShapleyEngine, ShapleyOutcome, SubsetMemo};

use crate::utils::{competition_ranks, to_percentages};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// Importance method identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceMethod {
    Correlation,
    Beta,
    RelativeWeights,
    Shapley,
    Shap,
}

impl ImportanceMethod {
    /// Every method, in reporting order.
    pub const ALL: [ImportanceMethod; 5] = [
        ImportanceMethod::Correlation,
        ImportanceMethod::Beta,
        ImportanceMethod::RelativeWeights,
        ImportanceMethod::Shapley,
        ImportanceMethod::Shap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportanceMethod::Correlation => "correlation",
            ImportanceMethod::Beta => "beta",
            ImportanceMethod::RelativeWeights => "relative_weights",
            ImportanceMethod::Shapley => "shapley",
            ImportanceMethod::Shap => "shap",
        }
    }
}

impl fmt::Display for ImportanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores keyed by driver name, in driver order.
///
/// Serializes as a JSON object whose keys keep the driver order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverScores {
    entries: Vec<(String, f64)>,
}

impl DriverScores {
    /// Pair `names` with `values`; extra elements of the longer side are ignored.
    pub fn new(names: &[String], values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            entries: names.iter().cloned().zip(values).collect(),
        }
    }

    /// Score of `driver`, if present.
    pub fn get(&self, driver: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == driver)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, v)| (name.as_str(), *v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.entries.iter().map(|(_, v)| v).sum()
    }

    /// Driver names ordered by descending score.
    pub fn ranked(&self) -> Vec<&str> {
        let mut order: Vec<&(String, f64)> = self.entries.iter().collect();
        order.sort_by(|a, b| b.1.total_cmp(&a.1));
        order.into_iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl Serialize for DriverScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Output of one importance method.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ImportanceResult {
    pub method: ImportanceMethod,
    /// Percentage share per driver; sums to 100 unless every raw score is zero.
    pub percent: DriverScores,
    /// The non-negative statistic the shares were normalized from.
    pub raw: DriverScores,
    /// Signed statistic for direction (correlation and beta only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed: Option<DriverScores>,
}

impl ImportanceResult {
    /// Build a result by normalizing non-negative `raw` scores to percentages.
    pub fn from_raw(method: ImportanceMethod, names: &[String], raw: Vec<f64>) -> Self {
        let percent = to_percentages(&raw);
        Self {
            method,
            percent: DriverScores::new(names, percent),
            raw: DriverScores::new(names, raw),
            signed: None,
        }
    }

    /// Attach the signed statistic.
    pub fn with_signed(mut self, names: &[String], signed: Vec<f64>) -> Self {
        self.signed = Some(DriverScores::new(names, signed));
        self
    }

    /// Percentage share of `driver`.
    pub fn share(&self, driver: &str) -> Option<f64> {
        self.percent.get(driver)
    }

    /// Competition ranks, 1 = most important, in driver order.
    pub fn ranks(&self) -> Vec<usize> {
        competition_ranks(&self.percent.values())
    }
}
