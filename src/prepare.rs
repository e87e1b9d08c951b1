//! Validation and listwise cleaning of the raw respondent table.

use crate::config::{AnalysisConfig, AnalysisLimits};
use crate::error::{KeyDriverError, Result};
use crate::types::{AnalysisDataset, DataTable, observed};
use ndarray::{Array1, Array2, ArrayView1};
use serde::Serialize;
use tracing::debug;

/// Respondents removed while preparing the data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionSummary {
    /// Rows in the input table.
    pub total_rows: usize,
    /// Rows dropped for a missing outcome or driver value.
    pub missing: usize,
    /// Rows dropped for a missing, non-finite or zero weight.
    pub weight: usize,
}

impl ExclusionSummary {
    /// Total rows removed.
    pub fn excluded(&self) -> usize {
        self.missing + self.weight
    }
}

/// Output of [`DataPreparer::prepare`].
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub dataset: AnalysisDataset,
    pub exclusions: ExclusionSummary,
}

/// Turns a raw table into an [`AnalysisDataset`].
#[derive(Debug, Clone)]
pub struct DataPreparer<'a> {
    config: &'a AnalysisConfig,
    limits: &'a AnalysisLimits,
}

impl<'a> DataPreparer<'a> {
    pub fn new(config: &'a AnalysisConfig, limits: &'a AnalysisLimits) -> Self {
        Self { config, limits }
    }

    /// Check the driver count against the limits.
    ///
    /// Runs before any data is touched, so an oversized request fails without
    /// doing any work.
    pub fn check_driver_count(&self) -> Result<()> {
        let k = self.config.driver_names.len();
        if k < self.limits.min_drivers {
            return Err(KeyDriverError::InvalidDriverCount(format!(
                "expected between {} and {} drivers, found {}",
                self.limits.min_drivers, self.limits.max_exact_drivers, k
            )));
        }
        if k > self.limits.max_exact_drivers {
            return Err(KeyDriverError::TooManyDrivers(k));
        }
        Ok(())
    }

    /// Validate and clean `table`.
    pub fn prepare(&self, table: &DataTable) -> Result<PreparedData> {
        self.config.validate()?;
        self.check_driver_count()?;

        let outcome_col = table.column(&self.config.outcome_name)?;
        let driver_cols = self
            .config
            .driver_names
            .iter()
            .map(|name| table.column(name))
            .collect::<Result<Vec<_>>>()?;
        let weight_col = self
            .config
            .weight_name
            .as_deref()
            .map(|name| table.column(name))
            .transpose()?;

        let n_rows = table.n_rows();
        let k = driver_cols.len();
        let mut exclusions = ExclusionSummary {
            total_rows: n_rows,
            ..Default::default()
        };

        let mut outcome = Vec::with_capacity(n_rows);
        let mut drivers = Vec::with_capacity(n_rows * k);
        let mut weights = Vec::with_capacity(if weight_col.is_some() { n_rows } else { 0 });
        let mut row = Vec::with_capacity(k);

        for i in 0..n_rows {
            let Some(y) = observed(outcome_col[i]) else {
                exclusions.missing += 1;
                continue;
            };
            row.clear();
            row.extend(driver_cols.iter().map_while(|col| observed(col[i])));
            if row.len() < k {
                exclusions.missing += 1;
                continue;
            }
            if let Some(col) = weight_col {
                match observed(col[i]) {
                    Some(w) if w < 0.0 => {
                        return Err(KeyDriverError::InvalidWeights(format!(
                            "negative weight {} in row {}",
                            w, i
                        )));
                    }
                    Some(w) if w > 0.0 => weights.push(w),
                    _ => {
                        exclusions.weight += 1;
                        continue;
                    }
                }
            }
            outcome.push(y);
            drivers.extend_from_slice(&row);
        }

        let n = outcome.len();
        let required = self
            .limits
            .required_sample(k, self.config.min_sample_size);
        if n < required {
            return Err(KeyDriverError::InsufficientData { n, required });
        }

        let outcome = Array1::from_vec(outcome);
        let drivers = Array2::from_shape_vec((n, k), drivers)?;
        let weights = weight_col.map(|_| Array1::from_vec(weights));

        if self.is_constant(&outcome.view()) {
            return Err(KeyDriverError::ZeroVariance(self.config.outcome_name.clone()));
        }
        for (j, name) in self.config.driver_names.iter().enumerate() {
            if self.is_constant(&drivers.column(j)) {
                return Err(KeyDriverError::ZeroVariance(name.clone()));
            }
        }

        debug!(
            rows = n_rows,
            usable = n,
            dropped_missing = exclusions.missing,
            dropped_weight = exclusions.weight,
            "Prepared analysis data"
        );

        let dataset = AnalysisDataset::from_parts(
            self.config.outcome_name.clone(),
            self.config.driver_names.clone(),
            outcome,
            drivers,
            weights,
        )?;
        Ok(PreparedData {
            dataset,
            exclusions,
        })
    }

    /// Whether a column's spread is below the resolution of its magnitude.
    ///
    /// Every retained row has positive weight, so the weighted variance is
    /// zero exactly when the spread is. A location shift leaves the spread
    /// unchanged and only moves the resolution floor.
    fn is_constant(&self, x: &ArrayView1<f64>) -> bool {
        let (min, max) = x
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let magnitude = min.abs().max(max.abs());
        max - min <= self.limits.zero_variance_tolerance * magnitude
    }
}
