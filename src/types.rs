//! Core data types: the raw respondent table and the prepared dataset.

use crate::error::{KeyDriverError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Column-oriented table of respondent data.
///
/// Values are `Option<f64>`; `None` and non-finite values both count as
/// missing. All columns share the same length.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    names: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column, checking its length against existing columns.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<()> {
        let name = name.into();
        if let Some(first) = self.columns.first() {
            if first.len() != values.len() {
                return Err(KeyDriverError::InvalidInput(format!(
                    "column '{}' has {} rows, expected {}",
                    name,
                    values.len(),
                    first.len()
                )));
            }
        }
        if self.names.contains(&name) {
            return Err(KeyDriverError::InvalidInput(format!(
                "column '{}' is defined twice",
                name
            )));
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    /// Builder-style [`add_column`](Self::add_column).
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self> {
        self.add_column(name, values)?;
        Ok(self)
    }

    /// Add a fully observed column.
    pub fn with_values(self, name: impl Into<String>, values: &[f64]) -> Result<Self> {
        self.with_column(name, values.iter().map(|&v| Some(v)).collect())
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Result<&[Option<f64>]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| KeyDriverError::MissingColumn(name.to_string()))
    }
}

/// Read a cell, mapping non-finite values to missing.
pub(crate) fn observed(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Analysis-ready, row-aligned numeric data.
///
/// Produced by [`DataPreparer`](crate::prepare::DataPreparer); every
/// downstream method sees exactly these rows.
#[derive(Debug, Clone)]
pub struct AnalysisDataset {
    driver_names: Vec<String>,
    outcome_name: String,
    outcome: Array1<f64>,
    drivers: Array2<f64>,
    weights: Option<Array1<f64>>,
}

impl AnalysisDataset {
    /// Assemble a dataset, checking shapes only.
    pub(crate) fn from_parts(
        outcome_name: String,
        driver_names: Vec<String>,
        outcome: Array1<f64>,
        drivers: Array2<f64>,
        weights: Option<Array1<f64>>,
    ) -> Result<Self> {
        let n = outcome.len();
        if drivers.nrows() != n || drivers.ncols() != driver_names.len() {
            return Err(KeyDriverError::ShapeMismatch {
                expected_shape: format!("({}, {})", n, driver_names.len()),
                actual_shape: format!("{:?}", drivers.dim()),
            });
        }
        if let Some(w) = &weights {
            if w.len() != n {
                return Err(KeyDriverError::ShapeMismatch {
                    expected_shape: format!("({},)", n),
                    actual_shape: format!("({},)", w.len()),
                });
            }
        }
        Ok(Self {
            driver_names,
            outcome_name,
            outcome,
            drivers,
            weights,
        })
    }

    /// Number of respondents.
    pub fn n(&self) -> usize {
        self.outcome.len()
    }

    /// Number of drivers.
    pub fn k(&self) -> usize {
        self.driver_names.len()
    }

    pub fn driver_names(&self) -> &[String] {
        &self.driver_names
    }

    pub fn outcome_name(&self) -> &str {
        &self.outcome_name
    }

    pub fn outcome(&self) -> ArrayView1<'_, f64> {
        self.outcome.view()
    }

    pub fn drivers(&self) -> ArrayView2<'_, f64> {
        self.drivers.view()
    }

    /// Row weights, if the analysis is weighted.
    pub fn weights(&self) -> Option<ArrayView1<'_, f64>> {
        self.weights.as_ref().map(|w| w.view())
    }

    /// Row weights with unit weights filled in for unweighted data.
    pub fn weights_or_unit(&self) -> Array1<f64> {
        self.weights
            .clone()
            .unwrap_or_else(|| Array1::ones(self.outcome.len()))
    }

    /// Kish effective sample size, (Σw)² / Σw².
    pub fn effective_n(&self) -> f64 {
        match &self.weights {
            Some(w) => {
                let sum = w.sum();
                let sum_sq = w.dot(w);
                if sum_sq > 0.0 { sum * sum / sum_sq } else { 0.0 }
            }
            None => self.n() as f64,
        }
    }
}
