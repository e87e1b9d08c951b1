//! Multicollinearity diagnostics.
//!
//! Variance inflation factors are computed from the same weighted subset
//! regressions the importance methods use, so a weighted analysis yields
//! weighted VIFs.

use crate::config::AnalysisLimits;
use crate::error::Result;
use crate::regression::RegressionModel;
use serde::Serialize;
use tracing::warn;

/// Severity band of a variance inflation factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VifLevel {
    /// Below the moderate threshold.
    None,
    /// Between the moderate and high thresholds.
    Moderate,
    /// Above the high threshold.
    High,
}

/// VIF of a single driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverVif {
    pub driver: String,
    pub vif: f64,
    /// R² of the driver regressed on all other drivers.
    pub r_squared: f64,
    pub level: VifLevel,
}

/// Consolidated collinearity and data-quality report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsReport {
    pub vif: Vec<DriverVif>,
    /// The full design passed the aliasing check.
    pub aliasing_checked: bool,
    /// Every driver passed the zero-variance check.
    pub zero_variance_checked: bool,
    /// Largest absolute correlation between two drivers.
    pub max_driver_correlation: f64,
    pub warnings: Vec<String>,
}

impl DiagnosticsReport {
    /// VIF of `driver`, if present.
    pub fn vif_for(&self, driver: &str) -> Option<f64> {
        self.vif.iter().find(|v| v.driver == driver).map(|v| v.vif)
    }

    /// Drivers at the given level or worse.
    pub fn flagged(&self, level: VifLevel) -> impl Iterator<Item = &DriverVif> {
        self.vif.iter().filter(move |v| match level {
            VifLevel::None => true,
            VifLevel::Moderate => v.level != VifLevel::None,
            VifLevel::High => v.level == VifLevel::High,
        })
    }
}

/// VIF of driver `j` with respect to the drivers in `others`.
///
/// With a single other driver this is `1 / (1 - r²)` for their correlation `r`.
pub fn variance_inflation(model: &RegressionModel, j: usize, others: &[usize]) -> Result<f64> {
    let r2 = model.driver_r2(j, others)?;
    let tolerance = 1.0 - r2;
    Ok(if tolerance <= 0.0 {
        f64::INFINITY
    } else {
        1.0 / tolerance
    })
}

/// Computes [`DiagnosticsReport`]s.
#[derive(Debug, Clone)]
pub struct DiagnosticsEngine<'a> {
    limits: &'a AnalysisLimits,
}

impl<'a> DiagnosticsEngine<'a> {
    pub fn new(limits: &'a AnalysisLimits) -> Self {
        Self { limits }
    }

    /// Classify a VIF value.
    pub fn level(&self, vif: f64) -> VifLevel {
        if vif > self.limits.vif_high {
            VifLevel::High
        } else if vif >= self.limits.vif_moderate {
            VifLevel::Moderate
        } else {
            VifLevel::None
        }
    }

    /// Run every diagnostic against a fitted model.
    ///
    /// A fitted model has already passed the data preparer's zero-variance
    /// check and the fitter's aliasing check; both are recorded here.
    pub fn run(&self, model: &RegressionModel) -> Result<DiagnosticsReport> {
        let k = model.k();
        let mut vif = Vec::with_capacity(k);
        let mut warnings = Vec::new();

        for (j, driver) in model.driver_names().iter().enumerate() {
            let others: Vec<usize> = (0..k).filter(|&i| i != j).collect();
            let value = variance_inflation(model, j, &others)?;
            let level = self.level(value);
            match level {
                VifLevel::High => {
                    warn!(driver = %driver, vif = value, "High multicollinearity");
                    warnings.push(format!(
                        "High multicollinearity: '{}' has VIF {:.2} (> {}). Consider removing \
                         it or combining it with correlated drivers.",
                        driver, value, self.limits.vif_high
                    ));
                }
                VifLevel::Moderate => {
                    warnings.push(format!(
                        "Moderate multicollinearity: '{}' has VIF {:.2} ({}-{}).",
                        driver, value, self.limits.vif_moderate, self.limits.vif_high
                    ));
                }
                VifLevel::None => {}
            }
            vif.push(DriverVif {
                driver: driver.clone(),
                vif: value,
                r_squared: 1.0 - 1.0 / value,
                level,
            });
        }

        let mut max_driver_correlation: f64 = 0.0;
        for i in 0..k {
            for j in (i + 1)..k {
                max_driver_correlation =
                    max_driver_correlation.max(model.driver_correlation(i, j).abs());
            }
        }

        Ok(DiagnosticsReport {
            vif,
            aliasing_checked: true,
            zero_variance_checked: true,
            max_driver_correlation,
            warnings,
        })
    }
}
