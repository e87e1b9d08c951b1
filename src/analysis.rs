//! The analysis pipeline.
//!
//! [`KeyDriverAnalysis`] runs the stages in order:
//!
//! 1. **Preparing**: validate the configuration and clean the table.
//! 2. **Fitting**: fit the full weighted regression.
//! 3. **Diagnostics and importance**: VIF diagnostics, the exact importance
//!    methods and SHAP, run in parallel on the rayon pool.
//! 4. **Consensus**: rank drivers across methods.
//!
//! Any validation error moves the run to `Failed` and is returned. SHAP
//! problems never fail a run; they are recorded in the result instead.
//!
//! # Example
//!
//! ```
//! use keydriver::prelude::*;
//!
//! let n = 60;
//! let x1: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64).collect();
//! let x2: Vec<f64> = (0..n).map(|i| ((i * 5) % 13) as f64).collect();
//! let x3: Vec<f64> = (0..n).map(|i| ((i * 3) % 17) as f64).collect();
//! let y: Vec<f64> = (0..n)
//!     .map(|i| 0.5 * x1[i] + 0.3 * x2[i] + ((i * 13) % 7) as f64 * 0.1)
//!     .collect();
//! let table = DataTable::new()
//!     .with_values("y", &y)?
//!     .with_values("x1", &x1)?
//!     .with_values("x2", &x2)?
//!     .with_values("x3", &x3)?;
//!
//! let config = AnalysisConfig::new("y", ["x1", "x2", "x3"]);
//! let result = KeyDriverAnalysis::new(config).run(&table)?;
//! let total: f64 = result.importance.shapley.sum();
//! assert!((total - 100.0).abs() < 1e-6);
//! # Ok::<(), keydriver::error::KeyDriverError>(())
//! ```

use crate::config::{AnalysisConfig, AnalysisLimits};
use crate::consensus::ConsensusRanker;
use crate::diagnostics::{DiagnosticsEngine, DiagnosticsReport};
use crate::error::Result;
use crate::importance::{
    DriverScores, ImportanceResult, ShapleyEngine, ShapleyOutcome, beta_importance,
    correlation_importance, relative_weights,
};
use crate::observer::{AnalysisObserver, AnalysisStage};
use crate::prepare::{DataPreparer, ExclusionSummary};
use crate::regression::{ModelFitter, RegressionModel};
use crate::result::{AnalysisResult, DriverLabels, MethodImportances};
use crate::shap::{ShapEngine, ShapReport, ShapStrategy};
use crate::types::{AnalysisDataset, DataTable};
use std::sync::Arc;
use tracing::{info, warn};

/// Observer used when none is attached.
struct Silent;

impl AnalysisObserver for Silent {}

static SILENT: Silent = Silent;

/// Results of the four exact importance methods.
struct ExactMethods {
    correlation: ImportanceResult,
    beta: ImportanceResult,
    relative_weights: ImportanceResult,
    shapley: ShapleyOutcome,
}

/// A configured key driver analysis.
pub struct KeyDriverAnalysis {
    config: AnalysisConfig,
    limits: AnalysisLimits,
    shap: ShapStrategy,
    observer: Option<Arc<dyn AnalysisObserver>>,
}

impl KeyDriverAnalysis {
    /// Create an analysis with default limits and the best available SHAP
    /// backend.
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            limits: AnalysisLimits::default(),
            shap: ShapStrategy::detect(),
            observer: None,
        }
    }

    pub fn with_limits(mut self, limits: AnalysisLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the SHAP strategy.
    pub fn with_shap(mut self, strategy: ShapStrategy) -> Self {
        self.shap = strategy;
        self
    }

    /// Attach an observer; use an [`ObserverList`](crate::observer::ObserverList)
    /// for several.
    pub fn with_observer(mut self, observer: Arc<dyn AnalysisObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn limits(&self) -> &AnalysisLimits {
        &self.limits
    }

    pub fn shap_strategy(&self) -> &ShapStrategy {
        &self.shap
    }

    /// Run the full pipeline on `table`.
    pub fn run(&self, table: &DataTable) -> Result<AnalysisResult> {
        let observer = self.observer();
        match self.execute(table, observer) {
            Ok(result) => {
                observer.on_stage(AnalysisStage::Done);
                info!(
                    n = result.n,
                    k = result.drivers.len(),
                    r_squared = result.r_squared,
                    warnings = result.warnings.len(),
                    "Key driver analysis complete"
                );
                Ok(result)
            }
            Err(e) => {
                observer.on_stage(AnalysisStage::Failed);
                warn!(error = %e, "Key driver analysis failed");
                Err(e)
            }
        }
    }

    fn observer(&self) -> &dyn AnalysisObserver {
        match &self.observer {
            Some(observer) => observer.as_ref(),
            None => &SILENT,
        }
    }

    fn execute(
        &self,
        table: &DataTable,
        observer: &dyn AnalysisObserver,
    ) -> Result<AnalysisResult> {
        observer.on_stage(AnalysisStage::Preparing);
        let prepared = DataPreparer::new(&self.config, &self.limits).prepare(table)?;
        let data = prepared.dataset;

        observer.on_stage(AnalysisStage::Fitting);
        let model = ModelFitter::new(&self.limits).fit(&data)?;

        observer.on_stage(AnalysisStage::DiagnosticsAndImportance);
        let (diagnostics, (exact, shap)) = rayon::join(
            || DiagnosticsEngine::new(&self.limits).run(&model),
            || {
                rayon::join(
                    || self.exact_methods(&data, &model, observer),
                    || {
                        ShapEngine::new(&self.shap, &self.config.shap_params)
                            .run(&data, self.config.enable_shap)
                    },
                )
            },
        );
        let exact = exact?;
        let diagnostics = diagnostics?;

        observer.on_stage(AnalysisStage::Consensus);
        Ok(self.assemble(&data, &model, prepared.exclusions, diagnostics, exact, shap))
    }

    fn exact_methods(
        &self,
        data: &AnalysisDataset,
        model: &RegressionModel,
        observer: &dyn AnalysisObserver,
    ) -> Result<ExactMethods> {
        let shapley = ShapleyEngine::new(&self.limits)
            .with_observer(observer)
            .run(model)?;
        Ok(ExactMethods {
            correlation: correlation_importance(model),
            beta: beta_importance(model),
            relative_weights: relative_weights(data, model)?,
            shapley,
        })
    }

    fn assemble(
        &self,
        data: &AnalysisDataset,
        model: &RegressionModel,
        exclusions: ExclusionSummary,
        diagnostics: DiagnosticsReport,
        exact: ExactMethods,
        shap: ShapReport,
    ) -> AnalysisResult {
        let drivers = data.driver_names();

        let mut methods = vec![
            exact.correlation,
            exact.beta,
            exact.relative_weights,
            exact.shapley.result,
        ];
        if let Some(importance) = shap.result.importance() {
            methods.push(importance.clone());
        }
        let ranked: Vec<&ImportanceResult> = methods.iter().collect();
        let consensus =
            ConsensusRanker::new(&self.limits).rank(drivers, &ranked, Some(&diagnostics));

        let mut warnings = Vec::new();
        if exclusions.excluded() > 0 {
            warnings.push(format!(
                "Excluded {} of {} respondents ({} with missing values, {} with missing or \
                 zero weight).",
                exclusions.excluded(),
                exclusions.total_rows,
                exclusions.missing,
                exclusions.weight
            ));
        }
        warnings.extend(diagnostics.warnings.iter().cloned());
        warnings.extend(shap.warning);
        warnings.extend(consensus.warnings().iter().cloned());

        let signed = |i: usize| methods[i].signed.clone().unwrap_or_default();
        let labels = DriverLabels::new(
            drivers
                .iter()
                .map(|d| (d.clone(), self.config.label_for(d).to_string()))
                .collect(),
        );

        AnalysisResult {
            analysis_name: self.config.analysis_name.clone(),
            outcome: data.outcome_name().to_string(),
            drivers: drivers.to_vec(),
            n: data.n(),
            effective_n: data.effective_n(),
            excluded: exclusions,
            r_squared: model.r_squared(),
            adj_r_squared: model.adj_r_squared(),
            f_stat: model.f_stat(),
            f_p_value: model.f_p_value(),
            rmse: model.rmse(),
            intercept: model.intercept(),
            coefficients: DriverScores::new(drivers, model.coefficients().iter().copied()),
            importance: MethodImportances {
                correlation: methods[0].percent.clone(),
                beta: methods[1].percent.clone(),
                relative_weights: methods[2].percent.clone(),
                shapley: methods[3].percent.clone(),
                shap: shap.result,
            },
            signed_beta: signed(1),
            signed_correlation: signed(0),
            vif: DriverScores::new(drivers, diagnostics.vif.iter().map(|v| v.vif)),
            diagnostics,
            consensus,
            shapley_fits: exact.shapley.distinct_fits,
            labels,
            warnings,
            methods,
        }
    }
}

impl std::fmt::Debug for KeyDriverAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDriverAnalysis")
            .field("config", &self.config)
            .field("limits", &self.limits)
            .field("shap", &self.shap)
            .field("observer", &self.observer.as_ref().map(|o| o.name()))
            .finish()
    }
}

/// Run an analysis with default limits and SHAP backend.
pub fn analyze(config: AnalysisConfig, table: &DataTable) -> Result<AnalysisResult> {
    KeyDriverAnalysis::new(config).run(table)
}
