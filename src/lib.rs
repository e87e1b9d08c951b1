//! # keydriver
//!
//! Multi-method driver importance analysis for survey data.
//!
//! Given one numeric outcome and 3 to 15 numeric drivers observed across
//! respondents, optionally weighted, the crate measures each driver's
//! contribution to the outcome with five methods:
//!
//! - squared correlations
//! - standardized regression coefficients (beta)
//! - Johnson's relative weights
//! - exact Shapley decomposition of R²
//! - SHAP attributions from a gradient-boosted tree model (optional)
//!
//! It also reports variance inflation diagnostics and a consensus ranking
//! across methods.
//!
//! ## Features
//!
//! - `xgboost` - Enable the XGBoost SHAP backend
//! - `full` - Enable all backends
//!
//! ## Example
//!
//! ```ignore
//! use keydriver::prelude::*;
//!
//! let config = AnalysisConfig::new("satisfaction", ["price", "quality", "service"])
//!     .with_weight("weight");
//! let result = KeyDriverAnalysis::new(config).run(&table)?;
//! println!("{}", result.to_json()?);
//! ```

pub mod analysis;
pub mod backend;
pub mod config;
pub mod consensus;
pub mod diagnostics;
pub mod error;
pub mod importance;
pub mod observer;
pub mod prepare;
pub mod regression;
pub mod result;
pub mod shap;
pub mod types;
pub mod utils;

pub mod prelude {
    //! Convenient re-exports of commonly used types.
    pub use crate::analysis::{KeyDriverAnalysis, analyze};
    pub use crate::backend::{ExplainerInput, LinearExplainer, TreeExplainer};
    pub use crate::config::{AnalysisConfig, AnalysisLimits, ShapParams, VariableRole, VariableSpec};
    pub use crate::consensus::{ConsensusFlag, ConsensusTable};
    pub use crate::diagnostics::{DiagnosticsReport, VifLevel};
    pub use crate::error::{KeyDriverError, Result};
    pub use crate::importance::{DriverScores, ImportanceMethod, ImportanceResult};
    pub use crate::observer::{
        AnalysisObserver, AnalysisStage, CancelHandle, LoggingObserver, ObserverAction,
        ObserverList, StageHistory,
    };
    pub use crate::result::AnalysisResult;
    pub use crate::shap::{ShapResult, ShapStrategy};
    pub use crate::types::DataTable;

    #[cfg(feature = "xgboost")]
    pub use crate::backend::XGBoostExplainer;
}
