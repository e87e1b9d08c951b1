//! Attribution backends for the SHAP method.
//!
//! Every backend implements [`TreeExplainer`]. The XGBoost backend is
//! compiled in with the `xgboost` feature; the linear backend is always
//! available.

mod linear_backend;
mod traits;

#[cfg(feature = "xgboost")]
pub mod xgboost_backend;

pub use linear_backend::LinearExplainer;
pub(crate) use traits::check_attributions;
pub use traits::{ExplainerInput, TreeExplainer};

#[cfg(feature = "xgboost")]
pub use xgboost_backend::XGBoostExplainer;
