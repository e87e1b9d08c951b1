//! Explainer trait definitions.

use crate::config::ShapParams;
use crate::error::{KeyDriverError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};

/// Rows handed to an explainer.
///
/// All three views are row-aligned; `weights` is all ones for an unweighted
/// analysis.
#[derive(Debug, Clone, Copy)]
pub struct ExplainerInput<'a> {
    pub features: ArrayView2<'a, f64>,
    pub target: ArrayView1<'a, f64>,
    pub weights: ArrayView1<'a, f64>,
}

impl<'a> ExplainerInput<'a> {
    /// Bundle row-aligned views, checking their lengths.
    pub fn new(
        features: ArrayView2<'a, f64>,
        target: ArrayView1<'a, f64>,
        weights: ArrayView1<'a, f64>,
    ) -> Result<Self> {
        let n = features.nrows();
        if target.len() != n || weights.len() != n {
            return Err(KeyDriverError::ShapeMismatch {
                expected_shape: format!("({},)", n),
                actual_shape: format!("target ({},), weights ({},)", target.len(), weights.len()),
            });
        }
        Ok(Self {
            features,
            target,
            weights,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }
}

/// A model-based attribution backend.
///
/// Implementations fit a regressor of `target` on `features` using the row
/// weights and return per-row additive feature attributions of shape
/// `(n_rows, n_features)`, with the bias term excluded.
pub trait TreeExplainer: Send + Sync {
    /// Backend name, used in logs and warnings.
    fn name(&self) -> &str;

    /// Fit and explain.
    fn explain(&self, input: &ExplainerInput<'_>, params: &ShapParams) -> Result<Array2<f64>>;
}

/// Check an explainer's output shape against its input.
pub(crate) fn check_attributions(
    input: &ExplainerInput<'_>,
    attributions: &Array2<f64>,
) -> Result<()> {
    let expected = (input.n_rows(), input.n_features());
    if attributions.dim() != expected {
        return Err(KeyDriverError::ShapeMismatch {
            expected_shape: format!("{:?}", expected),
            actual_shape: format!("{:?}", attributions.dim()),
        });
    }
    if attributions.iter().any(|v| !v.is_finite()) {
        return Err(KeyDriverError::Numerical(
            "explainer returned non-finite attributions".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};

    #[test]
    fn test_input_rejects_misaligned_rows() {
        let x = Array2::<f64>::zeros((3, 2));
        let y = Array1::<f64>::zeros(3);
        let w = Array1::<f64>::ones(2);
        assert!(ExplainerInput::new(x.view(), y.view(), w.view()).is_err());
    }

    #[test]
    fn test_check_attributions() {
        let x = Array2::<f64>::zeros((2, 2));
        let y = Array1::<f64>::zeros(2);
        let w = Array1::<f64>::ones(2);
        let input = ExplainerInput::new(x.view(), y.view(), w.view()).unwrap();
        assert!(check_attributions(&input, &array![[0.1, 0.2], [0.3, 0.4]]).is_ok());
        assert!(check_attributions(&input, &array![[0.1, 0.2, 0.0], [0.3, 0.4, 0.0]]).is_err());
        assert!(check_attributions(&input, &array![[f64::NAN, 0.2], [0.3, 0.4]]).is_err());
    }
}
