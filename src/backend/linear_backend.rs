//! Exact attributions for a weighted linear model.
//!
//! For a linear model the interventional SHAP value of feature `j` on row
//! `i` is `β_j (x_ij - x̄_j)`, with `x̄` the weighted feature mean. This
//! backend needs no external library, which makes it a useful baseline and
//! a stand-in explainer in tests. It is only used when injected explicitly.

use super::traits::{ExplainerInput, TreeExplainer};
use crate::config::ShapParams;
use crate::error::{KeyDriverError, Result};
use crate::utils::{to_dmatrix, weighted_mean};
use nalgebra::DVector;
use ndarray::{Array1, Array2, Axis};

/// Weighted least squares explainer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearExplainer;

impl TreeExplainer for LinearExplainer {
    fn name(&self) -> &str {
        "linear"
    }

    fn explain(&self, input: &ExplainerInput<'_>, _params: &ShapParams) -> Result<Array2<f64>> {
        let w = &input.weights;
        let means: Array1<f64> = input
            .features
            .axis_iter(Axis(1))
            .map(|col| weighted_mean(&col, w))
            .collect();
        let y_mean = weighted_mean(&input.target, w);

        let mut centered = input.features.to_owned();
        for (mut row, &wi) in centered.axis_iter_mut(Axis(0)).zip(w.iter()) {
            let scale = wi.sqrt();
            for (v, &m) in row.iter_mut().zip(means.iter()) {
                *v = scale * (*v - m);
            }
        }
        let y = DVector::from_iterator(
            input.n_rows(),
            input
                .target
                .iter()
                .zip(w.iter())
                .map(|(&yi, &wi)| wi.sqrt() * (yi - y_mean)),
        );

        let beta = to_dmatrix(&centered.view())
            .svd(true, true)
            .solve(&y, 1e-12)
            .map_err(|e| KeyDriverError::Backend(format!("linear solve failed: {}", e)))?;

        let mut attributions = input.features.to_owned();
        for mut row in attributions.axis_iter_mut(Axis(0)) {
            for (j, v) in row.iter_mut().enumerate() {
                *v = beta[j] * (*v - means[j]);
            }
        }
        Ok(attributions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_attributions_recover_linear_terms() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 3.0]];
        let y: Array1<f64> = x.rows().into_iter().map(|r| 2.0 * r[0] - r[1] + 1.0).collect();
        let w = Array1::ones(5);
        let input = ExplainerInput::new(x.view(), y.view(), w.view()).unwrap();
        let attr = LinearExplainer.explain(&input, &ShapParams::default()).unwrap();

        assert_eq!(attr.dim(), (5, 2));
        // x̄ = (3, 1): row 0 gets 2·(1 - 3) and -1·(0 - 1).
        assert!((attr[[0, 0]] + 4.0).abs() < 1e-9);
        assert!((attr[[0, 1]] - 1.0).abs() < 1e-9);
        // Attributions of each feature average to zero.
        for col in attr.axis_iter(Axis(1)) {
            assert!(col.sum().abs() < 1e-9);
        }
    }
}
