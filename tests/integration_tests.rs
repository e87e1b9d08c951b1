//! Integration tests for keydriver.

use keydriver::diagnostics::variance_inflation;
use keydriver::importance::ShapleyEngine;
use keydriver::prelude::*;
use keydriver::prepare::DataPreparer;
use keydriver::regression::{ModelFitter, RegressionModel};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::sync::Arc;

// =============================================================================
// Synthetic survey data
// =============================================================================

/// Columns of a synthetic survey: y = 0.5·x1 + 0.3·x2 + noise, x3 unrelated.
struct Survey {
    y: Vec<f64>,
    x: Vec<Vec<f64>>,
    noise: Vec<f64>,
}

fn survey(n: usize, seed: u64) -> Survey {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut draw = || -> Vec<f64> { (0..n).map(|_| normal.sample(&mut rng)).collect() };
    let x = vec![draw(), draw(), draw()];
    let noise: Vec<f64> = draw().into_iter().map(|e| 0.5 * e).collect();
    let y = (0..n)
        .map(|i| 0.5 * x[0][i] + 0.3 * x[1][i] + noise[i])
        .collect();
    Survey { y, x, noise }
}

fn table_from(y: &[f64], x: &[Vec<f64>]) -> DataTable {
    let mut table = DataTable::new().with_values("y", y).unwrap();
    for (j, col) in x.iter().enumerate() {
        table = table.with_values(format!("x{}", j + 1), col).unwrap();
    }
    table
}

fn driver_names(k: usize) -> Vec<String> {
    (0..k).map(|j| format!("x{}", j + 1)).collect()
}

fn run(table: &DataTable, k: usize) -> AnalysisResult {
    KeyDriverAnalysis::new(AnalysisConfig::new("y", driver_names(k)))
        .run(table)
        .unwrap()
}

fn fit(table: &DataTable, config: &AnalysisConfig, limits: &AnalysisLimits) -> RegressionModel {
    let prepared = DataPreparer::new(config, limits).prepare(table).unwrap();
    ModelFitter::new(limits).fit(&prepared.dataset).unwrap()
}

fn assert_close(a: &DriverScores, b: &DriverScores, tol: f64) {
    for ((name, va), vb) in a.iter().zip(b.values()) {
        assert!((va - vb).abs() < tol, "{name}: {va} vs {vb}");
    }
}

// =============================================================================
// End-to-end behaviour
// =============================================================================

#[test]
fn test_end_to_end_ranking() {
    let data = survey(200, 2024);
    let result = run(&table_from(&data.y, &data.x), 3);

    assert_eq!(result.n, 200);
    assert_eq!(result.importance.shapley.ranked(), vec!["x1", "x2", "x3"]);
    assert!(result.importance.shapley.get("x3").unwrap() < 5.0);
    assert_eq!(result.ordered_drivers()[0], "x1");
    assert_eq!(result.shapley_fits, 7);
    assert!(result.r_squared > 0.3);
    assert!(result.f_p_value < 1e-10);
}

#[test]
fn test_shares_sum_to_one_hundred() {
    let data = survey(150, 7);
    let result = run(&table_from(&data.y, &data.x), 3);
    for scores in [
        &result.importance.shapley,
        &result.importance.relative_weights,
        &result.importance.beta,
        &result.importance.correlation,
    ] {
        assert!((scores.sum() - 100.0).abs() < 1e-6);
    }
}

#[test]
fn test_noise_driver_gets_small_shapley_share() {
    let small = (0..10)
        .filter(|&seed| {
            let data = survey(200, 100 + seed);
            let result = run(&table_from(&data.y, &data.x), 3);
            result.importance.shapley.get("x3").unwrap() < 5.0
        })
        .count();
    assert!(small >= 9, "noise driver exceeded 5% in {} of 10 runs", 10 - small);
}

#[test]
fn test_shapley_totals_model_r2() {
    let data = survey(120, 3);
    let result = run(&table_from(&data.y, &data.x), 3);
    let shapley = result.method(ImportanceMethod::Shapley).unwrap();
    assert!((shapley.raw.sum() - result.r_squared).abs() < 1e-10);
    let rw = result.method(ImportanceMethod::RelativeWeights).unwrap();
    assert!((rw.raw.sum() - result.r_squared).abs() < 1e-10);
}

#[test]
fn test_signed_statistics_keep_direction() {
    let mut data = survey(200, 11);
    data.y = data
        .y
        .iter()
        .zip(&data.x[0])
        .map(|(y, x)| y - 1.2 * x)
        .collect();
    let result = run(&table_from(&data.y, &data.x), 3);
    assert!(result.signed_beta.get("x1").unwrap() < 0.0);
    assert!(result.signed_correlation.get("x1").unwrap() < 0.0);
    assert!(result.signed_beta.get("x2").unwrap() > 0.0);
}

// =============================================================================
// Invariance
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_shares_sum_to_one_hundred(seed in 0u64..10_000, n in 40usize..120) {
        let data = survey(n, seed);
        let result = run(&table_from(&data.y, &data.x), 3);
        prop_assert!((result.importance.shapley.sum() - 100.0).abs() < 1e-6);
        prop_assert!((result.importance.relative_weights.sum() - 100.0).abs() < 1e-6);
        prop_assert!(result.importance.relative_weights.values().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn prop_affine_rescaling_leaves_beta_and_rw_unchanged(
        seed in 0u64..10_000,
        driver in 0usize..3,
        scale in 0.1f64..100.0,
        shift in -50.0f64..50.0,
    ) {
        let data = survey(100, seed);
        let base = run(&table_from(&data.y, &data.x), 3);

        let mut x = data.x.clone();
        x[driver] = x[driver].iter().map(|v| scale * v + shift).collect();
        let rescaled = run(&table_from(&data.y, &x), 3);

        assert_close(&base.importance.beta, &rescaled.importance.beta, 1e-6);
        assert_close(
            &base.importance.relative_weights,
            &rescaled.importance.relative_weights,
            1e-6,
        );
    }

    #[test]
    fn prop_large_offset_leaves_beta_and_rw_unchanged(
        seed in 0u64..10_000,
        driver in 0usize..3,
        shift in 1.0e5f64..1.0e8,
    ) {
        let data = survey(100, seed);
        let base = run(&table_from(&data.y, &data.x), 3);

        let mut x = data.x.clone();
        x[driver] = x[driver].iter().map(|v| v + shift).collect();
        let shifted = run(&table_from(&data.y, &x), 3);

        assert_close(&base.importance.beta, &shifted.importance.beta, 1e-4);
        assert_close(
            &base.importance.relative_weights,
            &shifted.importance.relative_weights,
            1e-4,
        );
    }

    #[test]
    fn prop_row_permutation_leaves_beta_and_rw_unchanged(seed in 0u64..10_000) {
        let data = survey(90, seed);
        let base = run(&table_from(&data.y, &data.x), 3);

        let mut order: Vec<usize> = (0..90).collect();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed ^ 0xdead_beef));
        let y: Vec<f64> = order.iter().map(|&i| data.y[i]).collect();
        let x: Vec<Vec<f64>> = data
            .x
            .iter()
            .map(|col| order.iter().map(|&i| col[i]).collect())
            .collect();
        let permuted = run(&table_from(&y, &x), 3);

        assert_close(&base.importance.beta, &permuted.importance.beta, 1e-8);
        assert_close(
            &base.importance.relative_weights,
            &permuted.importance.relative_weights,
            1e-8,
        );
    }
}

// =============================================================================
// Diagnostics and failure modes
// =============================================================================

#[test]
fn test_vif_with_one_other_driver() {
    let data = survey(100, 5);
    let mut x = data.x.clone();
    x[1] = x[0].iter().zip(&x[1]).map(|(a, b)| 0.7 * a + b).collect();
    let table = table_from(&data.y, &x);
    let config = AnalysisConfig::new("y", driver_names(3));
    let limits = AnalysisLimits::default();
    let model = fit(&table, &config, &limits);

    let r = model.driver_correlation(0, 1);
    let vif = variance_inflation(&model, 0, &[1]).unwrap();
    assert!((vif - 1.0 / (1.0 - r * r)).abs() < 1e-10);
}

#[test]
fn test_exact_linear_transform_is_aliased() {
    let data = survey(100, 6);
    let mut x = data.x.clone();
    x[1] = x[0].iter().map(|v| 2.0 * v + 3.0).collect();
    let err = KeyDriverAnalysis::new(AnalysisConfig::new("y", driver_names(3)))
        .run(&table_from(&data.y, &x))
        .unwrap_err();
    match err {
        KeyDriverError::AliasedCoefficients(drivers) => {
            assert_eq!(drivers, vec!["x1".to_string(), "x2".to_string()]);
        }
        other => panic!("expected aliased coefficients, got {other}"),
    }
}

#[test]
fn test_sixteen_drivers_rejected_without_fitting() {
    let mut rng = ChaCha8Rng::seed_from_u64(16);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let n = 200;
    let x: Vec<Vec<f64>> = (0..16)
        .map(|_| (0..n).map(|_| normal.sample(&mut rng)).collect())
        .collect();
    let y: Vec<f64> = (0..n).map(|i| x.iter().map(|col| col[i]).sum()).collect();
    let table = table_from(&y, &x);
    let config = AnalysisConfig::new("y", driver_names(16));

    let history = Arc::new(StageHistory::new());
    let err = KeyDriverAnalysis::new(config.clone())
        .with_observer(history.clone())
        .run(&table)
        .unwrap_err();
    assert!(matches!(err, KeyDriverError::TooManyDrivers(16)));
    assert_eq!(history.stages(), vec![AnalysisStage::Preparing, AnalysisStage::Failed]);

    // A model fitted under relaxed limits still fails fast in the Shapley engine.
    let relaxed = AnalysisLimits {
        max_exact_drivers: 16,
        ..AnalysisLimits::default()
    };
    let model = fit(&table, &config, &relaxed);
    let err = ShapleyEngine::new(&AnalysisLimits::default())
        .run(&model)
        .unwrap_err();
    assert!(matches!(err, KeyDriverError::TooManyDrivers(16)));
    assert_eq!(model.fit_count(), 0);
}

#[test]
fn test_weights_change_r_squared() {
    let data = survey(200, 8);
    let weights: Vec<f64> = data.noise.iter().map(|e| 1.0 + 4.0 * e.abs()).collect();
    let table = table_from(&data.y, &data.x)
        .with_values("w", &weights)
        .unwrap();

    let unweighted = run(&table, 3);
    let config = AnalysisConfig::new("y", driver_names(3)).with_weight("w");
    let weighted = KeyDriverAnalysis::new(config)
        .run(&table)
        .unwrap();

    assert!((unweighted.r_squared - weighted.r_squared).abs() > 1e-3);
    assert!(weighted.effective_n < 200.0);
    assert!((weighted.importance.shapley.sum() - 100.0).abs() < 1e-6);
}

#[test]
fn test_excluded_rows_are_reported() {
    let data = survey(80, 9);
    let mut y: Vec<Option<f64>> = data.y.iter().map(|&v| Some(v)).collect();
    y[0] = None;
    y[1] = Some(f64::NAN);
    let mut weights: Vec<Option<f64>> = vec![Some(1.0); 80];
    weights[2] = Some(0.0);

    let mut table = DataTable::new();
    table.add_column("y", y).unwrap();
    for (j, col) in data.x.iter().enumerate() {
        table
            .add_column(format!("x{}", j + 1), col.iter().map(|&v| Some(v)).collect())
            .unwrap();
    }
    table.add_column("w", weights).unwrap();

    let result = KeyDriverAnalysis::new(AnalysisConfig::new("y", driver_names(3)).with_weight("w"))
        .run(&table)
        .unwrap();
    assert_eq!(result.n, 77);
    assert_eq!(result.excluded.missing, 2);
    assert_eq!(result.excluded.weight, 1);
    assert!(result.warnings.iter().any(|w| w.starts_with("Excluded 3 of 80")));
}

#[test]
fn test_collinear_drivers_warn_but_complete() {
    let data = survey(200, 12);
    let mut rng = ChaCha8Rng::seed_from_u64(12_345);
    let jitter = Normal::new(0.0, 0.05).unwrap();
    let mut x = data.x.clone();
    x[2] = x[0].iter().map(|v| v + jitter.sample(&mut rng)).collect();
    let result = run(&table_from(&data.y, &x), 3);

    let report = &result.diagnostics;
    assert_eq!(report.flagged(VifLevel::High).count(), 2);
    assert!(result.vif.get("x1").unwrap() > 10.0);
    assert!(result.warnings.iter().any(|w| w.contains("High multicollinearity")));
    assert!((result.importance.relative_weights.sum() - 100.0).abs() < 1e-6);
}

// =============================================================================
// SHAP strategy
// =============================================================================

#[test]
fn test_shap_skipped_when_capability_missing() {
    let data = survey(100, 13);
    let config = AnalysisConfig::new("y", driver_names(3)).with_shap(ShapParams::default());
    let result = KeyDriverAnalysis::new(config)
        .with_shap(ShapStrategy::Unavailable {
            capability: "xgboost",
        })
        .run(&table_from(&data.y, &data.x))
        .unwrap();

    assert_eq!(
        result.importance.shap,
        ShapResult::Skipped {
            reason: "xgboost not available".to_string()
        }
    );
    assert!(result.warnings.iter().any(|w| w.contains("xgboost not available")));
    assert!((result.importance.shapley.sum() - 100.0).abs() < 1e-6);
}

#[test]
fn test_injected_explainer_is_used() {
    let data = survey(300, 14);
    let params = ShapParams {
        sample_cap: 150,
        ..ShapParams::default()
    };
    let config = AnalysisConfig::new("y", driver_names(3)).with_shap(params);
    let result = KeyDriverAnalysis::new(config)
        .with_shap(ShapStrategy::with_explainer(LinearExplainer))
        .run(&table_from(&data.y, &data.x))
        .unwrap();

    let shap = result.method(ImportanceMethod::Shap).unwrap();
    assert_eq!(shap.percent.ranked(), vec!["x1", "x2", "x3"]);
    assert!((shap.percent.sum() - 100.0).abs() < 1e-9);
    match &result.importance.shap {
        ShapResult::Computed { rows_used, .. } => assert_eq!(*rows_used, 150),
        other => panic!("unexpected SHAP result: {other:?}"),
    }
}

#[cfg(feature = "xgboost")]
#[test]
fn test_xgboost_shap_end_to_end() {
    let data = survey(300, 18);
    let params = ShapParams {
        n_trees: 50,
        ..ShapParams::default()
    };
    let config = AnalysisConfig::new("y", driver_names(3)).with_shap(params);
    let analysis = KeyDriverAnalysis::new(config).with_shap(ShapStrategy::detect());
    assert!(analysis.shap_strategy().is_available());

    let result = analysis.run(&table_from(&data.y, &data.x)).unwrap();
    match &result.importance.shap {
        ShapResult::Computed { backend, rows_used, .. } => {
            assert_eq!(backend, "xgboost");
            assert_eq!(*rows_used, 300);
        }
        other => panic!("unexpected SHAP result: {other:?}"),
    }
    let shap = result.method(ImportanceMethod::Shap).unwrap();
    assert_eq!(shap.percent.ranked()[0], "x1");
    assert!((shap.percent.sum() - 100.0).abs() < 1e-6);
    assert_eq!(result.consensus.get("x1").unwrap().ranks.len(), 5);
}

// =============================================================================
// Configuration and output
// =============================================================================

#[test]
fn test_config_from_variables_with_labels() {
    let data = survey(100, 15);
    let variables = vec![
        VariableSpec::new("y", VariableRole::Outcome),
        VariableSpec::new("x1", VariableRole::Driver).with_label("Price"),
        VariableSpec::new("x2", VariableRole::Driver).with_label("Quality"),
        VariableSpec::new("x3", VariableRole::Driver),
    ];
    let config = AnalysisConfig::from_variables(&variables)
        .unwrap()
        .with_name("Brand health");
    let result = KeyDriverAnalysis::new(config)
        .run(&table_from(&data.y, &data.x))
        .unwrap();

    assert_eq!(result.analysis_name.as_deref(), Some("Brand health"));
    assert_eq!(result.labels.get("x1"), Some("Price"));
    assert_eq!(result.labels.get("x3"), Some("x3"));
}

#[test]
fn test_json_output_shape() {
    let data = survey(100, 16);
    let result = run(&table_from(&data.y, &data.x), 3);
    let json = result.to_value().unwrap();

    for key in [
        "n",
        "r_squared",
        "adj_r_squared",
        "f_stat",
        "rmse",
        "importance",
        "signed_beta",
        "signed_correlation",
        "vif",
        "consensus",
        "warnings",
    ] {
        assert!(json.get(key).is_some(), "missing key {key}");
    }
    assert_eq!(json["n"], 100);
    assert!(json["importance"]["shapley"]["x1"].is_number());
    assert_eq!(json["importance"]["shap"]["status"], "SKIPPED");
    assert_eq!(json["consensus"]["x1"]["flag"], "CONSISTENT");
    assert!(json["consensus"]["x2"]["ranks"]["relative_weights"].is_number());

    let text = result.to_json().unwrap();
    let x1 = text.find("\"x1\"").unwrap();
    let x2 = text.find("\"x2\"").unwrap();
    assert!(x1 < x2);
}

#[test]
fn test_observers_see_every_shapley_driver() {
    struct Counter(parking_lot::Mutex<Vec<String>>);

    impl AnalysisObserver for Counter {
        fn on_driver_scored(&self, driver: &str, method: ImportanceMethod) -> ObserverAction {
            assert_eq!(method, ImportanceMethod::Shapley);
            self.0.lock().push(driver.to_string());
            ObserverAction::Continue
        }
    }

    let counter = Arc::new(Counter(parking_lot::Mutex::new(Vec::new())));
    let observers = ObserverList::new()
        .with(counter.clone())
        .with(Arc::new(LoggingObserver));
    let data = survey(100, 17);
    KeyDriverAnalysis::new(AnalysisConfig::new("y", driver_names(3)))
        .with_observer(Arc::new(observers))
        .run(&table_from(&data.y, &data.x))
        .unwrap();

    let mut seen = counter.0.lock().clone();
    seen.sort();
    assert_eq!(seen, driver_names(3));
}
