//! Exact Shapley value decomposition of R².
//!
//! Each driver's share is its marginal R² contribution averaged over every
//! subset of the other drivers, with the usual Shapley weights
//! `|S|! (k - |S| - 1)! / k!`. Subsets are enumerated as integers in
//! `[0, 2^(k-1))`, expanded to full driver bitmasks, and every subset R² is
//! fetched through a [`SubsetMemo`] shared by all drivers of the run. The
//! number of regressions is therefore `2^k - 1` instead of `k · 2^k`.
//!
//! Efficiency, symmetry and the null-player property hold by construction:
//! the raw values sum to the full-model R², drivers with identical
//! contributions receive identical values, and a driver that never changes
//! R² receives zero.

use super::{ImportanceMethod, ImportanceResult};
use crate::config::AnalysisLimits;
use crate::error::{KeyDriverError, Result};
use crate::observer::{AnalysisObserver, ObserverAction};
use crate::regression::RegressionModel;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use statrs::function::factorial::binomial;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Run-scoped cache of subset R² values keyed by driver bitmask.
///
/// Each slot is initialized at most once; concurrent readers of a slot that
/// is being computed block until it is ready.
#[derive(Debug)]
pub struct SubsetMemo {
    slots: Vec<OnceCell<f64>>,
}

impl SubsetMemo {
    /// Allocate a memo for `k` drivers (`2^k` slots).
    pub fn new(k: usize) -> Self {
        Self {
            slots: (0..1usize << k).map(|_| OnceCell::new()).collect(),
        }
    }

    /// R² of the subset `mask`, fitting it on first access.
    pub fn r2(&self, model: &RegressionModel, mask: u32) -> Result<f64> {
        if mask == 0 {
            return Ok(0.0);
        }
        self.slots[mask as usize]
            .get_or_try_init(|| model.fit_r2_mask(mask))
            .copied()
    }

    /// Number of subsets fitted so far.
    pub fn computed(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }
}

/// Shapley importance plus run statistics.
#[derive(Debug, Clone)]
pub struct ShapleyOutcome {
    pub result: ImportanceResult,
    /// Distinct subset regressions performed.
    pub distinct_fits: usize,
}

/// Computes exact Shapley values for a fitted model.
pub struct ShapleyEngine<'a> {
    limits: &'a AnalysisLimits,
    observer: Option<&'a dyn AnalysisObserver>,
}

impl<'a> ShapleyEngine<'a> {
    pub fn new(limits: &'a AnalysisLimits) -> Self {
        Self {
            limits,
            observer: None,
        }
    }

    /// Consult `observer` after every driver.
    pub fn with_observer(mut self, observer: &'a dyn AnalysisObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Shapley decomposition of `model`'s R².
    ///
    /// Fails with [`KeyDriverError::TooManyDrivers`] before any subset is
    /// fitted when the model has more drivers than exact enumeration allows.
    pub fn run(&self, model: &RegressionModel) -> Result<ShapleyOutcome> {
        let k = model.k();
        if k > self.limits.max_exact_drivers || k >= u32::BITS as usize {
            return Err(KeyDriverError::TooManyDrivers(k));
        }

        let memo = SubsetMemo::new(k);
        let weights: Vec<f64> = (0..k)
            .map(|size| 1.0 / (k as f64 * binomial((k - 1) as u64, size as u64)))
            .collect();
        let stopped = AtomicBool::new(false);

        let phi = (0..k)
            .into_par_iter()
            .map(|j| {
                if stopped.load(Ordering::Relaxed) {
                    return Err(KeyDriverError::Cancelled);
                }
                let value = driver_value(model, &memo, &weights, j)?;
                if let Some(observer) = self.observer {
                    let driver = &model.driver_names()[j];
                    if observer.on_driver_scored(driver, ImportanceMethod::Shapley)
                        == ObserverAction::Stop
                    {
                        stopped.store(true, Ordering::Relaxed);
                        return Err(KeyDriverError::Cancelled);
                    }
                }
                Ok(value)
            })
            .collect::<Result<Vec<f64>>>()?;

        let distinct_fits = memo.computed();
        debug!(k, distinct_fits, total = phi.iter().sum::<f64>(), "Computed Shapley values");

        Ok(ShapleyOutcome {
            result: ImportanceResult::from_raw(
                ImportanceMethod::Shapley,
                model.driver_names(),
                phi,
            ),
            distinct_fits,
        })
    }
}

/// Raw Shapley value of driver `j`.
fn driver_value(
    model: &RegressionModel,
    memo: &SubsetMemo,
    weights: &[f64],
    j: usize,
) -> Result<f64> {
    let k = model.k();
    let bit = 1u32 << j;
    let low_mask = bit - 1;
    (0..1u32 << (k - 1))
        .map(|m| {
            // Insert a zero at bit position j.
            let subset = (m & low_mask) | ((m >> j) << (j + 1));
            let gain = memo.r2(model, subset | bit)? - memo.r2(model, subset)?;
            Ok(weights[subset.count_ones() as usize] * gain)
        })
        .sum()
}
