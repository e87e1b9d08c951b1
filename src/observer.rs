//! Progress observers for an analysis run.
//!
//! Observers are notified at every stage transition and after each driver's
//! Shapley value is computed. Returning [`ObserverAction::Stop`] from
//! [`AnalysisObserver::on_driver_scored`] cancels the run cooperatively; the
//! analysis then fails with [`KeyDriverError::Cancelled`](crate::error::KeyDriverError::Cancelled).
//!
//! # Example
//!
//! ```
//! use keydriver::importance::ImportanceMethod;
//! use keydriver::observer::{AnalysisObserver, ObserverAction};
//!
//! struct FirstDriverOnly;
//!
//! impl AnalysisObserver for FirstDriverOnly {
//!     fn on_driver_scored(&self, _driver: &str, _method: ImportanceMethod) -> ObserverAction {
//!         ObserverAction::Stop
//!     }
//! }
//! ```

use crate::importance::ImportanceMethod;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Stage of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStage {
    Preparing,
    Fitting,
    /// Diagnostics and importance methods, run in parallel.
    DiagnosticsAndImportance,
    Consensus,
    Done,
    Failed,
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalysisStage::Preparing => "preparing",
            AnalysisStage::Fitting => "fitting",
            AnalysisStage::DiagnosticsAndImportance => "diagnostics+importance",
            AnalysisStage::Consensus => "consensus",
            AnalysisStage::Done => "done",
            AnalysisStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What an observer wants the run to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverAction {
    Continue,
    Stop,
}

/// Receives progress notifications from a running analysis.
///
/// Methods take `&self` because Shapley drivers are scored from worker
/// threads; use interior mutability for state.
pub trait AnalysisObserver: Send + Sync {
    /// Called when the run enters `stage`.
    fn on_stage(&self, _stage: AnalysisStage) {}

    /// Called after `driver` has been scored by `method`.
    fn on_driver_scored(&self, _driver: &str, _method: ImportanceMethod) -> ObserverAction {
        ObserverAction::Continue
    }

    /// Name used in log output.
    fn name(&self) -> &str {
        "AnalysisObserver"
    }
}

/// Logs progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl AnalysisObserver for LoggingObserver {
    fn on_stage(&self, stage: AnalysisStage) {
        info!(stage = %stage, "Key driver analysis stage");
    }

    fn on_driver_scored(&self, driver: &str, method: ImportanceMethod) -> ObserverAction {
        debug!(driver, method = %method, "Driver scored");
        ObserverAction::Continue
    }

    fn name(&self) -> &str {
        "LoggingObserver"
    }
}

/// Records every stage a run passes through.
#[derive(Debug, Default)]
pub struct StageHistory {
    stages: Mutex<Vec<AnalysisStage>>,
}

impl StageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages seen so far, in order.
    pub fn stages(&self) -> Vec<AnalysisStage> {
        self.stages.lock().clone()
    }

    /// The most recent stage.
    pub fn last(&self) -> Option<AnalysisStage> {
        self.stages.lock().last().copied()
    }
}

impl AnalysisObserver for StageHistory {
    fn on_stage(&self, stage: AnalysisStage) {
        self.stages.lock().push(stage);
    }

    fn name(&self) -> &str {
        "StageHistory"
    }
}

/// Cancels a run from another thread.
///
/// Clones share the same flag; call [`cancel`](Self::cancel) on any of them
/// and the run stops at the next driver boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl AnalysisObserver for CancelHandle {
    fn on_driver_scored(&self, _driver: &str, _method: ImportanceMethod) -> ObserverAction {
        if self.is_cancelled() {
            ObserverAction::Stop
        } else {
            ObserverAction::Continue
        }
    }

    fn name(&self) -> &str {
        "CancelHandle"
    }
}

/// Runs several observers in sequence.
///
/// If any observer returns [`ObserverAction::Stop`], the list does too.
#[derive(Default)]
pub struct ObserverList {
    observers: Vec<Arc<dyn AnalysisObserver>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer to the list.
    pub fn add(&mut self, observer: Arc<dyn AnalysisObserver>) {
        self.observers.push(observer);
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, observer: Arc<dyn AnalysisObserver>) -> Self {
        self.add(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.observers.iter().map(|o| o.name()))
            .finish()
    }
}

impl AnalysisObserver for ObserverList {
    fn on_stage(&self, stage: AnalysisStage) {
        for observer in &self.observers {
            observer.on_stage(stage);
        }
    }

    fn on_driver_scored(&self, driver: &str, method: ImportanceMethod) -> ObserverAction {
        let mut action = ObserverAction::Continue;
        for observer in &self.observers {
            if observer.on_driver_scored(driver, method) == ObserverAction::Stop {
                action = ObserverAction::Stop;
            }
        }
        action
    }

    fn name(&self) -> &str {
        "ObserverList"
    }
}
