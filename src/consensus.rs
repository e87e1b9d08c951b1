//! Cross-method ranking and agreement.

use crate::config::AnalysisLimits;
use crate::diagnostics::DiagnosticsReport;
use crate::importance::{ImportanceMethod, ImportanceResult};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use std::collections::BTreeMap;
use tracing::debug;

/// Agreement between a driver's ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsensusFlag {
    Consistent,
    /// Some method ranks the driver far from its Shapley rank.
    LowConsensus,
}

/// One driver's row of the consensus table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverConsensus {
    /// Rank under each computed method, 1 = most important.
    pub ranks: BTreeMap<ImportanceMethod, usize>,
    pub average_rank: f64,
    pub flag: ConsensusFlag,
    /// Largest distance between any method's rank and the Shapley rank.
    pub max_rank_gap: usize,
}

/// Consensus rows in driver order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsensusTable {
    rows: Vec<(String, DriverConsensus)>,
    warnings: Vec<String>,
}

impl ConsensusTable {
    pub fn get(&self, driver: &str) -> Option<&DriverConsensus> {
        self.rows
            .iter()
            .find(|(name, _)| name == driver)
            .map(|(_, row)| row)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DriverConsensus)> {
        self.rows.iter().map(|(name, row)| (name.as_str(), row))
    }

    /// Drivers from best to worst average rank; ties keep driver order.
    pub fn ordered_drivers(&self) -> Vec<&str> {
        let mut order: Vec<&(String, DriverConsensus)> = self.rows.iter().collect();
        order.sort_by(|a, b| a.1.average_rank.total_cmp(&b.1.average_rank));
        order.into_iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Drivers flagged [`ConsensusFlag::LowConsensus`].
    pub fn low_consensus(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, row)| row.flag == ConsensusFlag::LowConsensus)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl Serialize for ConsensusTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rows.len()))?;
        for (name, row) in &self.rows {
            map.serialize_entry(name, row)?;
        }
        map.end()
    }
}

/// Builds a [`ConsensusTable`] from the computed methods.
#[derive(Debug, Clone)]
pub struct ConsensusRanker<'a> {
    limits: &'a AnalysisLimits,
}

impl<'a> ConsensusRanker<'a> {
    pub fn new(limits: &'a AnalysisLimits) -> Self {
        Self { limits }
    }

    /// Rank every driver under every result in `methods`.
    ///
    /// All results must cover `drivers`. Without a Shapley result no driver is
    /// flagged. `diagnostics` supplies the VIF quoted in warnings.
    pub fn rank(
        &self,
        drivers: &[String],
        methods: &[&ImportanceResult],
        diagnostics: Option<&DiagnosticsReport>,
    ) -> ConsensusTable {
        let ranks: Vec<(ImportanceMethod, Vec<usize>)> =
            methods.iter().map(|m| (m.method, m.ranks())).collect();
        let shapley = ranks
            .iter()
            .find(|(method, _)| *method == ImportanceMethod::Shapley)
            .map(|(_, r)| r);

        let mut rows = Vec::with_capacity(drivers.len());
        let mut warnings = Vec::new();
        for (j, driver) in drivers.iter().enumerate() {
            let by_method: BTreeMap<ImportanceMethod, usize> =
                ranks.iter().map(|(method, r)| (*method, r[j])).collect();
            let average_rank = if by_method.is_empty() {
                f64::NAN
            } else {
                by_method.values().sum::<usize>() as f64 / by_method.len() as f64
            };

            let mut max_rank_gap = 0;
            let mut worst: Option<(ImportanceMethod, usize)> = None;
            if let Some(shapley) = shapley {
                for (&method, &rank) in &by_method {
                    let gap = rank.abs_diff(shapley[j]);
                    if gap > max_rank_gap {
                        max_rank_gap = gap;
                        worst = Some((method, rank));
                    }
                }
            }

            let flag = if max_rank_gap > self.limits.consensus_rank_gap {
                ConsensusFlag::LowConsensus
            } else {
                ConsensusFlag::Consistent
            };
            if let (ConsensusFlag::LowConsensus, Some((method, rank)), Some(shapley)) =
                (flag, worst, shapley)
            {
                let vif = diagnostics
                    .and_then(|d| d.vif_for(driver))
                    .map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v));
                warnings.push(format!(
                    "Low consensus for '{}': ranked {} by {} but {} by shapley (VIF {}). \
                     Multicollinearity may be distorting the single-equation methods.",
                    driver, rank, method, shapley[j], vif
                ));
            }

            rows.push((
                driver.clone(),
                DriverConsensus {
                    ranks: by_method,
                    average_rank,
                    flag,
                    max_rank_gap,
                },
            ));
        }

        debug!(
            methods = methods.len(),
            low_consensus = warnings.len(),
            "Ranked drivers across methods"
        );
        ConsensusTable { rows, warnings }
    }
}
