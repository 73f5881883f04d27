// Copyright (c) 2025 Felix Kahle.
//
// Permission is hereby granted, free of charge, to any person obtaining
// a copy of this software and associated documentation files (the
// "Software"), to deal in the Software without restriction, including
// without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to
// permit persons to whom the Software is furnished to do so, subject to
// the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE
// LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION
// WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Tunables of the exploration engine.
//!
//! `BnbSettings::default()` is a sensible starting point; the `with_*`
//! setters chain, and `validate` rejects combinations the engine cannot run.

use crate::{
    diving::DivingStrategy,
    error::{BnbError, BnbResult},
};
use std::time::Duration;

/// How workers share global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExplorationMode {
    /// Horizon-synchronised with event replay; reproducible.
    #[default]
    Deterministic,
    /// Shared state mutated as soon as results are available.
    Opportunistic,
}

impl std::fmt::Display for ExplorationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExplorationMode::Deterministic => write!(f, "deterministic"),
            ExplorationMode::Opportunistic => write!(f, "opportunistic"),
        }
    }
}

/// Converts LP effort into work units.
///
/// Work must be a function of the LP's reported iterations only, never of
/// wall-clock time, or horizons would stop being reproducible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkModel {
    pub per_node: f64,
    pub per_lp_iteration: f64,
}

impl Default for WorkModel {
    fn default() -> Self {
        Self {
            per_node: 1.0,
            per_lp_iteration: 0.01,
        }
    }
}

impl WorkModel {
    /// Work charged for one node whose LP took `lp_iterations`.
    #[inline]
    pub fn node_cost(&self, lp_iterations: u64) -> f64 {
        self.per_node + self.per_lp_iteration * lp_iterations as f64
    }
}

/// Everything the exploration engine can be tuned with.
///
/// Fields are public so a caller can set several at once with struct update
/// syntax; `validate` is what guards against nonsense.
#[derive(Debug, Clone, PartialEq)]
pub struct BnbSettings {
    pub mode: ExplorationMode,
    /// Best-first workers. In opportunistic mode this is the thread count.
    pub num_bfs_workers: usize,
    /// Diving workers; deterministic mode only.
    pub num_diving_workers: usize,
    /// Assigned to diving workers round-robin.
    pub diving_strategies: Vec<DivingStrategy>,
    /// Work units between two syncs.
    pub horizon_step: f64,
    /// Rebalance when the largest and smallest worker loads differ by more than this.
    pub rebalance_threshold: usize,
    pub work_model: WorkModel,
    pub integrality_tolerance: f64,
    pub relative_gap_tolerance: f64,
    pub absolute_gap_tolerance: f64,
    pub time_limit: Option<Duration>,
    /// Total work after which deterministic mode stops; reproducible, unlike `time_limit`.
    pub work_limit: Option<f64>,
    /// Node-local LP failures tolerated before the solve gives up.
    pub max_numerical_failures: u64,
    pub max_dive_depth: usize,
    /// How long a sync waits for an external producer.
    pub producer_timeout: Duration,
    /// Tighten column bounds with the root reduced costs once an incumbent exists.
    pub reduced_cost_fixing: bool,
    /// Check node conservation at every sync. Costly; meant for tests.
    pub audit_node_conservation: bool,
}

impl Default for BnbSettings {
    fn default() -> Self {
        Self {
            mode: ExplorationMode::Deterministic,
            num_bfs_workers: 2,
            num_diving_workers: 1,
            diving_strategies: vec![
                DivingStrategy::Pseudocost,
                DivingStrategy::Guided,
                DivingStrategy::LineSearch,
                DivingStrategy::Coefficient,
            ],
            horizon_step: 5.0,
            rebalance_threshold: 8,
            work_model: WorkModel::default(),
            integrality_tolerance: 1e-6,
            relative_gap_tolerance: 1e-4,
            absolute_gap_tolerance: 1e-6,
            time_limit: None,
            work_limit: None,
            max_numerical_failures: 64,
            max_dive_depth: 64,
            producer_timeout: Duration::from_millis(50),
            reduced_cost_fixing: true,
            audit_node_conservation: false,
        }
    }
}

impl BnbSettings {
    /// Chooses how workers share global state.
    #[inline]
    pub fn with_mode(mut self, mode: ExplorationMode) -> Self {
        self.mode = mode;
        self
    }

    #[inline]
    pub fn with_bfs_workers(mut self, n: usize) -> Self {
        self.num_bfs_workers = n;
        self
    }

    #[inline]
    pub fn with_diving_workers(mut self, n: usize) -> Self {
        self.num_diving_workers = n;
        self
    }

    #[inline]
    pub fn with_diving_strategies(mut self, strategies: Vec<DivingStrategy>) -> Self {
        self.diving_strategies = strategies;
        self
    }

    #[inline]
    pub fn with_horizon_step(mut self, step: f64) -> Self {
        self.horizon_step = step;
        self
    }

    #[inline]
    pub fn with_rebalance_threshold(mut self, threshold: usize) -> Self {
        self.rebalance_threshold = threshold;
        self
    }

    #[inline]
    pub fn with_work_model(mut self, model: WorkModel) -> Self {
        self.work_model = model;
        self
    }

    #[inline]
    pub fn with_gap_tolerances(mut self, relative: f64, absolute: f64) -> Self {
        self.relative_gap_tolerance = relative;
        self.absolute_gap_tolerance = absolute;
        self
    }

    #[inline]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    #[inline]
    pub fn with_work_limit(mut self, limit: f64) -> Self {
        self.work_limit = Some(limit);
        self
    }

    #[inline]
    pub fn with_max_numerical_failures(mut self, n: u64) -> Self {
        self.max_numerical_failures = n;
        self
    }

    #[inline]
    pub fn with_max_dive_depth(mut self, depth: usize) -> Self {
        self.max_dive_depth = depth;
        self
    }

    #[inline]
    pub fn with_producer_timeout(mut self, timeout: Duration) -> Self {
        self.producer_timeout = timeout;
        self
    }

    /// Enables or disables root reduced-cost fixing.
    ///
    /// # Arguments
    ///
    /// * `enabled` - Whether the search may tighten integer columns from the
    ///   root reduced costs before it starts.
    ///
    /// # Returns
    ///
    /// The updated settings.
    #[inline]
    pub fn with_reduced_cost_fixing(mut self, enabled: bool) -> Self {
        self.reduced_cost_fixing = enabled;
        self
    }

    #[inline]
    pub fn with_conservation_audit(mut self, enabled: bool) -> Self {
        self.audit_node_conservation = enabled;
        self
    }

    /// Total worker threads the chosen mode will spawn.
    #[inline]
    pub fn num_threads(&self) -> usize {
        match self.mode {
            ExplorationMode::Deterministic => self.num_bfs_workers + self.num_diving_workers,
            ExplorationMode::Opportunistic => self.num_bfs_workers,
        }
    }

    /// Diving strategy of diving worker `i`.
    #[inline]
    pub fn diving_strategy(&self, i: usize) -> DivingStrategy {
        if self.diving_strategies.is_empty() {
            return DivingStrategy::Pseudocost;
        }
        self.diving_strategies[i % self.diving_strategies.len()]
    }

    /// Whether `lower` and `upper` are close enough to stop.
    ///
    /// # Arguments
    ///
    /// * `lower` - The global lower bound, internal sense.
    /// * `upper` - The incumbent objective, internal sense; infinite without one.
    ///
    /// # Returns
    ///
    /// `true` if either gap tolerance is met. Never `true` without an incumbent.
    #[inline]
    pub fn gap_closed(&self, lower: f64, upper: f64) -> bool {
        if !upper.is_finite() {
            return false;
        }
        if lower >= upper - self.absolute_gap_tolerance {
            return true;
        }
        cairn_core::num::float::relative_gap(lower, upper) <= self.relative_gap_tolerance
    }

    /// Rejects settings the engine cannot run with.
    ///
    /// # Returns
    ///
    /// `Ok(())`, or `BnbError::InvalidSettings` naming the first offending
    /// value.
    pub fn validate(&self) -> BnbResult<()> {
        if self.num_bfs_workers == 0 {
            return Err(BnbError::InvalidSettings(
                "at least one BFS worker is required".to_string(),
            ));
        }
        if !(self.horizon_step.is_finite() && self.horizon_step > 0.0) {
            return Err(BnbError::InvalidSettings(format!(
                "horizon step must be positive and finite, got {}",
                self.horizon_step
            )));
        }
        if !(self.work_model.per_node > 0.0 && self.work_model.per_lp_iteration >= 0.0) {
            return Err(BnbError::InvalidSettings(
                "work model must charge a positive cost per node".to_string(),
            ));
        }
        if self.integrality_tolerance < 0.0 || self.integrality_tolerance >= 0.5 {
            return Err(BnbError::InvalidSettings(format!(
                "integrality tolerance must lie in [0, 0.5), got {}",
                self.integrality_tolerance
            )));
        }
        if self.relative_gap_tolerance < 0.0 || self.absolute_gap_tolerance < 0.0 {
            return Err(BnbError::InvalidSettings(
                "gap tolerances must be non-negative".to_string(),
            ));
        }
        if let Some(limit) = self.work_limit.filter(|l| l.is_nan() || *l <= 0.0) {
            return Err(BnbError::InvalidSettings(format!(
                "work limit must be positive, got {}",
                limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(BnbSettings::default().validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let s = BnbSettings::default()
            .with_mode(ExplorationMode::Opportunistic)
            .with_bfs_workers(4)
            .with_diving_workers(2)
            .with_horizon_step(2.5)
            .with_work_limit(100.0)
            .with_reduced_cost_fixing(false);
        assert!(!s.reduced_cost_fixing);
        assert_eq!(s.mode, ExplorationMode::Opportunistic);
        assert_eq!(s.num_threads(), 4);
        assert_eq!(s.horizon_step, 2.5);
        assert_eq!(s.work_limit, Some(100.0));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(BnbSettings::default().with_bfs_workers(0).validate().is_err());
        assert!(BnbSettings::default().with_horizon_step(0.0).validate().is_err());
        assert!(
            BnbSettings::default()
                .with_horizon_step(f64::INFINITY)
                .validate()
                .is_err()
        );
        assert!(BnbSettings::default().with_work_limit(-1.0).validate().is_err());
    }

    #[test]
    fn test_diving_strategies_cycle() {
        let s = BnbSettings::default();
        assert_eq!(s.diving_strategy(0), DivingStrategy::Pseudocost);
        assert_eq!(s.diving_strategy(1), DivingStrategy::Guided);
        assert_eq!(s.diving_strategy(2), DivingStrategy::LineSearch);
        assert_eq!(s.diving_strategy(3), DivingStrategy::Coefficient);
        assert_eq!(s.diving_strategy(4), DivingStrategy::Pseudocost);
        let empty = BnbSettings::default().with_diving_strategies(Vec::new());
        assert_eq!(empty.diving_strategy(5), DivingStrategy::Pseudocost);
    }

    #[test]
    fn test_gap_closed() {
        let s = BnbSettings::default();
        assert!(!s.gap_closed(0.0, f64::INFINITY));
        assert!(s.gap_closed(10.0, 10.0));
        assert!(s.gap_closed(9.9999, 10.0));
        assert!(!s.gap_closed(9.0, 10.0));
    }

    #[test]
    fn test_work_model_cost() {
        let m = WorkModel::default();
        assert!((m.node_cost(100) - 2.0).abs() < 1e-12);
    }
}
