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

//! Tree search monitoring interface
//!
//! Declares the `TreeSearchMonitor` trait and `SyncReport` for observing and
//! stopping a branch-and-bound search. A monitor can end the search through
//! `SearchCommand` (default: Continue).
//!
//! Lifecycle highlights
//! - enter → sync → solution → sync → … → exit
//! - `on_sync` fires once per horizon in deterministic mode and once per
//!   supervisor tick in opportunistic mode.
//!
//! Design notes
//! - Methods take `&mut self`; only the coordinating thread calls them.
//! - Keep callbacks lightweight. Workers wait while a deterministic sync runs.

use crate::settings::BnbSettings;
use cairn_core::num::float::relative_gap;
use cairn_model::{problem::Problem, solution::MipSolution};
use cairn_search::{
    monitor::search_monitor::SearchCommand, result::MipStatus, stats::SolverStatistics,
};
use std::time::Duration;

/// What one coordination round did. Bounds are in minimisation form.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SyncReport {
    /// Horizon number in deterministic mode, supervisor tick otherwise.
    pub horizon: u64,
    /// Work units consumed so far.
    pub work: f64,
    /// Events merged and applied to the canonical tree this round.
    pub events_replayed: usize,
    /// Events that referred to nodes closed before they were replayed.
    pub stale_events: usize,
    /// Open nodes removed because their bound reached the incumbent.
    pub nodes_pruned: usize,
    /// Nodes moved between worker queues by rebalancing.
    pub transfers: usize,
    pub dives_assigned: usize,
    pub open_nodes: usize,
    pub nodes_explored: u64,
    /// Global lower bound.
    pub lower_bound: f64,
    /// Incumbent objective, or infinity without one.
    pub upper_bound: f64,
    /// Wall-clock time since the search started.
    pub elapsed: Duration,
}

impl SyncReport {
    /// The relative gap between the two bounds.
    ///
    /// # Returns
    ///
    /// `(upper - lower) / max(|upper|, 1e-10)`, or infinity without an incumbent.
    #[inline]
    pub fn gap(&self) -> f64 {
        relative_gap(self.lower_bound, self.upper_bound)
    }
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SyncReport(horizon: {}, events: {}, open: {}, bounds: [{}, {}])",
            self.horizon, self.events_replayed, self.open_nodes, self.lower_bound, self.upper_bound
        )
    }
}

/// Observes, and may stop, a branch-and-bound search.
pub trait TreeSearchMonitor {
    /// Returns the name of the monitor.
    fn name(&self) -> &str;
    /// Called once before the root relaxation is solved.
    fn on_enter_search(&mut self, problem: &Problem, settings: &BnbSettings);
    /// Called after each coordination round.
    fn on_sync(&mut self, report: &SyncReport);
    /// Called for every accepted incumbent, objective in the problem's own sense.
    fn on_solution_found(&mut self, solution: &MipSolution);
    /// Called once when the search ends, with its final status.
    fn on_exit_search(&mut self, status: MipStatus, statistics: &SolverStatistics);
    /// Called after each sync to decide whether the search goes on.
    fn search_command(&mut self) -> SearchCommand {
        SearchCommand::Continue
    }
}

impl std::fmt::Debug for dyn TreeSearchMonitor + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TreeSearchMonitor({})", self.name())
    }
}

impl std::fmt::Display for dyn TreeSearchMonitor + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TreeSearchMonitor({})", self.name())
    }
}

/// Lets a borrowed monitor join a composite without giving up ownership.
impl<M> TreeSearchMonitor for &mut M
where
    M: TreeSearchMonitor + ?Sized,
{
    #[inline]
    fn name(&self) -> &str {
        (**self).name()
    }

    #[inline]
    fn on_enter_search(&mut self, problem: &Problem, settings: &BnbSettings) {
        (**self).on_enter_search(problem, settings);
    }

    #[inline]
    fn on_sync(&mut self, report: &SyncReport) {
        (**self).on_sync(report);
    }

    #[inline]
    fn on_solution_found(&mut self, solution: &MipSolution) {
        (**self).on_solution_found(solution);
    }

    #[inline]
    fn on_exit_search(&mut self, status: MipStatus, statistics: &SolverStatistics) {
        (**self).on_exit_search(status, statistics);
    }

    #[inline]
    fn search_command(&mut self) -> SearchCommand {
        (**self).search_command()
    }
}
