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

//! Fan-out over several tree-search monitors.
//!
//! Callbacks go to every child in insertion order. `search_command` returns
//! the first `Terminate`, so put stricter stop conditions first.

use crate::{
    monitor::tree_search_monitor::{SyncReport, TreeSearchMonitor},
    settings::BnbSettings,
};
use cairn_model::{problem::Problem, solution::MipSolution};
use cairn_search::{
    monitor::search_monitor::SearchCommand, result::MipStatus, stats::SolverStatistics,
};

/// A composite monitor that forwards every callback to its children.
pub struct CompositeTreeSearchMonitor<'a> {
    monitors: Vec<Box<dyn TreeSearchMonitor + 'a>>,
}

impl Default for CompositeTreeSearchMonitor<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompositeTreeSearchMonitor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.monitors.iter().map(|m| m.name()))
            .finish()
    }
}

impl<'a> CompositeTreeSearchMonitor<'a> {
    /// Creates a new empty `CompositeTreeSearchMonitor`.
    #[inline]
    pub fn new() -> Self {
        Self {
            monitors: Vec::new(),
        }
    }

    /// Creates a new `CompositeTreeSearchMonitor` with room for `capacity` monitors.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            monitors: Vec::with_capacity(capacity),
        }
    }

    /// Adds a new monitor after the existing ones.
    #[inline]
    pub fn add_monitor<M>(&mut self, monitor: M)
    where
        M: TreeSearchMonitor + 'a,
    {
        self.monitors.push(Box::new(monitor));
    }

    /// Adds a new boxed monitor after the existing ones.
    #[inline]
    pub fn add_monitor_boxed(&mut self, monitor: Box<dyn TreeSearchMonitor + 'a>) {
        self.monitors.push(monitor);
    }

    /// Returns the number of monitors in the composite.
    #[inline]
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    /// Returns `true` if the composite contains no monitors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}

impl TreeSearchMonitor for CompositeTreeSearchMonitor<'_> {
    fn name(&self) -> &str {
        "CompositeTreeSearchMonitor"
    }

    fn on_enter_search(&mut self, problem: &Problem, settings: &BnbSettings) {
        for monitor in &mut self.monitors {
            monitor.on_enter_search(problem, settings);
        }
    }

    fn on_sync(&mut self, report: &SyncReport) {
        for monitor in &mut self.monitors {
            monitor.on_sync(report);
        }
    }

    fn on_solution_found(&mut self, solution: &MipSolution) {
        for monitor in &mut self.monitors {
            monitor.on_solution_found(solution);
        }
    }

    fn on_exit_search(&mut self, status: MipStatus, statistics: &SolverStatistics) {
        for monitor in &mut self.monitors {
            monitor.on_exit_search(status, statistics);
        }
    }

    fn search_command(&mut self) -> SearchCommand {
        self.monitors
            .iter_mut()
            .map(|m| m.search_command())
            .find(SearchCommand::is_terminate)
            .unwrap_or(SearchCommand::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counting<'c> {
        syncs: &'c Cell<usize>,
        stop_after: Option<usize>,
    }

    impl TreeSearchMonitor for Counting<'_> {
        fn name(&self) -> &str {
            "Counting"
        }
        fn on_enter_search(&mut self, _: &Problem, _: &BnbSettings) {}
        fn on_sync(&mut self, _: &SyncReport) {
            self.syncs.set(self.syncs.get() + 1);
        }
        fn on_solution_found(&mut self, _: &MipSolution) {}
        fn on_exit_search(&mut self, _: MipStatus, _: &SolverStatistics) {}
        fn search_command(&mut self) -> SearchCommand {
            match self.stop_after {
                Some(n) if self.syncs.get() >= n => SearchCommand::Terminate(format!("{} syncs", n)),
                _ => SearchCommand::Continue,
            }
        }
    }

    #[test]
    fn test_fans_out_and_stops_on_first_terminate() {
        let a = Cell::new(0);
        let b = Cell::new(0);
        let mut composite = CompositeTreeSearchMonitor::with_capacity(2);
        composite.add_monitor(Counting {
            syncs: &a,
            stop_after: None,
        });
        composite.add_monitor_boxed(Box::new(Counting {
            syncs: &b,
            stop_after: Some(2),
        }));
        assert_eq!(composite.len(), 2);

        composite.on_sync(&SyncReport::default());
        assert_eq!(composite.search_command(), SearchCommand::Continue);
        composite.on_sync(&SyncReport::default());
        assert_eq!(
            composite.search_command(),
            SearchCommand::Terminate("2 syncs".to_string())
        );
        assert_eq!((a.get(), b.get()), (2, 2));
    }

    #[test]
    fn test_empty_composite_continues() {
        let mut composite = CompositeTreeSearchMonitor::new();
        assert!(composite.is_empty());
        assert_eq!(composite.search_command(), SearchCommand::Continue);
    }
}
