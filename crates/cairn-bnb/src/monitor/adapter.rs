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

//! Runs a mode-independent `SearchMonitor` inside the tree search.
//!
//! Lifecycle callbacks and `search_command` are forwarded; every sync is one
//! `on_step`. The sync report itself is not visible to the inner monitor.

use crate::{
    monitor::tree_search_monitor::{SyncReport, TreeSearchMonitor},
    settings::BnbSettings,
};
use cairn_model::{problem::Problem, solution::MipSolution};
use cairn_search::{
    monitor::search_monitor::{SearchCommand, SearchMonitor},
    result::MipStatus,
    stats::SolverStatistics,
};

pub struct SearchMonitorAdapter<'a> {
    inner: &'a mut dyn SearchMonitor,
    name: String,
}

impl<'a> SearchMonitorAdapter<'a> {
    pub fn new(inner: &'a mut dyn SearchMonitor) -> Self {
        let name = format!("SearchMonitorAdapter({})", inner.name());
        Self { inner, name }
    }
}

impl std::fmt::Debug for SearchMonitorAdapter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl TreeSearchMonitor for SearchMonitorAdapter<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn on_enter_search(&mut self, problem: &Problem, _settings: &BnbSettings) {
        self.inner.on_enter_search(problem);
    }

    #[inline]
    fn on_sync(&mut self, _report: &SyncReport) {
        self.inner.on_step();
    }

    #[inline]
    fn on_solution_found(&mut self, solution: &MipSolution) {
        self.inner.on_solution_found(solution);
    }

    #[inline]
    fn on_exit_search(&mut self, _status: MipStatus, _statistics: &SolverStatistics) {
        self.inner.on_exit_search();
    }

    #[inline]
    fn search_command(&mut self) -> SearchCommand {
        self.inner.search_command()
    }
}
