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

use crate::{
    monitor::tree_search_monitor::{SyncReport, TreeSearchMonitor},
    settings::BnbSettings,
};
use cairn_model::{problem::Problem, solution::MipSolution};
use cairn_search::{result::MipStatus, stats::SolverStatistics};

/// A monitor that ignores every callback and never stops the search.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct NoOpTreeSearchMonitor;

impl NoOpTreeSearchMonitor {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl TreeSearchMonitor for NoOpTreeSearchMonitor {
    #[inline]
    fn name(&self) -> &str {
        "NoOpTreeSearchMonitor"
    }

    #[inline]
    fn on_enter_search(&mut self, _problem: &Problem, _settings: &BnbSettings) {}

    #[inline]
    fn on_sync(&mut self, _report: &SyncReport) {}

    #[inline]
    fn on_solution_found(&mut self, _solution: &MipSolution) {}

    #[inline]
    fn on_exit_search(&mut self, _status: MipStatus, _statistics: &SolverStatistics) {}
}
