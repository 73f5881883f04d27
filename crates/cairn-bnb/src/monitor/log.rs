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
use std::time::{Duration, Instant};

/// Writes a progress table through `log::info!`.
///
/// A row is emitted at most once per `log_interval`; syncs in between are
/// skipped. Improvements are always logged.
#[derive(Debug, Clone)]
pub struct LogTreeSearchMonitor {
    start_time: Instant,
    last_log_time: Option<Instant>,
    log_interval: Duration,
    best_objective: Option<f64>,
    rows: u64,
}

impl LogTreeSearchMonitor {
    pub fn new(log_interval: Duration) -> Self {
        Self {
            start_time: Instant::now(),
            last_log_time: None,
            log_interval,
            best_objective: None,
            rows: 0,
        }
    }

    #[inline]
    pub fn rows_logged(&self) -> u64 {
        self.rows
    }

    fn log_header(&self) {
        log::info!(
            "{:<9} | {:>8} | {:>12} | {:>8} | {:>14} | {:>14} | {:>8}",
            "Elapsed",
            "Horizon",
            "Nodes",
            "Open",
            "Lower Bound",
            "Upper Bound",
            "Gap"
        );
        log::info!("{}", "-".repeat(90));
    }

    fn log_row(&mut self, report: &SyncReport) {
        let gap = if report.upper_bound.is_finite() {
            format!("{:.2}%", 100.0 * report.gap())
        } else {
            "Inf".to_string()
        };
        log::info!(
            "{:<9} | {:>8} | {:>12} | {:>8} | {:>14.6} | {:>14.6} | {:>8}",
            format!("{:.1}s", self.start_time.elapsed().as_secs_f32()),
            report.horizon,
            report.nodes_explored,
            report.open_nodes,
            report.lower_bound,
            report.upper_bound,
            gap
        );
        self.last_log_time = Some(Instant::now());
        self.rows += 1;
    }
}

impl Default for LogTreeSearchMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl std::fmt::Display for LogTreeSearchMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LogTreeSearchMonitor(log_interval: {}ms)",
            self.log_interval.as_millis()
        )
    }
}

impl TreeSearchMonitor for LogTreeSearchMonitor {
    fn name(&self) -> &str {
        "LogTreeSearchMonitor"
    }

    fn on_enter_search(&mut self, problem: &Problem, settings: &BnbSettings) {
        self.start_time = Instant::now();
        self.last_log_time = None;
        self.best_objective = None;
        self.rows = 0;
        log::info!(
            "Solving {} columns, {} rows ({} integer) in {} mode with {} thread(s)",
            problem.num_columns(),
            problem.num_rows(),
            problem.integer_columns().len(),
            settings.mode,
            settings.num_threads()
        );
        self.log_header();
    }

    fn on_sync(&mut self, report: &SyncReport) {
        let due = self
            .last_log_time
            .is_none_or(|t| t.elapsed() >= self.log_interval);
        if due {
            self.log_row(report);
        }
    }

    fn on_solution_found(&mut self, solution: &MipSolution) {
        self.best_objective = Some(solution.objective());
        log::info!("New incumbent: {}", solution.objective());
    }

    fn on_exit_search(&mut self, status: MipStatus, statistics: &SolverStatistics) {
        log::info!("{}", "-".repeat(90));
        match self.best_objective {
            Some(objective) => log::info!(
                "Search finished: {} (objective {}, {} nodes)",
                status,
                objective,
                statistics.nodes_explored
            ),
            None => log::info!(
                "Search finished: {} ({} nodes)",
                status,
                statistics.nodes_explored
            ),
        }
    }
}
