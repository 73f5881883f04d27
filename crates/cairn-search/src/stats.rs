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

use std::time::Duration;

/// Exploration statistics of one solve.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SolverStatistics {
    /// Nodes whose relaxation was solved.
    pub nodes_explored: u64,
    pub nodes_branched: u64,
    /// Nodes closed by bound, at the worker or when pruned at a sync.
    pub nodes_fathomed: u64,
    pub nodes_infeasible: u64,
    /// Nodes whose relaxation was already integral.
    pub nodes_integer: u64,
    pub numerical_failures: u64,
    pub lp_iterations: u64,
    /// Incumbent improvements accepted.
    pub solutions_found: u64,
    /// Syncs run, deterministic mode only.
    pub horizons: u64,
    /// Nodes moved between workers when queues were rebalanced.
    pub rebalance_transfers: u64,
    pub dives_assigned: u64,
    /// Replayed events whose node had already been closed.
    pub stale_events: u64,
    pub producer_waits: u64,
    pub producer_timeouts: u64,
    pub producer_wait_time: Duration,
    /// Worker threads that ran, at least one.
    pub used_threads: usize,
    pub solve_duration: Duration,
}

impl std::fmt::Display for SolverStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Solver Statistics:")?;
        writeln!(f, "  Nodes Explored: {}", self.nodes_explored)?;
        writeln!(f, "  Nodes Branched: {}", self.nodes_branched)?;
        writeln!(f, "  Nodes Fathomed: {}", self.nodes_fathomed)?;
        writeln!(f, "  Nodes Infeasible: {}", self.nodes_infeasible)?;
        writeln!(f, "  Nodes Integer: {}", self.nodes_integer)?;
        writeln!(f, "  Numerical Failures: {}", self.numerical_failures)?;
        writeln!(f, "  LP Iterations: {}", self.lp_iterations)?;
        writeln!(f, "  Solutions Found: {}", self.solutions_found)?;
        writeln!(f, "  Horizons: {}", self.horizons)?;
        writeln!(f, "  Rebalance Transfers: {}", self.rebalance_transfers)?;
        writeln!(f, "  Dives Assigned: {}", self.dives_assigned)?;
        writeln!(f, "  Stale Events: {}", self.stale_events)?;
        writeln!(
            f,
            "  Producer Waits: {} ({} timed out, {:.3} secs)",
            self.producer_waits,
            self.producer_timeouts,
            self.producer_wait_time.as_secs_f64()
        )?;
        writeln!(f, "  Used Threads: {}", self.used_threads)?;
        writeln!(
            f,
            "  Solve Duration (secs): {:.3}",
            self.solve_duration.as_secs_f64()
        )
    }
}

/// Builder for `SolverStatistics`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverStatisticsBuilder {
    stats: SolverStatistics,
}

impl Default for SolverStatisticsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! builder_setter {
    ($name:ident, $ty:ty) => {
        #[inline]
        pub fn $name(mut self, $name: $ty) -> Self {
            self.stats.$name = $name;
            self
        }
    };
}

impl SolverStatisticsBuilder {
    #[inline]
    pub fn new() -> Self {
        Self {
            stats: SolverStatistics {
                used_threads: 1,
                ..SolverStatistics::default()
            },
        }
    }

    builder_setter!(nodes_explored, u64);
    builder_setter!(nodes_branched, u64);
    builder_setter!(nodes_fathomed, u64);
    builder_setter!(nodes_infeasible, u64);
    builder_setter!(nodes_integer, u64);
    builder_setter!(numerical_failures, u64);
    builder_setter!(lp_iterations, u64);
    builder_setter!(solutions_found, u64);
    builder_setter!(horizons, u64);
    builder_setter!(rebalance_transfers, u64);
    builder_setter!(dives_assigned, u64);
    builder_setter!(stale_events, u64);
    builder_setter!(producer_waits, u64);
    builder_setter!(producer_timeouts, u64);
    builder_setter!(producer_wait_time, Duration);
    builder_setter!(used_threads, usize);
    builder_setter!(solve_duration, Duration);

    #[inline]
    pub fn build(self) -> SolverStatistics {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_constructs_expected_struct() {
        let stats = SolverStatisticsBuilder::new()
            .nodes_explored(40)
            .nodes_branched(19)
            .lp_iterations(321)
            .horizons(7)
            .used_threads(3)
            .solve_duration(Duration::from_millis(1234))
            .build();

        assert_eq!(stats.nodes_explored, 40);
        assert_eq!(stats.nodes_branched, 19);
        assert_eq!(stats.lp_iterations, 321);
        assert_eq!(stats.horizons, 7);
        assert_eq!(stats.used_threads, 3);
        assert_eq!(stats.solve_duration, Duration::from_millis(1234));
        assert_eq!(stats.nodes_fathomed, 0);
    }

    #[test]
    fn test_builder_defaults_to_one_thread() {
        assert_eq!(SolverStatisticsBuilder::new().build().used_threads, 1);
    }

    #[test]
    fn test_display_formats_fields() {
        let stats = SolverStatisticsBuilder::new()
            .nodes_explored(5)
            .producer_waits(2)
            .producer_timeouts(1)
            .solve_duration(Duration::from_millis(1500))
            .build();
        let rendered = stats.to_string();
        assert!(rendered.contains("Solver Statistics:"));
        assert!(rendered.contains("Nodes Explored: 5"));
        assert!(rendered.contains("Producer Waits: 2 (1 timed out"));
        assert!(rendered.contains("Solve Duration (secs): 1.500"));
    }
}
