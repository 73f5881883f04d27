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

use std::ops::AddAssign;

/// Per-worker counters, merged into the solver statistics at the end of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerStatistics {
    /// Nodes taken off a queue and processed.
    pub nodes_explored: u64,
    pub nodes_branched: u64,
    /// Closed because their bound could not beat the incumbent.
    pub nodes_fathomed: u64,
    /// Closed because their relaxation (or their bounds) had no solution.
    pub nodes_infeasible: u64,
    pub nodes_integer: u64,
    pub numerical_failures: u64,
    pub lp_iterations: u64,
    /// Deepest node processed.
    pub max_depth: u32,
    /// Dives run to a stop by a diving worker.
    pub dives_completed: u64,
    /// Relaxations solved inside dives.
    pub dive_lp_solves: u64,
}

impl WorkerStatistics {
    #[inline]
    pub fn on_node_explored(&mut self, depth: u32) {
        self.nodes_explored = self.nodes_explored.saturating_add(1);
        self.max_depth = self.max_depth.max(depth);
    }

    #[inline]
    pub fn on_lp_solved(&mut self, iterations: u64) {
        self.lp_iterations = self.lp_iterations.saturating_add(iterations);
    }

    #[inline]
    pub fn on_branched(&mut self) {
        self.nodes_branched = self.nodes_branched.saturating_add(1);
    }

    #[inline]
    pub fn on_fathomed(&mut self) {
        self.nodes_fathomed = self.nodes_fathomed.saturating_add(1);
    }

    #[inline]
    pub fn on_infeasible(&mut self) {
        self.nodes_infeasible = self.nodes_infeasible.saturating_add(1);
    }

    #[inline]
    pub fn on_integer(&mut self) {
        self.nodes_integer = self.nodes_integer.saturating_add(1);
    }

    #[inline]
    pub fn on_numerical_failure(&mut self) {
        self.numerical_failures = self.numerical_failures.saturating_add(1);
    }

    #[inline]
    pub fn on_dive_step(&mut self, iterations: u64) {
        self.dive_lp_solves = self.dive_lp_solves.saturating_add(1);
        self.on_lp_solved(iterations);
    }

    #[inline]
    pub fn on_dive_completed(&mut self) {
        self.dives_completed = self.dives_completed.saturating_add(1);
    }
}

impl AddAssign for WorkerStatistics {
    fn add_assign(&mut self, other: Self) {
        self.nodes_explored = self.nodes_explored.saturating_add(other.nodes_explored);
        self.nodes_branched = self.nodes_branched.saturating_add(other.nodes_branched);
        self.nodes_fathomed = self.nodes_fathomed.saturating_add(other.nodes_fathomed);
        self.nodes_infeasible = self.nodes_infeasible.saturating_add(other.nodes_infeasible);
        self.nodes_integer = self.nodes_integer.saturating_add(other.nodes_integer);
        self.numerical_failures = self
            .numerical_failures
            .saturating_add(other.numerical_failures);
        self.lp_iterations = self.lp_iterations.saturating_add(other.lp_iterations);
        self.max_depth = self.max_depth.max(other.max_depth);
        self.dives_completed = self.dives_completed.saturating_add(other.dives_completed);
        self.dive_lp_solves = self.dive_lp_solves.saturating_add(other.dive_lp_solves);
    }
}

impl std::iter::Sum for WorkerStatistics {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut acc, s| {
            acc += s;
            acc
        })
    }
}

impl std::fmt::Display for WorkerStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Worker Statistics:")?;
        writeln!(f, "  Nodes explored:       {}", self.nodes_explored)?;
        writeln!(f, "  Nodes branched:       {}", self.nodes_branched)?;
        writeln!(f, "  Nodes fathomed:       {}", self.nodes_fathomed)?;
        writeln!(f, "  Nodes infeasible:     {}", self.nodes_infeasible)?;
        writeln!(f, "  Integer nodes:        {}", self.nodes_integer)?;
        writeln!(f, "  Numerical failures:   {}", self.numerical_failures)?;
        writeln!(f, "  LP iterations:        {}", self.lp_iterations)?;
        writeln!(f, "  Max depth reached:    {}", self.max_depth)?;
        writeln!(f, "  Dives completed:      {}", self.dives_completed)?;
        writeln!(f, "  Dive LP solves:       {}", self.dive_lp_solves)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_depth() {
        let mut s = WorkerStatistics::default();
        s.on_node_explored(3);
        s.on_node_explored(1);
        s.on_lp_solved(10);
        s.on_branched();
        assert_eq!(s.nodes_explored, 2);
        assert_eq!(s.max_depth, 3);
        assert_eq!(s.lp_iterations, 10);
        assert_eq!(s.nodes_branched, 1);
    }

    #[test]
    fn test_sum_adds_counts_and_keeps_max_depth() {
        let a = WorkerStatistics {
            nodes_explored: 4,
            max_depth: 7,
            ..Default::default()
        };
        let b = WorkerStatistics {
            nodes_explored: 6,
            max_depth: 2,
            dives_completed: 1,
            ..Default::default()
        };
        let total: WorkerStatistics = [a, b].into_iter().sum();
        assert_eq!(total.nodes_explored, 10);
        assert_eq!(total.max_depth, 7);
        assert_eq!(total.dives_completed, 1);
    }
}
