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

//! # External Solutions
//!
//! Solutions found outside the tree search (by heuristics running on other
//! threads, or supplied by the caller) enter through a `HeuristicQueue`.
//! Each submission carries a work-unit timestamp. In deterministic mode the
//! coordinator drains only entries stamped at or before the horizon being
//! synced and sorts them by content, so they replay at the same point on
//! every run. The opportunistic supervisor drains everything as it arrives.
//!
//! Candidates that fail the feasibility check can be handed to a
//! `RepairHeuristic` through the `RepairQueue`. Repaired points re-enter the
//! heuristic queue like any other submission.

use crate::lp::RootRelaxation;
use cairn_model::problem::Problem;
use std::{
    cmp::Ordering,
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

/// A submitted point, not yet checked for feasibility.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicSolution {
    /// One value per column.
    pub values: Vec<f64>,
    /// Work units at which the solution counts as found.
    pub timestamp: f64,
}

impl HeuristicSolution {
    fn content_cmp(&self, other: &Self) -> Ordering {
        self.timestamp.total_cmp(&other.timestamp).then_with(|| {
            self.values
                .iter()
                .zip(&other.values)
                .map(|(a, b)| a.total_cmp(b))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| self.values.len().cmp(&other.values.len()))
        })
    }
}

/// Thread-safe inbox for solutions found outside the tree search.
#[derive(Debug, Default)]
pub struct HeuristicQueue {
    entries: Mutex<Vec<HeuristicSolution>>,
}

impl HeuristicQueue {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Vec<HeuristicSolution>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues a candidate solution.
    ///
    /// # Arguments
    ///
    /// * `values` - One value per column of the problem being solved.
    /// * `timestamp` - Work units at which the solution counts as found.
    pub fn submit(&self, values: Vec<f64>, timestamp: f64) {
        self.lock().push(HeuristicSolution { values, timestamp });
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes entries stamped at or before `end`, sorted by timestamp then values.
    pub fn drain_until(&self, end: f64) -> Vec<HeuristicSolution> {
        let mut drained: Vec<HeuristicSolution> = {
            let mut entries = self.lock();
            let (ready, pending): (Vec<_>, Vec<_>) =
                entries.drain(..).partition(|e| e.timestamp <= end);
            *entries = pending;
            ready
        };
        drained.sort_by(HeuristicSolution::content_cmp);
        drained
    }

    /// Removes every entry in submission order.
    pub fn drain_all(&self) -> Vec<HeuristicSolution> {
        std::mem::take(&mut *self.lock())
    }
}

/// Tries to turn an infeasible candidate into a feasible point.
pub trait RepairHeuristic: Send {
    /// Returns the name of the heuristic.
    fn name(&self) -> &str;

    /// Attempts a repair of `candidate`.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem the candidate failed to satisfy.
    /// * `candidate` - The infeasible point.
    /// * `root` - The root relaxation, a common guide for rounding.
    ///
    /// # Returns
    ///
    /// A new point, or `None` if the heuristic gives up. The returned point
    /// is checked again before it is used.
    fn repair(
        &mut self,
        problem: &Problem,
        candidate: &[f64],
        root: &RootRelaxation,
    ) -> Option<Vec<f64>>;
}

impl std::fmt::Debug for dyn RepairHeuristic + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RepairHeuristic({})", self.name())
    }
}

/// Candidates waiting for a repair attempt, oldest first.
#[derive(Debug, Default)]
pub struct RepairQueue {
    entries: Mutex<VecDeque<Vec<f64>>>,
}

impl RepairQueue {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<f64>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues `candidate` for the next repair round.
    #[inline]
    pub fn push(&self, candidate: Vec<f64>) {
        self.lock().push_back(candidate);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes every candidate, oldest first.
    pub fn drain(&self) -> Vec<Vec<f64>> {
        self.lock().drain(..).collect()
    }
}

/// Runs `heuristic` over every queued candidate and resubmits feasible repairs at `timestamp`.
///
/// Returns the number of successful repairs.
pub fn process_repairs(
    repairs: &RepairQueue,
    heuristic: &mut dyn RepairHeuristic,
    problem: &Problem,
    root: &RootRelaxation,
    tolerance: f64,
    target: &HeuristicQueue,
    timestamp: f64,
) -> usize {
    let mut repaired = 0;
    for candidate in repairs.drain() {
        match heuristic.repair(problem, &candidate, root) {
            Some(values) if problem.is_feasible(&values, tolerance) => {
                target.submit(values, timestamp);
                repaired += 1;
            }
            Some(_) => log::debug!("{} returned an infeasible repair", heuristic.name()),
            None => log::trace!("{} could not repair a candidate", heuristic.name()),
        }
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_model::{
        index::ColumnIndex,
        problem::{ProblemBuilder, VariableKind},
    };

    #[test]
    fn test_drain_until_keeps_later_entries() {
        let queue = HeuristicQueue::new();
        queue.submit(vec![1.0], 12.0);
        queue.submit(vec![2.0], 4.0);
        queue.submit(vec![3.0], 5.0);
        let drained = queue.drain_until(5.0);
        let stamps: Vec<f64> = drained.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![4.0, 5.0]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain_all().len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_order_ignores_submission_order() {
        let a = HeuristicQueue::new();
        a.submit(vec![1.0, 0.0], 3.0);
        a.submit(vec![0.0, 1.0], 3.0);
        a.submit(vec![0.0, 0.0], 1.0);
        let b = HeuristicQueue::new();
        b.submit(vec![0.0, 0.0], 1.0);
        b.submit(vec![0.0, 1.0], 3.0);
        b.submit(vec![1.0, 0.0], 3.0);
        assert_eq!(a.drain_until(10.0), b.drain_until(10.0));
    }

    struct RoundUp;

    impl RepairHeuristic for RoundUp {
        fn name(&self) -> &str {
            "RoundUp"
        }
        fn repair(&mut self, _: &Problem, candidate: &[f64], _: &RootRelaxation) -> Option<Vec<f64>> {
            Some(candidate.iter().map(|v| v.ceil()).collect())
        }
    }

    #[test]
    fn test_repairs_are_resubmitted() {
        let mut b = ProblemBuilder::new(1);
        b.set_bounds(ColumnIndex::new(0), 0.0, 1.0)
            .set_variable_kind(ColumnIndex::new(0), VariableKind::Integer);
        let problem = b.build().expect("valid");
        let root = RootRelaxation::from_primal(vec![0.0], 0.0);

        let repairs = RepairQueue::new();
        repairs.push(vec![0.3]);
        repairs.push(vec![1.7]);
        let target = HeuristicQueue::new();
        let repaired = process_repairs(&repairs, &mut RoundUp, &problem, &root, 1e-6, &target, 8.0);
        // 1.7 rounds to 2, which is out of bounds.
        assert_eq!(repaired, 1);
        assert!(repairs.is_empty());
        assert_eq!(
            target.drain_all(),
            vec![HeuristicSolution {
                values: vec![1.0],
                timestamp: 8.0
            }]
        );
    }
}
