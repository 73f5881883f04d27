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

//! # Pseudo-Costs
//!
//! Per-column estimates of how much the relaxation objective degrades per
//! unit of bound tightening, learned online from solved children.
//!
//! Each column keeps four accumulators: `(sum_down, num_down, sum_up,
//! num_up)`. A column with no observations in a direction borrows the average
//! per-unit cost over every column that has at least one (`1.0` when nothing
//! has been observed yet).
//!
//! ## Snapshots
//!
//! In deterministic mode the coordinator owns the global table and hands
//! every worker an `Arc<PseudoCosts>` at horizon start. The shared snapshot
//! is never written; a worker clones it into a private copy, applies its own
//! observations there, and ships each observation to the coordinator on the
//! event that produced it. Replaying those events in canonical order
//! rebuilds the same global table whatever the thread timing was.
//!
//! All selection functions are pure: they read the table, the fractional
//! columns and the relaxation values, and nothing else.

use crate::node::{BranchDirection, BranchInfo};
use cairn_core::{hash::StateHasher, num::float::fractional_parts};
use cairn_model::index::ColumnIndex;

/// Floor on each factor of the product branching score.
const SCORE_EPSILON: f64 = 1e-6;

/// One per-unit objective degradation observed on a solved child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PseudoCostObservation {
    pub column: ColumnIndex,
    pub direction: BranchDirection,
    pub delta: f64,
}

impl PseudoCostObservation {
    /// The observation a child with relaxation objective `child_objective` contributes.
    ///
    /// Non-finite or negative per-unit changes are recorded as zero.
    pub fn from_child(branch: &BranchInfo, child_objective: f64) -> Self {
        let delta = (child_objective - branch.parent_objective) / branch.fraction();
        Self {
            column: branch.column,
            direction: branch.direction,
            delta: if delta.is_finite() && delta > 0.0 {
                delta
            } else {
                0.0
            },
        }
    }
}

/// Fallback per-unit costs for columns without history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PseudoCostAverages {
    pub down: f64,
    pub up: f64,
}

/// The column to branch on at a fractional node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchChoice {
    pub column: ColumnIndex,
    pub value: f64,
    /// The child to plunge into first.
    pub preferred: BranchDirection,
}

/// Running per-column pseudo-cost accumulators.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PseudoCosts {
    sum_down: Vec<f64>,
    sum_up: Vec<f64>,
    num_down: Vec<u32>,
    num_up: Vec<u32>,
}

impl PseudoCosts {
    /// A table with no observations for `num_columns` columns.
    pub fn new(num_columns: usize) -> Self {
        Self {
            sum_down: vec![0.0; num_columns],
            sum_up: vec![0.0; num_columns],
            num_down: vec![0; num_columns],
            num_up: vec![0; num_columns],
        }
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.sum_down.len()
    }

    /// Observations recorded for `column` as `(down, up)`.
    #[inline]
    pub fn num_observations(&self, column: ColumnIndex) -> (u32, u32) {
        (self.num_down[column.get()], self.num_up[column.get()])
    }

    /// Adds one per-unit degradation for `column` in `direction`.
    ///
    /// # Arguments
    ///
    /// * `column` - The branched column.
    /// * `direction` - The side of the branch the child took.
    /// * `delta` - Objective change divided by the bound change. Non-negative.
    ///
    /// # Panics
    ///
    /// In debug builds, if `column` is out of bounds.
    pub fn update(&mut self, column: ColumnIndex, direction: BranchDirection, delta: f64) {
        debug_assert!(
            column.get() < self.num_columns(),
            "called `PseudoCosts::update` with column index out of bounds: the len is {} but the index is {}",
            self.num_columns(),
            column.get()
        );

        let j = column.get();
        match direction {
            BranchDirection::Down => {
                self.sum_down[j] += delta;
                self.num_down[j] += 1;
            }
            BranchDirection::Up => {
                self.sum_up[j] += delta;
                self.num_up[j] += 1;
            }
        }
    }

    #[inline]
    pub fn record(&mut self, observation: &PseudoCostObservation) {
        self.update(observation.column, observation.direction, observation.delta);
    }

    /// Mean per-unit cost over the columns observed in each direction.
    ///
    /// # Returns
    ///
    /// The averages, with `1.0` for a direction nothing was observed in.
    pub fn averages(&self) -> PseudoCostAverages {
        fn average(sums: &[f64], nums: &[u32]) -> f64 {
            let mut initialized = 0u32;
            let mut total = 0.0;
            for (&sum, &num) in sums.iter().zip(nums) {
                if num > 0 {
                    initialized += 1;
                    if sum.is_finite() {
                        total += sum / num as f64;
                    }
                }
            }
            if initialized > 0 {
                total / initialized as f64
            } else {
                1.0
            }
        }

        PseudoCostAverages {
            down: average(&self.sum_down, &self.num_down),
            up: average(&self.sum_up, &self.num_up),
        }
    }

    /// Per-unit `(pc_down, pc_up)` of `column`, falling back to `averages`.
    #[inline]
    pub fn estimates(&self, column: ColumnIndex, averages: PseudoCostAverages) -> (f64, f64) {
        let j = column.get();
        let down = if self.num_down[j] != 0 {
            self.sum_down[j] / self.num_down[j] as f64
        } else {
            averages.down
        };
        let up = if self.num_up[j] != 0 {
            self.sum_up[j] / self.num_up[j] as f64
        } else {
            averages.up
        };
        (down, up)
    }

    /// Picks the branching column with the largest product score.
    ///
    /// `fractional` must be in ascending column order; on exact score ties
    /// the first column scanned wins.
    pub fn select_branch(&self, fractional: &[ColumnIndex], x: &[f64]) -> Option<BranchChoice> {
        debug_assert!(
            fractional.windows(2).all(|w| w[0] < w[1]),
            "called `PseudoCosts::select_branch` with fractional columns out of ascending order"
        );

        let averages = self.averages();
        let mut best: Option<(f64, ColumnIndex)> = None;
        for &column in fractional {
            let (pc_down, pc_up) = self.estimates(column, averages);
            let (f_down, f_up) = fractional_parts(x[column.get()]);
            let score = (f_down * pc_down).max(SCORE_EPSILON) * (f_up * pc_up).max(SCORE_EPSILON);
            if best.is_none_or(|(max, _)| score > max) {
                best = Some((score, column));
            }
        }

        best.map(|(_, column)| {
            let value = x[column.get()];
            let (f_down, _) = fractional_parts(value);
            BranchChoice {
                column,
                value,
                preferred: if f_down > 0.5 {
                    BranchDirection::Up
                } else {
                    BranchDirection::Down
                },
            }
        })
    }

    /// `lower_bound` plus the cheaper rounding cost of every fractional column.
    pub fn objective_estimate(&self, lower_bound: f64, fractional: &[ColumnIndex], x: &[f64]) -> f64 {
        let averages = self.averages();
        fractional.iter().fold(lower_bound, |estimate, &column| {
            let (pc_down, pc_up) = self.estimates(column, averages);
            let (f_down, f_up) = fractional_parts(x[column.get()]);
            estimate + (f_down * pc_down).min(f_up * pc_up)
        })
    }

    /// Feeds every accumulator into `hasher`, column by column.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.write_f64_slice(&self.sum_down);
        hasher.write_f64_slice(&self.sum_up);
        hasher.write_usize(self.num_down.len());
        for (&down, &up) in self.num_down.iter().zip(&self.num_up) {
            hasher.write_u32(down);
            hasher.write_u32(up);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(i: usize) -> ColumnIndex {
        ColumnIndex::new(i)
    }

    #[test]
    fn test_averages_fall_back_to_one() {
        let pc = PseudoCosts::new(3);
        assert_eq!(pc.averages(), PseudoCostAverages { down: 1.0, up: 1.0 });
    }

    #[test]
    fn test_averages_skip_unobserved_columns() {
        let mut pc = PseudoCosts::new(3);
        pc.update(col(0), BranchDirection::Down, 2.0);
        pc.update(col(0), BranchDirection::Down, 4.0);
        pc.update(col(2), BranchDirection::Down, 1.0);
        pc.update(col(1), BranchDirection::Up, 5.0);
        let avg = pc.averages();
        assert!((avg.down - 2.0).abs() < 1e-12);
        assert!((avg.up - 5.0).abs() < 1e-12);
        assert_eq!(pc.estimates(col(1), avg), (2.0, 5.0));
        assert_eq!(pc.estimates(col(0), avg), (3.0, 5.0));
    }

    #[test]
    fn test_observation_is_per_unit_and_clamped() {
        let branch = BranchInfo {
            column: col(1),
            value: 2.25,
            direction: BranchDirection::Down,
            parent_objective: 10.0,
        };
        let obs = PseudoCostObservation::from_child(&branch, 10.5);
        assert!((obs.delta - 2.0).abs() < 1e-12);

        let worse = PseudoCostObservation::from_child(&branch, 9.0);
        assert_eq!(worse.delta, 0.0);

        let infinite = PseudoCostObservation::from_child(&branch, f64::INFINITY);
        assert_eq!(infinite.delta, 0.0);
    }

    #[test]
    fn test_select_branch_prefers_largest_product() {
        let mut pc = PseudoCosts::new(3);
        pc.update(col(1), BranchDirection::Down, 10.0);
        pc.update(col(1), BranchDirection::Up, 10.0);
        let x = [0.5, 0.5, 0.5];
        let choice = pc
            .select_branch(&[col(0), col(1), col(2)], &x)
            .expect("fractional columns exist");
        assert_eq!(choice.column, col(1));
    }

    #[test]
    fn test_select_branch_ties_go_to_first_column() {
        let pc = PseudoCosts::new(4);
        let x = [0.0, 0.5, 0.0, 0.5];
        let choice = pc.select_branch(&[col(1), col(3)], &x).expect("non-empty");
        assert_eq!(choice.column, col(1));
        assert!(pc.select_branch(&[], &x).is_none());
    }

    #[test]
    fn test_preferred_direction_follows_fraction() {
        let pc = PseudoCosts::new(1);
        let up = pc.select_branch(&[col(0)], &[3.7]).expect("non-empty");
        assert_eq!(up.preferred, BranchDirection::Up);
        let down = pc.select_branch(&[col(0)], &[3.5]).expect("non-empty");
        assert_eq!(down.preferred, BranchDirection::Down);
    }

    #[test]
    fn test_objective_estimate_adds_cheaper_side() {
        let pc = PseudoCosts::new(2);
        // f = (0.25, 0.75) and (0.5, 0.5) with unit costs.
        let estimate = pc.objective_estimate(3.0, &[col(0), col(1)], &[1.25, 0.5]);
        assert!((estimate - 3.75).abs() < 1e-12);
    }

    #[test]
    fn test_hash_tracks_contents() {
        let mut a = PseudoCosts::new(2);
        let b = PseudoCosts::new(2);
        let digest = |pc: &PseudoCosts| {
            let mut h = StateHasher::new();
            pc.hash_into(&mut h);
            h.finish()
        };
        assert_eq!(digest(&a), digest(&b));
        a.update(col(0), BranchDirection::Up, 1.0);
        assert_ne!(digest(&a), digest(&b));
    }
}
