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

//! # Dive Selection
//!
//! A dive fixes one fractional column per step and never backtracks, so the
//! selection rule decides both the column and the side to round to. Four
//! rules are provided:
//!
//! - `pseudocost_diving` rounds away from where the relaxation has drifted
//!   since the root, then by fractional part, then by pseudo-cost.
//! - `guided_diving` rounds towards the incumbent's value and falls back to
//!   `pseudocost_diving` when there is no incumbent.
//! - `line_search_diving` follows the line from the root point through the
//!   current point and fixes the column that would hit an integer first.
//! - `coefficient_diving` rounds each column to the side with fewer
//!   `VariableLocks` and fixes the column with the fewest.
//!
//! Every rule scans `fractional` in order and keeps the first column on ties.
//! The rules are pure: they read the point, the reference vectors and the
//! tables they are given, nothing else.

use crate::{node::BranchDirection, pseudo_cost::PseudoCosts};
use cairn_core::num::float::fractional_parts;
use cairn_model::{
    index::ColumnIndex,
    problem::{Problem, RowSense},
};

const DIRECTION_EPSILON: f64 = 1e-6;
const ROOT_DRIFT: f64 = 0.4;

/// The column selection rule a diving worker follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DivingStrategy {
    /// Drift from the root first, pseudo-costs last.
    #[default]
    Pseudocost,
    /// Towards the incumbent; pseudo-cost diving while there is none.
    Guided,
    /// Along the ray from the root point through the current point.
    LineSearch,
    /// Towards the side that can violate the fewest rows.
    Coefficient,
}

impl std::fmt::Display for DivingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DivingStrategy::Pseudocost => write!(f, "pseudocost"),
            DivingStrategy::Guided => write!(f, "guided"),
            DivingStrategy::LineSearch => write!(f, "line-search"),
            DivingStrategy::Coefficient => write!(f, "coefficient"),
        }
    }
}

/// The column a dive fixes next and the side it rounds it to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiveChoice {
    pub column: ColumnIndex,
    /// The column's current fractional value.
    pub value: f64,
    pub direction: BranchDirection,
    /// The rule's rating of this choice; higher is better.
    pub score: f64,
}

impl DiveChoice {
    /// The integer the column is fixed at: `floor(value)` or `ceil(value)`.
    #[inline]
    pub fn target(&self) -> f64 {
        match self.direction {
            BranchDirection::Down => self.value.floor(),
            BranchDirection::Up => self.value.ceil(),
        }
    }
}

fn keep_best(best: &mut Option<DiveChoice>, candidate: DiveChoice) {
    if best.is_none_or(|b| candidate.score > b.score) {
        *best = Some(candidate);
    }
}

/// Per-column counts of the rows that rounding the column may violate.
///
/// A row locks a column upwards if increasing the column can break the row,
/// and downwards if decreasing it can: `a_j > 0` in a `<=` row locks up,
/// `a_j < 0` locks down, `>=` rows are the mirror image and equality rows
/// lock both ways. The counts depend only on the rows, so one table serves
/// a whole solve.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariableLocks {
    up: Vec<u32>,
    down: Vec<u32>,
}

impl VariableLocks {
    /// Counts the locks of every column of `problem`.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem whose rows are scanned.
    ///
    /// # Returns
    ///
    /// A table with one `(up, down)` pair per column.
    pub fn new(problem: &Problem) -> Self {
        let n = problem.num_columns();
        let mut up = vec![0u32; n];
        let mut down = vec![0u32; n];
        for row in problem.rows() {
            for &(column, a) in row.coefficients() {
                let j = column.get();
                let (locks_up, locks_down) = match row.sense() {
                    RowSense::LessEqual => (a > 0.0, a < 0.0),
                    RowSense::GreaterEqual => (a < 0.0, a > 0.0),
                    RowSense::Equal => (a != 0.0, a != 0.0),
                };
                up[j] += u32::from(locks_up);
                down[j] += u32::from(locks_down);
            }
        }
        Self { up, down }
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.up.len()
    }

    /// Rows that increasing `column` may violate.
    #[inline]
    pub fn up(&self, column: ColumnIndex) -> u32 {
        self.up[column.get()]
    }

    /// Rows that decreasing `column` may violate.
    #[inline]
    pub fn down(&self, column: ColumnIndex) -> u32 {
        self.down[column.get()]
    }
}

/// Pseudo-cost diving.
///
/// The direction follows the first rule that applies: keep moving the way
/// the column drifted since the root if it moved by more than `0.4`, round
/// down below a fractional part of `0.3` and up above `0.7`, and otherwise
/// towards the cheaper pseudo-cost. The column with the best pseudo-cost
/// ratio in its chosen direction is fixed.
///
/// # Arguments
///
/// * `pseudo_costs` - The worker's current pseudo-cost table.
/// * `fractional` - Fractional integral columns in ascending order.
/// * `x` - The current relaxation point.
/// * `root` - The root relaxation's point; missing entries count as no drift.
///
/// # Returns
///
/// The chosen column, or `None` if `fractional` is empty.
pub fn pseudocost_diving(
    pseudo_costs: &PseudoCosts,
    fractional: &[ColumnIndex],
    x: &[f64],
    root: &[f64],
) -> Option<DiveChoice> {
    let averages = pseudo_costs.averages();
    let mut best = None;

    for &column in fractional {
        let j = column.get();
        let value = x[j];
        let (f_down, f_up) = fractional_parts(value);
        let (pc_down, pc_up) = pseudo_costs.estimates(column, averages);

        let score_down = f_up.sqrt() * (1.0 + pc_up) / (1.0 + pc_down);
        let score_up = f_down.sqrt() * (1.0 + pc_down) / (1.0 + pc_up);
        let root_value = root.get(j).copied().unwrap_or(value);

        let direction = if value < root_value - ROOT_DRIFT {
            BranchDirection::Down
        } else if value > root_value + ROOT_DRIFT {
            BranchDirection::Up
        } else if f_down < 0.3 {
            BranchDirection::Down
        } else if f_down > 0.7 {
            BranchDirection::Up
        } else if pc_down < pc_up + DIRECTION_EPSILON {
            BranchDirection::Down
        } else {
            BranchDirection::Up
        };

        let score = match direction {
            BranchDirection::Down => score_down,
            BranchDirection::Up => score_up,
        };
        keep_best(
            &mut best,
            DiveChoice {
                column,
                value,
                direction,
                score,
            },
        );
    }

    best
}

/// Guided diving.
///
/// Each column is rounded to the side nearer the incumbent's value. The score
/// weighs the pseudo-cost of that side five to one against the other side.
///
/// # Arguments
///
/// * `pseudo_costs` - The worker's current pseudo-cost table.
/// * `fractional` - Fractional integral columns in ascending order.
/// * `x` - The current relaxation point.
/// * `incumbent` - The incumbent's values, one per column.
///
/// # Returns
///
/// The chosen column, or `None` if `fractional` is empty.
pub fn guided_diving(
    pseudo_costs: &PseudoCosts,
    fractional: &[ColumnIndex],
    x: &[f64],
    incumbent: &[f64],
) -> Option<DiveChoice> {
    let averages = pseudo_costs.averages();
    let mut best = None;

    for &column in fractional {
        let j = column.get();
        let value = x[j];
        let (f_down, f_up) = fractional_parts(value);
        let down_distance = (incumbent[j] - value.floor()).abs();
        let up_distance = (value.ceil() - incumbent[j]).abs();
        let direction = if down_distance < up_distance + DIRECTION_EPSILON {
            BranchDirection::Down
        } else {
            BranchDirection::Up
        };

        let (pc_down, pc_up) = pseudo_costs.estimates(column, averages);
        let (primary, secondary) = match direction {
            BranchDirection::Down => (pc_down * f_down, pc_up * f_up),
            BranchDirection::Up => (pc_up * f_up, pc_down * f_down),
        };
        keep_best(
            &mut best,
            DiveChoice {
                column,
                value,
                direction,
                score: (5.0 * primary + secondary) / 6.0,
            },
        );
    }

    best
}

/// Line-search diving.
///
/// A column that moved down since the root is rounded down, one that moved
/// up is rounded up, and the column whose ray from the root reaches its
/// integer after the shortest step (`f_down / drift` or `f_up / drift`) is
/// fixed. Columns that have not moved are only considered when none has:
/// the one nearest an integer is then rounded to it.
///
/// # Arguments
///
/// * `fractional` - Fractional integral columns in ascending order.
/// * `x` - The current relaxation point.
/// * `root` - The root relaxation's point; missing entries count as no drift.
///
/// # Returns
///
/// The chosen column, or `None` if `fractional` is empty.
pub fn line_search_diving(
    fractional: &[ColumnIndex],
    x: &[f64],
    root: &[f64],
) -> Option<DiveChoice> {
    let mut drifted = None;
    let mut nearest = None;

    for &column in fractional {
        let j = column.get();
        let value = x[j];
        let (f_down, f_up) = fractional_parts(value);
        let root_value = root.get(j).copied().unwrap_or(value);

        if value < root_value - DIRECTION_EPSILON {
            let step = f_down / (root_value - value);
            keep_best(
                &mut drifted,
                DiveChoice {
                    column,
                    value,
                    direction: BranchDirection::Down,
                    score: -step,
                },
            );
        } else if value > root_value + DIRECTION_EPSILON {
            let step = f_up / (value - root_value);
            keep_best(
                &mut drifted,
                DiveChoice {
                    column,
                    value,
                    direction: BranchDirection::Up,
                    score: -step,
                },
            );
        } else {
            let (direction, distance) = if f_down <= f_up {
                (BranchDirection::Down, f_down)
            } else {
                (BranchDirection::Up, f_up)
            };
            keep_best(
                &mut nearest,
                DiveChoice {
                    column,
                    value,
                    direction,
                    score: -distance,
                },
            );
        }
    }

    drifted.or(nearest)
}

/// Coefficient diving.
///
/// Each column is rounded to the side with fewer locks, or to the nearer
/// integer when both sides have the same count. The column with the fewest
/// locks on its side is fixed; among equals the one with the smaller
/// rounding distance wins.
///
/// # Arguments
///
/// * `locks` - The problem's lock table.
/// * `fractional` - Fractional integral columns in ascending order.
/// * `x` - The current relaxation point.
///
/// # Returns
///
/// The chosen column, or `None` if `fractional` is empty.
pub fn coefficient_diving(
    locks: &VariableLocks,
    fractional: &[ColumnIndex],
    x: &[f64],
) -> Option<DiveChoice> {
    let mut best = None;

    for &column in fractional {
        let value = x[column.get()];
        let (f_down, f_up) = fractional_parts(value);
        let (up, down) = (locks.up(column), locks.down(column));

        let (direction, count, distance) = if down < up {
            (BranchDirection::Down, down, f_down)
        } else if up < down || f_up < f_down {
            (BranchDirection::Up, up, f_up)
        } else {
            (BranchDirection::Down, down, f_down)
        };

        // The distance lies in (0, 1), so this orders by lock count first.
        keep_best(
            &mut best,
            DiveChoice {
                column,
                value,
                direction,
                score: -(f64::from(count) + distance),
            },
        );
    }

    best
}

/// The reference data a dive selection may consult.
#[derive(Debug, Clone, Copy)]
pub struct DiveInputs<'a> {
    pub pseudo_costs: &'a PseudoCosts,
    /// The root relaxation's point.
    pub root: &'a [f64],
    /// The incumbent's values as of the last sync, if any.
    pub incumbent: Option<&'a [f64]>,
    pub locks: &'a VariableLocks,
}

/// Dispatches on `strategy`.
///
/// Guided diving falls back to pseudo-cost diving while there is no
/// incumbent.
///
/// # Arguments
///
/// * `strategy` - The rule to apply.
/// * `inputs` - Tables and reference points the rules read.
/// * `fractional` - Fractional integral columns in ascending order.
/// * `x` - The current relaxation point.
///
/// # Returns
///
/// The chosen column, or `None` if `fractional` is empty.
pub fn select_dive(
    strategy: DivingStrategy,
    inputs: &DiveInputs<'_>,
    fractional: &[ColumnIndex],
    x: &[f64],
) -> Option<DiveChoice> {
    match (strategy, inputs.incumbent) {
        (DivingStrategy::Guided, Some(incumbent)) => {
            guided_diving(inputs.pseudo_costs, fractional, x, incumbent)
        }
        (DivingStrategy::LineSearch, _) => line_search_diving(fractional, x, inputs.root),
        (DivingStrategy::Coefficient, _) => coefficient_diving(inputs.locks, fractional, x),
        (DivingStrategy::Pseudocost | DivingStrategy::Guided, _) => {
            pseudocost_diving(inputs.pseudo_costs, fractional, x, inputs.root)
        }
    }
}
