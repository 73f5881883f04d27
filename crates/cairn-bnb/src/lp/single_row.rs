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

//! Exact relaxation oracle for problems with at most one constraint row.
//!
//! With a single row the relaxation is a continuous knapsack: start every
//! column at the bound its objective coefficient prefers, and if the row is
//! violated move columns back in order of objective cost per unit of row
//! activity until it holds. The greedy order makes the result optimal, and
//! since the algorithm is a pure function of its input the reported
//! iteration counts are reproducible.
//!
//! Columns whose preferred bound is infinite are only supported when they do
//! not appear in the row; the problem is then unbounded. Anything this oracle
//! cannot solve exactly (more than one row, an infinite preferred bound on a
//! row column) is reported as `Numerical`.

use crate::lp::{LpOutcome, LpSolution, NodeLpSolver};
use cairn_model::problem::{Problem, RowSense};

/// Greedy continuous-knapsack relaxation solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SingleRowLpSolver {
    tolerance: f64,
}

impl Default for SingleRowLpSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct Move {
    ratio: f64,
    column: usize,
    direction: f64,
    capacity: f64,
}

impl SingleRowLpSolver {
    #[inline]
    pub fn new() -> Self {
        Self { tolerance: 1e-9 }
    }

    /// A solver with `tolerance` as its feasibility tolerance on bounds and the row.
    #[inline]
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

impl NodeLpSolver for SingleRowLpSolver {
    fn name(&self) -> &str {
        "SingleRowLpSolver"
    }

    fn solve(&mut self, problem: &Problem, lower: &[f64], upper: &[f64]) -> LpOutcome {
        let n = problem.num_columns();
        let tol = self.tolerance;
        let mut iterations = 1;

        if lower.iter().zip(upper).any(|(l, u)| *l > *u + tol) {
            return LpOutcome::Infeasible { iterations };
        }
        if problem.num_rows() > 1 {
            return LpOutcome::Numerical { iterations };
        }

        let cost = problem.objective();
        let row = problem.rows().first();
        let mut a = vec![0.0; n];
        if let Some(row) = row {
            for &(column, value) in row.coefficients() {
                a[column.get()] += value;
            }
        }

        let mut x = Vec::with_capacity(n);
        for j in 0..n {
            let value = if cost[j] > 0.0 {
                lower[j]
            } else if cost[j] < 0.0 {
                upper[j]
            } else if lower[j].is_finite() {
                lower[j]
            } else if upper[j].is_finite() {
                upper[j]
            } else {
                0.0
            };
            if !value.is_finite() {
                return if a[j] == 0.0 {
                    LpOutcome::Unbounded { iterations }
                } else {
                    LpOutcome::Numerical { iterations }
                };
            }
            x.push(value);
        }

        let mut dual = Vec::new();
        let mut row_price = 0.0;

        if let Some(row) = row {
            let activity: f64 = a.iter().zip(&x).map(|(a, x)| a * x).sum();
            let rhs = row.rhs();
            // -1 to decrease the activity, +1 to increase it, 0 if the row holds.
            let push = match row.sense() {
                RowSense::LessEqual if activity > rhs + tol => -1.0,
                RowSense::GreaterEqual if activity < rhs - tol => 1.0,
                RowSense::Equal if (activity - rhs).abs() > tol => (rhs - activity).signum(),
                _ => 0.0,
            };

            if push != 0.0 {
                let mut moves: Vec<Move> = (0..n)
                    .filter(|&j| a[j] != 0.0)
                    .filter_map(|j| {
                        let direction = push * a[j].signum();
                        let capacity = if direction > 0.0 {
                            upper[j] - x[j]
                        } else {
                            x[j] - lower[j]
                        };
                        (capacity > tol).then(|| Move {
                            ratio: cost[j] * direction / a[j].abs(),
                            column: j,
                            direction,
                            capacity,
                        })
                    })
                    .collect();
                moves.sort_by(|l, r| l.ratio.total_cmp(&r.ratio).then(l.column.cmp(&r.column)));

                let mut remaining = (activity - rhs).abs();
                for m in &moves {
                    if remaining <= tol {
                        break;
                    }
                    let weight = a[m.column].abs();
                    let used = (m.capacity * weight).min(remaining);
                    x[m.column] += m.direction * used / weight;
                    remaining -= used;
                    row_price = m.ratio;
                    iterations += 1;
                }

                if remaining > tol * (1.0 + rhs.abs()) {
                    return LpOutcome::Infeasible { iterations };
                }
                row_price *= push;
            }
            dual.push(row_price);
        }

        let reduced_costs = cost
            .iter()
            .zip(&a)
            .map(|(c, a)| c - row_price * a)
            .collect();
        let objective = cost.iter().zip(&x).map(|(c, x)| c * x).sum();

        LpOutcome::Optimal(LpSolution {
            primal: x,
            dual,
            reduced_costs,
            objective,
            iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_model::{
        index::ColumnIndex,
        problem::{ObjectiveSense, ProblemBuilder, VariableKind},
    };

    fn col(i: usize) -> ColumnIndex {
        ColumnIndex::new(i)
    }

    fn knapsack() -> Problem {
        let mut b = ProblemBuilder::new(3);
        b.set_sense(ObjectiveSense::Maximize);
        for (j, v) in [5.0, 4.0, 3.0].into_iter().enumerate() {
            b.set_objective_coefficient(col(j), v)
                .set_variable_kind(col(j), VariableKind::Binary);
        }
        b.add_row(
            [(col(0), 2.0), (col(1), 3.0), (col(2), 1.0)],
            RowSense::LessEqual,
            4.0,
        );
        b.build().expect("valid knapsack")
    }

    fn optimal(outcome: LpOutcome) -> LpSolution {
        match outcome {
            LpOutcome::Optimal(solution) => solution,
            other => panic!("expected an optimal relaxation, got {:?}", other),
        }
    }

    #[test]
    fn test_continuous_knapsack_takes_best_ratios() {
        let p = knapsack();
        let s = optimal(SingleRowLpSolver::new().solve(&p, p.lower_bounds(), p.upper_bounds()));
        assert_eq!(s.primal[0], 1.0);
        assert!((s.primal[1] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(s.primal[2], 1.0);
        assert!((s.objective + 28.0 / 3.0).abs() < 1e-12);
        assert_eq!(s.iterations, 2);
        // The fractional column prices the row: -(4/3) per unit of capacity.
        assert!((s.dual[0] + 4.0 / 3.0).abs() < 1e-12);
        assert!(s.reduced_costs[1].abs() < 1e-12);
    }

    #[test]
    fn test_node_bounds_override_problem_bounds() {
        let p = knapsack();
        let s = optimal(SingleRowLpSolver::new().solve(&p, &[0.0, 1.0, 0.0], &[1.0, 1.0, 1.0]));
        assert_eq!(s.primal[1], 1.0);
        assert_eq!(s.primal[2], 1.0);
        assert_eq!(s.primal[0], 0.0);
    }

    #[test]
    fn test_slack_row_keeps_box_optimum() {
        let mut b = ProblemBuilder::new(2);
        b.set_objective_coefficient(col(0), 1.0)
            .set_bounds(col(0), 0.5, 1.0)
            .set_bounds(col(1), 0.0, 3.0);
        b.add_row([(col(0), 1.0), (col(1), 1.0)], RowSense::LessEqual, 10.0);
        let p = b.build().expect("valid");
        let s = optimal(SingleRowLpSolver::new().solve(&p, p.lower_bounds(), p.upper_bounds()));
        assert_eq!(s.primal, vec![0.5, 0.0]);
        assert_eq!(s.dual, vec![0.0]);
        assert_eq!(s.iterations, 1);
    }

    #[test]
    fn test_greater_equal_row_is_covered() {
        // minimize 2x + 3y, x + y >= 1.5, x, y in [0, 1]
        let mut b = ProblemBuilder::new(2);
        b.set_objective_coefficient(col(0), 2.0)
            .set_objective_coefficient(col(1), 3.0)
            .set_bounds(col(0), 0.0, 1.0)
            .set_bounds(col(1), 0.0, 1.0);
        b.add_row([(col(0), 1.0), (col(1), 1.0)], RowSense::GreaterEqual, 1.5);
        let p = b.build().expect("valid");
        let s = optimal(SingleRowLpSolver::new().solve(&p, p.lower_bounds(), p.upper_bounds()));
        assert_eq!(s.primal[0], 1.0);
        assert!((s.primal[1] - 0.5).abs() < 1e-12);
        assert!((s.objective - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_equality_row() {
        let mut b = ProblemBuilder::new(2);
        b.set_objective_coefficient(col(0), 1.0)
            .set_bounds(col(0), 0.0, 4.0)
            .set_bounds(col(1), 0.0, 4.0);
        b.add_row([(col(0), 1.0), (col(1), -1.0)], RowSense::Equal, 2.0);
        let p = b.build().expect("valid");
        let s = optimal(SingleRowLpSolver::new().solve(&p, p.lower_bounds(), p.upper_bounds()));
        assert_eq!(s.primal, vec![2.0, 0.0]);
    }

    #[test]
    fn test_conflicting_bounds_are_infeasible() {
        let p = knapsack();
        let outcome = SingleRowLpSolver::new().solve(&p, &[1.0, 0.0, 0.0], &[0.0, 1.0, 1.0]);
        assert!(matches!(outcome, LpOutcome::Infeasible { .. }));
    }

    #[test]
    fn test_unreachable_row_is_infeasible() {
        let mut b = ProblemBuilder::new(1);
        b.set_bounds(col(0), 0.0, 1.0);
        b.add_row([(col(0), 1.0)], RowSense::GreaterEqual, 2.0);
        let p = b.build().expect("valid");
        let outcome = SingleRowLpSolver::new().solve(&p, p.lower_bounds(), p.upper_bounds());
        assert!(matches!(outcome, LpOutcome::Infeasible { .. }));
    }

    #[test]
    fn test_two_rows_are_outside_the_oracle() {
        let mut b = ProblemBuilder::new(1);
        b.add_row([(col(0), 1.0)], RowSense::LessEqual, 1.0);
        b.add_row([(col(0), 1.0)], RowSense::GreaterEqual, 0.0);
        let p = b.build().expect("valid");
        let outcome = SingleRowLpSolver::new().solve(&p, p.lower_bounds(), p.upper_bounds());
        assert!(matches!(outcome, LpOutcome::Numerical { .. }));
    }
}
