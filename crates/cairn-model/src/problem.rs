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

//! # Mixed-Integer Problem
//!
//! `Problem` is the immutable description the search runs against: column
//! bounds and kinds, a linear objective and sparse constraint rows. It is
//! built once through `ProblemBuilder` and then only read, so workers can
//! share it by reference without locking.
//!
//! The objective is stored in minimisation form. For a maximisation problem
//! the builder negates the coefficients, and `user_objective` maps internal
//! values back so callers only ever see objectives in their own sense.
//!
//! ```rust
//! use cairn_model::problem::{ProblemBuilder, VariableKind, ObjectiveSense};
//! use cairn_model::index::ColumnIndex;
//!
//! let mut builder = ProblemBuilder::new(1);
//! builder
//!     .set_objective_coefficient(ColumnIndex::new(0), 1.0)
//!     .set_bounds(ColumnIndex::new(0), 0.5, 1.0)
//!     .set_variable_kind(ColumnIndex::new(0), VariableKind::Integer);
//! let problem = builder.build().unwrap();
//! assert_eq!(problem.num_columns(), 1);
//! assert_eq!(problem.sense(), ObjectiveSense::Minimize);
//! assert_eq!(problem.fractional_columns(&[0.5], 1e-6), vec![ColumnIndex::new(0)]);
//! ```

use crate::{
    error::{ModelError, ModelResult},
    index::{ColumnIndex, RowIndex},
};
use cairn_core::num::float::{fractional_parts, is_integral};

/// Direction of optimisation as the caller states it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectiveSense {
    #[default]
    Minimize,
    Maximize,
}

impl ObjectiveSense {
    /// `+1.0` for minimisation, `-1.0` for maximisation.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            ObjectiveSense::Minimize => 1.0,
            ObjectiveSense::Maximize => -1.0,
        }
    }

    /// `true` if `candidate` is strictly better than `reference` in this sense.
    #[inline]
    pub fn is_better(self, candidate: f64, reference: f64) -> bool {
        match self {
            ObjectiveSense::Minimize => candidate < reference,
            ObjectiveSense::Maximize => candidate > reference,
        }
    }
}

impl std::fmt::Display for ObjectiveSense {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectiveSense::Minimize => write!(f, "minimize"),
            ObjectiveSense::Maximize => write!(f, "maximize"),
        }
    }
}

/// Domain of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VariableKind {
    /// Any real value within the bounds.
    #[default]
    Continuous,
    /// Integral values within the bounds.
    Integer,
    /// Integral values within `[0, 1]`.
    Binary,
}

impl VariableKind {
    /// Returns `true` for `Integer` and `Binary`.
    #[inline]
    pub fn is_integral(self) -> bool {
        !matches!(self, VariableKind::Continuous)
    }
}

/// Comparison of a row's activity against its right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowSense {
    LessEqual,
    GreaterEqual,
    Equal,
}

/// One sparse linear constraint `Σ a_j x_j (<=|>=|=) rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    coefficients: Vec<(ColumnIndex, f64)>,
    sense: RowSense,
    rhs: f64,
}

impl Row {
    /// Nonzero coefficients, sorted by column.
    #[inline]
    pub fn coefficients(&self) -> &[(ColumnIndex, f64)] {
        &self.coefficients
    }

    #[inline]
    pub fn sense(&self) -> RowSense {
        self.sense
    }

    #[inline]
    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    /// Left-hand side value at `x`.
    #[inline]
    pub fn activity(&self, x: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .map(|&(column, a)| a * x[column.get()])
            .sum()
    }

    /// Checks the row at `x`.
    ///
    /// # Arguments
    ///
    /// * `x` - A point with one value per column.
    /// * `tolerance` - Absolute slack allowed on the right-hand side.
    ///
    /// # Returns
    ///
    /// `true` if the activity respects the sense within `tolerance`.
    pub fn is_satisfied(&self, x: &[f64], tolerance: f64) -> bool {
        let activity = self.activity(x);
        match self.sense {
            RowSense::LessEqual => activity <= self.rhs + tolerance,
            RowSense::GreaterEqual => activity >= self.rhs - tolerance,
            RowSense::Equal => (activity - self.rhs).abs() <= tolerance,
        }
    }
}

/// An immutable mixed-integer linear problem.
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    sense: ObjectiveSense,
    objective: Vec<f64>,
    objective_offset: f64,
    lower: Vec<f64>,
    upper: Vec<f64>,
    kinds: Vec<VariableKind>,
    rows: Vec<Row>,
    integer_columns: Vec<ColumnIndex>,
}

impl Problem {
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.objective.len()
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    /// Objective coefficients in minimisation form.
    #[inline]
    pub fn objective(&self) -> &[f64] {
        &self.objective
    }

    /// Constant added to every objective value reported to the caller.
    #[inline]
    pub fn objective_offset(&self) -> f64 {
        self.objective_offset
    }

    #[inline]
    pub fn lower_bounds(&self) -> &[f64] {
        &self.lower
    }

    #[inline]
    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper
    }

    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Returns the constraint at `row`.
    ///
    /// # Panics
    ///
    /// In debug builds, if `row` is out of bounds.
    #[inline]
    pub fn row(&self, row: RowIndex) -> &Row {
        debug_assert!(
            row.get() < self.num_rows(),
            "called `Problem::row` with row index out of bounds: the len is {} but the index is {}",
            self.num_rows(),
            row.get()
        );
        &self.rows[row.get()]
    }

    /// Returns the domain of `column`.
    ///
    /// # Panics
    ///
    /// In debug builds, if `column` is out of bounds.
    #[inline]
    pub fn variable_kind(&self, column: ColumnIndex) -> VariableKind {
        debug_assert!(
            column.get() < self.num_columns(),
            "called `Problem::variable_kind` with column index out of bounds: the len is {} but the index is {}",
            self.num_columns(),
            column.get()
        );
        self.kinds[column.get()]
    }

    /// Integral columns in ascending order.
    #[inline]
    pub fn integer_columns(&self) -> &[ColumnIndex] {
        &self.integer_columns
    }

    /// Objective of `x` in minimisation form, offset excluded.
    #[inline]
    pub fn internal_objective(&self, x: &[f64]) -> f64 {
        debug_assert_eq!(
            x.len(),
            self.num_columns(),
            "called `Problem::internal_objective` with a vector of the wrong length"
        );
        self.objective.iter().zip(x).map(|(c, v)| c * v).sum()
    }

    /// Maps an internal (minimisation-form) objective into the caller's sense.
    #[inline]
    pub fn user_objective(&self, internal: f64) -> f64 {
        self.sense.sign() * internal + self.objective_offset
    }

    /// Objective of `x` in the caller's sense, offset included.
    #[inline]
    pub fn objective_value(&self, x: &[f64]) -> f64 {
        self.user_objective(self.internal_objective(x))
    }

    /// Checks integrality only. Bounds and rows are not looked at.
    ///
    /// # Arguments
    ///
    /// * `x` - A point with one value per column.
    /// * `tolerance` - Largest distance to an integer still counted as integral.
    ///
    /// # Returns
    ///
    /// `true` if every integral column holds an integral value.
    pub fn is_integer_feasible(&self, x: &[f64], tolerance: f64) -> bool {
        self.integer_columns
            .iter()
            .all(|c| is_integral(x[c.get()], tolerance))
    }

    /// Bounds, rows and integrality all hold at `x`.
    pub fn is_feasible(&self, x: &[f64], tolerance: f64) -> bool {
        if x.len() != self.num_columns() {
            return false;
        }
        let within_bounds = x
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .all(|(&v, (&l, &u))| v.is_finite() && v >= l - tolerance && v <= u + tolerance);

        within_bounds
            && self.is_integer_feasible(x, tolerance)
            && self.rows.iter().all(|r| r.is_satisfied(x, tolerance))
    }

    /// Integral columns whose value at `x` is fractional, ascending by index.
    ///
    /// The ascending order is relied upon by branching selection, which
    /// breaks exact score ties in favour of the first column scanned.
    pub fn fractional_columns(&self, x: &[f64], tolerance: f64) -> Vec<ColumnIndex> {
        let mut out = Vec::new();
        self.fractional_columns_into(x, tolerance, &mut out);
        out
    }

    /// As `fractional_columns`, reusing `out`.
    pub fn fractional_columns_into(&self, x: &[f64], tolerance: f64, out: &mut Vec<ColumnIndex>) {
        out.clear();
        out.extend(self.integer_columns.iter().copied().filter(|c| {
            let (down, up) = fractional_parts(x[c.get()]);
            down > tolerance && up > tolerance
        }));
    }

    /// A copy of this problem with every column's bounds replaced.
    ///
    /// Lets a search run on tightened bounds while the caller's problem stays
    /// untouched. Objective, rows and variable kinds are shared unchanged.
    ///
    /// # Arguments
    ///
    /// * `lower` - The new lower bound of every column.
    /// * `upper` - The new upper bound of every column.
    ///
    /// # Returns
    ///
    /// The re-bounded problem, or `ModelError::BoundsLengthMismatch` when a
    /// vector does not have one entry per column, or
    /// `ModelError::InvertedBounds` for the first column with `lower > upper`.
    pub fn with_bounds(&self, lower: Vec<f64>, upper: Vec<f64>) -> ModelResult<Problem> {
        let expected = self.num_columns();
        if lower.len() != expected || upper.len() != expected {
            return Err(ModelError::BoundsLengthMismatch {
                expected,
                lower: lower.len(),
                upper: upper.len(),
            });
        }
        if let Some(column) = ColumnIndex::range(expected).find(|c| {
            let j = c.get();
            lower[j] > upper[j] || lower[j].is_nan() || upper[j].is_nan()
        }) {
            return Err(ModelError::InvertedBounds {
                column,
                lower: lower[column.get()],
                upper: upper[column.get()],
            });
        }

        Ok(Problem {
            lower,
            upper,
            ..self.clone()
        })
    }
}

/// Mutable construction-time view of a `Problem`.
///
/// Columns start continuous with bounds `[0, +inf)` and a zero objective.
#[derive(Debug, Clone)]
pub struct ProblemBuilder {
    sense: ObjectiveSense,
    objective: Vec<f64>,
    objective_offset: f64,
    lower: Vec<f64>,
    upper: Vec<f64>,
    kinds: Vec<VariableKind>,
    rows: Vec<Row>,
}

impl ProblemBuilder {
    /// A builder for a minimisation problem with `num_columns` columns and no rows.
    pub fn new(num_columns: usize) -> Self {
        Self {
            sense: ObjectiveSense::Minimize,
            objective: vec![0.0; num_columns],
            objective_offset: 0.0,
            lower: vec![0.0; num_columns],
            upper: vec![f64::INFINITY; num_columns],
            kinds: vec![VariableKind::Continuous; num_columns],
            rows: Vec::new(),
        }
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.objective.len()
    }

    #[inline]
    fn check_column(&self, column: ColumnIndex, caller: &str) {
        debug_assert!(
            column.get() < self.num_columns(),
            "called `ProblemBuilder::{}` with column index out of bounds: the len is {} but the index is {}",
            caller,
            self.num_columns(),
            column.get()
        );
    }

    /// Sets the direction of optimisation. Coefficients are kept as given.
    #[inline]
    pub fn set_sense(&mut self, sense: ObjectiveSense) -> &mut Self {
        self.sense = sense;
        self
    }

    #[inline]
    pub fn set_objective_offset(&mut self, offset: f64) -> &mut Self {
        self.objective_offset = offset;
        self
    }

    /// Sets `c_j` in the caller's objective sense.
    #[inline]
    pub fn set_objective_coefficient(&mut self, column: ColumnIndex, value: f64) -> &mut Self {
        self.check_column(column, "set_objective_coefficient");
        self.objective[column.get()] = value;
        self
    }

    /// Sets both bounds of `column`. Infinite bounds are allowed.
    ///
    /// # Arguments
    ///
    /// * `column` - The column to bound.
    /// * `lower` - The lower bound, possibly `-inf`.
    /// * `upper` - The upper bound, possibly `+inf`.
    ///
    /// # Returns
    ///
    /// The builder, for chaining.
    #[inline]
    pub fn set_bounds(&mut self, column: ColumnIndex, lower: f64, upper: f64) -> &mut Self {
        self.check_column(column, "set_bounds");
        self.lower[column.get()] = lower;
        self.upper[column.get()] = upper;
        self
    }

    #[inline]
    pub fn set_variable_kind(&mut self, column: ColumnIndex, kind: VariableKind) -> &mut Self {
        self.check_column(column, "set_variable_kind");
        self.kinds[column.get()] = kind;
        self
    }

    /// Appends a constraint row and returns its index.
    pub fn add_row<I>(&mut self, coefficients: I, sense: RowSense, rhs: f64) -> RowIndex
    where
        I: IntoIterator<Item = (ColumnIndex, f64)>,
    {
        let index = RowIndex::new(self.rows.len());
        let mut coefficients: Vec<(ColumnIndex, f64)> = coefficients.into_iter().collect();
        coefficients.sort_by_key(|&(c, _)| c);
        self.rows.push(Row {
            coefficients,
            sense,
            rhs,
        });
        index
    }

    /// Validates and freezes the problem.
    ///
    /// Binary columns have their bounds intersected with `[0, 1]`.
    pub fn build(self) -> ModelResult<Problem> {
        if self.objective.is_empty() {
            return Err(ModelError::Empty);
        }

        let num_columns = self.num_columns();
        let mut lower = self.lower;
        let mut upper = self.upper;

        for column in ColumnIndex::range(num_columns) {
            let j = column.get();
            if self.kinds[j] == VariableKind::Binary {
                lower[j] = lower[j].max(0.0);
                upper[j] = upper[j].min(1.0);
            }
            if lower[j] > upper[j] || lower[j].is_nan() || upper[j].is_nan() {
                return Err(ModelError::InvertedBounds {
                    column,
                    lower: lower[j],
                    upper: upper[j],
                });
            }
            if !self.objective[j].is_finite() {
                return Err(ModelError::NonFiniteObjective {
                    column,
                    value: self.objective[j],
                });
            }
        }

        for (i, row) in self.rows.iter().enumerate() {
            let row_index = RowIndex::new(i);
            if !row.rhs.is_finite() {
                return Err(ModelError::NonFiniteRhs {
                    row: row_index,
                    value: row.rhs,
                });
            }
            for &(column, value) in &row.coefficients {
                if column.get() >= num_columns {
                    return Err(ModelError::UnknownColumn {
                        row: row_index,
                        column,
                        num_columns,
                    });
                }
                if !value.is_finite() {
                    return Err(ModelError::NonFiniteCoefficient {
                        row: row_index,
                        column,
                        value,
                    });
                }
            }
        }

        let sign = self.sense.sign();
        let objective = self.objective.iter().map(|c| sign * c).collect();
        let integer_columns = ColumnIndex::range(num_columns)
            .filter(|c| self.kinds[c.get()].is_integral())
            .collect();

        Ok(Problem {
            sense: self.sense,
            objective,
            objective_offset: self.objective_offset,
            lower,
            upper,
            kinds: self.kinds,
            rows: self.rows,
            integer_columns,
        })
    }
}
