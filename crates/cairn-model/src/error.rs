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

use crate::index::{ColumnIndex, RowIndex};
use thiserror::Error;

/// Reasons a `ProblemBuilder` refuses to build, or `Problem::with_bounds` to re-bound.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("problem has no columns")]
    Empty,

    #[error("{column}: lower bound {lower} exceeds upper bound {upper}")]
    InvertedBounds {
        column: ColumnIndex,
        lower: f64,
        upper: f64,
    },

    #[error("{column}: objective coefficient {value} is not finite")]
    NonFiniteObjective { column: ColumnIndex, value: f64 },

    #[error("{row}: coefficient {value} on {column} is not finite")]
    NonFiniteCoefficient {
        row: RowIndex,
        column: ColumnIndex,
        value: f64,
    },

    #[error("{row}: references {column} but the problem has {num_columns} columns")]
    UnknownColumn {
        row: RowIndex,
        column: ColumnIndex,
        num_columns: usize,
    },

    #[error("{row}: right-hand side {value} is not finite")]
    NonFiniteRhs { row: RowIndex, value: f64 },

    #[error("expected {expected} bounds per side, got {lower} lower and {upper} upper")]
    BoundsLengthMismatch {
        expected: usize,
        lower: usize,
        upper: usize,
    },
}

pub type ModelResult<T> = Result<T, ModelError>;
