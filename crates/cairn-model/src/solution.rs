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

use crate::index::ColumnIndex;

/// An integer-feasible assignment of every column.
///
/// `objective` is expressed in the problem's own sense (a maximisation
/// problem reports the maximised value), offset included.
#[derive(Clone, Debug, PartialEq)]
pub struct MipSolution {
    objective: f64,
    values: Vec<f64>,
}

impl MipSolution {
    /// Creates a new `MipSolution`.
    ///
    /// # Arguments
    ///
    /// * `objective` - The objective value in the problem's sense.
    /// * `values` - One value per column.
    ///
    /// # Returns
    ///
    /// A solution owning `values`. Feasibility is not checked.
    #[inline]
    pub fn new(objective: f64, values: Vec<f64>) -> Self {
        Self { objective, values }
    }

    #[inline]
    pub fn objective(&self) -> f64 {
        self.objective
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.values.len()
    }

    /// Returns the value of `column`.
    ///
    /// # Panics
    ///
    /// Panics if `column` is out of bounds.
    #[inline]
    pub fn value(&self, column: ColumnIndex) -> f64 {
        debug_assert!(
            column.get() < self.num_columns(),
            "called `MipSolution::value` with column index out of bounds: the len is {} but the index is {}",
            self.num_columns(),
            column.get()
        );
        self.values[column.get()]
    }

    /// Consumes the solution and returns its column values.
    #[inline]
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

impl std::fmt::Display for MipSolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Solution (objective {}):", self.objective)?;
        for (j, v) in self.values.iter().enumerate() {
            writeln!(f, "  x[{}] = {}", j, v)?;
        }
        Ok(())
    }
}
