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

//! # Reduced-Cost Fixing
//!
//! Let `z` be the objective of an optimal root relaxation and `U` the
//! incumbent's. A column at its lower bound with reduced cost `d > 0` cannot
//! rise more than `(U - z) / d` above that bound in any solution better than
//! `U`, and a column at its upper bound with `d < 0` cannot fall more than
//! `(U - z) / -d` below it. Integral columns round the new bound inwards.
//!
//! The root bound is global, so the tightened bounds hold for the whole
//! tree. If a column's bounds cross, no solution better than `U` exists.

use crate::lp::RootRelaxation;
use cairn_model::{index::ColumnIndex, problem::Problem};

/// Reduced costs closer to zero than this fix nothing.
const REDUCED_COST_THRESHOLD: f64 = 1e-6;

/// Column bounds after reduced-cost fixing.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedCostFixing {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    /// Columns whose range shrank.
    pub tightened: usize,
    /// Columns whose range shrank to a single value.
    pub fixed: usize,
    /// Some column ended up with `lower > upper`.
    pub conflict: bool,
}

/// Tightens column bounds with the root reduced costs.
///
/// A column is only considered if the root point sits at the bound its
/// reduced cost pushes it towards.
///
/// # Arguments
///
/// * `problem` - The problem whose bounds are tightened.
/// * `root` - The root relaxation; its `reduced_costs` must have one entry
///   per column or nothing is done.
/// * `upper_bound` - The incumbent objective in minimisation form.
/// * `tolerance` - Integrality and at-bound tolerance.
///
/// # Returns
///
/// `None` if there is no finite incumbent, no usable reduced costs, or no
/// column could be tightened.
pub fn reduced_cost_fixings(
    problem: &Problem,
    root: &RootRelaxation,
    upper_bound: f64,
    tolerance: f64,
) -> Option<ReducedCostFixing> {
    let n = problem.num_columns();
    if !upper_bound.is_finite() || root.reduced_costs.len() != n || root.primal.len() != n {
        return None;
    }

    let gap = (upper_bound - root.objective).max(0.0);
    let mut lower = problem.lower_bounds().to_vec();
    let mut upper = problem.upper_bounds().to_vec();
    let mut tightened = 0;
    let mut fixed = 0;
    let mut conflict = false;

    for j in 0..n {
        let d = root.reduced_costs[j];
        let x = root.primal[j];
        let integral = problem.variable_kind(ColumnIndex::new(j)).is_integral();

        let changed = if d > REDUCED_COST_THRESHOLD && (x - lower[j]).abs() <= tolerance {
            let mut bound = lower[j] + gap / d;
            if integral {
                bound = (bound + tolerance).floor();
            }
            let shrinks = bound < upper[j] - tolerance;
            if shrinks {
                upper[j] = bound;
            }
            shrinks
        } else if d < -REDUCED_COST_THRESHOLD && (upper[j] - x).abs() <= tolerance {
            let mut bound = upper[j] + gap / d;
            if integral {
                bound = (bound - tolerance).ceil();
            }
            let shrinks = bound > lower[j] + tolerance;
            if shrinks {
                lower[j] = bound;
            }
            shrinks
        } else {
            false
        };

        if changed {
            tightened += 1;
            if lower[j] > upper[j] + tolerance {
                conflict = true;
            } else if (upper[j] - lower[j]).abs() <= tolerance {
                fixed += 1;
            }
        }
    }

    if tightened == 0 {
        return None;
    }
    log::debug!(
        "Reduced-cost fixing tightened {} column(s), fixed {}, gap {}",
        tightened,
        fixed,
        gap
    );
    Some(ReducedCostFixing {
        lower,
        upper,
        tightened,
        fixed,
        conflict,
    })
}
