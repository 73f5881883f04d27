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

//! # Solver Float
//!
//! `SolverFloat` collects the bounds that pseudo-cost scoring and diving need
//! from a floating-point type, so those functions stay generic while the
//! engine itself runs on `f64`.

use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Floating-point types usable by the scoring functions.
pub trait SolverFloat: Float + FromPrimitive + Debug + Default + Send + Sync + 'static {}

impl<T> SolverFloat for T where T: Float + FromPrimitive + Debug + Default + Send + Sync + 'static {}

/// Returns `(x - floor(x), ceil(x) - x)`.
///
/// For an integral `x` both parts are zero.
///
/// ```rust
/// use cairn_core::num::float::fractional_parts;
/// let (down, up) = fractional_parts(2.25_f64);
/// assert!((down - 0.25).abs() < 1e-12);
/// assert!((up - 0.75).abs() < 1e-12);
/// ```
#[inline]
pub fn fractional_parts<F: SolverFloat>(x: F) -> (F, F) {
    (x - x.floor(), x.ceil() - x)
}

/// `true` when `x` lies within `tolerance` of an integer.
#[inline]
pub fn is_integral<F: SolverFloat>(x: F, tolerance: F) -> bool {
    (x - x.round()).abs() <= tolerance
}

/// Snaps values within `tolerance` of an integer onto it.
#[inline]
pub fn round_to_integer<F: SolverFloat>(x: F, tolerance: F) -> F {
    if is_integral(x, tolerance) { x.round() } else { x }
}

/// Relative gap `(upper - lower) / max(|upper|, 1e-10)`, `+inf` while either side is unbounded.
#[inline]
pub fn relative_gap(lower: f64, upper: f64) -> f64 {
    if !lower.is_finite() || !upper.is_finite() {
        return f64::INFINITY;
    }
    ((upper - lower) / upper.abs().max(1e-10)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fractional_parts_of_integral_value_are_zero() {
        let (down, up) = fractional_parts(4.0_f64);
        assert_eq!(down, 0.0);
        assert_eq!(up, 0.0);
    }

    #[test]
    fn test_fractional_parts_negative_value() {
        let (down, up) = fractional_parts(-1.25_f64);
        assert!((down - 0.75).abs() < 1e-12);
        assert!((up - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_is_integral_respects_tolerance() {
        assert!(is_integral(3.0000001_f64, 1e-6));
        assert!(!is_integral(3.001_f64, 1e-6));
        assert!(is_integral(-2.0_f32, 1e-6));
    }

    #[test]
    fn test_round_to_integer_only_snaps_near_values() {
        assert_eq!(round_to_integer(0.9999999_f64, 1e-6), 1.0);
        assert_eq!(round_to_integer(0.5_f64, 1e-6), 0.5);
    }

    #[test]
    fn test_relative_gap() {
        assert_eq!(relative_gap(f64::NEG_INFINITY, 3.0), f64::INFINITY);
        assert!((relative_gap(9.0, 10.0) - 0.1).abs() < 1e-12);
        assert_eq!(relative_gap(10.0, 10.0), 0.0);
        assert_eq!(relative_gap(11.0, 10.0), 0.0);
    }
}
