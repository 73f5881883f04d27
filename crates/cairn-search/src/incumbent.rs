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

//! # Shared Incumbent
//!
//! The best integer-feasible solution seen by the opportunistic scheduler,
//! readable without locking and updated by any worker.
//!
//! ## Layout
//!
//! - `upper_bound`: the incumbent's minimisation-form objective, stored as
//!   `f64` bits in an `AtomicU64`. Workers read it at every node to decide
//!   whether to fathom, so it must be cheap. `+inf` means no incumbent.
//! - `solution`: the authoritative `(objective, MipSolution)` pair behind a
//!   `Mutex`. `try_install` re-checks against it after locking, so two racing
//!   proposals can never leave a worse solution installed.
//!
//! The deterministic coordinator does not use this type: there the incumbent
//! is owned by a single writer and needs no synchronisation.
//!
//! ## Usage
//!
//! ```rust
//! use cairn_search::incumbent::SharedIncumbent;
//! use cairn_model::solution::MipSolution;
//!
//! let inc = SharedIncumbent::new();
//! assert!(inc.try_install(5.0, MipSolution::new(5.0, vec![1.0])));
//! assert!(!inc.try_install(7.0, MipSolution::new(7.0, vec![0.0])));
//! assert_eq!(inc.upper_bound(), 5.0);
//! ```

use cairn_model::solution::MipSolution;
use std::sync::{
    Mutex, MutexGuard,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug)]
pub struct SharedIncumbent {
    upper_bound: AtomicU64,
    solution: Mutex<Option<(f64, MipSolution)>>,
}

impl Default for SharedIncumbent {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SharedIncumbent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Incumbent(upper_bound: {})", self.upper_bound())
    }
}

impl SharedIncumbent {
    #[inline]
    pub fn new() -> Self {
        Self {
            upper_bound: AtomicU64::new(f64::INFINITY.to_bits()),
            solution: Mutex::new(None),
        }
    }

    /// Minimisation-form objective of the incumbent, `+inf` if none.
    #[inline]
    pub fn upper_bound(&self) -> f64 {
        f64::from_bits(self.upper_bound.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn has_solution(&self) -> bool {
        self.upper_bound().is_finite()
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Option<(f64, MipSolution)>> {
        // The slot is replaced wholesale, so a poisoned guard still holds a consistent value.
        self.solution
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Clone of the installed solution, if any.
    #[inline]
    pub fn snapshot(&self) -> Option<MipSolution> {
        self.lock().as_ref().map(|(_, s)| s.clone())
    }

    /// Takes the installed solution together with its minimisation-form objective.
    pub fn into_inner(self) -> Option<(f64, MipSolution)> {
        self.solution
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Installs `solution` if `objective` (minimisation form) is strictly better.
    pub fn try_install(&self, objective: f64, solution: MipSolution) -> bool {
        if !(objective < self.upper_bound()) {
            return false;
        }

        let mut guard = self.lock();
        // Another worker may have installed a better solution while we waited.
        if guard
            .as_ref()
            .is_some_and(|(current, _)| objective >= *current)
        {
            return false;
        }

        *guard = Some((objective, solution));
        self.upper_bound.store(objective.to_bits(), Ordering::Relaxed);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sol(obj: f64) -> MipSolution {
        MipSolution::new(obj, vec![obj])
    }

    #[test]
    fn test_starts_empty_with_infinite_bound() {
        let inc = SharedIncumbent::new();
        assert_eq!(inc.upper_bound(), f64::INFINITY);
        assert!(!inc.has_solution());
        assert!(inc.snapshot().is_none());
    }

    #[test]
    fn test_only_strict_improvements_install() {
        let inc = SharedIncumbent::new();
        assert!(inc.try_install(10.0, sol(10.0)));
        assert!(!inc.try_install(10.0, sol(10.0)));
        assert!(!inc.try_install(11.0, sol(11.0)));
        assert!(inc.try_install(-2.0, sol(-2.0)));
        assert_eq!(inc.upper_bound(), -2.0);
        assert_eq!(inc.snapshot().map(|s| s.objective()), Some(-2.0));
    }

    #[test]
    fn test_nan_is_rejected() {
        let inc = SharedIncumbent::new();
        assert!(!inc.try_install(f64::NAN, sol(0.0)));
        assert!(!inc.has_solution());
    }

    #[test]
    fn test_concurrent_installs_keep_the_minimum() {
        let inc = Arc::new(SharedIncumbent::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let inc = Arc::clone(&inc);
                std::thread::spawn(move || {
                    for k in 0..200 {
                        let obj = ((t * 200 + k) % 977) as f64;
                        inc.try_install(obj, sol(obj));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("installer thread panicked");
        }
        assert_eq!(inc.upper_bound(), 0.0);
        let inner = Arc::try_unwrap(inc).expect("sole owner").into_inner();
        assert_eq!(inner.map(|(o, _)| o), Some(0.0));
    }
}
