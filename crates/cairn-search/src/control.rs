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

//! # Search Control
//!
//! The cancellation channel shared by the coordinator and every worker: a
//! status flag recording why the search is stopping, and a halt counter that
//! workers poll at each node boundary.
//!
//! The first `request_halt` wins; later requests only bump the counter so the
//! reported status is the cause that actually stopped the search.

use crate::result::MipStatus;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

/// Shared stop signal of one solve.
#[derive(Debug, Default)]
pub struct SearchControl {
    status: AtomicU8,
    halt: AtomicU32,
}

impl SearchControl {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every participant to stop.
    ///
    /// # Arguments
    ///
    /// * `status` - The status the search should end with.
    ///
    /// # Returns
    ///
    /// `true` if this call set the status, `false` if an earlier request did.
    pub fn request_halt(&self, status: MipStatus) -> bool {
        self.halt.fetch_add(1, Ordering::AcqRel);
        self.status
            .compare_exchange(
                MipStatus::Unset.as_u8(),
                status.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Returns `true` once any halt was requested.
    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halt.load(Ordering::Acquire) > 0
    }

    #[inline]
    pub fn halt_requests(&self) -> u32 {
        self.halt.load(Ordering::Acquire)
    }

    /// The status of the first halt request, `Unset` before one.
    #[inline]
    pub fn status(&self) -> MipStatus {
        MipStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Clears both fields for a new solve.
    pub fn reset(&self) {
        self.status.store(MipStatus::Unset.as_u8(), Ordering::Release);
        self.halt.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_halt_request_sets_status() {
        let control = SearchControl::new();
        assert!(!control.is_halted());
        assert!(control.request_halt(MipStatus::TimeLimit));
        assert!(!control.request_halt(MipStatus::Optimal));
        assert!(control.is_halted());
        assert_eq!(control.halt_requests(), 2);
        assert_eq!(control.status(), MipStatus::TimeLimit);
    }

    #[test]
    fn test_reset() {
        let control = SearchControl::new();
        control.request_halt(MipStatus::Numerical);
        control.reset();
        assert!(!control.is_halted());
        assert_eq!(control.status(), MipStatus::Unset);
    }

    #[test]
    fn test_exactly_one_concurrent_winner() {
        let control = Arc::new(SearchControl::new());
        let winners: usize = (0..8)
            .map(|_| {
                let c = Arc::clone(&control);
                std::thread::spawn(move || c.request_halt(MipStatus::WorkLimit))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().expect("thread panicked") as usize)
            .sum();
        assert_eq!(winners, 1);
        assert_eq!(control.halt_requests(), 8);
    }
}
