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

//! # Horizon Barrier
//!
//! A reusable counting rendezvous for a fixed set of participants. Every
//! `wait` blocks until all participants of the current generation have
//! arrived, then releases them together and starts the next generation.
//!
//! Participant `0` is always the leader. Leadership is fixed rather than
//! given to the last thread to arrive, so work done only by the leader does
//! not depend on thread timing.
//!
//! `shutdown` releases every current and future waiter with
//! `BarrierWaitResult::Shutdown`. The coordinator uses it to end a solve, and
//! a worker that panics triggers it from a drop guard so no peer is left
//! blocked.

use std::sync::{Condvar, Mutex, MutexGuard};

/// How a `wait` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierWaitResult {
    /// Released, and this is participant `0`.
    Leader,
    /// Released, any other participant.
    Follower,
    /// The barrier was shut down. No generation completed.
    Shutdown,
}

impl BarrierWaitResult {
    #[inline]
    pub fn is_shutdown(self) -> bool {
        self == BarrierWaitResult::Shutdown
    }
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    shutdown: bool,
}

/// A reusable barrier with a fixed leader and a shutdown switch.
#[derive(Debug)]
pub struct HorizonBarrier {
    participants: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl HorizonBarrier {
    /// Creates a new `HorizonBarrier`.
    ///
    /// # Arguments
    ///
    /// * `participants` - Threads that must arrive before any is released.
    ///
    /// # Panics
    ///
    /// In debug builds, if `participants` is zero.
    pub fn new(participants: usize) -> Self {
        debug_assert!(
            participants > 0,
            "called `HorizonBarrier::new` with zero participants"
        );
        Self {
            participants,
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
        }
    }

    #[inline]
    pub fn participants(&self) -> usize {
        self.participants
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Blocks until every participant has arrived or the barrier is shut down.
    pub fn wait(&self, participant: usize) -> BarrierWaitResult {
        debug_assert!(
            participant < self.participants,
            "called `HorizonBarrier::wait` with participant out of bounds: the len is {} but the index is {}",
            self.participants,
            participant
        );

        let mut state = self.lock();
        if state.shutdown {
            return BarrierWaitResult::Shutdown;
        }

        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.participants {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.released.notify_all();
        } else {
            while state.generation == generation && !state.shutdown {
                state = self
                    .released
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            if state.generation == generation {
                return BarrierWaitResult::Shutdown;
            }
        }

        if participant == 0 {
            BarrierWaitResult::Leader
        } else {
            BarrierWaitResult::Follower
        }
    }

    /// Releases every waiter with `Shutdown`. Later waits return at once.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        self.released.notify_all();
    }

    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.lock().shutdown
    }
}

/// Shuts the barriers down when dropped during a panic.
#[derive(Debug)]
pub struct ShutdownOnPanic<'a> {
    barriers: &'a [&'a HorizonBarrier],
}

impl<'a> ShutdownOnPanic<'a> {
    #[inline]
    pub fn new(barriers: &'a [&'a HorizonBarrier]) -> Self {
        Self { barriers }
    }
}

impl Drop for ShutdownOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            for barrier in self.barriers {
                barrier.shutdown();
            }
        }
    }
}
