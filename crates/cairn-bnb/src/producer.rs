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

//! # Producer Synchronisation
//!
//! External heuristic producers run on their own threads and feed solutions
//! into the `HeuristicQueue`. For their contributions to land in the same
//! horizon on every run, the coordinator waits at each sync until every
//! registered producer has reported for that horizon, by delivering a
//! solution or declining to.
//!
//! The wait is bounded by `producer_timeout`. A producer that misses it is
//! skipped for the horizon; the timeout is counted in the statistics and
//! logged, never raised as an error.

use std::{
    collections::BTreeMap,
    sync::{Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// Identifies a registered producer. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProducerId(u64);

impl std::fmt::Display for ProducerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Producer({})", self.0)
    }
}

/// Accumulated cost of waiting for producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProducerWaitStatistics {
    /// Waits with at least one producer registered.
    pub waits: u64,
    /// Waits that ended on the timeout.
    pub timeouts: u64,
    pub total_wait: Duration,
    pub max_wait: Duration,
}

/// How a wait for a horizon ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerWait {
    /// Nobody is registered.
    NoProducers,
    /// Every registered producer reported.
    Ready,
    /// `missing` producers had not reported when the timeout expired.
    TimedOut { missing: usize },
}

#[derive(Debug, Default)]
struct ProducerState {
    next_id: u64,
    /// Last horizon each registered producer reported for.
    reported: BTreeMap<ProducerId, Option<u64>>,
    current_horizon: u64,
    statistics: ProducerWaitStatistics,
}

impl ProducerState {
    fn missing(&self, horizon: u64) -> usize {
        self.reported
            .values()
            .filter(|r| r.is_none_or(|h| h < horizon))
            .count()
    }
}

/// Rendezvous between the deterministic coordinator and external producers.
#[derive(Debug, Default)]
pub struct ProducerSync {
    state: Mutex<ProducerState>,
    changed: Condvar,
}

impl ProducerSync {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, ProducerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new producer.
    ///
    /// # Returns
    ///
    /// A fresh id. The producer counts as not having reported any horizon yet.
    pub fn register(&self) -> ProducerId {
        let mut state = self.lock();
        let id = ProducerId(state.next_id);
        state.next_id += 1;
        state.reported.insert(id, None);
        log::debug!("{} registered", id);
        id
    }

    /// Removes `id`. A coordinator waiting on it is woken up.
    pub fn deregister(&self, id: ProducerId) {
        let mut state = self.lock();
        if state.reported.remove(&id).is_some() {
            log::debug!("{} deregistered", id);
        }
        self.changed.notify_all();
    }

    #[inline]
    pub fn num_registered(&self) -> usize {
        self.lock().reported.len()
    }

    /// Announces the horizon producers should now work towards.
    pub fn begin_horizon(&self, horizon: u64) {
        self.lock().current_horizon = horizon;
        self.changed.notify_all();
    }

    /// The horizon last announced by `begin_horizon`.
    #[inline]
    pub fn current_horizon(&self) -> u64 {
        self.lock().current_horizon
    }

    /// Marks `id` as done with `horizon`, with or without a solution.
    pub fn report(&self, id: ProducerId, horizon: u64) {
        let mut state = self.lock();
        if let Some(last) = state.reported.get_mut(&id) {
            *last = Some(last.map_or(horizon, |h| h.max(horizon)));
        }
        self.changed.notify_all();
    }

    /// Reports that `id` submitted its solution for `horizon`.
    #[inline]
    pub fn deliver(&self, id: ProducerId, horizon: u64) {
        log::trace!("{} delivered for horizon {}", id, horizon);
        self.report(id, horizon);
    }

    /// Reports that `id` has nothing for `horizon`.
    #[inline]
    pub fn decline(&self, id: ProducerId, horizon: u64) {
        log::trace!("{} declined horizon {}", id, horizon);
        self.report(id, horizon);
    }

    /// Blocks until every registered producer has reported for `horizon`, or `timeout` passes.
    pub fn wait_for_horizon(&self, horizon: u64, timeout: Duration) -> ProducerWait {
        let state = self.lock();
        if state.reported.is_empty() {
            return ProducerWait::NoProducers;
        }

        let started = Instant::now();
        let (mut state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |s| s.missing(horizon) > 0)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let waited = started.elapsed();

        let missing = state.missing(horizon);
        let stats = &mut state.statistics;
        stats.waits += 1;
        stats.total_wait += waited;
        stats.max_wait = stats.max_wait.max(waited);

        if missing > 0 {
            stats.timeouts += 1;
            log::warn!(
                "{} producer(s) missed horizon {} after {:?}",
                missing,
                horizon,
                waited
            );
            ProducerWait::TimedOut { missing }
        } else {
            ProducerWait::Ready
        }
    }

    #[inline]
    pub fn statistics(&self) -> ProducerWaitStatistics {
        self.lock().statistics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_producers_returns_immediately() {
        let sync = ProducerSync::new();
        assert_eq!(
            sync.wait_for_horizon(1, Duration::from_secs(10)),
            ProducerWait::NoProducers
        );
        assert_eq!(sync.statistics().waits, 0);
    }

    #[test]
    fn test_reported_producers_are_ready() {
        let sync = ProducerSync::new();
        let a = sync.register();
        let b = sync.register();
        sync.deliver(a, 1);
        sync.decline(b, 1);
        assert_eq!(sync.wait_for_horizon(1, Duration::from_secs(10)), ProducerWait::Ready);
        assert_eq!(sync.statistics().waits, 1);
        assert_eq!(sync.statistics().timeouts, 0);
    }

    #[test]
    fn test_silent_producer_times_out() {
        let sync = ProducerSync::new();
        let a = sync.register();
        let _silent = sync.register();
        sync.report(a, 3);
        let wait = sync.wait_for_horizon(2, Duration::from_millis(5));
        assert_eq!(wait, ProducerWait::TimedOut { missing: 1 });
        let stats = sync.statistics();
        assert_eq!(stats.timeouts, 1);
        assert!(stats.max_wait >= Duration::from_millis(5));
    }

    #[test]
    fn test_deregistered_producer_is_not_awaited() {
        let sync = ProducerSync::new();
        let a = sync.register();
        sync.deregister(a);
        assert_eq!(sync.num_registered(), 0);
        assert_eq!(
            sync.wait_for_horizon(1, Duration::from_secs(10)),
            ProducerWait::NoProducers
        );
    }

    #[test]
    fn test_wait_wakes_on_report_from_another_thread() {
        let sync = ProducerSync::new();
        let id = sync.register();
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(Duration::from_millis(10));
                sync.deliver(id, 4);
            });
            assert_eq!(sync.wait_for_horizon(4, Duration::from_secs(30)), ProducerWait::Ready);
        });
    }
}
