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

//! # Search Events
//!
//! In deterministic mode workers never touch global state. Every node outcome
//! becomes an `Event` in the worker's private `EventBatch`, stamped with the
//! worker's work clock, its id and a per-worker sequence number. At a sync
//! point the coordinator merges all batches, sorts them by
//! `(clock, worker, sequence)` and replays them one by one.
//!
//! The sort key depends only on event content, so the replay order (and
//! everything derived from it) is independent of which thread finished first.
//! Ties in `clock` are possible and harmless: `worker` and `sequence` together
//! are unique.

use crate::{
    node::{NodeKey, WorkerIndex},
    pseudo_cost::PseudoCostObservation,
};
use cairn_core::hash::StateHasher;
use cairn_model::index::ColumnIndex;

/// What happened to a node, or what a dive or an outside producer found.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// The node was split on `column` at `value`; `objective` is its relaxation bound.
    Branched {
        objective: f64,
        column: ColumnIndex,
        value: f64,
        down: NodeKey,
        up: NodeKey,
    },
    /// An integer-feasible point with minimisation-form `objective`.
    IntegerSolutionFound { objective: f64, values: Vec<f64> },
    /// Closed because its bound could not beat the incumbent.
    Fathomed { lower_bound: f64 },
    /// Closed because its relaxation (or its bounds) had no solution.
    Infeasible,
    /// Closed because its relaxation failed; `lower_bound` is the bound it had.
    NumericalError { lower_bound: f64 },
    /// A dive solved the relaxation below a column it fixed.
    ///
    /// Touches no node; it exists to carry the step's pseudo-cost observation
    /// into the canonical table.
    DiveStep { objective: f64 },
}

impl EventKind {
    #[inline]
    fn tag(&self) -> u32 {
        match self {
            EventKind::Branched { .. } => 0,
            EventKind::IntegerSolutionFound { .. } => 1,
            EventKind::Fathomed { .. } => 2,
            EventKind::Infeasible => 3,
            EventKind::NumericalError { .. } => 4,
            EventKind::DiveStep { .. } => 5,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Branched { column, value, .. } => {
                write!(f, "Branched({} = {})", column, value)
            }
            EventKind::IntegerSolutionFound { objective, .. } => {
                write!(f, "IntegerSolutionFound({})", objective)
            }
            EventKind::Fathomed { lower_bound } => write!(f, "Fathomed({})", lower_bound),
            EventKind::Infeasible => write!(f, "Infeasible"),
            EventKind::NumericalError { lower_bound } => {
                write!(f, "NumericalError({})", lower_bound)
            }
            EventKind::DiveStep { objective } => write!(f, "DiveStep({})", objective),
        }
    }
}

/// One outcome, stamped for canonical replay.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// The producing worker's work clock when the outcome was recorded.
    pub clock: f64,
    pub worker: WorkerIndex,
    /// The node the event refers to; `None` for dives and external solutions.
    pub node: Option<NodeKey>,
    /// Per-worker counter; with `worker` it makes the sort key unique.
    pub sequence: u64,
    pub depth: u32,
    /// Applied to the canonical pseudo-costs only if the event replays.
    pub pseudo_cost: Option<PseudoCostObservation>,
    pub kind: EventKind,
}

impl Event {
    /// Compares two events by `(clock, worker, sequence)`, the replay order.
    #[inline]
    pub fn sort_key_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.clock
            .total_cmp(&other.clock)
            .then(self.worker.cmp(&other.worker))
            .then(self.sequence.cmp(&other.sequence))
    }

    /// Feeds the event's identity and payload into the running state digest.
    ///
    /// Solution vectors are hashed bit for bit, so two runs agree only if
    /// they replayed exactly the same points.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.write_f64(self.clock);
        hasher.write_usize(self.worker.get());
        hasher.write_u64(self.sequence);
        if let Some(key) = self.node {
            hasher.write_usize(key.origin.get());
            hasher.write_u64(key.seq);
        }
        hasher.write_u32(self.kind.tag());
        match &self.kind {
            EventKind::Branched {
                objective,
                column,
                value,
                ..
            } => {
                hasher.write_f64(*objective);
                hasher.write_usize(column.get());
                hasher.write_f64(*value);
            }
            EventKind::IntegerSolutionFound { objective, values } => {
                hasher.write_f64(*objective);
                hasher.write_f64_slice(values);
            }
            EventKind::Fathomed { lower_bound } | EventKind::NumericalError { lower_bound } => {
                hasher.write_f64(*lower_bound);
            }
            EventKind::DiveStep { objective } => hasher.write_f64(*objective),
            EventKind::Infeasible => {}
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Event(clock: {}, worker: {}, sequence: {}, kind: {})",
            self.clock,
            self.worker.get(),
            self.sequence,
            self.kind
        )
    }
}

/// Sorts events into replay order.
#[inline]
pub fn sort_events(events: &mut [Event]) {
    events.sort_unstable_by(Event::sort_key_cmp);
}

/// Concatenates per-worker batches in any order and sorts the result.
pub fn merge_batches<I>(batches: I) -> Vec<Event>
where
    I: IntoIterator<Item = Vec<Event>>,
{
    let mut events: Vec<Event> = batches.into_iter().flatten().collect();
    sort_events(&mut events);
    events
}

/// A worker's private, append-only event stream for the current horizon.
#[derive(Debug, Clone)]
pub struct EventBatch {
    worker: WorkerIndex,
    next_sequence: u64,
    events: Vec<Event>,
}

impl EventBatch {
    #[inline]
    pub fn new(worker: WorkerIndex) -> Self {
        Self {
            worker,
            next_sequence: 0,
            events: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Appends an event stamped with `clock` and the next sequence number.
    pub fn record(
        &mut self,
        clock: f64,
        node: Option<NodeKey>,
        depth: u32,
        pseudo_cost: Option<PseudoCostObservation>,
        kind: EventKind,
    ) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.events.push(Event {
            clock,
            worker: self.worker,
            node,
            sequence,
            depth,
            pseudo_cost,
            kind,
        });
    }

    /// Hands the batch to the coordinator. Sequence numbers keep counting.
    #[inline]
    pub fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    #[inline]
    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, seq::SliceRandom};
    use rand_chacha::ChaCha8Rng;

    fn batch(worker: usize, clocks: &[f64]) -> Vec<Event> {
        let mut b = EventBatch::new(WorkerIndex::new(worker));
        for (i, &clock) in clocks.iter().enumerate() {
            b.record(
                clock,
                Some(NodeKey::new(WorkerIndex::new(worker), i as u64 + 1)),
                1,
                None,
                EventKind::Fathomed { lower_bound: i as f64 },
            );
        }
        b.take()
    }

    fn order(events: &[Event]) -> Vec<(usize, u64)> {
        events.iter().map(|e| (e.worker.get(), e.sequence)).collect()
    }

    #[test]
    fn test_batch_stamps_increasing_sequence() {
        let mut b = EventBatch::new(WorkerIndex::new(3));
        b.record(1.0, None, 0, None, EventKind::Infeasible);
        b.record(1.0, None, 0, None, EventKind::Infeasible);
        let first = b.take();
        assert!(b.is_empty());
        b.record(2.0, None, 0, None, EventKind::Infeasible);
        let second = b.take();
        assert_eq!(first[0].sequence, 0);
        assert_eq!(first[1].sequence, 1);
        assert_eq!(second[0].sequence, 2);
        assert_eq!(second[0].worker, WorkerIndex::new(3));
    }

    #[test]
    fn test_sort_by_clock_worker_sequence() {
        let merged = merge_batches(vec![batch(1, &[1.0, 2.0]), batch(0, &[2.0, 2.0, 3.0])]);
        assert_eq!(order(&merged), vec![(1, 0), (0, 0), (0, 1), (1, 1), (0, 2)]);
    }

    #[test]
    fn test_batch_arrival_order_does_not_change_replay_order() {
        let batches = vec![
            batch(0, &[0.5, 1.5, 1.5, 4.0]),
            batch(1, &[1.5, 1.5, 2.0]),
            batch(2, &[0.0, 4.0]),
            batch(3, &[1.0, 1.5, 3.5, 4.0]),
        ];
        let reference = merge_batches(batches.clone());

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..32 {
            let mut shuffled = batches.clone();
            shuffled.shuffle(&mut rng);
            assert_eq!(merge_batches(shuffled), reference);
        }
    }

    #[test]
    fn test_dive_steps_hash_their_objective() {
        let step = |objective| {
            let mut b = EventBatch::new(WorkerIndex::new(2));
            b.record(1.0, None, 3, None, EventKind::DiveStep { objective });
            let mut h = StateHasher::new();
            b.take().iter().for_each(|e| e.hash_into(&mut h));
            h.finish()
        };
        assert_eq!(step(1.5), step(1.5));
        assert_ne!(step(1.5), step(2.5));
        assert_eq!(EventKind::DiveStep { objective: 1.5 }.to_string(), "DiveStep(1.5)");
    }

    #[test]
    fn test_hash_depends_on_content() {
        let a = batch(0, &[1.0]);
        let b = batch(0, &[2.0]);
        let digest = |events: &[Event]| {
            let mut h = StateHasher::new();
            events.iter().for_each(|e| e.hash_into(&mut h));
            h.finish()
        };
        assert_eq!(digest(&a), digest(&a.clone()));
        assert_ne!(digest(&a), digest(&b));
    }
}
