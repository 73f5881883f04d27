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

//! # Sync-Time State
//!
//! Everything the coordinator does between the end barrier of one horizon
//! and the start barrier of the next, as plain functions over plain data so
//! the threaded and sequential drivers share it verbatim:
//!
//! 1. `CanonicalState::replay` applies the sorted event stream to the search
//!    tree, the pseudo-cost table and the incumbent.
//! 2. `prune_queues` drops queued nodes the incumbent has made useless.
//! 3. `rebalance` evens out worker loads when they drift too far apart.
//! 4. `DivingHeap` picks the backlog nodes idle divers start from.
//!
//! None of these look at the clock or at thread identity.

use crate::{
    event::{Event, EventKind},
    heuristic::{HeuristicSolution, RepairQueue},
    node::{EXTERNAL_WORKER, Node, NodeKey},
    pseudo_cost::PseudoCosts,
    queue::NodeQueue,
    tree::{NodeStatus, SearchTree},
};
use cairn_core::hash::StateHasher;
use cairn_model::problem::Problem;
use rustc_hash::FxHashSet;
use std::{cmp::Ordering, collections::BinaryHeap, sync::Arc};

/// The best integer point accepted so far, objective in minimisation form.
#[derive(Debug, Clone, PartialEq)]
pub struct Incumbent {
    pub objective: f64,
    /// Shared with the snapshot handed to workers.
    pub values: Arc<[f64]>,
}

/// What one call to `CanonicalState::replay` did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    /// Events applied to the tree or the incumbent.
    pub replayed: usize,
    /// Events ignored because their node was no longer open.
    pub stale: usize,
    /// Incumbents accepted during this replay, in acceptance order.
    pub improvements: Vec<Incumbent>,
}

/// Coordinator-owned global state. Only replay and pruning change it.
#[derive(Debug, Clone)]
pub struct CanonicalState {
    tree: SearchTree,
    pseudo_costs: PseudoCosts,
    incumbent: Option<Incumbent>,
    history: Vec<f64>,
    numerical_failures: u64,
    hasher: StateHasher,
}

impl CanonicalState {
    /// The state before the first horizon: an open root, empty pseudo-costs, no incumbent.
    ///
    /// # Arguments
    ///
    /// * `root_lower_bound` - The root relaxation's objective.
    /// * `num_columns` - Number of columns of the problem, sizing the pseudo-cost table.
    pub fn new(root_lower_bound: f64, num_columns: usize) -> Self {
        Self {
            tree: SearchTree::with_root(root_lower_bound),
            pseudo_costs: PseudoCosts::new(num_columns),
            incumbent: None,
            history: Vec::new(),
            numerical_failures: 0,
            hasher: StateHasher::new(),
        }
    }

    #[inline]
    pub fn tree(&self) -> &SearchTree {
        &self.tree
    }

    #[inline]
    pub fn tree_mut(&mut self) -> &mut SearchTree {
        &mut self.tree
    }

    #[inline]
    pub fn pseudo_costs(&self) -> &PseudoCosts {
        &self.pseudo_costs
    }

    #[inline]
    pub fn incumbent(&self) -> Option<&Incumbent> {
        self.incumbent.as_ref()
    }

    #[inline]
    pub fn upper_bound(&self) -> f64 {
        self.incumbent
            .as_ref()
            .map_or(f64::INFINITY, |i| i.objective)
    }

    /// Objectives of every accepted incumbent, oldest first.
    #[inline]
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    #[inline]
    pub fn numerical_failures(&self) -> u64 {
        self.numerical_failures
    }

    /// The digest of everything replayed and folded so far.
    #[inline]
    pub fn state_hash(&self) -> u64 {
        self.hasher.finish()
    }

    /// Installs `values` if `objective` strictly improves on the incumbent.
    ///
    /// # Returns
    ///
    /// The new incumbent, or `None` if `objective` did not improve.
    pub fn offer_solution(&mut self, objective: f64, values: &[f64]) -> Option<Incumbent> {
        if !(objective < self.upper_bound()) {
            return None;
        }
        let incumbent = Incumbent {
            objective,
            values: Arc::from(values),
        };
        self.history.push(objective);
        self.incumbent = Some(incumbent.clone());
        Some(incumbent)
    }

    /// Applies `events`, which must already be in replay order.
    ///
    /// Every event is folded into the state hash, replayed or not. A replayed
    /// event's pseudo-cost observation goes into the canonical table at its
    /// position in the stream.
    pub fn replay(&mut self, events: &[Event]) -> ReplaySummary {
        debug_assert!(
            events.windows(2).all(|w| w[0].sort_key_cmp(&w[1]).is_le()),
            "called `CanonicalState::replay` with events out of replay order"
        );

        let mut summary = ReplaySummary::default();
        for event in events {
            event.hash_into(&mut self.hasher);
            if self.apply(event, &mut summary) {
                if let Some(observation) = &event.pseudo_cost {
                    self.pseudo_costs.record(observation);
                }
                summary.replayed += 1;
            } else {
                summary.stale += 1;
                log::warn!("Ignoring stale {}", event);
            }
        }
        summary
    }

    fn apply(&mut self, event: &Event, summary: &mut ReplaySummary) -> bool {
        match (&event.kind, event.node) {
            (EventKind::Branched { objective, down, up, .. }, Some(key)) => {
                self.tree.branch(key, *objective, *down, *up)
            }
            (EventKind::IntegerSolutionFound { objective, values }, node) => {
                if let Some(key) = node {
                    if !self.tree.close(key, NodeStatus::Integer) {
                        return false;
                    }
                }
                if let Some(incumbent) = self.offer_solution(*objective, values) {
                    log::info!(
                        "Incumbent improved to {} by worker {}",
                        incumbent.objective,
                        event.worker.get()
                    );
                    summary.improvements.push(incumbent);
                }
                true
            }
            (EventKind::Fathomed { .. }, Some(key)) => self.tree.close(key, NodeStatus::Fathomed),
            (EventKind::Infeasible, Some(key)) => self.tree.close(key, NodeStatus::Infeasible),
            (EventKind::NumericalError { .. }, Some(key)) => {
                let closed = self.tree.close(key, NodeStatus::Numerical);
                if closed {
                    self.numerical_failures += 1;
                }
                closed
            }
            (EventKind::DiveStep { .. }, None) => true,
            (EventKind::DiveStep { .. }, Some(_)) | (_, None) => false,
        }
    }

    /// Folds the post-sync incumbent and pseudo-costs into the running digest.
    pub fn fold_into_hash(&mut self) {
        self.hasher.write_f64(self.upper_bound());
        if let Some(incumbent) = &self.incumbent {
            self.hasher.write_f64_slice(&incumbent.values);
        }
        self.pseudo_costs.hash_into(&mut self.hasher);
    }
}

/// Turns drained heuristic submissions into events of the external worker.
///
/// Infeasible submissions are handed to `repairs` when one is given and
/// dropped otherwise.
///
/// # Arguments
///
/// * `solutions` - Submissions drained for this horizon, in submission order.
/// * `problem` - The problem the points are checked against.
/// * `tolerance` - Feasibility and integrality tolerance.
/// * `repairs` - Where infeasible points go, if a repair heuristic is installed.
///
/// # Returns
///
/// One `IntegerSolutionFound` event per feasible point, stamped with the
/// submission's timestamp and its position in `solutions`.
pub fn external_events(
    solutions: Vec<HeuristicSolution>,
    problem: &Problem,
    tolerance: f64,
    repairs: Option<&RepairQueue>,
) -> Vec<Event> {
    let mut events = Vec::with_capacity(solutions.len());
    for (sequence, solution) in solutions.into_iter().enumerate() {
        if !problem.is_feasible(&solution.values, tolerance) {
            match repairs {
                Some(queue) => queue.push(solution.values),
                None => log::debug!("Dropping infeasible external solution"),
            }
            continue;
        }
        let objective = problem.internal_objective(&solution.values);
        events.push(Event {
            clock: solution.timestamp,
            worker: EXTERNAL_WORKER,
            node: None,
            sequence: sequence as u64,
            depth: 0,
            pseudo_cost: None,
            kind: EventKind::IntegerSolutionFound {
                objective,
                values: solution.values,
            },
        });
    }
    events
}

/// Forgets dive sources whose node is no longer open in `tree`.
///
/// Only open backlog nodes can be handed to a diver again, so a closed
/// source needs no entry. Keeps `dived` no larger than the open frontier.
///
/// # Returns
///
/// The number of keys removed.
pub fn retain_open(dived: &mut FxHashSet<NodeKey>, tree: &SearchTree) -> usize {
    let before = dived.len();
    dived.retain(|key| tree.is_open(*key));
    before - dived.len()
}

/// Removes every queued node with `lower_bound >= cutoff` and closes it in `tree`.
///
/// # Arguments
///
/// * `queues` - Every BFS worker's queue.
/// * `tree` - The canonical tree; each pruned node is closed as `Pruned`.
/// * `cutoff` - The incumbent's objective less the absolute gap tolerance.
///
/// # Returns
///
/// The number of nodes pruned.
pub fn prune_queues(queues: &mut [&mut NodeQueue], tree: &mut SearchTree, cutoff: f64) -> usize {
    let mut pruned = 0;
    for queue in queues.iter_mut() {
        for key in queue.prune(cutoff) {
            let closed = tree.close(key, NodeStatus::Pruned);
            debug_assert!(closed, "pruned {} was not open in the search tree", key);
            pruned += 1;
        }
    }
    pruned
}

fn extreme_loads(queues: &[&mut NodeQueue]) -> Option<((usize, usize), (usize, usize))> {
    let mut loads = queues.iter().map(|q| q.len()).enumerate();
    let first = loads.next()?;
    Some(loads.fold((first, first), |(max, min), (i, load)| {
        (
            if load > max.1 { (i, load) } else { max },
            if load < min.1 { (i, load) } else { min },
        )
    }))
}

/// Moves nodes from the most to the least loaded queue once their spread exceeds `threshold`.
///
/// Transfers continue until no two loads differ by more than one. Returns
/// the number of nodes moved.
pub fn rebalance(queues: &mut [&mut NodeQueue], threshold: usize) -> usize {
    let Some(((_, max), (_, min))) = extreme_loads(queues) else {
        return 0;
    };
    if max - min <= threshold {
        return 0;
    }

    let mut transfers = 0;
    while let Some(((from, max), (to, min))) = extreme_loads(queues) {
        if max - min <= 1 {
            break;
        }
        let Some(node) = queues[from].take_for_transfer() else {
            break;
        };
        queues[to].receive(node);
        transfers += 1;
    }
    transfers
}

#[derive(Debug, Clone)]
struct DiveCandidate {
    estimate: f64,
    node: Node,
}

impl PartialEq for DiveCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DiveCandidate {}

impl PartialOrd for DiveCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DiveCandidate {
    // Reversed: the smallest estimate, then the smallest key, pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| other.node.key().cmp(&self.node.key()))
    }
}

/// Backlog nodes ranked as dive starting points.
#[derive(Debug, Clone, Default)]
pub struct DivingHeap {
    heap: BinaryHeap<DiveCandidate>,
}

impl DivingHeap {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Rebuilds the heap from `backlog`, skipping nodes that were already dived from.
    ///
    /// Candidates are ranked by objective estimate, ties broken by key.
    pub fn refresh<'a, I>(&mut self, backlog: I, dived: &FxHashSet<NodeKey>)
    where
        I: IntoIterator<Item = &'a Node>,
    {
        self.heap.clear();
        self.heap.extend(
            backlog
                .into_iter()
                .filter(|node| !dived.contains(&node.key()))
                .map(|node| DiveCandidate {
                    estimate: node.estimate(),
                    node: node.clone(),
                }),
        );
    }

    /// The best remaining node, as a detached copy.
    #[inline]
    pub fn pop(&mut self) -> Option<Node> {
        self.heap.pop().map(|c| c.node)
    }
}
