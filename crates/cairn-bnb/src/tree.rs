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

//! # Canonical Search Tree
//!
//! The coordinator's record of the open part of the search, keyed by
//! `NodeKey`. Records change only during event replay and sync-time pruning,
//! so after a sync the set of open records is exactly the set of nodes held
//! by the workers' queues. `audit_conservation` checks that claim.
//!
//! A record lives only while its node is open. Closing a node drops the
//! record and bumps a per-status counter, so memory and the cost of every
//! query follow the size of the open frontier, not the number of nodes the
//! search has ever created. Open bounds are additionally kept in an ordered
//! set, which makes the global lower bound a lookup of its first element.
//!
//! Replay is idempotent per node: an event for a node that is not open
//! (already closed, or never created) is reported as stale and ignored.

use crate::node::NodeKey;
use rustc_hash::{FxHashMap, FxHashSet};
use std::{cmp::Ordering, collections::BTreeSet};

/// Where a node of the canonical tree stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    Open,
    Branched,
    Fathomed,
    Infeasible,
    Integer,
    Numerical,
    /// Removed at a sync because its bound no longer beat the incumbent.
    Pruned,
    /// Dropped with the remaining queues when the search stopped early.
    Abandoned,
}

impl NodeStatus {
    const COUNT: usize = 8;

    #[inline]
    const fn slot(self) -> usize {
        match self {
            NodeStatus::Open => 0,
            NodeStatus::Branched => 1,
            NodeStatus::Fathomed => 2,
            NodeStatus::Infeasible => 3,
            NodeStatus::Integer => 4,
            NodeStatus::Numerical => 5,
            NodeStatus::Pruned => 6,
            NodeStatus::Abandoned => 7,
        }
    }
}

/// What the tree remembers about an open node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeRecord {
    pub parent: Option<NodeKey>,
    pub depth: u32,
    pub lower_bound: f64,
}

/// An open node's bound, ordered by bound and then by key.
#[derive(Debug, Clone, Copy)]
struct OpenBound {
    bound: f64,
    key: NodeKey,
}

impl PartialEq for OpenBound {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenBound {}

impl PartialOrd for OpenBound {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenBound {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bound
            .total_cmp(&other.bound)
            .then_with(|| self.key.cmp(&other.key))
    }
}

/// The open frontier of the canonical search plus closing statistics.
#[derive(Debug, Clone, Default)]
pub struct SearchTree {
    open: FxHashMap<NodeKey, NodeRecord>,
    bounds: BTreeSet<OpenBound>,
    closed: [usize; NodeStatus::COUNT],
    created: usize,
}

impl SearchTree {
    /// A tree holding only the open root.
    ///
    /// # Arguments
    ///
    /// * `lower_bound` - The root relaxation's objective.
    pub fn with_root(lower_bound: f64) -> Self {
        let mut tree = Self::default();
        tree.insert(
            NodeKey::ROOT,
            NodeRecord {
                parent: None,
                depth: 0,
                lower_bound,
            },
        );
        tree
    }

    fn insert(&mut self, key: NodeKey, record: NodeRecord) {
        let previous = self.open.insert(key, record);
        debug_assert!(
            previous.is_none(),
            "called `SearchTree::insert` with key {} that is already open",
            key
        );
        self.bounds.insert(OpenBound {
            bound: record.lower_bound,
            key,
        });
        self.created += 1;
    }

    /// Number of nodes the tree has ever opened, the root included.
    #[inline]
    pub fn created(&self) -> usize {
        self.created
    }

    /// `true` while no node is open.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    #[inline]
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// The record of `key` if it is open.
    #[inline]
    pub fn record(&self, key: NodeKey) -> Option<&NodeRecord> {
        self.open.get(&key)
    }

    #[inline]
    pub fn is_open(&self, key: NodeKey) -> bool {
        self.open.contains_key(&key)
    }

    /// Closes `key` with `status` and drops its record.
    ///
    /// # Returns
    ///
    /// `false` if the node was not open, in which case nothing changes.
    pub fn close(&mut self, key: NodeKey, status: NodeStatus) -> bool {
        debug_assert!(
            status != NodeStatus::Open,
            "called `SearchTree::close` with status `Open`"
        );
        let Some(record) = self.open.remove(&key) else {
            return false;
        };
        let removed = self.bounds.remove(&OpenBound {
            bound: record.lower_bound,
            key,
        });
        debug_assert!(removed, "{} was open without an ordered bound", key);
        self.closed[status.slot()] += 1;
        true
    }

    /// Closes `key` as branched and opens its two children with bound `objective`.
    ///
    /// # Arguments
    ///
    /// * `key` - The node that was split.
    /// * `objective` - Its relaxation objective, inherited by both children.
    /// * `down` - Key of the child on the rounded-down side.
    /// * `up` - Key of the child on the rounded-up side.
    ///
    /// # Returns
    ///
    /// `false` if `key` was not open; no child is created then.
    pub fn branch(&mut self, key: NodeKey, objective: f64, down: NodeKey, up: NodeKey) -> bool {
        let Some(depth) = self.open.get(&key).map(|r| r.depth) else {
            return false;
        };
        self.close(key, NodeStatus::Branched);
        for child in [down, up] {
            self.insert(
                child,
                NodeRecord {
                    parent: Some(key),
                    depth: depth + 1,
                    lower_bound: objective,
                },
            );
        }
        true
    }

    /// Smallest bound over open nodes, `+inf` when none are open.
    #[inline]
    pub fn lower_bound(&self) -> f64 {
        self.bounds.first().map_or(f64::INFINITY, |b| b.bound)
    }

    /// How many nodes currently have `status`; closed statuses count every close so far.
    #[inline]
    pub fn count(&self, status: NodeStatus) -> usize {
        match status {
            NodeStatus::Open => self.open.len(),
            closed => self.closed[closed.slot()],
        }
    }

    /// Checks that `live` (the keys held by all queues) is exactly the open set.
    ///
    /// Every created node is then either live in one container or closed,
    /// with no duplicates and no orphans.
    ///
    /// # Returns
    ///
    /// A description of the first violation found.
    pub fn audit_conservation<I>(&self, live: I) -> Result<(), String>
    where
        I: IntoIterator<Item = NodeKey>,
    {
        let mut seen = FxHashSet::default();
        for key in live {
            if !seen.insert(key) {
                return Err(format!("{} is held by more than one container", key));
            }
            if !self.open.contains_key(&key) {
                return Err(format!("{} is live but not open in the tree", key));
            }
        }
        if seen.len() != self.open.len() {
            return Err(format!(
                "{} nodes are open but only {} are held by containers",
                self.open.len(),
                seen.len()
            ));
        }
        let closed: usize = self.closed.iter().sum();
        if closed + self.open.len() != self.created {
            return Err(format!(
                "{} nodes were created but {} are open and {} closed",
                self.created,
                self.open.len(),
                closed
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::WorkerIndex;

    fn key(worker: usize, seq: u64) -> NodeKey {
        NodeKey::new(WorkerIndex::new(worker), seq)
    }

    #[test]
    fn test_branch_opens_children() {
        let mut tree = SearchTree::with_root(1.0);
        assert!(tree.branch(NodeKey::ROOT, 1.5, key(0, 1), key(0, 2)));
        assert_eq!(tree.created(), 3);
        assert_eq!(tree.open_count(), 2);
        assert_eq!(tree.count(NodeStatus::Branched), 1);
        assert_eq!(tree.record(key(0, 2)).map(|r| r.depth), Some(1));
        assert_eq!(tree.record(key(0, 1)).and_then(|r| r.parent), Some(NodeKey::ROOT));
        assert!(tree.record(NodeKey::ROOT).is_none());
        assert_eq!(tree.lower_bound(), 1.5);
    }

    #[test]
    fn test_second_close_is_stale() {
        let mut tree = SearchTree::with_root(0.0);
        assert!(tree.close(NodeKey::ROOT, NodeStatus::Fathomed));
        assert!(!tree.close(NodeKey::ROOT, NodeStatus::Infeasible));
        assert!(!tree.branch(NodeKey::ROOT, 0.0, key(0, 1), key(0, 2)));
        assert!(!tree.close(key(4, 4), NodeStatus::Fathomed));
        assert_eq!(tree.open_count(), 0);
        assert!(tree.is_empty());
        assert_eq!(tree.lower_bound(), f64::INFINITY);
        assert_eq!(tree.count(NodeStatus::Fathomed), 1);
        assert_eq!(tree.count(NodeStatus::Infeasible), 0);
    }

    #[test]
    fn test_closed_records_are_dropped() {
        let mut tree = SearchTree::with_root(0.0);
        let mut frontier = vec![NodeKey::ROOT];
        let mut seq = 0;
        // Grow a chain of 200 branchings, closing one child each time.
        for depth in 0..200 {
            let parent = frontier.pop().expect("open node");
            let (down, up) = (key(0, seq + 1), key(0, seq + 2));
            seq += 2;
            assert!(tree.branch(parent, depth as f64, down, up));
            assert!(tree.close(down, NodeStatus::Infeasible));
            frontier.push(up);
        }
        assert_eq!(tree.created(), 401);
        assert_eq!(tree.open_count(), 1);
        assert_eq!(tree.count(NodeStatus::Branched), 200);
        assert_eq!(tree.count(NodeStatus::Infeasible), 200);
        assert_eq!(tree.lower_bound(), 199.0);
        assert!(tree.audit_conservation(frontier).is_ok());
    }

    #[test]
    fn test_lower_bound_follows_the_smallest_open_bound() {
        let mut tree = SearchTree::with_root(0.0);
        tree.branch(NodeKey::ROOT, 2.0, key(0, 1), key(0, 2));
        tree.branch(key(0, 1), 3.0, key(0, 3), key(0, 4));
        assert_eq!(tree.lower_bound(), 2.0);
        tree.close(key(0, 2), NodeStatus::Pruned);
        assert_eq!(tree.lower_bound(), 3.0);
        tree.close(key(0, 3), NodeStatus::Fathomed);
        // Key (0, 4) shares the bound and keeps it alive.
        assert_eq!(tree.lower_bound(), 3.0);
        tree.close(key(0, 4), NodeStatus::Integer);
        assert_eq!(tree.lower_bound(), f64::INFINITY);
    }

    #[test]
    fn test_audit_accepts_exact_open_set() {
        let mut tree = SearchTree::with_root(0.0);
        tree.branch(NodeKey::ROOT, 0.0, key(0, 1), key(0, 2));
        tree.close(key(0, 1), NodeStatus::Infeasible);
        assert!(tree.audit_conservation([key(0, 2)]).is_ok());
    }

    #[test]
    fn test_audit_rejects_duplicates_orphans_and_losses() {
        let mut tree = SearchTree::with_root(0.0);
        tree.branch(NodeKey::ROOT, 0.0, key(0, 1), key(0, 2));
        assert!(tree.audit_conservation([key(0, 1), key(0, 1)]).is_err());
        assert!(tree.audit_conservation([key(0, 1), key(0, 2), key(1, 9)]).is_err());
        assert!(tree.audit_conservation([key(0, 1)]).is_err());
        assert!(tree.audit_conservation([NodeKey::ROOT, key(0, 1)]).is_err());
    }
}
