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

//! # Worker Node Queue
//!
//! Every BFS worker owns one `NodeQueue`. Nodes live in a generational
//! `Arena`; the three containers below hold only `Handle`s into it, and a
//! handle is in exactly one of them at a time:
//!
//! - `current`: an explicitly placed node, dequeued before anything else.
//! - `plunge`: the depth-first stack. `enqueue` pushes to the front and
//!   `dequeue` pops from the front.
//! - `backlog`: a best-first heap ordered by `(lower_bound, origin, seq)`,
//!   holding nodes deferred during a plunge.
//!
//! Removing a node from the arena bumps its slot's generation, so a handle
//! that outlived its node is detected instead of reading a reused slot.

use crate::node::{BranchDirection, Node, NodeKey};
use cairn_core::utils::arena::{Arena, Handle};
use std::{
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
};

#[derive(Debug, Clone, Copy)]
struct BacklogEntry {
    lower_bound: f64,
    key: NodeKey,
    handle: Handle<Node>,
}

impl PartialEq for BacklogEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BacklogEntry {}

impl PartialOrd for BacklogEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BacklogEntry {
    // `BinaryHeap` is a max-heap; reverse so the best bound pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .lower_bound
            .total_cmp(&self.lower_bound)
            .then_with(|| other.key.cmp(&self.key))
    }
}

#[derive(Debug, Default)]
pub struct NodeQueue {
    nodes: Arena<Node>,
    current: Option<Handle<Node>>,
    plunge: VecDeque<Handle<Node>>,
    backlog: BinaryHeap<BacklogEntry>,
    assigned: u64,
}

impl NodeQueue {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes in all three containers.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }

    #[inline]
    pub fn plunge_len(&self) -> usize {
        self.plunge.len()
    }

    #[inline]
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Nodes handed to this queue from outside: placements, enqueues and transfers.
    #[inline]
    pub fn assigned(&self) -> u64 {
        self.assigned
    }

    /// Places `node` in the current slot.
    ///
    /// # Panics
    ///
    /// In debug builds, if the slot is already occupied.
    pub fn set_current(&mut self, node: Node) {
        debug_assert!(
            self.current.is_none(),
            "called `NodeQueue::set_current` while the current slot holds a node"
        );
        self.current = Some(self.nodes.insert(node));
        self.assigned += 1;
    }

    /// Pushes `node` on the front of the plunge stack.
    pub fn enqueue(&mut self, node: Node) {
        let handle = self.nodes.insert(node);
        self.plunge.push_front(handle);
        self.assigned += 1;
    }

    /// Adds `node` to the best-first backlog.
    pub fn enqueue_backlog(&mut self, node: Node) {
        self.push_backlog(node);
        self.assigned += 1;
    }

    fn push_backlog(&mut self, node: Node) {
        let lower_bound = node.lower_bound();
        let key = node.key();
        let handle = self.nodes.insert(node);
        self.backlog.push(BacklogEntry {
            lower_bound,
            key,
            handle,
        });
    }

    /// Pushes two freshly created children so `preferred` is dequeued first.
    ///
    /// An unexplored sibling still on the plunge stack is demoted to the
    /// backlog first, which keeps the stack at most two deep.
    pub fn enqueue_children_for_plunge(&mut self, down: Node, up: Node, preferred: BranchDirection) {
        if let Some(sibling) = self.plunge.pop_back() {
            if let Some(node) = self.nodes.remove(sibling) {
                self.push_backlog(node);
            }
        }

        let (first, second) = match preferred {
            BranchDirection::Down => (down, up),
            BranchDirection::Up => (up, down),
        };
        let second = self.nodes.insert(second);
        self.plunge.push_front(second);
        let first = self.nodes.insert(first);
        self.plunge.push_front(first);
    }

    /// Removes and returns the next node: current slot, then plunge stack, then backlog.
    pub fn dequeue(&mut self) -> Option<Node> {
        let handle = self
            .current
            .take()
            .or_else(|| self.plunge.pop_front())
            .or_else(|| self.backlog.pop().map(|e| e.handle))?;
        self.nodes.remove(handle)
    }

    /// Removes a node to hand to another worker: best backlog node first, then the plunge tail.
    pub fn take_for_transfer(&mut self) -> Option<Node> {
        let handle = self
            .backlog
            .pop()
            .map(|e| e.handle)
            .or_else(|| self.plunge.pop_back())?;
        self.nodes.remove(handle)
    }

    /// Removes the best backlog node, leaving the current slot and plunge stack alone.
    pub fn pop_backlog(&mut self) -> Option<Node> {
        let entry = self.backlog.pop()?;
        self.nodes.remove(entry.handle)
    }

    /// Receives a node transferred from another worker.
    #[inline]
    pub fn receive(&mut self, node: Node) {
        self.enqueue_backlog(node);
    }

    /// Removes every node with `lower_bound >= cutoff` and returns their keys in key order.
    pub fn prune(&mut self, cutoff: f64) -> Vec<NodeKey> {
        let mut pruned = Vec::new();
        let nodes = &mut self.nodes;
        let mut remove = |handle: Handle<Node>| -> bool {
            match nodes.get(handle) {
                Some(node) if node.lower_bound() >= cutoff => {
                    pruned.push(node.key());
                    nodes.remove(handle);
                    true
                }
                Some(_) => false,
                None => true,
            }
        };

        if self.current.is_some_and(&mut remove) {
            self.current = None;
        }
        self.plunge.retain(|&h| !remove(h));
        self.backlog.retain(|e| !remove(e.handle));

        pruned.sort_unstable();
        pruned
    }

    /// Smallest lower bound over all live nodes, `+inf` if empty.
    pub fn lower_bound(&self) -> f64 {
        self.nodes
            .iter()
            .map(|(_, n)| n.lower_bound())
            .fold(f64::INFINITY, f64::min)
    }

    pub fn keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.nodes.iter().map(|(_, n)| n.key())
    }

    /// Backlog nodes in no particular order.
    pub fn backlog_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.backlog.iter().filter_map(|e| self.nodes.get(e.handle))
    }

    /// Drops every node and returns their keys.
    pub fn clear(&mut self) -> Vec<NodeKey> {
        let mut keys: Vec<NodeKey> = self.keys().collect();
        keys.sort_unstable();
        self.current = None;
        self.plunge.clear();
        self.backlog.clear();
        self.nodes.clear();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{BranchInfo, WorkerIndex};
    use cairn_model::index::ColumnIndex;

    fn node(seq: u64, lower_bound: f64) -> Node {
        let root = Node::root(lower_bound);
        root.child(
            NodeKey::new(WorkerIndex::new(0), seq),
            BranchInfo {
                column: ColumnIndex::new(0),
                value: 0.5,
                direction: BranchDirection::Down,
                parent_objective: lower_bound,
            },
            lower_bound,
        )
    }

    fn seqs(queue: &mut NodeQueue) -> Vec<u64> {
        std::iter::from_fn(|| queue.dequeue()).map(|n| n.key().seq).collect()
    }

    #[test]
    fn test_dequeue_order_current_plunge_backlog() {
        let mut q = NodeQueue::new();
        q.enqueue_backlog(node(1, 5.0));
        q.enqueue(node(2, 9.0));
        q.enqueue(node(3, 9.0));
        q.set_current(node(4, 9.0));
        assert_eq!(q.len(), 4);
        assert_eq!(q.assigned(), 4);
        assert_eq!(seqs(&mut q), vec![4, 3, 2, 1]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_backlog_is_best_first_with_key_tie_break() {
        let mut q = NodeQueue::new();
        q.enqueue_backlog(node(7, 2.0));
        q.enqueue_backlog(node(3, 1.0));
        q.enqueue_backlog(node(5, 2.0));
        q.enqueue_backlog(node(1, 4.0));
        assert_eq!(seqs(&mut q), vec![3, 5, 7, 1]);
    }

    #[test]
    fn test_children_preferred_first_and_sibling_demoted() {
        let mut q = NodeQueue::new();
        q.enqueue_children_for_plunge(node(1, 0.0), node(2, 0.0), BranchDirection::Up);
        assert_eq!(q.dequeue().map(|n| n.key().seq), Some(2));

        // Node 1 is still on the plunge stack; branching again demotes it.
        q.enqueue_children_for_plunge(node(3, 0.0), node(4, 0.0), BranchDirection::Down);
        assert_eq!(q.plunge_len(), 2);
        assert_eq!(q.backlog_len(), 1);
        assert_eq!(seqs(&mut q), vec![3, 4, 1]);
        assert_eq!(q.assigned(), 0);
    }

    #[test]
    fn test_prune_removes_from_every_container() {
        let mut q = NodeQueue::new();
        q.set_current(node(1, 10.0));
        q.enqueue(node(2, 3.0));
        q.enqueue(node(3, 12.0));
        q.enqueue_backlog(node(4, 10.5));
        q.enqueue_backlog(node(5, 1.0));

        let pruned = q.prune(10.0);
        let pruned: Vec<u64> = pruned.iter().map(|k| k.seq).collect();
        assert_eq!(pruned, vec![1, 3, 4]);
        assert!(!q.has_current());
        assert_eq!(q.len(), 2);
        assert_eq!(q.lower_bound(), 1.0);
        assert_eq!(seqs(&mut q), vec![2, 5]);
    }

    #[test]
    fn test_transfer_takes_best_backlog_then_plunge_tail() {
        let mut q = NodeQueue::new();
        q.enqueue(node(1, 0.0));
        q.enqueue(node(2, 0.0));
        q.enqueue_backlog(node(3, 7.0));
        q.enqueue_backlog(node(4, 6.0));
        let taken: Vec<u64> = std::iter::from_fn(|| q.take_for_transfer())
            .map(|n| n.key().seq)
            .collect();
        assert_eq!(taken, vec![4, 3, 1, 2]);
    }

    #[test]
    fn test_pop_backlog_leaves_plunge_alone() {
        let mut q = NodeQueue::new();
        q.enqueue(node(1, 0.0));
        q.enqueue_backlog(node(2, 3.0));
        q.enqueue_backlog(node(3, 2.0));
        let popped: Vec<u64> = std::iter::from_fn(|| q.pop_backlog())
            .map(|n| n.key().seq)
            .collect();
        assert_eq!(popped, vec![3, 2]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.plunge_len(), 1);
    }

    #[test]
    fn test_lower_bound_of_empty_queue() {
        let q = NodeQueue::new();
        assert_eq!(q.lower_bound(), f64::INFINITY);
    }

    #[test]
    fn test_clear_reports_every_key() {
        let mut q = NodeQueue::new();
        q.enqueue(node(2, 0.0));
        q.enqueue_backlog(node(1, 0.0));
        let keys: Vec<u64> = q.clear().iter().map(|k| k.seq).collect();
        assert_eq!(keys, vec![1, 2]);
        assert!(q.is_empty());
        assert_eq!(q.backlog_nodes().count(), 0);
    }
}
