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

//! # Subproblem Nodes
//!
//! A `Node` is one subproblem of the search tree: the root problem with a
//! chain of bound changes applied. Each node stores only the change that
//! produced it; the rest of the chain is shared with its ancestors through a
//! persistent, reference-counted `BoundPath`, so creating a child costs one
//! small allocation and never copies the parent's bounds.
//!
//! ## Identity
//!
//! A node is identified by `NodeKey { origin, seq }`: the worker that created
//! it and that worker's creation counter. Keys are unique for the lifetime of
//! a solve and sort first by origin, then by sequence number. That order is
//! the deterministic tie-break wherever two nodes compare equal on bound or
//! score.
//!
//! ## Ownership
//!
//! Nodes are plain owned values. A worker's `NodeQueue` stores them in a
//! generational arena and moves them out on dequeue, so a node lives in
//! exactly one container at a time. `Clone` exists for the diving hand-off,
//! which copies a node together with its resolved bound arrays.

use cairn_core::utils::index::{TypedIndex, TypedIndexTag};
use cairn_model::index::ColumnIndex;
use fixedbitset::FixedBitSet;
use std::sync::Arc;

/// A tag type for worker indices.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct WorkerIndexTag;

impl TypedIndexTag for WorkerIndexTag {
    const NAME: &'static str = "WorkerIndex";
}

/// A typed index for search workers.
pub type WorkerIndex = TypedIndex<WorkerIndexTag>;

/// Pseudo-worker that stamps solutions submitted from outside the search.
pub const EXTERNAL_WORKER: WorkerIndex = WorkerIndex::new(usize::MAX);

/// Run-stable identity of a node.
///
/// Keys are assigned by the worker that creates the node from its own
/// counter, so they do not depend on how threads interleave. Ordering is by
/// origin first, then sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    /// The worker that created the node.
    pub origin: WorkerIndex,
    /// The creating worker's counter at creation time.
    pub seq: u64,
}

impl NodeKey {
    /// The root is created by the coordinator before any worker runs.
    pub const ROOT: NodeKey = NodeKey {
        origin: WorkerIndex::new(0),
        seq: 0,
    };

    #[inline]
    pub const fn new(origin: WorkerIndex, seq: u64) -> Self {
        Self { origin, seq }
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({}:{})", self.origin.get(), self.seq)
    }
}

/// Side of a branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchDirection {
    /// `x_j <= floor(v)`.
    Down,
    /// `x_j >= ceil(v)`.
    Up,
}

impl BranchDirection {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            BranchDirection::Down => BranchDirection::Up,
            BranchDirection::Up => BranchDirection::Down,
        }
    }
}

impl std::fmt::Display for BranchDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BranchDirection::Down => write!(f, "down"),
            BranchDirection::Up => write!(f, "up"),
        }
    }
}

/// A tightened bound pair for one column. Unchanged sides are infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundChange {
    pub column: ColumnIndex,
    pub lower: f64,
    pub upper: f64,
}

impl BoundChange {
    /// The bound change of the `direction` child when branching on `value`.
    #[inline]
    pub fn for_branch(column: ColumnIndex, value: f64, direction: BranchDirection) -> Self {
        match direction {
            BranchDirection::Down => Self {
                column,
                lower: f64::NEG_INFINITY,
                upper: value.floor(),
            },
            BranchDirection::Up => Self {
                column,
                lower: value.ceil(),
                upper: f64::INFINITY,
            },
        }
    }
}

#[derive(Debug)]
struct PathLink {
    change: BoundChange,
    parent: Option<Arc<PathLink>>,
}

/// Persistent list of bound changes from a node back to the root.
#[derive(Debug, Clone, Default)]
pub struct BoundPath(Option<Arc<PathLink>>);

impl BoundPath {
    /// A path one change longer that shares `self` as its tail.
    #[inline]
    pub fn extended(&self, change: BoundChange) -> Self {
        Self(Some(Arc::new(PathLink {
            change,
            parent: self.0.clone(),
        })))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Changes from the newest (this node's) back to the root's first child.
    pub fn iter(&self) -> impl Iterator<Item = &BoundChange> {
        std::iter::successors(self.0.as_deref(), |link| link.parent.as_deref())
            .map(|link| &link.change)
    }
}

/// How a node came to exist: the branching that split its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchInfo {
    pub column: ColumnIndex,
    /// The parent's fractional value of `column`.
    pub value: f64,
    pub direction: BranchDirection,
    /// The parent's relaxation objective.
    pub parent_objective: f64,
}

impl BranchInfo {
    /// Distance the branching moved `column`: `f_down` for a down child, `f_up` for an up child.
    #[inline]
    pub fn fraction(&self) -> f64 {
        match self.direction {
            BranchDirection::Down => self.value - self.value.floor(),
            BranchDirection::Up => self.value.ceil() - self.value,
        }
    }
}

/// An open subproblem of the search tree.
///
/// A node stores only what differs from the root: its bound path. Cloning is
/// cheap because the path shares its tail with the parent.
#[derive(Debug, Clone)]
pub struct Node {
    key: NodeKey,
    parent: Option<NodeKey>,
    lower_bound: f64,
    estimate: f64,
    depth: u32,
    branch: Option<BranchInfo>,
    path: BoundPath,
}

impl Node {
    /// The root node with the root relaxation objective as its bound.
    #[inline]
    pub fn root(lower_bound: f64) -> Self {
        Self {
            key: NodeKey::ROOT,
            parent: None,
            lower_bound,
            estimate: lower_bound,
            depth: 0,
            branch: None,
            path: BoundPath::default(),
        }
    }

    /// Creates the `branch.direction` child of `self`.
    ///
    /// The child inherits `branch.parent_objective` as its lower bound until
    /// its own relaxation is solved.
    pub fn child(&self, key: NodeKey, branch: BranchInfo, estimate: f64) -> Self {
        let change = BoundChange::for_branch(branch.column, branch.value, branch.direction);
        Self {
            key,
            parent: Some(self.key),
            lower_bound: branch.parent_objective,
            estimate,
            depth: self.depth + 1,
            branch: Some(branch),
            path: self.path.extended(change),
        }
    }

    #[inline]
    pub fn key(&self) -> NodeKey {
        self.key
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    #[inline]
    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }

    /// Estimated objective of the best integer point below this node.
    #[inline]
    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn branch(&self) -> Option<&BranchInfo> {
        self.branch.as_ref()
    }

    #[inline]
    pub fn path(&self) -> &BoundPath {
        &self.path
    }

    /// Writes this node's column bounds into `lower`/`upper`.
    ///
    /// `lower`/`upper` must hold the root bounds for every column not set in
    /// `changed`; columns this call tightens are marked in `changed` so the
    /// caller can restore just those afterwards. Returns `false` if some
    /// column ends up with `lower > upper`.
    pub fn resolve_bounds(
        &self,
        root_lower: &[f64],
        root_upper: &[f64],
        lower: &mut [f64],
        upper: &mut [f64],
        changed: &mut FixedBitSet,
    ) -> bool {
        debug_assert_eq!(
            lower.len(),
            root_lower.len(),
            "called `Node::resolve_bounds` with a bound buffer of the wrong length"
        );

        for j in changed.ones() {
            lower[j] = root_lower[j];
            upper[j] = root_upper[j];
        }
        changed.clear();

        let mut consistent = true;
        for change in self.path.iter() {
            let j = change.column.get();
            lower[j] = lower[j].max(change.lower);
            upper[j] = upper[j].min(change.upper);
            changed.insert(j);
            consistent &= lower[j] <= upper[j];
        }
        consistent
    }

    /// Fully resolved bound arrays, for handing the node to a diving worker.
    pub fn resolved_bounds(&self, root_lower: &[f64], root_upper: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut lower = root_lower.to_vec();
        let mut upper = root_upper.to_vec();
        let mut changed = FixedBitSet::with_capacity(root_lower.len());
        self.resolve_bounds(root_lower, root_upper, &mut lower, &mut upper, &mut changed);
        (lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(i: usize) -> ColumnIndex {
        ColumnIndex::new(i)
    }

    fn branch(column: usize, value: f64, direction: BranchDirection, obj: f64) -> BranchInfo {
        BranchInfo {
            column: col(column),
            value,
            direction,
            parent_objective: obj,
        }
    }

    #[test]
    fn test_keys_order_by_origin_then_sequence() {
        let a = NodeKey::new(WorkerIndex::new(0), 9);
        let b = NodeKey::new(WorkerIndex::new(1), 2);
        let c = NodeKey::new(WorkerIndex::new(1), 3);
        let mut keys = vec![c, a, b];
        keys.sort();
        assert_eq!(keys, vec![a, b, c]);
        assert!(NodeKey::ROOT < a || NodeKey::ROOT == NodeKey::new(WorkerIndex::new(0), 0));
    }

    #[test]
    fn test_child_inherits_bound_and_depth() {
        let root = Node::root(1.5);
        let key = NodeKey::new(WorkerIndex::new(0), 1);
        let child = root.child(key, branch(2, 0.4, BranchDirection::Up, 1.5), 2.0);
        assert_eq!(child.key(), key);
        assert_eq!(child.parent(), Some(NodeKey::ROOT));
        assert_eq!(child.lower_bound(), 1.5);
        assert_eq!(child.estimate(), 2.0);
        assert_eq!(child.depth(), 1);
        assert!(root.path().is_empty());
        assert_eq!(child.path().iter().count(), 1);
    }

    #[test]
    fn test_resolve_bounds_intersects_the_whole_path() {
        let root_lower = vec![0.0, 0.0];
        let root_upper = vec![10.0, 10.0];
        let w = WorkerIndex::new(0);
        let root = Node::root(0.0);
        let a = root.child(NodeKey::new(w, 1), branch(0, 6.5, BranchDirection::Down, 0.0), 0.0);
        let b = a.child(NodeKey::new(w, 2), branch(0, 3.2, BranchDirection::Up, 0.0), 0.0);
        let c = b.child(NodeKey::new(w, 3), branch(1, 7.7, BranchDirection::Up, 0.0), 0.0);

        let (lower, upper) = c.resolved_bounds(&root_lower, &root_upper);
        assert_eq!(lower, vec![4.0, 8.0]);
        assert_eq!(upper, vec![6.0, 10.0]);
    }

    #[test]
    fn test_resolve_bounds_restores_previous_changes() {
        let root_lower = vec![0.0, 0.0, 0.0];
        let root_upper = vec![1.0, 1.0, 1.0];
        let w = WorkerIndex::new(0);
        let root = Node::root(0.0);
        let a = root.child(NodeKey::new(w, 1), branch(0, 0.5, BranchDirection::Up, 0.0), 0.0);
        let b = root.child(NodeKey::new(w, 2), branch(2, 0.5, BranchDirection::Down, 0.0), 0.0);

        let mut lower = root_lower.clone();
        let mut upper = root_upper.clone();
        let mut changed = FixedBitSet::with_capacity(3);
        assert!(a.resolve_bounds(&root_lower, &root_upper, &mut lower, &mut upper, &mut changed));
        assert_eq!(lower, vec![1.0, 0.0, 0.0]);

        assert!(b.resolve_bounds(&root_lower, &root_upper, &mut lower, &mut upper, &mut changed));
        assert_eq!(lower, vec![0.0, 0.0, 0.0]);
        assert_eq!(upper, vec![1.0, 1.0, 0.0]);
        assert_eq!(changed.ones().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_conflicting_bounds_are_reported() {
        // x >= 0.5 at the root, the down branch forces x <= 0.
        let root_lower = vec![0.5];
        let root_upper = vec![1.0];
        let root = Node::root(0.5);
        let down = root.child(
            NodeKey::new(WorkerIndex::new(0), 1),
            branch(0, 0.5, BranchDirection::Down, 0.5),
            0.5,
        );
        let mut lower = root_lower.clone();
        let mut upper = root_upper.clone();
        let mut changed = FixedBitSet::with_capacity(1);
        assert!(!down.resolve_bounds(&root_lower, &root_upper, &mut lower, &mut upper, &mut changed));
    }

    #[test]
    fn test_branch_fraction() {
        assert!((branch(0, 2.25, BranchDirection::Down, 0.0).fraction() - 0.25).abs() < 1e-12);
        assert!((branch(0, 2.25, BranchDirection::Up, 0.0).fraction() - 0.75).abs() < 1e-12);
        assert_eq!(BranchDirection::Down.opposite(), BranchDirection::Up);
    }
}
