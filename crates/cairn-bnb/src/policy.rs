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

//! # Tree Update Policy
//!
//! The BFS worker's node step is the same in both exploration modes; what
//! differs is where its results go. `TreeUpdatePolicy` is that seam.
//!
//! - The deterministic policy stamps every outcome as an event for the next
//!   sync, reads the upper bound from the horizon snapshot and learns
//!   pseudo-costs into a private copy.
//! - The opportunistic policy publishes straight into shared state: the
//!   atomic incumbent, a mutex-guarded pseudo-cost table and atomic counters.
//!
//! `observation` arguments carry the pseudo-cost update implied by the
//! node's own relaxation. They are `None` when the node was closed without
//! solving it, and for the root.

use crate::{
    node::Node,
    pseudo_cost::{BranchChoice, PseudoCostObservation},
};
use cairn_model::index::ColumnIndex;

/// Destination of a BFS worker's node outcomes.
pub trait TreeUpdatePolicy {
    /// Current cutoff in minimisation form, `+inf` without an incumbent.
    fn upper_bound(&self) -> f64;

    /// Charges `work` units for one processed node.
    fn record_work(&mut self, work: f64);

    /// Picks the branching column among `fractional`, with the policy's pseudo-costs.
    fn select_branch(&self, fractional: &[ColumnIndex], x: &[f64]) -> Option<BranchChoice>;

    /// Estimated best integer objective below a node with relaxation `x`.
    fn objective_estimate(&self, lower_bound: f64, fractional: &[ColumnIndex], x: &[f64]) -> f64;

    /// `node` was split into `down` and `up` on `choice`.
    fn record_branched(
        &mut self,
        node: &Node,
        objective: f64,
        choice: &BranchChoice,
        down: &Node,
        up: &Node,
        observation: Option<PseudoCostObservation>,
    );

    /// `values` are the node's relaxation values rounded onto integers.
    fn record_integer_solution(
        &mut self,
        node: &Node,
        objective: f64,
        values: Vec<f64>,
        observation: Option<PseudoCostObservation>,
    );

    /// `node` was closed because `lower_bound` reached the cutoff.
    fn record_fathomed(
        &mut self,
        node: &Node,
        lower_bound: f64,
        observation: Option<PseudoCostObservation>,
    );

    fn record_infeasible(&mut self, node: &Node);

    fn record_numerical(&mut self, node: &Node);
}
