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

//! Worker side of the deterministic protocol.
//!
//! At the start of every horizon each worker receives the same
//! `HorizonSnapshot`. Its `DeterministicPolicy` then reads the cutoff and the
//! pseudo-costs only from that snapshot plus the worker's own observations,
//! and turns every node outcome into an event stamped with the worker's work
//! clock. Nothing a worker does during a horizon is visible to its peers
//! before the next sync.

use crate::{
    event::{Event, EventBatch, EventKind},
    lp::{LpSolution, NodeLpSolver},
    node::{Node, NodeKey, WorkerIndex},
    policy::TreeUpdatePolicy,
    pseudo_cost::{BranchChoice, PseudoCostObservation, PseudoCosts},
    queue::NodeQueue,
    stats::WorkerStatistics,
    worker::{BfsWorker, NodeOutcome, SearchContext},
};
use cairn_model::{index::ColumnIndex, problem::Problem};
use std::sync::Arc;

/// Global state as of the last sync, shared read-only with every worker.
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonSnapshot {
    pub horizon: u64,
    /// Work clock at which the horizon starts.
    pub start: f64,
    /// Work clock the horizon runs up to.
    pub end: f64,
    pub pseudo_costs: Arc<PseudoCosts>,
    pub upper_bound: f64,
    pub incumbent: Option<Arc<[f64]>>,
}

impl HorizonSnapshot {
    /// Snapshot for horizon `horizon` of length `step`.
    pub fn new(
        horizon: u64,
        step: f64,
        pseudo_costs: Arc<PseudoCosts>,
        upper_bound: f64,
        incumbent: Option<Arc<[f64]>>,
    ) -> Self {
        debug_assert!(
            horizon > 0,
            "called `HorizonSnapshot::new` with horizon 0; horizons are numbered from 1"
        );
        Self {
            horizon,
            start: (horizon - 1) as f64 * step,
            end: horizon as f64 * step,
            pseudo_costs,
            upper_bound,
            incumbent,
        }
    }
}

/// Tree updates of one worker, buffered as events until the next sync.
#[derive(Debug, Clone)]
pub struct DeterministicPolicy {
    clock: f64,
    upper_bound: f64,
    pseudo_costs: PseudoCosts,
    events: EventBatch,
}

impl DeterministicPolicy {
    /// A policy with an empty event batch, stamped with `worker`.
    pub fn new(worker: WorkerIndex, num_columns: usize) -> Self {
        Self {
            clock: 0.0,
            upper_bound: f64::INFINITY,
            pseudo_costs: PseudoCosts::new(num_columns),
            events: EventBatch::new(worker),
        }
    }

    /// Restarts the clock at the horizon start and adopts the snapshot's state.
    pub fn begin_horizon(&mut self, snapshot: &HorizonSnapshot) {
        self.clock = snapshot.start;
        self.upper_bound = snapshot.upper_bound;
        self.pseudo_costs.clone_from(&snapshot.pseudo_costs);
    }

    #[inline]
    pub fn clock(&self) -> f64 {
        self.clock
    }

    #[inline]
    pub fn events(&self) -> &EventBatch {
        &self.events
    }

    /// Hands the buffered events to the coordinator.
    #[inline]
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take()
    }

    fn record(
        &mut self,
        node: &Node,
        observation: Option<PseudoCostObservation>,
        kind: EventKind,
    ) {
        if let Some(observation) = &observation {
            self.pseudo_costs.record(observation);
        }
        self.events
            .record(self.clock, Some(node.key()), node.depth(), observation, kind);
    }
}

impl TreeUpdatePolicy for DeterministicPolicy {
    #[inline]
    fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    #[inline]
    fn record_work(&mut self, work: f64) {
        self.clock += work;
    }

    #[inline]
    fn select_branch(&self, fractional: &[ColumnIndex], x: &[f64]) -> Option<BranchChoice> {
        self.pseudo_costs.select_branch(fractional, x)
    }

    #[inline]
    fn objective_estimate(&self, lower_bound: f64, fractional: &[ColumnIndex], x: &[f64]) -> f64 {
        self.pseudo_costs.objective_estimate(lower_bound, fractional, x)
    }

    fn record_branched(
        &mut self,
        node: &Node,
        objective: f64,
        choice: &BranchChoice,
        down: &Node,
        up: &Node,
        observation: Option<PseudoCostObservation>,
    ) {
        self.record(
            node,
            observation,
            EventKind::Branched {
                objective,
                column: choice.column,
                value: choice.value,
                down: down.key(),
                up: up.key(),
            },
        );
    }

    fn record_integer_solution(
        &mut self,
        node: &Node,
        objective: f64,
        values: Vec<f64>,
        observation: Option<PseudoCostObservation>,
    ) {
        // Only this worker's cutoff moves; peers learn of it at the sync.
        self.upper_bound = self.upper_bound.min(objective);
        self.record(
            node,
            observation,
            EventKind::IntegerSolutionFound { objective, values },
        );
    }

    fn record_fathomed(
        &mut self,
        node: &Node,
        lower_bound: f64,
        observation: Option<PseudoCostObservation>,
    ) {
        self.record(node, observation, EventKind::Fathomed { lower_bound });
    }

    fn record_infeasible(&mut self, node: &Node) {
        self.record(node, None, EventKind::Infeasible);
    }

    fn record_numerical(&mut self, node: &Node) {
        self.record(
            node,
            None,
            EventKind::NumericalError {
                lower_bound: node.lower_bound(),
            },
        );
    }
}

/// A BFS worker driven horizon by horizon.
#[derive(Debug)]
pub struct DeterministicBfs<L> {
    worker: BfsWorker<L>,
    policy: DeterministicPolicy,
    end: f64,
}

impl<L> DeterministicBfs<L>
where
    L: NodeLpSolver,
{
    /// Creates a new `DeterministicBfs`.
    ///
    /// # Arguments
    ///
    /// * `id` - The worker's index. It stamps events and new node keys.
    /// * `lp` - The worker's private relaxation oracle.
    /// * `problem` - The problem whose root bounds nodes are resolved against.
    ///
    /// # Returns
    ///
    /// A worker with an empty queue and a clock at zero.
    pub fn new(id: WorkerIndex, lp: L, problem: &Problem) -> Self {
        Self {
            worker: BfsWorker::new(id, lp, problem),
            policy: DeterministicPolicy::new(id, problem.num_columns()),
            end: 0.0,
        }
    }

    #[inline]
    pub fn id(&self) -> WorkerIndex {
        self.worker.id()
    }

    #[inline]
    pub fn queue(&self) -> &NodeQueue {
        self.worker.queue()
    }

    #[inline]
    pub fn queue_mut(&mut self) -> &mut NodeQueue {
        self.worker.queue_mut()
    }

    #[inline]
    pub fn stats(&self) -> &WorkerStatistics {
        self.worker.stats()
    }

    /// See `BfsWorker::lower_bound_ceiling`.
    #[inline]
    pub fn lower_bound_ceiling(&self) -> f64 {
        self.worker.lower_bound_ceiling()
    }

    #[inline]
    pub fn clock(&self) -> f64 {
        self.policy.clock()
    }

    /// Hands in the already solved relaxation of `node`; see `BfsWorker::seed_solution`.
    #[inline]
    pub fn seed_solution(&mut self, node: NodeKey, solution: LpSolution) {
        self.worker.seed_solution(node, solution);
    }

    /// Adopts the frozen state of a new horizon.
    pub fn begin_horizon(&mut self, snapshot: &HorizonSnapshot) {
        self.policy.begin_horizon(snapshot);
        self.end = snapshot.end;
    }

    /// Processes nodes until the clock reaches the horizon end or the queue runs dry.
    ///
    /// Returns the number of nodes processed.
    pub fn run_horizon(&mut self, ctx: &SearchContext<'_>) -> usize {
        let mut processed = 0;
        while self.policy.clock() < self.end && !ctx.control.is_halted() {
            match self.worker.process_next(ctx, &mut self.policy) {
                Some(NodeOutcome::Numerical) => {
                    log::trace!(
                        "worker {}: numerical failure at clock {}",
                        self.id().get(),
                        self.policy.clock()
                    );
                    processed += 1;
                }
                Some(_) => processed += 1,
                None => break,
            }
        }
        processed
    }

    #[inline]
    pub fn take_events(&mut self) -> Vec<Event> {
        self.policy.take_events()
    }
}
