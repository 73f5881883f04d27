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

//! # Diving Worker
//!
//! A diving worker takes detached copies of backlog nodes (`DiveEntry`) and
//! descends from each one without backtracking: solve the relaxation, fix one
//! fractional column by tightening a bound, repeat. A dive stops on an
//! infeasible or failed relaxation, on cutoff, at an integral point or at
//! `max_dive_depth`.
//!
//! Dives run against the horizon clock like BFS workers. A dive that is cut
//! short by the horizon end keeps its bounds and resumes in the next horizon.
//! A diver produces two kinds of events, neither with a node attached: integer
//! solutions, and `DiveStep`s that carry the pseudo-cost observation of a
//! relaxation solved after a fixing. The diver also applies its observations
//! to its own copy of the pseudo-costs straight away, so later steps of the
//! same horizon see them. The nodes it dives from stay in their BFS backlog
//! untouched.
//!
//! Accounting: every entry handed to a diver is counted once as assigned and
//! later once as completed, so at any point
//! `assigned == completed + queued + in_progress`.

use crate::{
    deterministic::policy::HorizonSnapshot,
    diving::{DiveInputs, DivingStrategy, VariableLocks, select_dive},
    driver::rounded_point,
    event::{Event, EventBatch, EventKind},
    lp::{LpOutcome, NodeLpSolver},
    node::{BranchDirection, BranchInfo, Node, NodeKey, WorkerIndex},
    pseudo_cost::{PseudoCostObservation, PseudoCosts},
    stats::WorkerStatistics,
    worker::SearchContext,
};
use cairn_model::index::ColumnIndex;
use std::{collections::VecDeque, sync::Arc};

/// A node copied out of a BFS backlog together with its resolved bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct DiveEntry {
    pub source: NodeKey,
    pub depth: u32,
    pub lower_bound: f64,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl DiveEntry {
    /// Copies `node` with its bound changes applied to the root bounds.
    ///
    /// # Arguments
    ///
    /// * `node` - The backlog node to dive from. It is not modified.
    /// * `root_lower` - Column lower bounds of the problem.
    /// * `root_upper` - Column upper bounds of the problem.
    ///
    /// # Returns
    ///
    /// An entry whose bounds are the node's full bound vectors.
    pub fn from_node(node: &Node, root_lower: &[f64], root_upper: &[f64]) -> Self {
        let (lower, upper) = node.resolved_bounds(root_lower, root_upper);
        Self {
            source: node.key(),
            depth: node.depth(),
            lower_bound: node.lower_bound(),
            lower,
            upper,
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveDive {
    entry: DiveEntry,
    steps: usize,
    /// The fixing applied before the next relaxation.
    last: Option<BranchInfo>,
}

/// A deterministic diving worker with its own LP solver and dive queue.
#[derive(Debug)]
pub struct DivingWorker<L> {
    id: WorkerIndex,
    strategy: DivingStrategy,
    lp: L,
    queue: VecDeque<DiveEntry>,
    active: Option<ActiveDive>,
    clock: f64,
    end: f64,
    upper_bound: f64,
    pseudo_costs: Arc<PseudoCosts>,
    incumbent: Option<Arc<[f64]>>,
    root_primal: Arc<[f64]>,
    locks: Arc<VariableLocks>,
    fractional: Vec<ColumnIndex>,
    events: EventBatch,
    assigned: u64,
    completed: u64,
    stats: WorkerStatistics,
}

impl<L> DivingWorker<L>
where
    L: NodeLpSolver,
{
    /// Creates an idle diver.
    ///
    /// # Arguments
    ///
    /// * `id` - The worker index stamped on every event.
    /// * `strategy` - The selection rule for every dive of this worker.
    /// * `lp` - The worker's own relaxation solver.
    /// * `num_columns` - Columns of the problem, sizing the pseudo-cost table
    ///   used until the first horizon.
    /// * `root_primal` - The root relaxation's point.
    /// * `locks` - The problem's lock table, shared by all divers.
    ///
    /// # Returns
    ///
    /// A diver with an empty queue and a clock at zero.
    pub fn new(
        id: WorkerIndex,
        strategy: DivingStrategy,
        lp: L,
        num_columns: usize,
        root_primal: Arc<[f64]>,
        locks: Arc<VariableLocks>,
    ) -> Self {
        Self {
            id,
            strategy,
            lp,
            queue: VecDeque::new(),
            active: None,
            clock: 0.0,
            end: 0.0,
            upper_bound: f64::INFINITY,
            pseudo_costs: Arc::new(PseudoCosts::new(num_columns)),
            incumbent: None,
            root_primal,
            locks,
            fractional: Vec::new(),
            events: EventBatch::new(id),
            assigned: 0,
            completed: 0,
            stats: WorkerStatistics::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> WorkerIndex {
        self.id
    }

    #[inline]
    pub fn strategy(&self) -> DivingStrategy {
        self.strategy
    }

    #[inline]
    pub fn stats(&self) -> &WorkerStatistics {
        &self.stats
    }

    #[inline]
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// No dive queued or in progress.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.active.is_none()
    }

    #[inline]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn in_progress(&self) -> usize {
        usize::from(self.active.is_some())
    }

    #[inline]
    pub fn assigned(&self) -> u64 {
        self.assigned
    }

    #[inline]
    pub fn completed(&self) -> u64 {
        self.completed
    }

    #[inline]
    pub fn is_balanced(&self) -> bool {
        self.assigned == self.completed + self.queued() as u64 + self.in_progress() as u64
    }

    /// Source nodes of the queued and running dives.
    pub fn sources(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.active
            .iter()
            .map(|a| a.entry.source)
            .chain(self.queue.iter().map(|e| e.source))
    }

    /// Queues a dive. It starts once the dives before it are done.
    pub fn assign(&mut self, entry: DiveEntry) {
        self.queue.push_back(entry);
        self.assigned += 1;
    }

    /// Adopts the frozen state of a new horizon.
    ///
    /// Local pseudo-cost updates of the previous horizon are dropped; they
    /// come back through the replayed `DiveStep` events.
    pub fn begin_horizon(&mut self, snapshot: &HorizonSnapshot) {
        self.clock = snapshot.start;
        self.end = snapshot.end;
        self.upper_bound = snapshot.upper_bound;
        self.pseudo_costs = Arc::clone(&snapshot.pseudo_costs);
        self.incumbent = snapshot.incumbent.clone();
    }

    #[inline]
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take()
    }

    /// Drops every queued and running dive, counting them as completed.
    pub fn abandon(&mut self) -> usize {
        let dropped = self.queue.len() + self.in_progress();
        self.queue.clear();
        self.active = None;
        self.completed += dropped as u64;
        dropped
    }

    /// Dives until the clock reaches the horizon end or no work is left.
    ///
    /// Returns the number of relaxations solved.
    pub fn run_horizon(&mut self, ctx: &SearchContext<'_>) -> usize {
        let mut solves = 0;
        while self.clock < self.end && !ctx.control.is_halted() {
            if self.active.is_none() {
                let Some(entry) = self.queue.pop_front() else {
                    break;
                };
                self.active = Some(ActiveDive {
                    entry,
                    steps: 0,
                    last: None,
                });
            }
            self.step(ctx);
            solves += 1;
        }
        solves
    }

    fn finish(&mut self) {
        if let Some(dive) = self.active.take() {
            self.completed += 1;
            self.stats.on_dive_completed();
            log::trace!(
                "diver {}: dive from {} finished after {} steps",
                self.id.get(),
                dive.entry.source,
                dive.steps
            );
        }
    }

    fn step(&mut self, ctx: &SearchContext<'_>) {
        let Some(dive) = self.active.as_mut() else {
            return;
        };
        let problem = ctx.problem;
        let settings = ctx.settings;

        let outcome = self.lp.solve(problem, &dive.entry.lower, &dive.entry.upper);
        let iterations = outcome.iterations();
        self.stats.on_dive_step(iterations);
        self.clock += settings.work_model.node_cost(iterations);

        let LpOutcome::Optimal(solution) = outcome else {
            self.finish();
            return;
        };
        let depth = dive.entry.depth + dive.steps as u32;
        let observation = dive
            .last
            .take()
            .map(|branch| PseudoCostObservation::from_child(&branch, solution.objective));
        if let Some(observation) = &observation {
            Arc::make_mut(&mut self.pseudo_costs).record(observation);
        }

        let x = &solution.primal;
        let cutoff = solution.objective >= self.upper_bound - settings.absolute_gap_tolerance;
        if !cutoff {
            problem.fractional_columns_into(x, settings.integrality_tolerance, &mut self.fractional);
        }
        if !cutoff && self.fractional.is_empty() {
            let values = rounded_point(problem, x, settings.integrality_tolerance);
            let objective = problem.internal_objective(&values);
            if objective < self.upper_bound {
                self.upper_bound = objective;
                self.events.record(
                    self.clock,
                    None,
                    depth,
                    observation,
                    EventKind::IntegerSolutionFound { objective, values },
                );
                log::trace!("diver {}: integer point at {}", self.id.get(), objective);
                self.finish();
                return;
            }
        }

        if observation.is_some() {
            self.events.record(
                self.clock,
                None,
                depth,
                observation,
                EventKind::DiveStep {
                    objective: solution.objective,
                },
            );
        }
        if cutoff || self.fractional.is_empty() || dive.steps >= settings.max_dive_depth {
            self.finish();
            return;
        }

        let inputs = DiveInputs {
            pseudo_costs: &self.pseudo_costs,
            root: &self.root_primal,
            incumbent: self.incumbent.as_deref(),
            locks: &self.locks,
        };
        let Some(choice) = select_dive(self.strategy, &inputs, &self.fractional, x) else {
            self.finish();
            return;
        };
        let j = choice.column.get();
        match choice.direction {
            BranchDirection::Down => dive.entry.upper[j] = choice.target(),
            BranchDirection::Up => dive.entry.lower[j] = choice.target(),
        }
        dive.last = Some(BranchInfo {
            column: choice.column,
            value: choice.value,
            direction: choice.direction,
            parent_objective: solution.objective,
        });
        dive.steps += 1;
    }
}
