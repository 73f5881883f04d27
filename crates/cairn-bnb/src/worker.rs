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

//! # BFS Worker
//!
//! A `BfsWorker` owns a `NodeQueue`, an LP solver and scratch buffers, and
//! processes one node at a time:
//!
//! 1. A node whose bound already reaches the cutoff is fathomed unsolved.
//! 2. The node's bound path is resolved against the root bounds; a conflict
//!    proves the node infeasible without an LP solve.
//! 3. The relaxation is solved and its iterations are charged as work. A
//!    node whose relaxation was handed in with `seed_solution` skips the
//!    solve but is still charged.
//! 4. Depending on the outcome the node is closed as infeasible, numerical,
//!    fathomed or integer, or branched into two children that go onto the
//!    plunge stack.
//!
//! Where the results go is decided by the `TreeUpdatePolicy` passed in, so
//! the same step serves both exploration modes.
//!
//! A numerical failure does not stop the worker. It lowers the worker's
//! `lower_bound_ceiling` to the failed node's bound, which keeps the reported
//! global bound from claiming more than the search actually proved.

use crate::{
    driver::rounded_point,
    lp::{LpOutcome, LpSolution, NodeLpSolver},
    node::{BranchDirection, BranchInfo, Node, NodeKey, WorkerIndex},
    policy::TreeUpdatePolicy,
    pseudo_cost::PseudoCostObservation,
    queue::NodeQueue,
    settings::BnbSettings,
    stats::WorkerStatistics,
};
use cairn_model::{index::ColumnIndex, problem::Problem};
use cairn_search::control::SearchControl;
use fixedbitset::FixedBitSet;

/// Read-only state every worker consults.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    pub problem: &'a Problem,
    pub settings: &'a BnbSettings,
    pub control: &'a SearchControl,
}

/// How `solve_node` closed or expanded a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeOutcome {
    Branched,
    Integer,
    Fathomed,
    Infeasible,
    Numerical,
}

/// A best-first worker with its own LP solver and node queue.
#[derive(Debug)]
pub struct BfsWorker<L> {
    id: WorkerIndex,
    lp: L,
    queue: NodeQueue,
    seeded: Option<(NodeKey, LpSolution)>,
    next_seq: u64,
    lower: Vec<f64>,
    upper: Vec<f64>,
    changed: FixedBitSet,
    fractional: Vec<ColumnIndex>,
    lower_bound_ceiling: f64,
    stats: WorkerStatistics,
}

impl<L> BfsWorker<L>
where
    L: NodeLpSolver,
{
    /// Creates a worker with an empty queue.
    ///
    /// # Arguments
    ///
    /// * `id` - The worker index; it prefixes every node key the worker creates.
    /// * `lp` - The worker's own relaxation solver.
    /// * `problem` - Sizes the bound scratch buffers.
    ///
    /// # Returns
    ///
    /// A worker whose first child key has sequence number 1.
    pub fn new(id: WorkerIndex, lp: L, problem: &Problem) -> Self {
        let n = problem.num_columns();
        Self {
            id,
            lp,
            queue: NodeQueue::new(),
            seeded: None,
            next_seq: 1,
            lower: problem.lower_bounds().to_vec(),
            upper: problem.upper_bounds().to_vec(),
            changed: FixedBitSet::with_capacity(n),
            fractional: Vec::new(),
            lower_bound_ceiling: f64::INFINITY,
            stats: WorkerStatistics::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> WorkerIndex {
        self.id
    }

    #[inline]
    pub fn queue(&self) -> &NodeQueue {
        &self.queue
    }

    #[inline]
    pub fn queue_mut(&mut self) -> &mut NodeQueue {
        &mut self.queue
    }

    #[inline]
    pub fn stats(&self) -> &WorkerStatistics {
        &self.stats
    }

    /// Smallest bound of a node this worker failed to solve, `+inf` if none.
    #[inline]
    pub fn lower_bound_ceiling(&self) -> f64 {
        self.lower_bound_ceiling
    }

    /// The bound this worker vouches for: its queue's best node, capped by the ceiling.
    #[inline]
    pub fn reported_lower_bound(&self) -> f64 {
        self.queue.lower_bound().min(self.lower_bound_ceiling)
    }

    /// Hands in the relaxation of `node`, already solved elsewhere.
    ///
    /// When `node` comes up, `solution` is used in place of an LP solve. It
    /// must be the relaxation of `node`'s resolved bounds.
    ///
    /// # Arguments
    ///
    /// * `node` - The node the solution belongs to.
    /// * `solution` - Its optimal relaxation.
    pub fn seed_solution(&mut self, node: NodeKey, solution: LpSolution) {
        self.seeded = Some((node, solution));
    }

    #[inline]
    fn next_key(&mut self) -> NodeKey {
        let key = NodeKey::new(self.id, self.next_seq);
        self.next_seq += 1;
        key
    }

    /// Dequeues and processes one node. `None` if the queue is empty.
    pub fn process_next<P>(&mut self, ctx: &SearchContext<'_>, policy: &mut P) -> Option<NodeOutcome>
    where
        P: TreeUpdatePolicy,
    {
        let node = self.queue.dequeue()?;
        Some(self.solve_node(ctx, node, policy))
    }

    /// Processes `node` and reports the result to `policy`.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The problem, settings and halt flag.
    /// * `node` - The node to process; children go onto this worker's queue.
    /// * `policy` - Supplies the cutoff and branching rule, and receives the
    ///   outcome and the work charged.
    ///
    /// # Returns
    ///
    /// How the node was closed, or `Branched`.
    pub fn solve_node<P>(&mut self, ctx: &SearchContext<'_>, node: Node, policy: &mut P) -> NodeOutcome
    where
        P: TreeUpdatePolicy,
    {
        let problem = ctx.problem;
        let settings = ctx.settings;
        let tolerance = settings.absolute_gap_tolerance;
        self.stats.on_node_explored(node.depth());

        if node.lower_bound() >= policy.upper_bound() - tolerance {
            policy.record_work(settings.work_model.node_cost(0));
            self.stats.on_fathomed();
            policy.record_fathomed(&node, node.lower_bound(), None);
            log::trace!("worker {}: {} fathomed before solving", self.id.get(), node.key());
            return NodeOutcome::Fathomed;
        }

        if !node.resolve_bounds(
            problem.lower_bounds(),
            problem.upper_bounds(),
            &mut self.lower,
            &mut self.upper,
            &mut self.changed,
        ) {
            policy.record_work(settings.work_model.node_cost(0));
            self.stats.on_infeasible();
            policy.record_infeasible(&node);
            log::trace!("worker {}: {} has conflicting bounds", self.id.get(), node.key());
            return NodeOutcome::Infeasible;
        }

        let outcome = match self.seeded.take_if(|(key, _)| *key == node.key()) {
            Some((_, solution)) => LpOutcome::Optimal(solution),
            None => {
                let outcome = self.lp.solve(problem, &self.lower, &self.upper);
                self.stats.on_lp_solved(outcome.iterations());
                outcome
            }
        };
        policy.record_work(settings.work_model.node_cost(outcome.iterations()));

        let solution = match outcome {
            LpOutcome::Optimal(solution) => solution,
            LpOutcome::Infeasible { .. } => {
                self.stats.on_infeasible();
                policy.record_infeasible(&node);
                log::trace!("worker {}: {} infeasible", self.id.get(), node.key());
                return NodeOutcome::Infeasible;
            }
            LpOutcome::Numerical { .. }
            | LpOutcome::IterationLimit { .. }
            | LpOutcome::Unbounded { .. } => {
                self.lower_bound_ceiling = self.lower_bound_ceiling.min(node.lower_bound());
                self.stats.on_numerical_failure();
                policy.record_numerical(&node);
                log::trace!("worker {}: {} numerical failure", self.id.get(), node.key());
                return NodeOutcome::Numerical;
            }
        };

        let objective = solution.objective;
        let observation = node
            .branch()
            .map(|branch| PseudoCostObservation::from_child(branch, objective));

        if objective >= policy.upper_bound() - tolerance {
            self.stats.on_fathomed();
            policy.record_fathomed(&node, objective, observation);
            log::trace!("worker {}: {} fathomed at {}", self.id.get(), node.key(), objective);
            return NodeOutcome::Fathomed;
        }

        let x = &solution.primal;
        problem.fractional_columns_into(x, settings.integrality_tolerance, &mut self.fractional);

        if self.fractional.is_empty() {
            let values = rounded_point(problem, x, settings.integrality_tolerance);
            let objective = problem.internal_objective(&values);
            self.stats.on_integer();
            policy.record_integer_solution(&node, objective, values, observation);
            log::trace!("worker {}: {} integer at {}", self.id.get(), node.key(), objective);
            return NodeOutcome::Integer;
        }

        let Some(choice) = policy.select_branch(&self.fractional, x) else {
            self.lower_bound_ceiling = self.lower_bound_ceiling.min(node.lower_bound());
            self.stats.on_numerical_failure();
            policy.record_numerical(&node);
            return NodeOutcome::Numerical;
        };

        let estimate = policy.objective_estimate(objective, &self.fractional, x);
        let branch = |direction| BranchInfo {
            column: choice.column,
            value: choice.value,
            direction,
            parent_objective: objective,
        };
        let down_key = self.next_key();
        let up_key = self.next_key();
        let down = node.child(down_key, branch(BranchDirection::Down), estimate);
        let up = node.child(up_key, branch(BranchDirection::Up), estimate);

        self.stats.on_branched();
        policy.record_branched(&node, objective, &choice, &down, &up, observation);
        log::trace!(
            "worker {}: {} branched on {} = {}",
            self.id.get(),
            node.key(),
            choice.column,
            choice.value
        );
        self.queue.enqueue_children_for_plunge(down, up, choice.preferred);
        NodeOutcome::Branched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lp::single_row::SingleRowLpSolver,
        pseudo_cost::{BranchChoice, PseudoCosts},
    };
    use cairn_model::problem::{ProblemBuilder, RowSense, VariableKind};

    /// Records what the worker reports.
    #[derive(Debug, Default)]
    struct Recorder {
        upper_bound: f64,
        work: f64,
        pseudo_costs: PseudoCosts,
        branched: Vec<(NodeKey, NodeKey, NodeKey)>,
        integer: Vec<(f64, Vec<f64>)>,
        fathomed: Vec<(NodeKey, f64)>,
        infeasible: Vec<NodeKey>,
        numerical: Vec<NodeKey>,
    }

    impl Recorder {
        fn new(num_columns: usize, upper_bound: f64) -> Self {
            Self {
                upper_bound,
                pseudo_costs: PseudoCosts::new(num_columns),
                ..Default::default()
            }
        }
    }

    impl TreeUpdatePolicy for Recorder {
        fn upper_bound(&self) -> f64 {
            self.upper_bound
        }
        fn record_work(&mut self, work: f64) {
            self.work += work;
        }
        fn select_branch(&self, fractional: &[ColumnIndex], x: &[f64]) -> Option<BranchChoice> {
            self.pseudo_costs.select_branch(fractional, x)
        }
        fn objective_estimate(&self, lb: f64, fractional: &[ColumnIndex], x: &[f64]) -> f64 {
            self.pseudo_costs.objective_estimate(lb, fractional, x)
        }
        fn record_branched(
            &mut self,
            node: &Node,
            _objective: f64,
            _choice: &BranchChoice,
            down: &Node,
            up: &Node,
            _observation: Option<PseudoCostObservation>,
        ) {
            self.branched.push((node.key(), down.key(), up.key()));
        }
        fn record_integer_solution(
            &mut self,
            _node: &Node,
            objective: f64,
            values: Vec<f64>,
            _observation: Option<PseudoCostObservation>,
        ) {
            self.upper_bound = self.upper_bound.min(objective);
            self.integer.push((objective, values));
        }
        fn record_fathomed(&mut self, node: &Node, lb: f64, _obs: Option<PseudoCostObservation>) {
            self.fathomed.push((node.key(), lb));
        }
        fn record_infeasible(&mut self, node: &Node) {
            self.infeasible.push(node.key());
        }
        fn record_numerical(&mut self, node: &Node) {
            self.numerical.push(node.key());
        }
    }

    /// Always fails.
    #[derive(Debug, Clone)]
    struct FailingSolver;

    impl NodeLpSolver for FailingSolver {
        fn name(&self) -> &str {
            "FailingSolver"
        }
        fn solve(&mut self, _: &Problem, _: &[f64], _: &[f64]) -> LpOutcome {
            LpOutcome::IterationLimit { iterations: 100 }
        }
    }

    /// minimize x, x integer in [0.5, 1]
    fn half_problem() -> Problem {
        let mut b = ProblemBuilder::new(1);
        b.set_objective_coefficient(ColumnIndex::new(0), 1.0)
            .set_bounds(ColumnIndex::new(0), 0.5, 1.0)
            .set_variable_kind(ColumnIndex::new(0), VariableKind::Integer);
        b.build().expect("valid")
    }

    fn run_to_completion<L: NodeLpSolver>(
        worker: &mut BfsWorker<L>,
        ctx: &SearchContext<'_>,
        policy: &mut Recorder,
    ) -> Vec<NodeOutcome> {
        std::iter::from_fn(|| worker.process_next(ctx, policy)).collect()
    }

    #[test]
    fn test_trivial_problem_branches_once() {
        let problem = half_problem();
        let settings = BnbSettings::default();
        let control = SearchControl::new();
        let ctx = SearchContext {
            problem: &problem,
            settings: &settings,
            control: &control,
        };
        let mut worker = BfsWorker::new(WorkerIndex::new(0), SingleRowLpSolver::new(), &problem);
        worker.queue_mut().set_current(Node::root(0.5));
        let mut policy = Recorder::new(1, f64::INFINITY);

        let outcomes = run_to_completion(&mut worker, &ctx, &mut policy);
        assert_eq!(
            outcomes,
            vec![NodeOutcome::Branched, NodeOutcome::Infeasible, NodeOutcome::Integer]
        );
        let down = NodeKey::new(WorkerIndex::new(0), 1);
        let up = NodeKey::new(WorkerIndex::new(0), 2);
        assert_eq!(policy.branched, vec![(NodeKey::ROOT, down, up)]);
        assert_eq!(policy.infeasible, vec![down]);
        assert_eq!(policy.integer, vec![(1.0, vec![1.0])]);
        assert_eq!(worker.stats().nodes_explored, 3);
        assert!(policy.work > 0.0);
    }

    #[test]
    fn test_node_at_incumbent_is_fathomed_without_children() {
        let problem = half_problem();
        let settings = BnbSettings::default();
        let control = SearchControl::new();
        let ctx = SearchContext {
            problem: &problem,
            settings: &settings,
            control: &control,
        };
        let mut worker = BfsWorker::new(WorkerIndex::new(0), SingleRowLpSolver::new(), &problem);
        let mut policy = Recorder::new(1, 10.0);

        let outcome = worker.solve_node(&ctx, Node::root(10.0), &mut policy);
        assert_eq!(outcome, NodeOutcome::Fathomed);
        assert_eq!(policy.fathomed, vec![(NodeKey::ROOT, 10.0)]);
        assert!(policy.branched.is_empty());
        assert!(worker.queue().is_empty());
    }

    #[test]
    fn test_relaxation_above_cutoff_is_fathomed() {
        // minimize 3x with x >= 4.5: the relaxation gives 13.5, above the cutoff of 10.
        let mut b = ProblemBuilder::new(1);
        b.set_objective_coefficient(ColumnIndex::new(0), 3.0)
            .set_bounds(ColumnIndex::new(0), 4.5, 9.0)
            .set_variable_kind(ColumnIndex::new(0), VariableKind::Integer);
        let problem = b.build().expect("valid");
        let settings = BnbSettings::default();
        let control = SearchControl::new();
        let ctx = SearchContext {
            problem: &problem,
            settings: &settings,
            control: &control,
        };
        let mut worker = BfsWorker::new(WorkerIndex::new(0), SingleRowLpSolver::new(), &problem);
        let mut policy = Recorder::new(1, 10.0);

        let outcome = worker.solve_node(&ctx, Node::root(0.0), &mut policy);
        assert_eq!(outcome, NodeOutcome::Fathomed);
        assert_eq!(policy.fathomed, vec![(NodeKey::ROOT, 13.5)]);
        assert!(worker.queue().is_empty());
    }

    #[test]
    fn test_numerical_failure_lowers_ceiling() {
        let problem = half_problem();
        let settings = BnbSettings::default();
        let control = SearchControl::new();
        let ctx = SearchContext {
            problem: &problem,
            settings: &settings,
            control: &control,
        };
        let mut worker = BfsWorker::new(WorkerIndex::new(0), FailingSolver, &problem);
        let mut policy = Recorder::new(1, f64::INFINITY);
        assert_eq!(worker.reported_lower_bound(), f64::INFINITY);

        let outcome = worker.solve_node(&ctx, Node::root(0.75), &mut policy);
        assert_eq!(outcome, NodeOutcome::Numerical);
        assert_eq!(policy.numerical, vec![NodeKey::ROOT]);
        assert_eq!(worker.lower_bound_ceiling(), 0.75);
        assert_eq!(worker.reported_lower_bound(), 0.75);
        assert_eq!(worker.stats().numerical_failures, 1);
        // 1 per node + 0.01 per iteration
        assert!((policy.work - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_seeded_root_is_not_solved_again() {
        let problem = half_problem();
        let settings = BnbSettings::default();
        let control = SearchControl::new();
        let ctx = SearchContext {
            problem: &problem,
            settings: &settings,
            control: &control,
        };
        // Every solve would fail, so branching proves the seed was used.
        let mut worker = BfsWorker::new(WorkerIndex::new(0), FailingSolver, &problem);
        worker.seed_solution(
            NodeKey::ROOT,
            LpSolution {
                primal: vec![0.5],
                dual: Vec::new(),
                reduced_costs: vec![1.0],
                objective: 0.5,
                iterations: 3,
            },
        );
        worker.queue_mut().set_current(Node::root(0.5));
        let mut policy = Recorder::new(1, f64::INFINITY);

        assert_eq!(worker.process_next(&ctx, &mut policy), Some(NodeOutcome::Branched));
        assert_eq!(worker.stats().lp_iterations, 0);
        assert!((policy.work - settings.work_model.node_cost(3)).abs() < 1e-12);

        // The down child conflicts with x >= 0.5; the up child is solved for real.
        assert_eq!(worker.process_next(&ctx, &mut policy), Some(NodeOutcome::Infeasible));
        assert_eq!(worker.process_next(&ctx, &mut policy), Some(NodeOutcome::Numerical));
        assert_eq!(worker.stats().lp_iterations, 100);
    }

    #[test]
    fn test_seed_for_another_node_is_kept() {
        let problem = half_problem();
        let settings = BnbSettings::default();
        let control = SearchControl::new();
        let ctx = SearchContext {
            problem: &problem,
            settings: &settings,
            control: &control,
        };
        let mut worker = BfsWorker::new(WorkerIndex::new(0), FailingSolver, &problem);
        let elsewhere = NodeKey::new(WorkerIndex::new(1), 7);
        worker.seed_solution(
            elsewhere,
            LpSolution {
                primal: vec![0.5],
                dual: Vec::new(),
                reduced_costs: Vec::new(),
                objective: 0.5,
                iterations: 0,
            },
        );
        let mut policy = Recorder::new(1, f64::INFINITY);
        let outcome = worker.solve_node(&ctx, Node::root(0.5), &mut policy);
        assert_eq!(outcome, NodeOutcome::Numerical);
    }

    #[test]
    fn test_knapsack_search_finds_optimum() {
        // maximize 5a + 4b + 3c  s.t. 2a + 3b + c <= 4; optimum a = c = 1 (8).
        let col = ColumnIndex::new;
        let mut b = ProblemBuilder::new(3);
        b.set_sense(cairn_model::problem::ObjectiveSense::Maximize);
        for (j, v) in [5.0, 4.0, 3.0].into_iter().enumerate() {
            b.set_objective_coefficient(col(j), v)
                .set_variable_kind(col(j), VariableKind::Binary);
        }
        b.add_row(
            [(col(0), 2.0), (col(1), 3.0), (col(2), 1.0)],
            RowSense::LessEqual,
            4.0,
        );
        let problem = b.build().expect("valid");
        let settings = BnbSettings::default();
        let control = SearchControl::new();
        let ctx = SearchContext {
            problem: &problem,
            settings: &settings,
            control: &control,
        };
        let mut worker = BfsWorker::new(WorkerIndex::new(0), SingleRowLpSolver::new(), &problem);
        worker.queue_mut().set_current(Node::root(f64::NEG_INFINITY));
        let mut policy = Recorder::new(3, f64::INFINITY);

        run_to_completion(&mut worker, &ctx, &mut policy);
        assert_eq!(policy.upper_bound, -8.0);
        let best = policy
            .integer
            .iter()
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, v)| v.clone());
        assert_eq!(best, Some(vec![1.0, 0.0, 1.0]));
    }
}
