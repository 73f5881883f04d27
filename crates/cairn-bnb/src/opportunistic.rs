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

//! # Opportunistic Exploration
//!
//! Asynchronous branch and bound for throughput when reproducibility does not
//! matter. BFS workers run free on their own threads:
//!
//! - A global best-first `NodePool` holds every node not owned by a worker.
//!   An idle worker takes the best one and plunges from it locally; nodes its
//!   plunge defers are handed straight back to the pool. Worker 0 starts on
//!   the root node directly, reusing the root relaxation.
//! - The incumbent is a `SharedIncumbent` that any worker may improve, the
//!   pseudo-cost table sits behind a mutex, and consumed work is an atomic
//!   counter. Workers see each other's progress immediately.
//! - The calling thread supervises: it drains external solutions, reports
//!   to the monitor and the bound callback, and checks the limits about once
//!   a millisecond.
//!
//! The search is exhausted once the pool is empty and no worker holds a node.
//! No event log is kept and no state hash is produced. There are no diving
//! workers in this mode.

use crate::{
    driver::{SearchEnvironment, SearchHooks, SearchStart, SearchSummary, exhausted_status},
    error::{BnbError, BnbResult},
    heuristic::process_repairs,
    lp::{NodeLpSolver, RootRelaxation},
    monitor::tree_search_monitor::SyncReport,
    node::{Node, NodeKey, WorkerIndex},
    policy::TreeUpdatePolicy,
    pseudo_cost::{BranchChoice, PseudoCostObservation, PseudoCosts},
    stats::WorkerStatistics,
    worker::BfsWorker,
};
use cairn_model::{index::ColumnIndex, problem::Problem, solution::MipSolution};
use cairn_search::{
    incumbent::SharedIncumbent, monitor::search_monitor::SearchCommand, result::MipStatus,
    stats::SolverStatistics,
};
use smallvec::SmallVec;
use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    sync::{
        Condvar, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering},
    },
    time::{Duration, Instant},
};

/// Work is accumulated in thousandths of a unit.
const WORK_SCALE: f64 = 1000.0;

const SUPERVISOR_TICK: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct PoolEntry(Node);

impl PoolEntry {
    #[inline]
    fn sort_key(&self) -> (f64, NodeKey) {
        (self.0.lower_bound(), self.0.key())
    }
}

impl PartialEq for PoolEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PoolEntry {}

impl PartialOrd for PoolEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PoolEntry {
    // Reversed: the heap pops the smallest bound first.
    fn cmp(&self, other: &Self) -> Ordering {
        let (a_bound, a_key) = self.sort_key();
        let (b_bound, b_key) = other.sort_key();
        b_bound.total_cmp(&a_bound).then_with(|| b_key.cmp(&a_key))
    }
}

#[derive(Debug)]
struct PoolState {
    heap: BinaryHeap<PoolEntry>,
    /// Workers currently holding local nodes.
    active: usize,
    /// Bound each worker vouches for, `+inf` while idle.
    bounds: Vec<f64>,
    exhausted: bool,
}

/// The global best-first node pool with its idle/active bookkeeping.
///
/// Node hand-offs and bound publications go through the same lock, so the
/// pool's lower bound never misses a node in transit between a worker and
/// the heap.
#[derive(Debug)]
pub struct NodePool {
    state: Mutex<PoolState>,
    available: Condvar,
    closed: AtomicBool,
}

impl NodePool {
    /// An empty pool for `num_workers` workers, all idle.
    pub fn new(num_workers: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                heap: BinaryHeap::new(),
                active: 0,
                bounds: vec![f64::INFINITY; num_workers],
                exhausted: false,
            }),
            available: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds `node` to the heap and wakes one waiting worker.
    pub fn push(&self, node: Node) {
        self.lock().heap.push(PoolEntry(node));
        self.available.notify_one();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Marks `worker` as active on a node it got outside the pool.
    ///
    /// The worker must later go idle through `publish` like any other.
    ///
    /// # Arguments
    ///
    /// * `worker` - Index of the worker taking the node.
    /// * `bound` - The node's lower bound, vouched for until the next publish.
    pub fn claim(&self, worker: usize, bound: f64) {
        let mut state = self.lock();
        state.active += 1;
        state.bounds[worker] = bound;
    }

    /// Blocks until a node is available for `worker`.
    ///
    /// Returns `None` once the pool is exhausted or closed.
    pub fn acquire(&self, worker: usize) -> Option<Node> {
        let mut state = self.lock();
        loop {
            if self.is_closed() || state.exhausted {
                return None;
            }
            if let Some(PoolEntry(node)) = state.heap.pop() {
                state.active += 1;
                state.bounds[worker] = node.lower_bound();
                return Some(node);
            }
            if state.active == 0 {
                state.exhausted = true;
                self.available.notify_all();
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Hands `shared` back to the pool and publishes `worker`'s new bound.
    ///
    /// `idle` marks that the worker has no local nodes left.
    pub fn publish<I>(&self, worker: usize, shared: I, bound: f64, idle: bool)
    where
        I: IntoIterator<Item = Node>,
    {
        let mut state = self.lock();
        let before = state.heap.len();
        state.heap.extend(shared.into_iter().map(PoolEntry));
        let added = state.heap.len() - before;
        state.bounds[worker] = bound;
        if idle {
            state.active -= 1;
        }
        if idle && state.active == 0 && state.heap.is_empty() {
            state.exhausted = true;
            self.available.notify_all();
        } else if added > 0 {
            self.available.notify_all();
        }
    }

    /// Smallest bound over the heap and every worker.
    pub fn lower_bound(&self) -> f64 {
        let state = self.lock();
        let heap = state
            .heap
            .peek()
            .map_or(f64::INFINITY, |e| e.0.lower_bound());
        state.bounds.iter().copied().fold(heap, f64::min)
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.lock().exhausted
    }

    /// Releases every waiter; later `acquire` calls return `None`.
    pub fn close(&self) {
        self.closed.store(true, AtomicOrdering::Release);
        let _state = self.lock();
        self.available.notify_all();
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::Acquire)
    }
}

/// Closes the pool when dropped during a panic.
struct CloseOnPanic<'a>(&'a NodePool);

impl Drop for CloseOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.close();
        }
    }
}

/// State every opportunistic worker reads and writes directly.
#[derive(Debug)]
pub struct SharedSearchState {
    /// Best solution so far, installed with a compare-and-swap on its objective.
    pub incumbent: SharedIncumbent,
    /// Global pseudo-cost table. Workers lock it for every observation.
    pub pseudo_costs: Mutex<PseudoCosts>,
    work: AtomicU64,
    numerical_failures: AtomicU64,
    solutions_found: AtomicU64,
}

impl SharedSearchState {
    /// Fresh state: no incumbent, no observations, no work done.
    pub fn new(num_columns: usize) -> Self {
        Self {
            incumbent: SharedIncumbent::new(),
            pseudo_costs: Mutex::new(PseudoCosts::new(num_columns)),
            work: AtomicU64::new(0),
            numerical_failures: AtomicU64::new(0),
            solutions_found: AtomicU64::new(0),
        }
    }

    /// Installs `solution` if it improves the incumbent and counts it.
    ///
    /// # Arguments
    ///
    /// * `objective` - The solution's objective in minimisation form.
    /// * `solution` - The solution in the caller's objective sense.
    ///
    /// # Returns
    ///
    /// `true` if the incumbent was replaced.
    pub fn offer(&self, objective: f64, solution: MipSolution) -> bool {
        let installed = self.incumbent.try_install(objective, solution);
        if installed {
            self.solutions_found.fetch_add(1, AtomicOrdering::Relaxed);
        }
        installed
    }

    /// Incumbent improvements so far, from any source.
    #[inline]
    pub fn solutions_found(&self) -> u64 {
        self.solutions_found.load(AtomicOrdering::Relaxed)
    }

    #[inline]
    fn pseudo_costs(&self) -> MutexGuard<'_, PseudoCosts> {
        self.pseudo_costs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Work units consumed by all workers so far.
    #[inline]
    pub fn work(&self) -> f64 {
        self.work.load(AtomicOrdering::Relaxed) as f64 / WORK_SCALE
    }

    #[inline]
    pub fn numerical_failures(&self) -> u64 {
        self.numerical_failures.load(AtomicOrdering::Relaxed)
    }
}

/// Publishes node outcomes straight into `SharedSearchState`.
#[derive(Debug)]
pub struct OpportunisticPolicy<'a> {
    shared: &'a SharedSearchState,
    problem: &'a Problem,
}

impl<'a> OpportunisticPolicy<'a> {
    #[inline]
    pub fn new(shared: &'a SharedSearchState, problem: &'a Problem) -> Self {
        Self { shared, problem }
    }

    fn learn(&self, observation: Option<PseudoCostObservation>) {
        if let Some(observation) = &observation {
            self.shared.pseudo_costs().record(observation);
        }
    }
}

impl TreeUpdatePolicy for OpportunisticPolicy<'_> {
    #[inline]
    fn upper_bound(&self) -> f64 {
        self.shared.incumbent.upper_bound()
    }

    #[inline]
    fn record_work(&mut self, work: f64) {
        self.shared
            .work
            .fetch_add((work * WORK_SCALE).round() as u64, AtomicOrdering::Relaxed);
    }

    fn select_branch(&self, fractional: &[ColumnIndex], x: &[f64]) -> Option<BranchChoice> {
        self.shared.pseudo_costs().select_branch(fractional, x)
    }

    fn objective_estimate(&self, lower_bound: f64, fractional: &[ColumnIndex], x: &[f64]) -> f64 {
        self.shared
            .pseudo_costs()
            .objective_estimate(lower_bound, fractional, x)
    }

    fn record_branched(
        &mut self,
        _node: &Node,
        _objective: f64,
        _choice: &BranchChoice,
        _down: &Node,
        _up: &Node,
        observation: Option<PseudoCostObservation>,
    ) {
        self.learn(observation);
    }

    fn record_integer_solution(
        &mut self,
        node: &Node,
        objective: f64,
        values: Vec<f64>,
        observation: Option<PseudoCostObservation>,
    ) {
        self.learn(observation);
        let solution = MipSolution::new(self.problem.user_objective(objective), values);
        if self.shared.offer(objective, solution) {
            log::debug!("{} improved the incumbent to {}", node.key(), objective);
        }
    }

    fn record_fathomed(
        &mut self,
        _node: &Node,
        _lower_bound: f64,
        observation: Option<PseudoCostObservation>,
    ) {
        self.learn(observation);
    }

    fn record_infeasible(&mut self, _node: &Node) {}

    fn record_numerical(&mut self, _node: &Node) {
        self.shared
            .numerical_failures
            .fetch_add(1, AtomicOrdering::Relaxed);
    }
}

/// Worker thread body. Returns the worker's counters and numerical ceiling.
///
/// `initial` is a node already claimed for this worker; it is processed
/// before anything is taken from the pool.
fn work_loop<L>(
    env: &SearchEnvironment<'_>,
    mut worker: BfsWorker<L>,
    pool: &NodePool,
    shared: &SharedSearchState,
    mut initial: Option<Node>,
) -> (WorkerStatistics, f64)
where
    L: NodeLpSolver,
{
    let _guard = CloseOnPanic(pool);
    let ctx = env.context();
    let index = worker.id().get();
    let mut policy = OpportunisticPolicy::new(shared, env.problem);

    'search: while let Some(node) = initial.take().or_else(|| pool.acquire(index)) {
        worker.queue_mut().set_current(node);
        loop {
            if env.control.is_halted() || pool.is_closed() {
                break 'search;
            }
            worker.process_next(&ctx, &mut policy);
            // A plunge defers at most one sibling per step.
            let deferred: SmallVec<[Node; 2]> =
                std::iter::from_fn(|| worker.queue_mut().pop_backlog()).collect();
            let idle = worker.queue().is_empty();
            pool.publish(index, deferred, worker.reported_lower_bound(), idle);
            if idle {
                break;
            }
        }
    }
    (*worker.stats(), worker.lower_bound_ceiling())
}

struct Supervisor<'a> {
    env: SearchEnvironment<'a>,
    root: &'a RootRelaxation,
    started: Instant,
    ticks: u64,
    reported_bound: f64,
}

impl<'a> Supervisor<'a> {
    /// Installs queued external solutions into the shared incumbent.
    fn absorb_external(&mut self, shared: &SharedSearchState, hooks: &mut SearchHooks<'_>) {
        let env = self.env;
        let problem = env.problem;
        let tolerance = env.settings.integrality_tolerance;
        if let Some(repair) = hooks.repair.as_deref_mut() {
            process_repairs(
                env.repairs,
                repair,
                problem,
                self.root,
                tolerance,
                env.heuristics,
                shared.work(),
            );
        }
        for solution in env.heuristics.drain_all() {
            if !problem.is_feasible(&solution.values, tolerance) {
                if hooks.repair.is_some() {
                    env.repairs.push(solution.values);
                } else {
                    log::debug!("Dropping infeasible external solution");
                }
                continue;
            }
            let objective = problem.internal_objective(&solution.values);
            let user = problem.user_objective(objective);
            if shared.offer(objective, MipSolution::new(user, solution.values)) {
                log::debug!("External solution improved the incumbent to {}", user);
            }
        }
    }

    /// Tells the monitor about an incumbent it has not seen yet.
    fn report_incumbent(&mut self, shared: &SharedSearchState, hooks: &mut SearchHooks<'_>) {
        let upper_bound = shared.incumbent.upper_bound();
        if upper_bound < self.reported_bound {
            if let Some(solution) = shared.incumbent.snapshot() {
                self.reported_bound = upper_bound;
                hooks.monitor.on_solution_found(&solution);
            }
        }
    }

    fn termination(&self, shared: &SharedSearchState, lower_bound: f64) -> Option<MipStatus> {
        let env = self.env;
        let settings = env.settings;
        if env.control.is_halted() {
            return Some(match env.control.status() {
                MipStatus::Unset => MipStatus::TimeLimit,
                status => status,
            });
        }
        if settings.gap_closed(lower_bound, shared.incumbent.upper_bound()) {
            return Some(MipStatus::Optimal);
        }
        if settings
            .time_limit
            .is_some_and(|limit| self.started.elapsed() >= limit)
        {
            env.control.request_halt(MipStatus::TimeLimit);
            return Some(MipStatus::TimeLimit);
        }
        if settings.work_limit.is_some_and(|limit| shared.work() >= limit) {
            return Some(MipStatus::WorkLimit);
        }
        if shared.numerical_failures() > settings.max_numerical_failures {
            log::warn!(
                "{} numerical failures exceed the limit of {}",
                shared.numerical_failures(),
                settings.max_numerical_failures
            );
            return Some(MipStatus::Numerical);
        }
        None
    }

    /// One supervision round. Returns the status to stop with, if any.
    fn tick(
        &mut self,
        pool: &NodePool,
        shared: &SharedSearchState,
        hooks: &mut SearchHooks<'_>,
    ) -> Option<MipStatus> {
        self.ticks += 1;
        self.absorb_external(shared, hooks);
        self.report_incumbent(shared, hooks);

        let lower_bound = pool.lower_bound();
        hooks.report_bound(
            self.env.problem,
            lower_bound.min(shared.incumbent.upper_bound()),
        );
        let report = SyncReport {
            horizon: self.ticks,
            work: shared.work(),
            open_nodes: pool.len(),
            lower_bound,
            upper_bound: shared.incumbent.upper_bound(),
            elapsed: self.started.elapsed(),
            ..SyncReport::default()
        };
        hooks.monitor.on_sync(&report);
        if let SearchCommand::Terminate(reason) = hooks.monitor.search_command() {
            log::info!("Search terminated by monitor: {}", reason);
            self.env.control.request_halt(MipStatus::TimeLimit);
        }
        self.termination(shared, lower_bound)
    }
}

/// Runs the opportunistic search with one thread per BFS worker.
///
/// Worker 0 starts on the root node with the root relaxation handed in, so
/// the root LP is not solved twice. A start incumbent is installed before
/// any worker runs.
pub fn run<L>(
    env: &SearchEnvironment<'_>,
    lp: L,
    start: SearchStart,
    hooks: &mut SearchHooks<'_>,
) -> BnbResult<SearchSummary>
where
    L: NodeLpSolver + Clone,
{
    let problem = env.problem;
    let num_workers = env.settings.num_bfs_workers;
    let pool = NodePool::new(num_workers);
    let shared = SharedSearchState::new(problem.num_columns());
    let root_solution = start.root_solution();
    let SearchStart { root, incumbent } = start;

    let mut reported_bound = f64::INFINITY;
    if let Some((objective, values)) = incumbent {
        let solution = MipSolution::new(problem.user_objective(objective), values);
        if shared.offer(objective, solution) {
            // The driver has already told the monitor.
            reported_bound = objective;
        }
    }

    let root_node = Node::root(root.objective);
    pool.claim(0, root_node.lower_bound());
    let mut first = Some((root_node, root_solution));

    let mut supervisor = Supervisor {
        env: *env,
        root: &root,
        started: Instant::now(),
        ticks: 0,
        reported_bound,
    };

    let (status, results) = std::thread::scope(|s| {
        let handles: Vec<_> = (0..num_workers)
            .map(|i| {
                let mut worker = BfsWorker::new(WorkerIndex::new(i), lp.clone(), problem);
                let initial = first.take().map(|(node, solution)| {
                    worker.seed_solution(node.key(), solution);
                    node
                });
                let pool = &pool;
                let shared = &shared;
                s.spawn(move || work_loop(env, worker, pool, shared, initial))
            })
            .collect();

        let mut status = None;
        while !pool.is_exhausted() && !pool.is_closed() {
            if let Some(stop) = supervisor.tick(&pool, &shared, hooks) {
                status = Some(stop);
                break;
            }
            std::thread::sleep(SUPERVISOR_TICK);
        }
        pool.close();

        let results: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
        (status, results)
    });

    let mut worker_stats = WorkerStatistics::default();
    let mut ceiling = f64::INFINITY;
    for result in results {
        match result {
            Ok((stats, worker_ceiling)) => {
                worker_stats += stats;
                ceiling = ceiling.min(worker_ceiling);
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                log::error!("Worker thread panicked: {}", message);
                return Err(BnbError::WorkerPanicked(message));
            }
        }
    }

    // Solutions submitted during the last tick still count.
    supervisor.absorb_external(&shared, hooks);
    supervisor.report_incumbent(&shared, hooks);

    let upper_bound = shared.incumbent.upper_bound();
    let status = status.unwrap_or_else(|| exhausted_status(upper_bound, ceiling, env.settings));
    let lower_bound = pool.lower_bound().min(ceiling);
    let numerical_failures = shared.numerical_failures();
    let shared_solutions = shared.solutions_found();
    let incumbent = shared
        .incumbent
        .into_inner()
        .map(|(objective, solution)| (objective, solution.into_values()));

    let statistics = SolverStatistics {
        nodes_explored: worker_stats.nodes_explored,
        nodes_branched: worker_stats.nodes_branched,
        nodes_fathomed: worker_stats.nodes_fathomed,
        nodes_infeasible: worker_stats.nodes_infeasible,
        nodes_integer: worker_stats.nodes_integer,
        numerical_failures,
        lp_iterations: worker_stats.lp_iterations + root.iterations,
        solutions_found: shared_solutions,
        used_threads: num_workers,
        ..SolverStatistics::default()
    };

    Ok(SearchSummary {
        status,
        incumbent,
        lower_bound,
        statistics,
        state_hash: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        driver::{SearchHooks, WarmStart, solve},
        heuristic::{HeuristicQueue, RepairQueue},
        lp::{LpOutcome, single_row::SingleRowLpSolver},
        monitor::no_op::NoOpTreeSearchMonitor,
        node::{BranchDirection, BranchInfo},
        producer::ProducerSync,
        settings::{BnbSettings, ExplorationMode},
    };
    use cairn_model::problem::{ObjectiveSense, ProblemBuilder, RowSense, VariableKind};
    use cairn_search::{control::SearchControl, result::SolverOutcome};
    use std::sync::{Arc, atomic::AtomicUsize};

    fn node(seq: u64, lower_bound: f64) -> Node {
        Node::root(0.0).child(
            NodeKey::new(WorkerIndex::new(0), seq),
            BranchInfo {
                column: ColumnIndex::new(0),
                value: 0.5,
                direction: BranchDirection::Up,
                parent_objective: lower_bound,
            },
            lower_bound,
        )
    }

    #[test]
    fn test_pool_hands_out_best_bound_first() {
        let pool = NodePool::new(1);
        pool.push(node(1, 4.0));
        pool.push(node(2, 1.0));
        pool.push(node(3, 1.0));
        assert_eq!(pool.lower_bound(), 1.0);
        let first = pool.acquire(0).expect("node");
        assert_eq!(first.key().seq, 2);
        // The acquiring worker now vouches for the bound.
        assert_eq!(pool.lower_bound(), 1.0);
        pool.publish(0, Vec::new(), f64::INFINITY, true);
        assert_eq!(pool.acquire(0).map(|n| n.key().seq), Some(3));
    }

    #[test]
    fn test_pool_exhausts_when_last_worker_goes_idle() {
        let pool = NodePool::new(2);
        pool.push(node(1, 0.0));
        let n = pool.acquire(0).expect("node");
        assert!(!pool.is_exhausted());
        pool.publish(0, vec![node(2, n.lower_bound())], 0.0, false);
        assert_eq!(pool.acquire(1).map(|n| n.key().seq), Some(2));
        pool.publish(0, Vec::new(), f64::INFINITY, true);
        assert!(!pool.is_exhausted());
        pool.publish(1, Vec::new(), f64::INFINITY, true);
        assert!(pool.is_exhausted());
        assert!(pool.acquire(0).is_none());
        assert_eq!(pool.lower_bound(), f64::INFINITY);
    }

    #[test]
    fn test_claimed_node_counts_as_active() {
        let pool = NodePool::new(2);
        pool.claim(0, 2.5);
        assert_eq!(pool.lower_bound(), 2.5);
        assert!(!pool.is_exhausted());
        pool.publish(0, vec![node(1, 3.0)], 3.0, false);
        assert_eq!(pool.acquire(1).map(|n| n.key().seq), Some(1));
        pool.publish(1, Vec::new(), f64::INFINITY, true);
        assert!(!pool.is_exhausted());
        pool.publish(0, Vec::new(), f64::INFINITY, true);
        assert!(pool.is_exhausted());
    }

    #[test]
    fn test_close_wakes_waiting_workers() {
        let pool = NodePool::new(2);
        pool.push(node(1, 0.0));
        let _held = pool.acquire(0).expect("node");
        std::thread::scope(|s| {
            let waiter = s.spawn(|| pool.acquire(1));
            std::thread::sleep(Duration::from_millis(20));
            pool.close();
            assert_eq!(waiter.join().ok().map(|n| n.is_none()), Some(true));
        });
    }

    #[test]
    fn test_policy_installs_only_improvements() {
        let mut b = ProblemBuilder::new(1);
        b.set_sense(ObjectiveSense::Maximize)
            .set_objective_coefficient(ColumnIndex::new(0), 1.0);
        let problem = b.build().expect("valid");
        let shared = SharedSearchState::new(1);
        let mut policy = OpportunisticPolicy::new(&shared, &problem);

        policy.record_integer_solution(&node(1, -5.0), -3.0, vec![3.0], None);
        policy.record_integer_solution(&node(2, -5.0), -2.0, vec![2.0], None);
        assert_eq!(policy.upper_bound(), -3.0);
        assert_eq!(shared.incumbent.snapshot().map(|s| s.objective()), Some(3.0));
        assert_eq!(shared.solutions_found(), 1);

        policy.record_integer_solution(&node(4, -5.0), -4.0, vec![4.0], None);
        assert!(shared.offer(-4.5, MipSolution::new(4.5, vec![4.5])));
        assert!(!shared.offer(-4.5, MipSolution::new(4.5, vec![4.5])));
        assert_eq!(shared.solutions_found(), 3);

        policy.record_work(1.25);
        policy.record_work(0.5);
        assert_eq!(shared.work(), 1.75);
        policy.record_numerical(&node(3, 0.0));
        assert_eq!(shared.numerical_failures(), 1);
    }

    const VALUES: [f64; 10] = [12.0, 9.0, 15.0, 7.0, 11.0, 8.0, 14.0, 6.0, 10.0, 13.0];
    const WEIGHTS: [f64; 10] = [6.0, 4.0, 8.0, 3.0, 6.0, 4.0, 7.0, 3.0, 5.0, 7.0];
    const CAPACITY: f64 = 21.0;

    fn knapsack() -> Problem {
        let col = ColumnIndex::new;
        let mut b = ProblemBuilder::new(VALUES.len());
        b.set_sense(ObjectiveSense::Maximize);
        for (j, v) in VALUES.into_iter().enumerate() {
            b.set_objective_coefficient(col(j), v)
                .set_variable_kind(col(j), VariableKind::Binary);
        }
        b.add_row(
            WEIGHTS.into_iter().enumerate().map(|(j, w)| (col(j), w)),
            RowSense::LessEqual,
            CAPACITY,
        );
        b.build().expect("valid")
    }

    fn brute_force_optimum() -> f64 {
        (0u32..1 << VALUES.len())
            .filter_map(|mask| {
                let items = || (0..VALUES.len()).filter(move |&j| mask & (1 << j) != 0);
                let weight: f64 = items().map(|j| WEIGHTS[j]).sum();
                (weight <= CAPACITY).then(|| items().map(|j| VALUES[j]).sum::<f64>())
            })
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn solve_warm<L>(problem: &Problem, settings: BnbSettings, lp: L, warm: WarmStart) -> SolverOutcome
    where
        L: NodeLpSolver + Clone,
    {
        let control = SearchControl::new();
        let heuristics = HeuristicQueue::new();
        let repairs = RepairQueue::new();
        let producers = ProducerSync::new();
        let env = SearchEnvironment {
            problem,
            settings: &settings,
            control: &control,
            heuristics: &heuristics,
            repairs: &repairs,
            producers: &producers,
        };
        let mut monitor = NoOpTreeSearchMonitor::new();
        solve(
            &env,
            lp,
            warm,
            SearchHooks::new(&mut monitor),
        )
        .expect("solve")
    }

    fn solve_with_settings(problem: &Problem, settings: BnbSettings) -> SolverOutcome {
        solve_warm(problem, settings, SingleRowLpSolver::new(), WarmStart::default())
    }

    #[test_log::test]
    fn test_parallel_search_finds_the_optimum() {
        let problem = knapsack();
        let outcome = solve_with_settings(
            &problem,
            BnbSettings::default()
                .with_mode(ExplorationMode::Opportunistic)
                .with_bfs_workers(4),
        );
        assert_eq!(outcome.status, MipStatus::Optimal);
        assert_eq!(outcome.objective(), Some(brute_force_optimum()));
        assert_eq!(outcome.state_hash, None);
        assert_eq!(outcome.statistics.used_threads, 4);
        assert!(outcome.bound >= brute_force_optimum() - 1e-6);
    }

    #[test]
    fn test_single_worker_finds_the_optimum() {
        let problem = knapsack();
        let outcome = solve_with_settings(
            &problem,
            BnbSettings::default()
                .with_mode(ExplorationMode::Opportunistic)
                .with_bfs_workers(1),
        );
        assert!(outcome.is_optimal());
        assert_eq!(outcome.objective(), Some(brute_force_optimum()));
    }

    /// Counts every solve across all clones.
    #[derive(Debug, Clone, Default)]
    struct CountingSolver {
        inner: SingleRowLpSolver,
        calls: Arc<AtomicUsize>,
    }

    impl NodeLpSolver for CountingSolver {
        fn name(&self) -> &str {
            "CountingSolver"
        }

        fn solve(&mut self, problem: &Problem, lower: &[f64], upper: &[f64]) -> LpOutcome {
            self.calls.fetch_add(1, AtomicOrdering::Relaxed);
            self.inner.solve(problem, lower, upper)
        }
    }

    #[test]
    fn test_root_relaxation_is_solved_once() {
        // min x, x integer in [0.5, 1]: the root, then only the up child needs an LP.
        let mut b = ProblemBuilder::new(1);
        b.set_objective_coefficient(ColumnIndex::new(0), 1.0)
            .set_bounds(ColumnIndex::new(0), 0.5, 1.0)
            .set_variable_kind(ColumnIndex::new(0), VariableKind::Integer);
        let problem = b.build().expect("valid");

        let lp = CountingSolver::default();
        let calls = Arc::clone(&lp.calls);
        let outcome = solve_warm(
            &problem,
            BnbSettings::default()
                .with_mode(ExplorationMode::Opportunistic)
                .with_bfs_workers(1),
            lp,
            WarmStart::default(),
        );
        assert_eq!(outcome.objective(), Some(1.0));
        assert_eq!(calls.load(AtomicOrdering::Relaxed), 2);
        assert_eq!(outcome.statistics.solutions_found, 1);
    }

    #[test]
    fn test_every_improvement_is_counted() {
        let problem = knapsack();
        // A poor but feasible start: the search must improve on it at least once.
        let mut guess = vec![0.0; VALUES.len()];
        guess[7] = 1.0;
        let outcome = solve_warm(
            &problem,
            BnbSettings::default()
                .with_mode(ExplorationMode::Opportunistic)
                .with_bfs_workers(1),
            SingleRowLpSolver::new(),
            WarmStart::default().with_initial_guess(guess),
        );
        assert_eq!(outcome.objective(), Some(brute_force_optimum()));
        assert!(outcome.statistics.solutions_found >= 2);
    }

    #[test]
    fn test_zero_time_limit() {
        let problem = knapsack();
        let outcome = solve_with_settings(
            &problem,
            BnbSettings::default()
                .with_mode(ExplorationMode::Opportunistic)
                .with_time_limit(Duration::ZERO),
        );
        assert_eq!(outcome.status, MipStatus::TimeLimit);
    }
}
