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

//! # Deterministic Exploration
//!
//! Bulk-synchronous branch and bound. Work is measured in abstract units
//! charged per node and per LP iteration, never in wall-clock time, and the
//! search advances in horizons of `horizon_step` units:
//!
//! 1. The coordinator publishes a `HorizonSnapshot` to every worker.
//! 2. Start barrier. BFS workers and divers run until their clocks reach
//!    the horizon end, recording outcomes as events.
//! 3. End barrier. The coordinator collects every batch (plus external
//!    solutions stamped inside the horizon), sorts them by
//!    `(clock, worker, sequence)` and replays them into the canonical state.
//!    Then it prunes, rebalances, hands out dives, folds the state hash and
//!    checks for termination.
//!
//! Workers only ever read the snapshot and their own state during a horizon,
//! and the coordinator only acts while every worker is parked at a barrier.
//! The same input therefore yields the same event stream and the same final
//! state hash for any thread schedule, including `run_sequential`, which
//! steps all workers in turn on the calling thread.

pub mod diver;
pub mod policy;
pub mod sync;

use crate::{
    barrier::{HorizonBarrier, ShutdownOnPanic},
    diving::VariableLocks,
    driver::{SearchEnvironment, SearchHooks, SearchStart, SearchSummary, exhausted_status},
    error::{BnbError, BnbResult},
    event::merge_batches,
    heuristic::process_repairs,
    lp::{NodeLpSolver, RootRelaxation},
    monitor::tree_search_monitor::SyncReport,
    node::{Node, NodeKey, WorkerIndex},
    queue::NodeQueue,
    stats::WorkerStatistics,
    tree::NodeStatus,
};
use cairn_model::solution::MipSolution;
use cairn_search::{
    monitor::search_monitor::SearchCommand, result::MipStatus, stats::SolverStatistics,
};
use diver::{DiveEntry, DivingWorker};
use policy::{DeterministicBfs, HorizonSnapshot};
use rustc_hash::FxHashSet;
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};
use sync::{CanonicalState, DivingHeap, external_events, prune_queues, rebalance, retain_open};

/// Where the coordinator is in the horizon cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// Before the first horizon is handed out.
    #[default]
    AwaitingWork,
    /// Workers are processing nodes up to the horizon end.
    RunningHorizon,
    /// Workers are parked and the coordinator replays their events.
    Syncing,
    /// The search has ended.
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::AwaitingWork => "AwaitingWork",
            Phase::RunningHorizon => "RunningHorizon",
            Phase::Syncing => "Syncing",
            Phase::Done => "Done",
        };
        f.write_str(s)
    }
}

#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// All workers of one deterministic solve.
///
/// Each worker sits behind its own mutex. A worker thread holds its lock for
/// the length of a horizon; the coordinator takes all of them at the sync,
/// when every worker is parked at the end barrier.
#[derive(Debug)]
struct WorkerPool<L> {
    bfs: Vec<Mutex<DeterministicBfs<L>>>,
    divers: Vec<Mutex<DivingWorker<L>>>,
}

impl<L> WorkerPool<L>
where
    L: NodeLpSolver + Clone,
{
    fn new(env: &SearchEnvironment<'_>, lp: &L, root: &RootRelaxation) -> Self {
        let settings = env.settings;
        let problem = env.problem;
        let root_primal: Arc<[f64]> = Arc::from(root.primal.as_slice());
        let locks = Arc::new(VariableLocks::new(problem));

        let bfs = (0..settings.num_bfs_workers)
            .map(|i| Mutex::new(DeterministicBfs::new(WorkerIndex::new(i), lp.clone(), problem)))
            .collect();
        let divers = (0..settings.num_diving_workers)
            .map(|i| {
                Mutex::new(DivingWorker::new(
                    WorkerIndex::new(settings.num_bfs_workers + i),
                    settings.diving_strategy(i),
                    lp.clone(),
                    problem.num_columns(),
                    Arc::clone(&root_primal),
                    Arc::clone(&locks),
                ))
            })
            .collect();
        Self { bfs, divers }
    }
}

impl<L> WorkerPool<L> {
    #[inline]
    fn num_workers(&self) -> usize {
        self.bfs.len() + self.divers.len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SyncCounters {
    transfers: u64,
    dives_assigned: u64,
    stale_events: u64,
}

/// Owns the canonical state and runs everything between the barriers.
struct Coordinator<'a> {
    env: SearchEnvironment<'a>,
    root: RootRelaxation,
    state: CanonicalState,
    phase: Phase,
    horizon: u64,
    dived: FxHashSet<NodeKey>,
    diving_heap: DivingHeap,
    counters: SyncCounters,
    lower_bound: f64,
    status: Option<MipStatus>,
    started: Instant,
}

impl<'a> Coordinator<'a> {
    fn new(env: SearchEnvironment<'a>, start: SearchStart) -> Self {
        let SearchStart { root, incumbent } = start;
        let mut state = CanonicalState::new(root.objective, env.problem.num_columns());
        if let Some((objective, values)) = incumbent {
            state.offer_solution(objective, &values);
        }
        Self {
            env,
            lower_bound: root.objective,
            root,
            state,
            phase: Phase::AwaitingWork,
            horizon: 0,
            dived: FxHashSet::default(),
            diving_heap: DivingHeap::new(),
            counters: SyncCounters::default(),
            status: None,
            started: Instant::now(),
        }
    }

    /// Puts the root node on worker 0 together with its solved relaxation.
    fn seed<L: NodeLpSolver>(&self, pool: &WorkerPool<L>) {
        if let Some(first) = pool.bfs.first() {
            let mut first = lock(first);
            first.seed_solution(NodeKey::ROOT, self.root.clone().into());
            first.queue_mut().set_current(Node::root(self.root.objective));
        }
    }

    /// Publishes the next snapshot to every worker.
    fn begin_horizon<L: NodeLpSolver>(&mut self, pool: &WorkerPool<L>) {
        self.horizon += 1;
        let snapshot = HorizonSnapshot::new(
            self.horizon,
            self.env.settings.horizon_step,
            Arc::new(self.state.pseudo_costs().clone()),
            self.state.upper_bound(),
            self.state.incumbent().map(|i| Arc::clone(&i.values)),
        );
        self.env.producers.begin_horizon(self.horizon);
        for worker in &pool.bfs {
            lock(worker).begin_horizon(&snapshot);
        }
        for diver in &pool.divers {
            lock(diver).begin_horizon(&snapshot);
        }
        log::trace!(
            "Horizon {} runs [{}, {})",
            snapshot.horizon,
            snapshot.start,
            snapshot.end
        );
        self.phase = Phase::RunningHorizon;
    }

    #[inline]
    fn horizon_end(&self) -> f64 {
        self.horizon as f64 * self.env.settings.horizon_step
    }

    /// Runs one sync. Returns `false` once the search is over.
    fn sync<L: NodeLpSolver>(
        &mut self,
        pool: &WorkerPool<L>,
        hooks: &mut SearchHooks<'_>,
    ) -> BnbResult<bool> {
        self.phase = Phase::Syncing;
        let env = self.env;
        let problem = env.problem;
        let settings = env.settings;
        let end = self.horizon_end();

        env.producers
            .wait_for_horizon(self.horizon, settings.producer_timeout);
        if let Some(repair) = hooks.repair.as_deref_mut() {
            process_repairs(
                env.repairs,
                repair,
                problem,
                &self.root,
                settings.integrality_tolerance,
                env.heuristics,
                end,
            );
        }

        let mut bfs: Vec<_> = pool.bfs.iter().map(lock).collect();
        let mut divers: Vec<_> = pool.divers.iter().map(lock).collect();

        let mut batches = Vec::with_capacity(pool.num_workers() + 1);
        batches.extend(bfs.iter_mut().map(|w| w.take_events()));
        batches.extend(divers.iter_mut().map(|d| d.take_events()));
        batches.push(external_events(
            env.heuristics.drain_until(end),
            problem,
            settings.integrality_tolerance,
            hooks.repair.is_some().then_some(env.repairs),
        ));
        let events = merge_batches(batches);

        let replay = self.state.replay(&events);
        self.counters.stale_events += replay.stale as u64;
        for incumbent in &replay.improvements {
            log::debug!(
                "Horizon {}: new incumbent {}",
                self.horizon,
                problem.user_objective(incumbent.objective)
            );
            hooks.monitor.on_solution_found(&MipSolution::new(
                problem.user_objective(incumbent.objective),
                incumbent.values.to_vec(),
            ));
        }

        let ceiling = bfs
            .iter()
            .map(|w| w.lower_bound_ceiling())
            .fold(f64::INFINITY, f64::min);
        let nodes_explored = bfs.iter().map(|w| w.stats().nodes_explored).sum();

        let mut queues: Vec<&mut NodeQueue> = bfs.iter_mut().map(|w| w.queue_mut()).collect();

        let upper_bound = self.state.upper_bound();
        let nodes_pruned = if upper_bound.is_finite() {
            prune_queues(
                &mut queues,
                self.state.tree_mut(),
                upper_bound - settings.absolute_gap_tolerance,
            )
        } else {
            0
        };
        retain_open(&mut self.dived, self.state.tree());

        let transfers = rebalance(&mut queues, settings.rebalance_threshold);
        self.counters.transfers += transfers as u64;

        let mut dives_assigned = 0;
        if divers.iter().any(|d| d.is_idle()) {
            self.diving_heap
                .refresh(queues.iter().flat_map(|q| q.backlog_nodes()), &self.dived);
            for diver in divers.iter_mut().filter(|d| d.is_idle()) {
                let Some(node) = self.diving_heap.pop() else {
                    break;
                };
                self.dived.insert(node.key());
                diver.assign(DiveEntry::from_node(
                    &node,
                    problem.lower_bounds(),
                    problem.upper_bounds(),
                ));
                dives_assigned += 1;
            }
        }
        self.counters.dives_assigned += dives_assigned as u64;

        if settings.audit_node_conservation {
            self.state
                .tree()
                .audit_conservation(queues.iter().flat_map(|q| q.keys()))
                .map_err(BnbError::ConservationViolated)?;
        }

        self.state.fold_into_hash();

        self.lower_bound = self.state.tree().lower_bound().min(ceiling);
        hooks.report_bound(problem, self.lower_bound.min(upper_bound));
        let diving_pending = divers.iter().any(|d| !d.is_idle());

        let report = SyncReport {
            horizon: self.horizon,
            work: end,
            events_replayed: replay.replayed,
            stale_events: replay.stale,
            nodes_pruned,
            transfers,
            dives_assigned,
            open_nodes: self.state.tree().open_count(),
            nodes_explored,
            lower_bound: self.lower_bound,
            upper_bound,
            elapsed: self.started.elapsed(),
        };
        log::debug!("{}", report);
        hooks.monitor.on_sync(&report);
        if let SearchCommand::Terminate(reason) = hooks.monitor.search_command() {
            log::info!("Search terminated by monitor: {}", reason);
            env.control.request_halt(MipStatus::TimeLimit);
        }

        let Some(status) = self.termination(ceiling, diving_pending) else {
            return Ok(true);
        };

        // Close whatever is left so the tree accounts for every node.
        for queue in queues.iter_mut() {
            for key in queue.clear() {
                self.state.tree_mut().close(key, NodeStatus::Abandoned);
            }
        }
        for diver in divers.iter_mut() {
            diver.abandon();
        }
        log::info!("Horizon {}: stopping with {}", self.horizon, status);
        self.status = Some(status);
        self.phase = Phase::Done;
        Ok(false)
    }

    fn termination(&self, ceiling: f64, diving_pending: bool) -> Option<MipStatus> {
        let env = self.env;
        let settings = env.settings;
        let upper_bound = self.state.upper_bound();

        if env.control.is_halted() {
            return Some(match env.control.status() {
                MipStatus::Unset => MipStatus::TimeLimit,
                status => status,
            });
        }
        if settings.gap_closed(self.lower_bound, upper_bound) {
            return Some(MipStatus::Optimal);
        }
        if settings
            .time_limit
            .is_some_and(|limit| self.started.elapsed() >= limit)
        {
            env.control.request_halt(MipStatus::TimeLimit);
            return Some(MipStatus::TimeLimit);
        }
        if settings
            .work_limit
            .is_some_and(|limit| self.horizon_end() >= limit)
        {
            return Some(MipStatus::WorkLimit);
        }
        if self.state.numerical_failures() > settings.max_numerical_failures {
            log::warn!(
                "{} numerical failures exceed the limit of {}",
                self.state.numerical_failures(),
                settings.max_numerical_failures
            );
            return Some(MipStatus::Numerical);
        }
        if self.state.tree().open_count() == 0 && !diving_pending {
            return Some(exhausted_status(upper_bound, ceiling, settings));
        }
        None
    }

    fn finish<L: NodeLpSolver>(self, pool: WorkerPool<L>, threads: usize) -> SearchSummary {
        let mut worker_stats = WorkerStatistics::default();
        for worker in pool.bfs {
            worker_stats += *worker
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .stats();
        }
        for diver in pool.divers {
            worker_stats += *diver
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .stats();
        }

        let pruned = self.state.tree().count(NodeStatus::Pruned) as u64;
        let statistics = SolverStatistics {
            nodes_explored: worker_stats.nodes_explored,
            nodes_branched: worker_stats.nodes_branched,
            nodes_fathomed: worker_stats.nodes_fathomed + pruned,
            nodes_infeasible: worker_stats.nodes_infeasible,
            nodes_integer: worker_stats.nodes_integer,
            numerical_failures: self.state.numerical_failures(),
            lp_iterations: worker_stats.lp_iterations + self.root.iterations,
            solutions_found: self.state.history().len() as u64,
            horizons: self.horizon,
            rebalance_transfers: self.counters.transfers,
            dives_assigned: self.counters.dives_assigned,
            stale_events: self.counters.stale_events,
            used_threads: threads,
            ..SolverStatistics::default()
        };

        let status = self.status.unwrap_or(MipStatus::Unset);
        let incumbent = self
            .state
            .incumbent()
            .map(|i| (i.objective, i.values.to_vec()));
        SearchSummary {
            status,
            incumbent,
            lower_bound: self.lower_bound,
            statistics,
            state_hash: Some(self.state.state_hash()),
        }
    }
}

/// Runs the deterministic search with one thread per worker.
///
/// The coordinator is barrier participant 0 and runs on the calling thread.
pub fn run<L>(
    env: &SearchEnvironment<'_>,
    lp: L,
    start: SearchStart,
    hooks: &mut SearchHooks<'_>,
) -> BnbResult<SearchSummary>
where
    L: NodeLpSolver + Clone,
{
    let pool = WorkerPool::new(env, &lp, &start.root);
    let num_bfs = pool.bfs.len();
    let participants = pool.num_workers() + 1;
    let start_barrier = HorizonBarrier::new(participants);
    let end_barrier = HorizonBarrier::new(participants);
    let barriers = [&start_barrier, &end_barrier];
    let ctx = env.context();

    let mut coordinator = Coordinator::new(*env, start);
    coordinator.seed(&pool);

    let outcome = std::thread::scope(|s| {
        let mut handles = Vec::with_capacity(pool.num_workers());
        for (i, worker) in pool.bfs.iter().enumerate() {
            let barriers = &barriers;
            handles.push(s.spawn(move || {
                let _guard = ShutdownOnPanic::new(barriers);
                let participant = i + 1;
                loop {
                    if barriers[0].wait(participant).is_shutdown() {
                        break;
                    }
                    lock(worker).run_horizon(&ctx);
                    if barriers[1].wait(participant).is_shutdown() {
                        break;
                    }
                }
            }));
        }
        for (i, diver) in pool.divers.iter().enumerate() {
            let barriers = &barriers;
            handles.push(s.spawn(move || {
                let _guard = ShutdownOnPanic::new(barriers);
                let participant = num_bfs + i + 1;
                loop {
                    if barriers[0].wait(participant).is_shutdown() {
                        break;
                    }
                    lock(diver).run_horizon(&ctx);
                    if barriers[1].wait(participant).is_shutdown() {
                        break;
                    }
                }
            }));
        }

        let result = {
            let _guard = ShutdownOnPanic::new(&barriers);
            let mut result = Ok(());
            loop {
                coordinator.begin_horizon(&pool);
                if start_barrier.wait(0).is_shutdown() || end_barrier.wait(0).is_shutdown() {
                    break;
                }
                match coordinator.sync(&pool, hooks) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }
            start_barrier.shutdown();
            end_barrier.shutdown();
            result
        };

        let mut panicked = None;
        for handle in handles {
            if let Err(payload) = handle.join() {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                log::error!("Worker thread panicked: {}", message);
                panicked.get_or_insert(message);
            }
        }
        match panicked {
            Some(message) => Err(BnbError::WorkerPanicked(message)),
            None => result,
        }
    });
    outcome?;

    let threads = pool.num_workers();
    Ok(coordinator.finish(pool, threads))
}

/// Runs the same protocol on the calling thread, workers stepped in id order.
///
/// Produces the same events, incumbent and state hash as `run`.
pub fn run_sequential<L>(
    env: &SearchEnvironment<'_>,
    lp: L,
    start: SearchStart,
    hooks: &mut SearchHooks<'_>,
) -> BnbResult<SearchSummary>
where
    L: NodeLpSolver + Clone,
{
    let pool = WorkerPool::new(env, &lp, &start.root);
    let ctx = env.context();
    let mut coordinator = Coordinator::new(*env, start);
    coordinator.seed(&pool);

    loop {
        coordinator.begin_horizon(&pool);
        for worker in &pool.bfs {
            lock(worker).run_horizon(&ctx);
        }
        for diver in &pool.divers {
            lock(diver).run_horizon(&ctx);
        }
        if !coordinator.sync(&pool, hooks)? {
            break;
        }
    }
    debug_assert_eq!(coordinator.phase, Phase::Done);
    Ok(coordinator.finish(pool, 1))
}
