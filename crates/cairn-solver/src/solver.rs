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

//! # Solver Facade
//!
//! One entry point over both exploration modes of `cairn_bnb`.
//!
//! ## Highlights
//!
//! - Builder pattern:
//!   - `SolverBuilder` collects the node LP solver, the `BnbSettings`, an
//!     optional root relaxation, an initial guess, monitors, a repair
//!     heuristic, a bound callback and an interrupt flag.
//! - External channels:
//!   - `SolverHandle` is a cheap, cloneable handle for other threads. It
//!     submits heuristic solutions, registers producers that the
//!     deterministic coordinator waits for, and halts a running solve.
//! - Monitor stack:
//!   - Per solve, an interrupt monitor (if a flag was given) and every
//!     registered monitor are combined into one composite. `SearchMonitor`s
//!     from `cairn_search` run through `SearchMonitorAdapter`.
//!
//! ## Usage
//!
//! ```rust
//! use cairn_bnb::lp::single_row::SingleRowLpSolver;
//! use cairn_model::index::ColumnIndex;
//! use cairn_model::problem::{ObjectiveSense, ProblemBuilder, RowSense, VariableKind};
//! use cairn_solver::solver::SolverBuilder;
//!
//! let mut b = ProblemBuilder::new(2);
//! b.set_sense(ObjectiveSense::Maximize);
//! for (j, v) in [3.0, 2.0].into_iter().enumerate() {
//!     b.set_objective_coefficient(ColumnIndex::new(j), v)
//!         .set_variable_kind(ColumnIndex::new(j), VariableKind::Binary);
//! }
//! b.add_row([(ColumnIndex::new(0), 2.0), (ColumnIndex::new(1), 2.0)], RowSense::LessEqual, 3.0);
//! let problem = b.build().unwrap();
//!
//! let mut solver = SolverBuilder::new(SingleRowLpSolver::new())
//!     .with_workers(2, 1)
//!     .build();
//! let outcome = solver.solve(&problem).unwrap();
//! assert!(outcome.is_optimal());
//! assert_eq!(outcome.objective(), Some(3.0));
//! ```

use cairn_bnb::{
    driver::{Execution, SearchEnvironment, SearchHooks, WarmStart, solve_with},
    error::BnbResult,
    heuristic::{HeuristicQueue, RepairHeuristic, RepairQueue},
    lp::{NodeLpSolver, RootRelaxation},
    monitor::{
        adapter::SearchMonitorAdapter, composite::CompositeTreeSearchMonitor,
        tree_search_monitor::TreeSearchMonitor,
    },
    producer::{ProducerId, ProducerSync},
    settings::{BnbSettings, ExplorationMode, WorkModel},
};
use cairn_model::problem::Problem;
use cairn_search::{
    control::SearchControl,
    monitor::{interrupt::InterruptMonitor, search_monitor::SearchMonitor},
    result::{MipStatus, SolverOutcome},
};
use std::{
    sync::{Arc, atomic::AtomicBool},
    time::Duration,
};

#[derive(Debug, Default)]
struct SharedChannels {
    control: SearchControl,
    heuristics: HeuristicQueue,
    repairs: RepairQueue,
    producers: ProducerSync,
}

/// Thread-safe access to a solver's external channels.
#[derive(Debug, Clone)]
pub struct SolverHandle {
    channels: Arc<SharedChannels>,
}

impl SolverHandle {
    /// Queues an externally found solution, stamped with the work units at which it counts.
    ///
    /// In deterministic mode it enters the search at the first sync whose
    /// horizon end is at or past `timestamp`.
    #[inline]
    pub fn submit_solution(&self, values: Vec<f64>, timestamp: f64) {
        self.channels.heuristics.submit(values, timestamp);
    }

    /// Registers a solution producer.
    ///
    /// A deterministic search waits at every sync until each registered
    /// producer has delivered or declined the current horizon.
    ///
    /// # Returns
    ///
    /// The id to deliver, decline and deregister with.
    #[inline]
    pub fn register_producer(&self) -> ProducerId {
        self.channels.producers.register()
    }

    /// Stops the search from waiting for producer `id`.
    #[inline]
    pub fn deregister_producer(&self, id: ProducerId) {
        self.channels.producers.deregister(id);
    }

    /// The horizon producers should currently work towards.
    #[inline]
    pub fn current_horizon(&self) -> u64 {
        self.channels.producers.current_horizon()
    }

    /// Submits `values` for `horizon` and marks the producer as done with it.
    pub fn deliver(&self, id: ProducerId, horizon: u64, values: Vec<f64>, timestamp: f64) {
        self.channels.heuristics.submit(values, timestamp);
        self.channels.producers.deliver(id, horizon);
    }

    /// Marks the producer as done with `horizon` without a solution.
    #[inline]
    pub fn decline(&self, id: ProducerId, horizon: u64) {
        self.channels.producers.decline(id, horizon);
    }

    /// Asks a running solve to stop. It ends with `TIME_LIMIT`.
    #[inline]
    pub fn halt(&self) -> bool {
        self.channels.control.request_halt(MipStatus::TimeLimit)
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.channels.control.is_halted()
    }
}

/// A configured branch-and-bound solver.
///
/// Built with `SolverBuilder`. A solver can solve any number of problems
/// one after another; monitors, the repair heuristic and the bound callback
/// carry over between solves.
pub struct Solver<'a, L> {
    lp: L,
    settings: BnbSettings,
    execution: Execution,
    root: Option<RootRelaxation>,
    initial_guess: Option<Vec<f64>>,
    bound_callback: Option<Box<dyn FnMut(f64) + 'a>>,
    monitors: CompositeTreeSearchMonitor<'a>,
    search_monitors: Vec<Box<dyn SearchMonitor + 'a>>,
    repair: Option<Box<dyn RepairHeuristic + 'a>>,
    interrupt: Option<&'a AtomicBool>,
    channels: Arc<SharedChannels>,
}

impl<L> std::fmt::Debug for Solver<'_, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solver")
            .field("settings", &self.settings)
            .field("execution", &self.execution)
            .field("monitors", &self.monitors)
            .field("search_monitors", &self.search_monitors.len())
            .field("repair", &self.repair.as_ref().map(|r| r.name().to_string()))
            .field("initial_guess", &self.initial_guess.as_ref().map(Vec::len))
            .field("bound_callback", &self.bound_callback.is_some())
            .finish()
    }
}

impl<'a, L> Solver<'a, L>
where
    L: NodeLpSolver + Clone,
{
    #[inline]
    pub fn settings(&self) -> &BnbSettings {
        &self.settings
    }

    /// A handle that other threads can use while `solve` runs.
    #[inline]
    pub fn handle(&self) -> SolverHandle {
        SolverHandle {
            channels: Arc::clone(&self.channels),
        }
    }

    /// Adds a tree search monitor for all later solves.
    #[inline]
    pub fn add_monitor<M>(&mut self, monitor: M)
    where
        M: TreeSearchMonitor + 'a,
    {
        self.monitors.add_monitor(monitor);
    }

    #[inline]
    pub fn add_search_monitor<M>(&mut self, monitor: M)
    where
        M: SearchMonitor + 'a,
    {
        self.search_monitors.push(Box::new(monitor));
    }

    /// Replaces the root relaxation used by the next solve.
    #[inline]
    pub fn set_root_relaxation(&mut self, root: Option<RootRelaxation>) {
        self.root = root;
    }

    /// Replaces the candidate solution checked before the next solve.
    ///
    /// A feasible guess becomes the first incumbent. An infeasible one goes
    /// to the repair heuristic if there is one and is dropped otherwise.
    ///
    /// # Arguments
    ///
    /// * `values` - One value per column, or `None` to start without a guess.
    #[inline]
    pub fn set_initial_guess(&mut self, values: Option<Vec<f64>>) {
        self.initial_guess = values;
    }

    /// Replaces the callback that receives each improvement of the global
    /// bound, in the problem's objective sense.
    #[inline]
    pub fn set_user_bound_callback<F>(&mut self, callback: F)
    where
        F: FnMut(f64) + 'a,
    {
        self.bound_callback = Some(Box::new(callback));
    }

    /// Solves `problem`. A halt requested before this call is cleared.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve.
    ///
    /// # Returns
    ///
    /// The outcome in the problem's objective sense, or an error if the
    /// settings, the root relaxation or the initial guess do not fit.
    pub fn solve(&mut self, problem: &Problem) -> BnbResult<SolverOutcome> {
        let channels = &*self.channels;
        channels.control.reset();
        log::info!(
            "Solving {} columns x {} rows in {} mode with {} thread(s)",
            problem.num_columns(),
            problem.num_rows(),
            self.settings.mode,
            self.settings.num_threads()
        );

        let mut interrupt = self.interrupt.map(InterruptMonitor::new);
        let mut monitor = CompositeTreeSearchMonitor::with_capacity(2 + self.search_monitors.len());
        if let Some(interrupt) = interrupt.as_mut() {
            monitor.add_monitor(SearchMonitorAdapter::new(interrupt));
        }
        for search_monitor in &mut self.search_monitors {
            monitor.add_monitor(SearchMonitorAdapter::new(search_monitor.as_mut()));
        }
        monitor.add_monitor(&mut self.monitors);

        let env = SearchEnvironment {
            problem,
            settings: &self.settings,
            control: &channels.control,
            heuristics: &channels.heuristics,
            repairs: &channels.repairs,
            producers: &channels.producers,
        };
        let repair = self
            .repair
            .as_mut()
            .map(|r| -> &mut dyn RepairHeuristic { r.as_mut() });
        let mut hooks = SearchHooks::new(&mut monitor);
        if let Some(repair) = repair {
            hooks = hooks.with_repair(repair);
        }
        if let Some(callback) = self.bound_callback.as_mut() {
            hooks = hooks.with_bound_callback(callback.as_mut());
        }
        let warm = WarmStart {
            root: self.root.clone(),
            initial_guess: self.initial_guess.clone(),
        };
        solve_with(&env, self.lp.clone(), warm, hooks, self.execution)
    }
}

/// Builder for `Solver`.
pub struct SolverBuilder<'a, L> {
    lp: L,
    settings: BnbSettings,
    execution: Execution,
    root: Option<RootRelaxation>,
    initial_guess: Option<Vec<f64>>,
    bound_callback: Option<Box<dyn FnMut(f64) + 'a>>,
    monitors: CompositeTreeSearchMonitor<'a>,
    search_monitors: Vec<Box<dyn SearchMonitor + 'a>>,
    repair: Option<Box<dyn RepairHeuristic + 'a>>,
    interrupt: Option<&'a AtomicBool>,
}

impl<'a, L> SolverBuilder<'a, L>
where
    L: NodeLpSolver + Clone,
{
    /// A builder with default settings that solves node relaxations with `lp`.
    ///
    /// # Arguments
    ///
    /// * `lp` - Cloned once per worker.
    ///
    /// # Returns
    ///
    /// A builder for a threaded solver with no monitors.
    #[inline]
    pub fn new(lp: L) -> Self {
        Self {
            lp,
            settings: BnbSettings::default(),
            execution: Execution::Threaded,
            root: None,
            initial_guess: None,
            bound_callback: None,
            monitors: CompositeTreeSearchMonitor::new(),
            search_monitors: Vec::new(),
            repair: None,
            interrupt: None,
        }
    }

    #[inline]
    pub fn with_settings(mut self, settings: BnbSettings) -> Self {
        self.settings = settings;
        self
    }

    #[inline]
    pub fn with_mode(mut self, mode: ExplorationMode) -> Self {
        self.settings.mode = mode;
        self
    }

    /// Sets the number of BFS and diving workers.
    #[inline]
    pub fn with_workers(mut self, bfs: usize, diving: usize) -> Self {
        self.settings.num_bfs_workers = bfs;
        self.settings.num_diving_workers = diving;
        self
    }

    #[inline]
    pub fn with_horizon_step(mut self, step: f64) -> Self {
        self.settings.horizon_step = step;
        self
    }

    #[inline]
    pub fn with_work_model(mut self, model: WorkModel) -> Self {
        self.settings.work_model = model;
        self
    }

    /// Halts with `TIME_LIMIT` once `limit` of wall-clock time has passed.
    #[inline]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.settings.time_limit = Some(limit);
        self
    }

    /// Halts with `WORK_LIMIT` once the work clock passes `limit`.
    #[inline]
    pub fn with_work_limit(mut self, limit: f64) -> Self {
        self.settings.work_limit = Some(limit);
        self
    }

    /// Runs the deterministic protocol on the calling thread only.
    #[inline]
    pub fn sequential(mut self) -> Self {
        self.execution = Execution::Sequential;
        self
    }

    /// Skips the root solve and starts from `root` instead.
    #[inline]
    pub fn with_root_relaxation(mut self, root: RootRelaxation) -> Self {
        self.root = Some(root);
        self
    }

    /// Checks `values` before the search and, if feasible, starts with it
    /// as the incumbent.
    ///
    /// # Arguments
    ///
    /// * `values` - One value per column of the problem to be solved.
    ///
    /// # Returns
    ///
    /// The updated builder.
    #[inline]
    pub fn with_initial_guess(mut self, values: Vec<f64>) -> Self {
        self.initial_guess = Some(values);
        self
    }

    /// Calls `callback` with the global bound, in the problem's objective
    /// sense, each time it improves.
    ///
    /// The callback runs on the thread that called `Solver::solve`.
    #[inline]
    pub fn with_user_bound_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(f64) + 'a,
    {
        self.bound_callback = Some(Box::new(callback));
        self
    }

    /// Enables or disables tightening bounds from the root reduced costs.
    #[inline]
    pub fn with_reduced_cost_fixing(mut self, enabled: bool) -> Self {
        self.settings.reduced_cost_fixing = enabled;
        self
    }

    #[inline]
    pub fn with_repair_heuristic<R>(mut self, repair: R) -> Self
    where
        R: RepairHeuristic + 'a,
    {
        self.repair = Some(Box::new(repair));
        self
    }

    /// Halts the search once `flag` is raised.
    #[inline]
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    #[inline]
    pub fn add_monitor<M>(mut self, monitor: M) -> Self
    where
        M: TreeSearchMonitor + 'a,
    {
        self.monitors.add_monitor(monitor);
        self
    }

    #[inline]
    pub fn add_search_monitor<M>(mut self, monitor: M) -> Self
    where
        M: SearchMonitor + 'a,
    {
        self.search_monitors.push(Box::new(monitor));
        self
    }

    #[inline]
    pub fn build(self) -> Solver<'a, L> {
        Solver {
            lp: self.lp,
            settings: self.settings,
            execution: self.execution,
            root: self.root,
            initial_guess: self.initial_guess,
            bound_callback: self.bound_callback,
            monitors: self.monitors,
            search_monitors: self.search_monitors,
            repair: self.repair,
            interrupt: self.interrupt,
            channels: Arc::new(SharedChannels::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_bnb::lp::single_row::SingleRowLpSolver;
    use cairn_model::{
        index::ColumnIndex,
        problem::{ProblemBuilder, VariableKind},
    };
    use std::sync::atomic::Ordering;

    fn half_problem() -> Problem {
        let mut b = ProblemBuilder::new(1);
        b.set_objective_coefficient(ColumnIndex::new(0), 1.0)
            .set_bounds(ColumnIndex::new(0), 0.5, 4.0)
            .set_variable_kind(ColumnIndex::new(0), VariableKind::Integer);
        b.build().expect("valid")
    }

    #[test]
    fn test_builder_applies_settings() {
        let solver = SolverBuilder::new(SingleRowLpSolver::new())
            .with_mode(ExplorationMode::Opportunistic)
            .with_workers(3, 0)
            .with_horizon_step(2.0)
            .with_work_limit(100.0)
            .build();
        let settings = solver.settings();
        assert_eq!(settings.mode, ExplorationMode::Opportunistic);
        assert_eq!(settings.num_bfs_workers, 3);
        assert_eq!(settings.num_diving_workers, 0);
        assert_eq!(settings.horizon_step, 2.0);
        assert_eq!(settings.work_limit, Some(100.0));
    }

    #[test]
    fn test_builder_can_disable_reduced_cost_fixing() {
        let solver = SolverBuilder::new(SingleRowLpSolver::new())
            .with_reduced_cost_fixing(false)
            .build();
        assert!(!solver.settings().reduced_cost_fixing);
    }

    #[test]
    fn test_initial_guess_is_kept_until_replaced() {
        let problem = half_problem();
        let mut solver = SolverBuilder::new(SingleRowLpSolver::new())
            .with_initial_guess(vec![1.0, 2.0])
            .build();
        assert!(solver.solve(&problem).is_err());
        solver.set_initial_guess(Some(vec![2.0]));
        let outcome = solver.solve(&problem).expect("solve");
        assert_eq!(outcome.objective(), Some(1.0));
        solver.set_initial_guess(None);
        assert!(solver.solve(&problem).expect("solve").is_optimal());
    }

    #[test]
    fn test_bound_callback_sees_final_bound() {
        let problem = half_problem();
        let mut bounds = Vec::new();
        {
            let mut solver = SolverBuilder::new(SingleRowLpSolver::new())
                .with_user_bound_callback(|bound| bounds.push(bound))
                .build();
            let outcome = solver.solve(&problem).expect("solve");
            assert!(outcome.is_optimal());
        }
        assert_eq!(bounds.last().copied(), Some(1.0));
    }

    #[test]
    fn test_solver_can_be_reused() {
        let problem = half_problem();
        let mut solver = SolverBuilder::new(SingleRowLpSolver::new()).build();
        let first = solver.solve(&problem).expect("solve");
        let second = solver.solve(&problem).expect("solve");
        assert_eq!(first.objective(), Some(1.0));
        assert_eq!(first.state_hash, second.state_hash);
    }

    #[test]
    fn test_raised_interrupt_stops_the_search() {
        let flag = AtomicBool::new(true);
        let problem = half_problem();
        let mut solver = SolverBuilder::new(SingleRowLpSolver::new())
            .with_interrupt(&flag)
            .build();
        let outcome = solver.solve(&problem).expect("solve");
        assert_eq!(outcome.status, MipStatus::TimeLimit);
        flag.store(false, Ordering::Relaxed);
        assert!(solver.solve(&problem).expect("solve").is_optimal());
    }
}
