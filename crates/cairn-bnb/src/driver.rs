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

//! # Search Driver
//!
//! The entry point shared by both exploration modes:
//!
//! 1. Validates the settings and announces the search to the monitor.
//! 2. Checks the caller's initial guess. A feasible guess becomes the first
//!    incumbent; an infeasible one goes to the repair queue if a repair
//!    heuristic is installed and is dropped otherwise.
//! 3. Obtains the root relaxation (given by the caller or solved with a clone
//!    of the node solver) and settles the trivial cases: an infeasible,
//!    unbounded, failed or already integral root ends the solve here, and so
//!    does a root bound that already meets the incumbent.
//! 4. Tightens column bounds with the root reduced costs when an incumbent
//!    exists.
//! 5. Hands the root node, together with its solved relaxation, to the
//!    deterministic coordinator or the opportunistic scheduler.
//! 6. Turns the mode's `SearchSummary` into a `SolverOutcome` in the
//!    caller's objective sense.

use crate::{
    deterministic,
    error::{BnbError, BnbResult},
    heuristic::{HeuristicQueue, RepairHeuristic, RepairQueue},
    lp::{LpSolution, NodeLpSolver, RootOutcome, RootRelaxation, solve_root},
    monitor::tree_search_monitor::TreeSearchMonitor,
    opportunistic,
    producer::ProducerSync,
    reduced_cost::{ReducedCostFixing, reduced_cost_fixings},
    settings::{BnbSettings, ExplorationMode},
    worker::SearchContext,
};
use cairn_core::num::float::round_to_integer;
use cairn_model::{problem::Problem, solution::MipSolution};
use cairn_search::{
    control::SearchControl,
    result::{MipStatus, SolverOutcome},
    stats::SolverStatistics,
};
use std::time::Instant;

/// Shared, read-only inputs of one solve.
#[derive(Debug, Clone, Copy)]
pub struct SearchEnvironment<'a> {
    pub problem: &'a Problem,
    pub settings: &'a BnbSettings,
    pub control: &'a SearchControl,
    pub heuristics: &'a HeuristicQueue,
    pub repairs: &'a RepairQueue,
    pub producers: &'a ProducerSync,
}

impl<'a> SearchEnvironment<'a> {
    /// The subset of the environment a worker needs during a node step.
    #[inline]
    pub fn context(&self) -> SearchContext<'a> {
        SearchContext {
            problem: self.problem,
            settings: self.settings,
            control: self.control,
        }
    }
}

/// Caller-supplied callbacks. Only the coordinating thread touches them.
pub struct SearchHooks<'h> {
    pub monitor: &'h mut dyn TreeSearchMonitor,
    pub repair: Option<&'h mut dyn RepairHeuristic>,
    bound_callback: Option<&'h mut dyn FnMut(f64)>,
    /// Last bound handed to `bound_callback`, minimisation form.
    reported_bound: f64,
}

impl<'h> SearchHooks<'h> {
    /// Hooks with a monitor and nothing else.
    ///
    /// # Arguments
    ///
    /// * `monitor` - Receives every search notification.
    ///
    /// # Returns
    ///
    /// Hooks without a repair heuristic or bound callback.
    pub fn new(monitor: &'h mut dyn TreeSearchMonitor) -> Self {
        Self {
            monitor,
            repair: None,
            bound_callback: None,
            reported_bound: f64::NEG_INFINITY,
        }
    }

    /// Installs a repair heuristic for infeasible external solutions.
    #[inline]
    pub fn with_repair(mut self, repair: &'h mut dyn RepairHeuristic) -> Self {
        self.repair = Some(repair);
        self
    }

    /// Installs a callback that receives the global bound in the caller's
    /// objective sense each time it improves.
    ///
    /// # Arguments
    ///
    /// * `callback` - Called on the coordinating thread with the new bound.
    ///
    /// # Returns
    ///
    /// The updated hooks.
    #[inline]
    pub fn with_bound_callback(mut self, callback: &'h mut dyn FnMut(f64)) -> Self {
        self.bound_callback = Some(callback);
        self
    }

    /// Passes `lower_bound` on to the bound callback if it improves on the
    /// last one passed.
    ///
    /// # Arguments
    ///
    /// * `problem` - Converts the bound into the caller's objective sense.
    /// * `lower_bound` - The global bound in minimisation form.
    pub fn report_bound(&mut self, problem: &Problem, lower_bound: f64) {
        let Some(callback) = self.bound_callback.as_deref_mut() else {
            return;
        };
        if lower_bound.is_nan() || lower_bound <= self.reported_bound {
            return;
        }
        self.reported_bound = lower_bound;
        callback(problem.user_objective(lower_bound));
    }
}

impl std::fmt::Debug for SearchHooks<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchHooks")
            .field("monitor", &self.monitor.name())
            .field("repair", &self.repair.as_ref().map(|r| r.name().to_string()))
            .field("bound_callback", &self.bound_callback.is_some())
            .finish()
    }
}

/// What a solve may start from besides the problem itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WarmStart {
    /// The root relaxation, when it was solved elsewhere.
    pub root: Option<RootRelaxation>,
    /// A candidate solution, one value per column.
    pub initial_guess: Option<Vec<f64>>,
}

impl WarmStart {
    /// Starts from a root relaxation solved elsewhere.
    #[inline]
    pub fn from_root(root: RootRelaxation) -> Self {
        Self {
            root: Some(root),
            initial_guess: None,
        }
    }

    /// Adds a candidate solution to check before the search.
    ///
    /// # Arguments
    ///
    /// * `values` - One value per column of the problem.
    ///
    /// # Returns
    ///
    /// The updated warm start.
    #[inline]
    pub fn with_initial_guess(mut self, values: Vec<f64>) -> Self {
        self.initial_guess = Some(values);
        self
    }
}

/// Where an exploration mode begins.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchStart {
    /// The root relaxation. The root node reuses it instead of solving again.
    pub root: RootRelaxation,
    /// The incumbent known before the search, minimisation form.
    pub incumbent: Option<(f64, Vec<f64>)>,
}

impl SearchStart {
    /// A start without an incumbent.
    #[inline]
    pub fn from_root(root: RootRelaxation) -> Self {
        Self {
            root,
            incumbent: None,
        }
    }

    /// The root relaxation as the root node's LP solution.
    #[inline]
    pub fn root_solution(&self) -> LpSolution {
        self.root.clone().into()
    }
}

/// What an exploration mode reports back. Objectives are in minimisation form.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSummary {
    pub status: MipStatus,
    pub incumbent: Option<(f64, Vec<f64>)>,
    pub lower_bound: f64,
    pub statistics: SolverStatistics,
    pub state_hash: Option<u64>,
}

/// How the deterministic protocol is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Execution {
    /// One thread per worker plus the coordinator.
    #[default]
    Threaded,
    /// Every worker stepped in turn on the calling thread.
    Sequential,
}

/// Status of a search whose tree ran empty.
///
/// A numerical failure below the incumbent means part of the tree was never
/// proven, so the result cannot be called optimal.
pub(crate) fn exhausted_status(upper_bound: f64, ceiling: f64, settings: &BnbSettings) -> MipStatus {
    if ceiling < upper_bound - settings.absolute_gap_tolerance {
        return MipStatus::Numerical;
    }
    if upper_bound.is_finite() {
        MipStatus::Optimal
    } else {
        MipStatus::Infeasible
    }
}

/// Integral columns rounded onto their integers.
pub(crate) fn rounded_point(problem: &Problem, x: &[f64], tolerance: f64) -> Vec<f64> {
    let mut values = x.to_vec();
    for &column in problem.integer_columns() {
        let j = column.get();
        values[j] = round_to_integer(values[j], tolerance);
    }
    values
}

enum RootStart {
    Search(SearchStart, Option<ReducedCostFixing>),
    Finished(SearchSummary),
}

fn finished(status: MipStatus, incumbent: Option<(f64, Vec<f64>)>, lower_bound: f64) -> RootStart {
    RootStart::Finished(SearchSummary {
        status,
        incumbent,
        lower_bound,
        statistics: SolverStatistics::default(),
        state_hash: None,
    })
}

/// Checks the caller's initial guess.
///
/// Returns the accepted incumbent in minimisation form, or `None` if there
/// was no guess or it is infeasible.
fn accept_initial_guess(
    env: &SearchEnvironment<'_>,
    guess: Option<Vec<f64>>,
    repairable: bool,
) -> BnbResult<Option<(f64, Vec<f64>)>> {
    let Some(values) = guess else {
        return Ok(None);
    };
    let problem = env.problem;
    if values.len() != problem.num_columns() {
        return Err(BnbError::GuessDimensionMismatch {
            expected: problem.num_columns(),
            actual: values.len(),
        });
    }

    let tolerance = env.settings.integrality_tolerance;
    if !problem.is_feasible(&values, tolerance) {
        if repairable {
            log::info!("Initial guess is infeasible; queued for repair");
            env.repairs.push(values);
        } else {
            log::info!("Initial guess is infeasible and is ignored");
        }
        return Ok(None);
    }

    let values = rounded_point(problem, &values, tolerance);
    let objective = problem.internal_objective(&values);
    log::info!("Initial guess accepted at {}", problem.user_objective(objective));
    Ok(Some((objective, values)))
}

fn start_from_root<L>(
    env: &SearchEnvironment<'_>,
    lp: &L,
    root: Option<RootRelaxation>,
    incumbent: Option<(f64, Vec<f64>)>,
) -> BnbResult<RootStart>
where
    L: NodeLpSolver + Clone,
{
    let problem = env.problem;
    let relaxation = match root {
        Some(root) => root,
        None => match solve_root(&mut lp.clone(), problem) {
            RootOutcome::Solved(root) => root,
            RootOutcome::Infeasible => {
                log::info!("Root relaxation is infeasible");
                return Ok(finished(MipStatus::Infeasible, None, f64::INFINITY));
            }
            RootOutcome::Unbounded => {
                log::info!("Root relaxation is unbounded");
                return Ok(finished(MipStatus::Unbounded, incumbent, f64::NEG_INFINITY));
            }
            RootOutcome::Numerical => {
                log::warn!("Root relaxation failed numerically");
                return Ok(finished(MipStatus::Numerical, incumbent, f64::NEG_INFINITY));
            }
        },
    };

    if relaxation.primal.len() != problem.num_columns() {
        return Err(BnbError::RootDimensionMismatch {
            expected: problem.num_columns(),
            actual: relaxation.primal.len(),
        });
    }

    let settings = env.settings;
    let tolerance = settings.integrality_tolerance;
    if problem.is_integer_feasible(&relaxation.primal, tolerance) {
        let values = rounded_point(problem, &relaxation.primal, tolerance);
        let objective = problem.internal_objective(&values);
        log::info!("Root relaxation is integral at {}", objective);
        return Ok(finished(
            MipStatus::Optimal,
            Some((objective, values)),
            relaxation.objective.min(objective),
        ));
    }

    let upper_bound = incumbent.as_ref().map_or(f64::INFINITY, |(objective, _)| *objective);
    if settings.gap_closed(relaxation.objective, upper_bound) {
        log::info!("Root bound {} meets the incumbent", relaxation.objective);
        return Ok(finished(MipStatus::Optimal, incumbent, relaxation.objective));
    }

    let fixing = if settings.reduced_cost_fixing {
        reduced_cost_fixings(problem, &relaxation, upper_bound, tolerance)
    } else {
        None
    };
    if fixing.as_ref().is_some_and(|f| f.conflict) {
        log::info!("Reduced-cost fixing leaves no room below the incumbent");
        return Ok(finished(MipStatus::Optimal, incumbent, upper_bound));
    }

    Ok(RootStart::Search(
        SearchStart {
            root: relaxation,
            incumbent,
        },
        fixing,
    ))
}

fn into_outcome(
    env: &SearchEnvironment<'_>,
    summary: SearchSummary,
    started: Instant,
) -> SolverOutcome {
    let problem = env.problem;
    let upper_bound = summary
        .incumbent
        .as_ref()
        .map_or(f64::INFINITY, |(objective, _)| *objective);
    let bound = problem.user_objective(summary.lower_bound.min(upper_bound));
    let solution = summary
        .incumbent
        .map(|(objective, values)| MipSolution::new(problem.user_objective(objective), values));

    let producer = env.producers.statistics();
    let mut statistics = summary.statistics;
    statistics.producer_waits = producer.waits;
    statistics.producer_timeouts = producer.timeouts;
    statistics.producer_wait_time = producer.total_wait;
    statistics.solutions_found = statistics.solutions_found.max(u64::from(solution.is_some()));
    statistics.used_threads = statistics.used_threads.max(1);
    statistics.solve_duration = started.elapsed();

    SolverOutcome::new(summary.status, solution, bound, statistics, summary.state_hash)
}

/// Runs a complete branch-and-bound solve in the mode chosen by the settings.
///
/// # Arguments
///
/// * `env` - The problem, settings and shared queues of this solve.
/// * `lp` - The node solver prototype; every worker gets a clone.
/// * `warm` - Root relaxation and initial guess, if the caller has them.
/// * `hooks` - Monitor, repair heuristic and bound callback.
///
/// # Returns
///
/// The outcome in the caller's objective sense, or an error if the settings
/// or the warm start are invalid, or a worker panicked.
pub fn solve<L>(
    env: &SearchEnvironment<'_>,
    lp: L,
    warm: WarmStart,
    hooks: SearchHooks<'_>,
) -> BnbResult<SolverOutcome>
where
    L: NodeLpSolver + Clone,
{
    solve_with(env, lp, warm, hooks, Execution::Threaded)
}

/// As `solve`, choosing how a deterministic search is executed.
///
/// `Execution` has no effect in opportunistic mode, which always runs threaded.
pub fn solve_with<L>(
    env: &SearchEnvironment<'_>,
    lp: L,
    warm: WarmStart,
    mut hooks: SearchHooks<'_>,
    execution: Execution,
) -> BnbResult<SolverOutcome>
where
    L: NodeLpSolver + Clone,
{
    env.settings.validate()?;
    let started = Instant::now();
    hooks.monitor.on_enter_search(env.problem, env.settings);
    log::info!(
        "Starting {} search with {} thread(s)",
        env.settings.mode,
        env.settings.num_threads()
    );

    let problem = env.problem;
    let guess = accept_initial_guess(env, warm.initial_guess, hooks.repair.is_some())?;
    let guess_objective = guess.as_ref().map(|(objective, _)| *objective);
    if let Some((objective, values)) = &guess {
        hooks.monitor.on_solution_found(&MipSolution::new(
            problem.user_objective(*objective),
            values.clone(),
        ));
    }

    let summary = match start_from_root(env, &lp, warm.root, guess)? {
        RootStart::Finished(summary) => {
            if let Some((objective, values)) = &summary.incumbent {
                if guess_objective != Some(*objective) {
                    hooks.monitor.on_solution_found(&MipSolution::new(
                        problem.user_objective(*objective),
                        values.clone(),
                    ));
                }
            }
            summary
        }
        RootStart::Search(start, fixing) => {
            let tightened = match fixing {
                Some(fixing) => {
                    log::info!(
                        "Reduced-cost fixing tightened {} column(s), {} fixed",
                        fixing.tightened,
                        fixing.fixed
                    );
                    Some(problem.with_bounds(fixing.lower, fixing.upper)?)
                }
                None => None,
            };
            let env = &SearchEnvironment {
                problem: tightened.as_ref().unwrap_or(problem),
                ..*env
            };
            match (env.settings.mode, execution) {
                (ExplorationMode::Deterministic, Execution::Threaded) => {
                    deterministic::run(env, lp, start, &mut hooks)?
                }
                (ExplorationMode::Deterministic, Execution::Sequential) => {
                    deterministic::run_sequential(env, lp, start, &mut hooks)?
                }
                (ExplorationMode::Opportunistic, _) => {
                    opportunistic::run(env, lp, start, &mut hooks)?
                }
            }
        }
    };

    let upper_bound = summary
        .incumbent
        .as_ref()
        .map_or(f64::INFINITY, |(objective, _)| *objective);
    hooks.report_bound(problem, summary.lower_bound.min(upper_bound));

    let outcome = into_outcome(env, summary, started);
    log::info!(
        "Search finished with status {} after {:.3}s",
        outcome.status,
        outcome.statistics.solve_duration.as_secs_f64()
    );
    hooks.monitor.on_exit_search(outcome.status, &outcome.statistics);
    Ok(outcome)
}
