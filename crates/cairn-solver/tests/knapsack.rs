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

use cairn_bnb::{
    heuristic::RepairHeuristic,
    lp::{RootOutcome, RootRelaxation, single_row::SingleRowLpSolver, solve_root},
    monitor::tree_search_monitor::{SyncReport, TreeSearchMonitor},
    settings::{BnbSettings, ExplorationMode},
};
use cairn_model::{
    index::ColumnIndex,
    problem::{ObjectiveSense, Problem, ProblemBuilder, RowSense, VariableKind},
    solution::MipSolution,
};
use cairn_search::{result::MipStatus, stats::SolverStatistics};
use cairn_solver::solver::{SolverBuilder, SolverHandle};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

struct Knapsack {
    values: Vec<f64>,
    weights: Vec<f64>,
    capacity: f64,
}

impl Knapsack {
    fn random(seed: u64, items: usize) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let values: Vec<f64> = (0..items).map(|_| rng.random_range(1..30) as f64).collect();
        let weights: Vec<f64> = (0..items).map(|_| rng.random_range(1..15) as f64).collect();
        let capacity = (weights.iter().sum::<f64>() / 2.0).floor();
        Self {
            values,
            weights,
            capacity,
        }
    }

    fn problem(&self) -> Problem {
        let col = ColumnIndex::new;
        let mut b = ProblemBuilder::new(self.values.len());
        b.set_sense(ObjectiveSense::Maximize);
        for (j, &v) in self.values.iter().enumerate() {
            b.set_objective_coefficient(col(j), v)
                .set_variable_kind(col(j), VariableKind::Binary);
        }
        b.add_row(
            self.weights.iter().enumerate().map(|(j, &w)| (col(j), w)),
            RowSense::LessEqual,
            self.capacity,
        );
        b.build().expect("valid knapsack")
    }

    fn brute_force(&self) -> f64 {
        let n = self.values.len();
        (0u32..1 << n)
            .filter_map(|mask| {
                let picked = || (0..n).filter(move |&j| mask & (1 << j) != 0);
                let weight: f64 = picked().map(|j| self.weights[j]).sum();
                (weight <= self.capacity).then(|| picked().map(|j| self.values[j]).sum::<f64>())
            })
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

fn deterministic_settings() -> BnbSettings {
    BnbSettings::default()
        .with_bfs_workers(3)
        .with_diving_workers(2)
        .with_horizon_step(4.0)
}

#[test_log::test]
fn test_deterministic_matches_brute_force() {
    for seed in 0..4 {
        let knapsack = Knapsack::random(seed, 14);
        let problem = knapsack.problem();
        let mut solver = SolverBuilder::new(SingleRowLpSolver::new())
            .with_settings(deterministic_settings())
            .build();
        let outcome = solver.solve(&problem).expect("solve");
        assert!(outcome.is_optimal(), "seed {}: {}", seed, outcome.status);
        assert_eq!(outcome.objective(), Some(knapsack.brute_force()), "seed {}", seed);
        assert!(outcome.bound >= knapsack.brute_force() - 1e-6);
        assert!(outcome.state_hash.is_some());
        let values = outcome.solution.as_ref().expect("solution").values();
        assert!(problem.is_feasible(values, 1e-6));
    }
}

#[test]
fn test_deterministic_runs_repeat_exactly() {
    let problem = Knapsack::random(11, 16).problem();
    let solve = |sequential: bool| {
        let builder =
            SolverBuilder::new(SingleRowLpSolver::new()).with_settings(deterministic_settings());
        let builder = if sequential { builder.sequential() } else { builder };
        builder.build().solve(&problem).expect("solve")
    };

    let reference = solve(false);
    for _ in 0..3 {
        let again = solve(false);
        assert_eq!(again.state_hash, reference.state_hash);
        assert_eq!(again.objective(), reference.objective());
        assert_eq!(again.statistics.nodes_explored, reference.statistics.nodes_explored);
        assert_eq!(again.statistics.horizons, reference.statistics.horizons);
    }
    let sequential = solve(true);
    assert_eq!(sequential.state_hash, reference.state_hash);
    assert_eq!(sequential.statistics.nodes_explored, reference.statistics.nodes_explored);
}

#[test_log::test]
fn test_opportunistic_matches_brute_force() {
    let knapsack = Knapsack::random(5, 15);
    let mut solver = SolverBuilder::new(SingleRowLpSolver::new())
        .with_mode(ExplorationMode::Opportunistic)
        .with_workers(4, 0)
        .build();
    let outcome = solver.solve(&knapsack.problem()).expect("solve");
    assert!(outcome.is_optimal());
    assert_eq!(outcome.objective(), Some(knapsack.brute_force()));
    assert_eq!(outcome.state_hash, None);
    assert!(outcome.statistics.nodes_explored > 0);
}

#[test]
fn test_infeasible_problem() {
    let col = ColumnIndex::new;
    let mut b = ProblemBuilder::new(2);
    for j in 0..2 {
        b.set_variable_kind(col(j), VariableKind::Binary);
    }
    b.add_row([(col(0), 1.0), (col(1), 1.0)], RowSense::GreaterEqual, 3.0);
    let problem = b.build().expect("valid");

    for mode in [ExplorationMode::Deterministic, ExplorationMode::Opportunistic] {
        let mut solver = SolverBuilder::new(SingleRowLpSolver::new())
            .with_mode(mode)
            .build();
        let outcome = solver.solve(&problem).expect("solve");
        assert!(outcome.is_infeasible(), "{}", mode);
        assert!(!outcome.has_solution());
    }
}

#[test]
fn test_supplied_root_relaxation_gives_same_search() {
    let problem = Knapsack::random(3, 12).problem();
    let RootOutcome::Solved(root) = solve_root(&mut SingleRowLpSolver::new(), &problem) else {
        panic!("root should solve");
    };

    let plain = SolverBuilder::new(SingleRowLpSolver::new())
        .with_settings(deterministic_settings())
        .build()
        .solve(&problem)
        .expect("solve");
    let supplied = SolverBuilder::new(SingleRowLpSolver::new())
        .with_settings(deterministic_settings())
        .with_root_relaxation(root)
        .build()
        .solve(&problem)
        .expect("solve");
    assert_eq!(plain.state_hash, supplied.state_hash);
    assert_eq!(plain.objective(), supplied.objective());
}

#[test]
fn test_mismatched_root_relaxation_is_rejected() {
    let problem = Knapsack::random(3, 6).problem();
    let mut solver = SolverBuilder::new(SingleRowLpSolver::new())
        .with_root_relaxation(RootRelaxation::from_primal(vec![0.5; 2], 0.0))
        .build();
    assert!(solver.solve(&problem).is_err());
}

#[test]
fn test_producer_is_awaited_every_horizon() {
    let knapsack = Knapsack::random(8, 14);
    let problem = knapsack.problem();
    let mut solver = SolverBuilder::new(SingleRowLpSolver::new())
        .with_settings(deterministic_settings().with_producer_timeout(Duration::from_secs(5)))
        .build();
    let handle = solver.handle();
    let id = handle.register_producer();
    let done = AtomicBool::new(false);

    let outcome = std::thread::scope(|s| {
        s.spawn(|| {
            let mut last = 0;
            while !done.load(Ordering::Acquire) {
                let horizon = handle.current_horizon();
                if horizon > last {
                    // The empty knapsack is always feasible.
                    handle.deliver(id, horizon, vec![0.0; knapsack.values.len()], 0.0);
                    last = horizon;
                } else {
                    std::thread::sleep(Duration::from_micros(50));
                }
            }
        });
        let outcome = solver.solve(&problem).expect("solve");
        done.store(true, Ordering::Release);
        outcome
    });
    handle.deregister_producer(id);

    assert!(outcome.is_optimal());
    assert_eq!(outcome.objective(), Some(knapsack.brute_force()));
    assert!(outcome.statistics.producer_waits > 0);
    assert_eq!(outcome.statistics.producer_timeouts, 0);
}

/// Drops the heaviest picked items until the point fits.
struct DropHeaviest {
    weights: Vec<f64>,
    capacity: f64,
    calls: Arc<AtomicUsize>,
}

impl RepairHeuristic for DropHeaviest {
    fn name(&self) -> &str {
        "DropHeaviest"
    }

    fn repair(&mut self, _: &Problem, candidate: &[f64], _: &RootRelaxation) -> Option<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut point: Vec<f64> = candidate.iter().map(|v| v.round().clamp(0.0, 1.0)).collect();
        let mut order: Vec<usize> = (0..point.len()).collect();
        order.sort_by(|&a, &b| self.weights[b].total_cmp(&self.weights[a]));
        let mut load: f64 = point.iter().zip(&self.weights).map(|(x, w)| x * w).sum();
        for j in order {
            if load <= self.capacity {
                break;
            }
            if point[j] > 0.5 {
                point[j] = 0.0;
                load -= self.weights[j];
            }
        }
        Some(point)
    }
}

#[test]
fn test_infeasible_submission_is_repaired() {
    let knapsack = Knapsack::random(21, 16);
    let problem = knapsack.problem();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut solver = SolverBuilder::new(SingleRowLpSolver::new())
        .with_settings(deterministic_settings().with_horizon_step(1.0))
        .with_repair_heuristic(DropHeaviest {
            weights: knapsack.weights.clone(),
            capacity: knapsack.capacity,
            calls: Arc::clone(&calls),
        })
        .build();
    // Every item picked overshoots the capacity.
    solver
        .handle()
        .submit_solution(vec![1.0; knapsack.values.len()], 0.0);

    let outcome = solver.solve(&problem).expect("solve");
    assert!(outcome.is_optimal());
    assert_eq!(outcome.objective(), Some(knapsack.brute_force()));
    if outcome.statistics.horizons >= 2 {
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}

#[derive(Default)]
struct Recorder {
    entered: bool,
    improvements: Vec<f64>,
    syncs: u64,
    exit: Option<MipStatus>,
}

impl TreeSearchMonitor for Recorder {
    fn name(&self) -> &str {
        "Recorder"
    }

    fn on_enter_search(&mut self, _: &Problem, _: &BnbSettings) {
        self.entered = true;
    }

    fn on_sync(&mut self, _: &SyncReport) {
        self.syncs += 1;
    }

    fn on_solution_found(&mut self, solution: &MipSolution) {
        self.improvements.push(solution.objective());
    }

    fn on_exit_search(&mut self, status: MipStatus, _: &SolverStatistics) {
        self.exit = Some(status);
    }
}

#[test]
fn test_monitor_sees_improving_incumbents() {
    let knapsack = Knapsack::random(13, 14);
    let mut recorder = Recorder::default();
    let outcome = SolverBuilder::new(SingleRowLpSolver::new())
        .with_settings(deterministic_settings())
        .add_monitor(&mut recorder)
        .build()
        .solve(&knapsack.problem())
        .expect("solve");

    assert!(recorder.entered);
    assert_eq!(recorder.exit, Some(MipStatus::Optimal));
    assert_eq!(recorder.syncs, outcome.statistics.horizons);
    assert!(recorder.improvements.windows(2).all(|w| w[1] > w[0]));
    assert_eq!(recorder.improvements.last().copied(), outcome.objective());
}

/// Halts the solve through its handle at the first sync.
struct HaltOnFirstSync {
    handle: SolverHandle,
}

impl TreeSearchMonitor for HaltOnFirstSync {
    fn name(&self) -> &str {
        "HaltOnFirstSync"
    }
    fn on_enter_search(&mut self, _: &Problem, _: &BnbSettings) {}
    fn on_sync(&mut self, _: &SyncReport) {
        self.handle.halt();
    }
    fn on_solution_found(&mut self, _: &MipSolution) {}
    fn on_exit_search(&mut self, _: MipStatus, _: &SolverStatistics) {}
}

#[test]
fn test_handle_halt_stops_after_current_sync() {
    let problem = Knapsack::random(2, 18).problem();
    let mut solver = SolverBuilder::new(SingleRowLpSolver::new())
        .with_settings(deterministic_settings().with_horizon_step(1.0))
        .build();
    let handle = solver.handle();
    solver.add_monitor(HaltOnFirstSync {
        handle: handle.clone(),
    });

    let outcome = solver.solve(&problem).expect("solve");
    assert_eq!(outcome.status, MipStatus::TimeLimit);
    assert_eq!(outcome.statistics.horizons, 1);
    assert!(handle.is_halted());
}

#[test]
fn test_work_limit_is_reported() {
    let problem = Knapsack::random(4, 18).problem();
    let mut solver = SolverBuilder::new(SingleRowLpSolver::new())
        .with_settings(deterministic_settings().with_horizon_step(1.0))
        .with_work_limit(2.0)
        .build();
    let outcome = solver.solve(&problem).expect("solve");
    assert_eq!(outcome.status, MipStatus::WorkLimit);
    assert_eq!(outcome.statistics.horizons, 2);
}

#[test]
fn test_initial_guess_is_the_first_incumbent() {
    let knapsack = Knapsack::random(8, 14);
    let problem = knapsack.problem();
    // Packing only the lightest item always fits.
    let lightest = (0..knapsack.weights.len())
        .min_by(|&a, &b| knapsack.weights[a].total_cmp(&knapsack.weights[b]))
        .expect("items");
    let mut guess = vec![0.0; knapsack.values.len()];
    guess[lightest] = 1.0;

    for mode in [ExplorationMode::Deterministic, ExplorationMode::Opportunistic] {
        let mut recorder = Recorder::default();
        let outcome = SolverBuilder::new(SingleRowLpSolver::new())
            .with_settings(deterministic_settings().with_mode(mode))
            .with_initial_guess(guess.clone())
            .add_monitor(&mut recorder)
            .build()
            .solve(&problem)
            .expect("solve");

        assert!(outcome.is_optimal(), "{}", mode);
        assert_eq!(outcome.objective(), Some(knapsack.brute_force()), "{}", mode);
        assert!(outcome.statistics.solutions_found >= 1, "{}", mode);
        assert_eq!(recorder.improvements.first().copied(), Some(knapsack.values[lightest]));
        assert!(recorder.improvements.windows(2).all(|w| w[1] > w[0]), "{}", mode);
    }
}

#[test]
fn test_initial_guess_of_wrong_length_is_rejected() {
    let problem = Knapsack::random(8, 6).problem();
    let mut solver = SolverBuilder::new(SingleRowLpSolver::new())
        .with_initial_guess(vec![0.0; 5])
        .build();
    assert!(solver.solve(&problem).is_err());
}

#[test]
fn test_bound_callback_tightens_towards_optimum() {
    let knapsack = Knapsack::random(9, 14);
    let mut bounds = Vec::new();
    let outcome = SolverBuilder::new(SingleRowLpSolver::new())
        .with_settings(deterministic_settings())
        .with_user_bound_callback(|bound| bounds.push(bound))
        .build()
        .solve(&knapsack.problem())
        .expect("solve");

    assert!(outcome.is_optimal());
    assert!(!bounds.is_empty());
    // Maximisation: the bound only comes down.
    assert!(bounds.windows(2).all(|w| w[1] < w[0]));
    assert!(bounds.iter().all(|&b| b >= knapsack.brute_force() - 1e-6));
    assert_eq!(bounds.last().copied(), Some(outcome.bound));
}

#[test]
fn test_reduced_cost_fixing_keeps_the_optimum() {
    let knapsack = Knapsack::random(10, 14);
    let problem = knapsack.problem();
    for enabled in [true, false] {
        let outcome = SolverBuilder::new(SingleRowLpSolver::new())
            .with_settings(deterministic_settings())
            .with_reduced_cost_fixing(enabled)
            .build()
            .solve(&problem)
            .expect("solve");
        assert!(outcome.is_optimal());
        assert_eq!(outcome.objective(), Some(knapsack.brute_force()));
        let values = outcome.solution.as_ref().expect("solution").values();
        assert!(problem.is_feasible(values, 1e-6));
    }
}
