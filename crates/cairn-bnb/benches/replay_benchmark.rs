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

use cairn_bnb::driver::{Execution, SearchEnvironment, SearchHooks, WarmStart, solve_with};
use cairn_bnb::event::{EventBatch, EventKind, merge_batches};
use cairn_bnb::heuristic::{HeuristicQueue, RepairQueue};
use cairn_bnb::lp::single_row::SingleRowLpSolver;
use cairn_bnb::monitor::no_op::NoOpTreeSearchMonitor;
use cairn_bnb::node::{BranchDirection, NodeKey, WorkerIndex};
use cairn_bnb::producer::ProducerSync;
use cairn_bnb::pseudo_cost::PseudoCosts;
use cairn_bnb::settings::BnbSettings;
use cairn_model::index::ColumnIndex;
use cairn_model::problem::{ObjectiveSense, Problem, ProblemBuilder, RowSense, VariableKind};
use cairn_search::control::SearchControl;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::hint::black_box;

fn random_knapsack(n: usize, seed: u64) -> Problem {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut b = ProblemBuilder::new(n);
    b.set_sense(ObjectiveSense::Maximize);
    let mut weights = Vec::with_capacity(n);
    for j in 0..n {
        let weight = rng.random_range(5..40) as f64;
        let value = weight + rng.random_range(0..20) as f64;
        b.set_objective_coefficient(ColumnIndex::new(j), value)
            .set_variable_kind(ColumnIndex::new(j), VariableKind::Binary);
        weights.push((ColumnIndex::new(j), weight));
    }
    let capacity = weights.iter().map(|(_, w)| w).sum::<f64>() / 2.0;
    b.add_row(weights, RowSense::LessEqual, capacity);
    b.build().expect("valid knapsack")
}

fn synthetic_batches(workers: usize, per_worker: usize, seed: u64) -> Vec<EventBatch> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..workers)
        .map(|w| {
            let id = WorkerIndex::new(w);
            let mut batch = EventBatch::new(id);
            let mut clock = 0.0;
            for seq in 0..per_worker as u64 {
                clock += rng.random_range(1.0..2.0);
                batch.record(
                    clock,
                    Some(NodeKey::new(id, seq + 1)),
                    rng.random_range(0..30),
                    None,
                    EventKind::Fathomed {
                        lower_bound: rng.random_range(0.0..100.0),
                    },
                );
            }
            batch
        })
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_batches");
    for &workers in &[2usize, 8, 32] {
        let batches = synthetic_batches(workers, 512, 42);
        group.throughput(Throughput::Elements((workers * 512) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(workers), &batches, |b, batches| {
            b.iter_batched(
                || batches.iter().map(|b| b.events().to_vec()).collect::<Vec<_>>(),
                |events| black_box(merge_batches(events)),
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_select_branch(c: &mut Criterion) {
    let n = 256;
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut costs = PseudoCosts::new(n);
    for _ in 0..4 * n {
        let column = ColumnIndex::new(rng.random_range(0..n));
        let direction = if rng.random_bool(0.5) {
            BranchDirection::Down
        } else {
            BranchDirection::Up
        };
        costs.update(column, direction, rng.random_range(0.0..10.0));
    }
    let x: Vec<f64> = (0..n).map(|_| rng.random_range(0.0..1.0)).collect();
    let fractional: Vec<ColumnIndex> = (0..n).map(ColumnIndex::new).collect();

    c.bench_function("select_branch_256", |b| {
        b.iter(|| black_box(costs.select_branch(black_box(&fractional), black_box(&x))))
    });
}

fn bench_deterministic_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("deterministic_solve");
    group.sample_size(10);
    for &n in &[16usize, 24] {
        let problem = random_knapsack(n, n as u64);
        for (name, execution) in [
            ("sequential", Execution::Sequential),
            ("threaded", Execution::Threaded),
        ] {
            group.bench_with_input(BenchmarkId::new(name, n), &problem, |b, problem| {
                b.iter(|| {
                    let settings = BnbSettings::default().with_bfs_workers(4);
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
                    let hooks = SearchHooks::new(&mut monitor);
                    black_box(solve_with(
                        &env,
                        SingleRowLpSolver::new(),
                        WarmStart::default(),
                        hooks,
                        execution,
                    ))
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_merge, bench_select_branch, bench_deterministic_solve);
criterion_main!(benches);
