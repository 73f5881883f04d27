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

//! Cairn-BnB: parallel branch-and-bound exploration for mixed-integer programs
//!
//! The crate drives the tree search of a MIP solver. It never solves an LP
//! itself: node relaxations go through the `lp::NodeLpSolver` boundary, and
//! external heuristics feed solutions in through `heuristic::HeuristicQueue`.
//!
//! Two exploration modes share one node step (`worker::BfsWorker`) and
//! differ in how its results propagate (`policy::TreeUpdatePolicy`):
//! - `deterministic`: bulk-synchronous horizons measured in work units.
//!   Outcomes become events that the coordinator replays in a fixed order,
//!   so the same input gives the same search on any thread schedule.
//! - `opportunistic`: free-running workers around a shared best-first pool
//!   and an atomic incumbent, for throughput.
//!
//! Core flow
//! - Build a `cairn_model::problem::Problem`.
//! - Pick `settings::BnbSettings` (mode, worker counts, horizon, limits).
//! - Provide a node LP solver and a `driver::WarmStart` (root relaxation
//!   and initial guess, both optional).
//! - Call `driver::solve` with a `driver::SearchEnvironment` and
//!   `driver::SearchHooks` (monitor, repair heuristic, bound callback).
//!
//! Module map
//! - `driver`: root handling, mode dispatch and outcome assembly.
//! - `deterministic`: coordinator, horizon policy, diving workers, sync state.
//! - `opportunistic`: shared pool, shared policy and supervisor.
//! - `worker`, `queue`, `node`, `tree`: the node step and its containers.
//! - `pseudo_cost`, `diving`: branching and dive selection rules.
//! - `reduced_cost`: root reduced-cost fixing against the incumbent.
//! - `event`, `barrier`, `producer`: deterministic plumbing.
//! - `heuristic`: external solutions and repair.
//! - `monitor`: tree-search monitors (log, composite, adapters).

pub mod barrier;
pub mod deterministic;
pub mod diving;
pub mod driver;
pub mod error;
pub mod event;
pub mod heuristic;
pub mod lp;
pub mod monitor;
pub mod node;
pub mod opportunistic;
pub mod policy;
pub mod producer;
pub mod pseudo_cost;
pub mod queue;
pub mod reduced_cost;
pub mod settings;
pub mod stats;
pub mod tree;
pub mod worker;
