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

//! # Cairn Solver
//!
//! Public entry point of the cairn MIP exploration engine. This crate wraps
//! the branch-and-bound drivers of `cairn_bnb` behind a builder, owns the
//! channels external heuristics talk to, and assembles the monitor stack for
//! each solve.
//!
//! ## Modules
//!
//! - `solver`: `SolverBuilder`, the reusable `Solver`, and the cloneable
//!   `SolverHandle` for producers and interrupts on other threads.
//!
//! ## Motivation
//!
//! The deterministic and opportunistic modes need the same surrounding
//! plumbing: a halt switch, a heuristic queue, producer synchronisation and
//! monitors. Keeping that here lets callers switch modes with one setting.
//!
//! See `solver` for detailed APIs and examples.

pub mod solver;
