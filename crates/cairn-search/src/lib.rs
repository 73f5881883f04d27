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

//! # Cairn Search
//!
//! Mode-independent plumbing shared by the deterministic coordinator, the
//! opportunistic scheduler and the solver facade.
//!
//! ## Modules
//!
//! - `incumbent`: `SharedIncumbent`, an atomic upper bound plus a mutex-held
//!   solution, written by any worker in opportunistic mode.
//! - `control`: `SearchControl`, the status flag and halt counter every
//!   worker polls at node boundaries.
//! - `monitor`: `SearchMonitor` and its time-limit, interrupt and composite
//!   implementations.
//! - `result`: `MipStatus` and the `SolverOutcome` a solve returns.
//! - `stats`: `SolverStatistics` and its builder.

pub mod control;
pub mod incumbent;
pub mod monitor;
pub mod result;
pub mod stats;
