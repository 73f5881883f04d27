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

//! # LP Relaxation Boundary
//!
//! The engine never solves linear programs itself. Every node relaxation goes
//! through a `NodeLpSolver`: given the problem and a node's column bounds it
//! returns an `LpOutcome`. Each worker owns its own solver, cloned from a
//! prototype before the search starts, so implementations may keep warm-start
//! state between calls without any locking.
//!
//! Outcomes at inner nodes are interpreted by the workers:
//!
//! - `Optimal`: branch, fathom, or record an integer solution.
//! - `Infeasible`: the node is pruned.
//! - `Numerical`, `IterationLimit` and `Unbounded`: a node-local numerical
//!   failure. `Unbounded` only carries meaning at the root, where it ends the
//!   solve with `UNBOUNDED`.
//!
//! `iterations` feeds the deterministic work model, so an implementation used
//! in deterministic mode must report the same count for the same input.

pub mod single_row;

use cairn_model::problem::Problem;

/// An optimal relaxation.
///
/// `objective` is in minimisation form, offset excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    pub primal: Vec<f64>,
    pub dual: Vec<f64>,
    pub reduced_costs: Vec<f64>,
    pub objective: f64,
    pub iterations: u64,
}

/// How a relaxation solve ended, with the iterations it took.
#[derive(Debug, Clone, PartialEq)]
pub enum LpOutcome {
    Optimal(LpSolution),
    Infeasible { iterations: u64 },
    Unbounded { iterations: u64 },
    Numerical { iterations: u64 },
    IterationLimit { iterations: u64 },
}

impl LpOutcome {
    /// The iterations the solve reported, whatever its outcome.
    #[inline]
    pub fn iterations(&self) -> u64 {
        match self {
            LpOutcome::Optimal(solution) => solution.iterations,
            LpOutcome::Infeasible { iterations }
            | LpOutcome::Unbounded { iterations }
            | LpOutcome::Numerical { iterations }
            | LpOutcome::IterationLimit { iterations } => *iterations,
        }
    }
}

/// Solves node relaxations. `lower`/`upper` override the problem's column bounds.
pub trait NodeLpSolver: Send {
    /// A short name for logs and debug output.
    fn name(&self) -> &str;

    /// Solves the relaxation of `problem` with its column bounds replaced.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem whose objective and rows are relaxed.
    /// * `lower` - The lower bound of every column at this node.
    /// * `upper` - The upper bound of every column at this node.
    ///
    /// # Returns
    ///
    /// The outcome of the solve. In deterministic mode the reported
    /// iterations must depend on the input only.
    fn solve(&mut self, problem: &Problem, lower: &[f64], upper: &[f64]) -> LpOutcome;
}

impl std::fmt::Debug for dyn NodeLpSolver + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeLpSolver({})", self.name())
    }
}

/// The root relaxation the search starts from.
///
/// Supplied by the caller or computed with the node solver on the problem's
/// own bounds. Its primal values are the reference point of pseudo-cost
/// diving.
#[derive(Debug, Clone, PartialEq)]
pub struct RootRelaxation {
    pub primal: Vec<f64>,
    pub dual: Vec<f64>,
    pub reduced_costs: Vec<f64>,
    pub objective: f64,
    pub iterations: u64,
}

impl RootRelaxation {
    /// A relaxation known only by its primal point and objective.
    pub fn from_primal(primal: Vec<f64>, objective: f64) -> Self {
        Self {
            primal,
            dual: Vec::new(),
            reduced_costs: Vec::new(),
            objective,
            iterations: 0,
        }
    }
}

impl From<RootRelaxation> for LpSolution {
    /// The root relaxation as the solution of the root node's LP.
    fn from(root: RootRelaxation) -> Self {
        Self {
            primal: root.primal,
            dual: root.dual,
            reduced_costs: root.reduced_costs,
            objective: root.objective,
            iterations: root.iterations,
        }
    }
}

impl From<LpSolution> for RootRelaxation {
    fn from(solution: LpSolution) -> Self {
        Self {
            primal: solution.primal,
            dual: solution.dual,
            reduced_costs: solution.reduced_costs,
            objective: solution.objective,
            iterations: solution.iterations,
        }
    }
}

/// How the root relaxation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RootOutcome {
    Solved(RootRelaxation),
    Infeasible,
    Unbounded,
    Numerical,
}

/// Solves the root relaxation on the problem's own bounds.
///
/// # Arguments
///
/// * `solver` - The node solver, usually a clone of the workers' prototype.
/// * `problem` - The problem whose relaxation is solved.
///
/// # Returns
///
/// The relaxation, or why there is none. Iteration limits are reported as
/// `RootOutcome::Numerical`.
pub fn solve_root<L>(solver: &mut L, problem: &Problem) -> RootOutcome
where
    L: NodeLpSolver + ?Sized,
{
    match solver.solve(problem, problem.lower_bounds(), problem.upper_bounds()) {
        LpOutcome::Optimal(solution) => RootOutcome::Solved(solution.into()),
        LpOutcome::Infeasible { .. } => RootOutcome::Infeasible,
        LpOutcome::Unbounded { .. } => RootOutcome::Unbounded,
        LpOutcome::Numerical { .. } | LpOutcome::IterationLimit { .. } => RootOutcome::Numerical,
    }
}
