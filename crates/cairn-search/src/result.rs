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

//! Solve results
//!
//! `MipStatus` names how a solve ended and `SolverOutcome` bundles it with
//! the best solution, the proven bound and the statistics.

use crate::stats::SolverStatistics;
use cairn_model::solution::MipSolution;

/// Terminal status of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MipStatus {
    /// The search has not concluded.
    #[default]
    Unset = 0,
    /// The incumbent is proven optimal within the gap tolerances.
    Optimal = 1,
    /// The root relaxation is unbounded.
    Unbounded = 2,
    /// No integer-feasible point exists.
    Infeasible = 3,
    /// The wall-clock budget ran out.
    TimeLimit = 4,
    /// Reserved; no node limit is enforced.
    NodeLimit = 5,
    /// Numerical failures prevented a proof.
    Numerical = 6,
    /// The work-unit budget ran out.
    WorkLimit = 7,
}

impl MipStatus {
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a status stored with `as_u8`. Unknown values map to `Unset`.
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => MipStatus::Optimal,
            2 => MipStatus::Unbounded,
            3 => MipStatus::Infeasible,
            4 => MipStatus::TimeLimit,
            5 => MipStatus::NodeLimit,
            6 => MipStatus::Numerical,
            7 => MipStatus::WorkLimit,
            _ => MipStatus::Unset,
        }
    }

    /// `true` for statuses that stop a search early rather than conclude it.
    #[inline]
    pub fn is_limit(self) -> bool {
        matches!(
            self,
            MipStatus::TimeLimit | MipStatus::NodeLimit | MipStatus::WorkLimit
        )
    }
}

impl std::fmt::Display for MipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MipStatus::Unset => "UNSET",
            MipStatus::Optimal => "OPTIMAL",
            MipStatus::Unbounded => "UNBOUNDED",
            MipStatus::Infeasible => "INFEASIBLE",
            MipStatus::TimeLimit => "TIME_LIMIT",
            MipStatus::NodeLimit => "NODE_LIMIT",
            MipStatus::Numerical => "NUMERICAL",
            MipStatus::WorkLimit => "WORK_LIMIT",
        };
        f.write_str(s)
    }
}

/// Everything a solve reports back.
///
/// Objective and bound values are in the problem's own sense.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub status: MipStatus,
    /// The incumbent, if one was found before the search ended.
    pub solution: Option<MipSolution>,
    /// Best proven bound on the optimal objective.
    pub bound: f64,
    pub statistics: SolverStatistics,
    /// Fingerprint of the replayed global state, deterministic mode only.
    pub state_hash: Option<u64>,
}

impl SolverOutcome {
    #[inline]
    pub fn new(
        status: MipStatus,
        solution: Option<MipSolution>,
        bound: f64,
        statistics: SolverStatistics,
        state_hash: Option<u64>,
    ) -> Self {
        Self {
            status,
            solution,
            bound,
            statistics,
            state_hash,
        }
    }

    #[inline]
    pub fn is_optimal(&self) -> bool {
        self.status == MipStatus::Optimal
    }

    #[inline]
    pub fn is_infeasible(&self) -> bool {
        self.status == MipStatus::Infeasible
    }

    #[inline]
    pub fn has_solution(&self) -> bool {
        self.solution.is_some()
    }

    /// The incumbent's objective in the problem's sense, if there is one.
    #[inline]
    pub fn objective(&self) -> Option<f64> {
        self.solution.as_ref().map(MipSolution::objective)
    }
}

impl std::fmt::Display for SolverOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Status: {}", self.status)?;
        match &self.solution {
            Some(s) => writeln!(f, "Objective: {}", s.objective())?,
            None => writeln!(f, "Objective: none")?,
        }
        writeln!(f, "Bound: {}", self.bound)?;
        if let Some(hash) = self.state_hash {
            writeln!(f, "State Hash: {:#018x}", hash)?;
        }
        write!(f, "{}", self.statistics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_u8() {
        for status in [
            MipStatus::Unset,
            MipStatus::Optimal,
            MipStatus::Unbounded,
            MipStatus::Infeasible,
            MipStatus::TimeLimit,
            MipStatus::NodeLimit,
            MipStatus::Numerical,
            MipStatus::WorkLimit,
        ] {
            assert_eq!(MipStatus::from_u8(status.as_u8()), status);
        }
        assert_eq!(MipStatus::from_u8(200), MipStatus::Unset);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(MipStatus::TimeLimit.to_string(), "TIME_LIMIT");
        assert_eq!(MipStatus::Optimal.to_string(), "OPTIMAL");
        assert!(MipStatus::WorkLimit.is_limit());
        assert!(!MipStatus::Numerical.is_limit());
    }

    #[test]
    fn test_outcome_display_includes_status_and_hash() {
        let outcome = SolverOutcome::new(
            MipStatus::Optimal,
            Some(MipSolution::new(1.0, vec![1.0])),
            1.0,
            SolverStatistics::default(),
            Some(0xabc),
        );
        let text = outcome.to_string();
        assert!(text.contains("Status: OPTIMAL"));
        assert!(text.contains("Objective: 1"));
        assert!(text.contains("0x0000000000000abc"));
        assert!(outcome.is_optimal());
        assert_eq!(outcome.objective(), Some(1.0));
    }
}
