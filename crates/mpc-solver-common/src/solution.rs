//! Solution representation returned by solver backends.

use serde::{Deserialize, Serialize};

use crate::expr::VarId;

/// Terminal status of a solve call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionStatus {
    /// Optimal solution found.
    Optimal,
    /// Problem is infeasible.
    Infeasible,
    /// Problem is unbounded.
    Unbounded,
    /// Time limit reached; an incumbent may still be present.
    TimeLimit,
    /// Iteration limit reached.
    IterationLimit,
    /// Numerical difficulties.
    NumericalError,
    /// Generic solver error.
    Error,
    /// Status unknown.
    Unknown,
}

impl SolutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SolutionStatus::Optimal)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success() && !matches!(self, SolutionStatus::Unknown)
    }
}

impl std::fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolutionStatus::Optimal => write!(f, "optimal"),
            SolutionStatus::Infeasible => write!(f, "infeasible"),
            SolutionStatus::Unbounded => write!(f, "unbounded"),
            SolutionStatus::TimeLimit => write!(f, "time_limit"),
            SolutionStatus::IterationLimit => write!(f, "iteration_limit"),
            SolutionStatus::NumericalError => write!(f, "numerical_error"),
            SolutionStatus::Error => write!(f, "error"),
            SolutionStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of one solve call.
///
/// `values` is indexed by [`VarId`] and is empty when the solver produced
/// no incumbent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub status: SolutionStatus,

    /// Objective value, absent when no incumbent exists.
    #[serde(default)]
    pub objective: Option<f64>,

    /// Per-variable values aligned to the problem's variable order.
    #[serde(default)]
    pub values: Vec<f64>,

    /// Iterations or branch-and-bound nodes, solver-defined.
    #[serde(default)]
    pub iterations: i32,

    /// Wall-clock solve time in milliseconds.
    #[serde(default)]
    pub solve_time_ms: i64,

    /// Error message when the status is error/infeasible.
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Solution {
    /// An empty solution with error status.
    pub fn error(message: &str) -> Self {
        Self {
            status: SolutionStatus::Error,
            objective: None,
            values: Vec::new(),
            iterations: 0,
            solve_time_ms: 0,
            error_message: Some(message.to_string()),
        }
    }

    pub fn infeasible(message: &str) -> Self {
        Self {
            status: SolutionStatus::Infeasible,
            ..Self::error(message)
        }
    }

    pub fn timeout(seconds: u64) -> Self {
        Self {
            status: SolutionStatus::TimeLimit,
            error_message: Some(format!("solver timed out after {} seconds", seconds)),
            ..Self::error("")
        }
    }

    /// An optimal solution with the given variable values.
    pub fn optimal(objective: f64, values: Vec<f64>) -> Self {
        Self {
            status: SolutionStatus::Optimal,
            objective: Some(objective),
            values,
            iterations: 0,
            solve_time_ms: 0,
            error_message: None,
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status.is_success()
    }

    /// True when variable values are retrievable (optimal, or a limit was
    /// hit with a feasible incumbent in hand).
    pub fn has_incumbent(&self) -> bool {
        !self.values.is_empty()
    }

    /// Value of a variable, if an incumbent exists and the id is in range.
    pub fn value(&self, id: VarId) -> Option<f64> {
        self.values.get(id.index()).copied()
    }
}

impl Default for Solution {
    fn default() -> Self {
        Self::error("no solution")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_solution_has_no_incumbent() {
        let s = Solution::error("boom");
        assert!(!s.has_incumbent());
        assert_eq!(s.value(VarId(0)), None);
        assert!(s.status.is_failure());
    }

    #[test]
    fn timeout_with_values_is_an_incumbent() {
        let mut s = Solution::timeout(60);
        assert!(!s.has_incumbent());
        s.values = vec![1.0, 2.0];
        s.objective = Some(3.0);
        assert!(s.has_incumbent());
        assert_eq!(s.value(VarId(1)), Some(2.0));
    }

    #[test]
    fn status_strings() {
        assert_eq!(SolutionStatus::Optimal.to_string(), "optimal");
        assert_eq!(SolutionStatus::TimeLimit.to_string(), "time_limit");
        assert!(SolutionStatus::Optimal.is_success());
        assert!(!SolutionStatus::Unknown.is_failure());
    }
}
