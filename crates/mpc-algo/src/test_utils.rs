//! Deterministic solver backends for tests.
//!
//! No test in this crate talks to a real solver; a [`ScriptedBackend`]
//! replays a canned sequence of solutions and records every problem it was
//! handed, which is enough to exercise the refinement loop end to end.

use std::collections::VecDeque;
use std::sync::Mutex;

use mpc_solver_common::{Problem, Solution, SolverError, SolverResult};

use crate::backend::SolverBackend;

/// Backend that replays a fixed sequence of solutions.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Solution>>,
    seen: Mutex<Vec<Problem>>,
}

impl ScriptedBackend {
    pub fn new(solutions: impl IntoIterator<Item = Solution>) -> Self {
        Self {
            script: Mutex::new(solutions.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Problems received so far, in call order.
    pub fn seen(&self) -> Vec<Problem> {
        self.seen.lock().unwrap().clone()
    }
}

impl SolverBackend for ScriptedBackend {
    fn id(&self) -> &str {
        "scripted"
    }

    fn solve(&self, problem: &Problem) -> SolverResult<Solution> {
        self.seen.lock().unwrap().push(problem.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SolverError::Protocol("scripted backend exhausted".to_string()))
    }
}

/// An optimal solution sized to the problem, with every value set to `v`.
pub fn uniform_solution(problem: &Problem, v: f64, objective: f64) -> Solution {
    Solution::optimal(objective, vec![v; problem.num_variables()])
}
