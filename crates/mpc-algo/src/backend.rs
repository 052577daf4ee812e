//! Solver backend abstraction.
//!
//! A backend takes a fully-formulated problem and returns a solution; the
//! numerical work happens elsewhere. The production implementation shells
//! out to a solver binary over the JSON protocol; tests use scripted
//! backends from [`crate::test_utils`].

use std::path::PathBuf;

use mpc_solver_common::{
    NonconvexPolicy, Problem, Solution, SolverError, SolverProcess, SolverResult,
};
use tracing::info;

/// A black-box optimization solver.
pub trait SolverBackend: Send + Sync {
    /// Identifier for logs and error messages.
    fn id(&self) -> &str;

    /// Whether the backend can currently be used.
    fn is_available(&self) -> bool {
        true
    }

    /// Solve a problem. Blocking.
    fn solve(&self, problem: &Problem) -> SolverResult<Solution>;
}

/// Backend that spawns an external solver binary per solve call.
#[derive(Debug)]
pub struct SubprocessBackend {
    id: String,
    process: SolverProcess,
}

impl SubprocessBackend {
    pub fn new(binary_path: PathBuf) -> Self {
        let id = binary_path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| binary_path.display().to_string());
        Self {
            id,
            process: SolverProcess::new(binary_path),
        }
    }

    /// Resolve a backend from a CLI-style spec: an explicit path (anything
    /// containing a separator) or a bare name looked up in the standard
    /// locations.
    pub fn from_spec(spec: &str) -> SolverResult<Self> {
        let path = if spec.contains(std::path::MAIN_SEPARATOR) {
            let p = PathBuf::from(spec);
            if !p.exists() {
                return Err(SolverError::NotFound(spec.to_string()));
            }
            p
        } else {
            SolverProcess::find_binary(spec)?
        };
        Ok(Self::new(path))
    }
}

impl SolverBackend for SubprocessBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        self.process.binary_path().exists()
    }

    fn solve(&self, problem: &Problem) -> SolverResult<Solution> {
        if problem.config.nonconvex == NonconvexPolicy::Reject {
            if let Some(name) = problem.nonconvex_constraint() {
                return Err(SolverError::Unsupported {
                    solver: self.id.clone(),
                    what: format!("non-convex quadratic constraint '{}'", name),
                });
            }
        }
        info!(
            solver = %self.id,
            problem = %problem.name,
            variables = problem.num_variables(),
            constraints = problem.num_constraints(),
            "dispatching to solver"
        );
        self.process.solve(problem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpc_solver_common::{Constraint, QuadExpr, RelOp, VarKind};

    #[test]
    fn missing_binary_is_not_found() {
        let err = SubprocessBackend::from_spec("definitely-not-a-solver-binary").unwrap_err();
        assert!(matches!(err, SolverError::NotFound(_)));
    }

    #[test]
    fn explicit_path_must_exist() {
        let err = SubprocessBackend::from_spec("/no/such/solver").unwrap_err();
        assert!(matches!(err, SolverError::NotFound(_)));
    }

    #[test]
    fn reject_policy_blocks_nonconvex_problems() {
        let mut p = Problem::new("keepout");
        let x = p.add_var("x", VarKind::Continuous, f64::NEG_INFINITY, f64::INFINITY);
        let mut q = QuadExpr::new();
        q.add_quad_term(x, x, 1.0);
        p.add_constraint(Constraint::Quadratic {
            name: "obs_1_0".into(),
            expr: q,
            op: RelOp::Ge,
            rhs: 4.0,
        })
        .unwrap();
        p.config.nonconvex = NonconvexPolicy::Reject;

        let backend = SubprocessBackend::new(PathBuf::from("/no/such/solver"));
        let err = backend.solve(&p).unwrap_err();
        match err {
            SolverError::Unsupported { what, .. } => assert!(what.contains("obs_1_0")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn backend_trait_is_object_safe() {
        fn _takes(_: &dyn SolverBackend) {}
    }
}
