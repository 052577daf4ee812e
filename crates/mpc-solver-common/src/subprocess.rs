//! Subprocess management for solver backends.
//!
//! Handles spawning solver binaries and exchanging the JSON problem and
//! solution payloads over stdin/stdout. The solve is blocking: the core is
//! single-threaded and synchronous, and wall-clock limits are delegated to
//! the solver itself through `SolverConfig::time_limit_seconds`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use tracing::debug;

use crate::error::{ExitCode, SolverError, SolverResult};
use crate::problem::Problem;
use crate::solution::Solution;

/// A solver subprocess handle.
#[derive(Debug)]
pub struct SolverProcess {
    /// Path to the solver binary.
    binary_path: PathBuf,
    /// Extra arguments passed to the binary.
    args: Vec<String>,
}

impl SolverProcess {
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Find a solver binary in standard locations.
    ///
    /// Search order:
    /// 1. `~/.mpc/solvers/<name>`
    /// 2. System PATH
    pub fn find_binary(name: &str) -> SolverResult<PathBuf> {
        if let Some(home) = dirs::home_dir() {
            let local = home.join(".mpc").join("solvers").join(name);
            if local.exists() {
                return Ok(local);
            }
        }

        if let Ok(path) = which::which(name) {
            return Ok(path);
        }

        Err(SolverError::NotFound(name.to_string()))
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Solve a problem by spawning the solver subprocess.
    ///
    /// Writes the problem to stdin as JSON, reads the solution from stdout,
    /// and maps the exit code; stderr is captured into error messages.
    pub fn solve(&self, problem: &Problem) -> SolverResult<Solution> {
        let start = Instant::now();
        let payload = serde_json::to_vec(problem)?;

        debug!(
            solver = %self.binary_path.display(),
            variables = problem.num_variables(),
            constraints = problem.num_constraints(),
            "spawning solver subprocess"
        );

        let mut child = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(SolverError::ProcessStart)?;

        {
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| SolverError::Protocol("solver stdin not piped".to_string()))?;
            stdin
                .write_all(&payload)
                .map_err(|e| SolverError::Protocol(format!("failed to write problem: {}", e)))?;
        }
        // stdin closes here, signalling end of input

        let output = child.wait_with_output().map_err(SolverError::ProcessStart)?;
        let elapsed = start.elapsed();

        let exit_code = ExitCode::from_raw(output.status.code().unwrap_or(-1));
        if !exit_code.is_success() {
            let stderr_str = String::from_utf8_lossy(&output.stderr);
            return Err(SolverError::ProcessFailed {
                exit_code,
                message: stderr_str.trim().to_string(),
            });
        }

        if output.stdout.is_empty() {
            return Err(SolverError::Protocol(
                "empty solution from solver".to_string(),
            ));
        }

        let mut solution: Solution = serde_json::from_slice(&output.stdout)?;
        if solution.solve_time_ms == 0 {
            solution.solve_time_ms = elapsed.as_millis() as i64;
        }
        Ok(solution)
    }
}

/// Check whether a solver binary can be located.
pub fn is_solver_installed(name: &str) -> bool {
    SolverProcess::find_binary(name).is_ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::problem::{Problem, VarKind};
    use crate::solution::SolutionStatus;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn fake_solver(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-solver");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn one_var_problem() -> Problem {
        let mut p = Problem::new("sub-test");
        p.add_var("x", VarKind::Continuous, 0.0, 1.0);
        p
    }

    #[test]
    fn round_trip_through_fake_solver() {
        let dir = tempfile::tempdir().unwrap();
        let reply = r#"{"status":"optimal","objective":0.5,"values":[0.5]}"#;
        // The fake solver drains stdin and echoes a canned solution.
        let path = fake_solver(dir.path(), &format!("cat > /dev/null; echo '{}'", reply));

        let solution = SolverProcess::new(path).solve(&one_var_problem()).unwrap();
        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert_eq!(solution.objective, Some(0.5));
        assert_eq!(solution.values, vec![0.5]);
    }

    #[test]
    fn nonzero_exit_maps_to_process_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_solver(
            dir.path(),
            "cat > /dev/null; echo 'no license' >&2; exit 2",
        );

        let err = SolverProcess::new(path)
            .solve(&one_var_problem())
            .unwrap_err();
        match err {
            SolverError::ProcessFailed { exit_code, message } => {
                assert_eq!(exit_code, ExitCode::SolverError);
                assert!(message.contains("no license"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn empty_reply_is_a_protocol_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_solver(dir.path(), "cat > /dev/null");

        let err = SolverProcess::new(path)
            .solve(&one_var_problem())
            .unwrap_err();
        assert!(matches!(err, SolverError::Protocol(_)));
    }
}
