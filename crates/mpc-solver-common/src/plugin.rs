//! Plugin harness for solver binaries.
//!
//! Provides common infrastructure for solver backend binaries, eliminating
//! boilerplate for tracing setup, protocol handling, and error management.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mpc_solver_common::plugin::{run_solver_plugin, SolverPlugin};
//! use mpc_solver_common::{Problem, Solution};
//! use anyhow::Result;
//!
//! struct MySolver;
//!
//! impl SolverPlugin for MySolver {
//!     fn name(&self) -> &'static str { "my-solver" }
//!     fn solve(&self, problem: &Problem) -> Result<Solution> {
//!         // Solver implementation
//!     }
//! }
//!
//! fn main() {
//!     run_solver_plugin(MySolver);
//! }
//! ```

use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::error::ExitCode;
use crate::problem::Problem;
use crate::solution::Solution;
use crate::PROTOCOL_VERSION;

/// Trait for implementing a solver backend binary.
///
/// The harness handles stdin/stdout protocol, logging, and exit codes.
pub trait SolverPlugin {
    /// The solver name (e.g., "mpc-pwl").
    fn name(&self) -> &'static str;

    /// Solve the given problem.
    fn solve(&self, problem: &Problem) -> Result<Solution>;

    /// Additional initialization before solving.
    ///
    /// Called after tracing is initialized but before reading the problem.
    /// Override for solver-specific setup (e.g., license checks).
    fn init(&self) -> Result<()> {
        Ok(())
    }
}

fn read_problem() -> Result<Problem> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read problem from stdin")?;
    let problem: Problem =
        serde_json::from_str(&input).context("failed to parse problem JSON")?;
    Ok(problem)
}

fn write_solution(solution: &Solution) -> Result<()> {
    let payload = serde_json::to_vec(solution).context("failed to serialize solution")?;
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&payload)
        .context("failed to write solution to stdout")?;
    stdout.flush().context("failed to flush stdout")?;
    Ok(())
}

/// Run a solver plugin with the standard harness.
///
/// This function:
/// 1. Initializes tracing to stderr (respects `RUST_LOG`)
/// 2. Reads the problem from stdin (JSON)
/// 3. Calls `plugin.solve()`
/// 4. Writes the solution to stdout (JSON)
/// 5. Exits with the appropriate [`ExitCode`]
pub fn run_solver_plugin<P: SolverPlugin>(plugin: P) -> ! {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    info!(
        solver = plugin.name(),
        protocol = PROTOCOL_VERSION,
        "solver plugin starting"
    );

    if let Err(e) = plugin.init() {
        error!("initialization failed: {:#}", e);
        std::process::exit(ExitCode::SolverError as i32);
    }

    let problem = match read_problem() {
        Ok(p) => p,
        Err(e) => {
            error!("invalid input: {:#}", e);
            std::process::exit(ExitCode::InvalidInput as i32);
        }
    };

    if problem.protocol_version != PROTOCOL_VERSION {
        error!(
            got = problem.protocol_version,
            expected = PROTOCOL_VERSION,
            "protocol version mismatch"
        );
        std::process::exit(ExitCode::InvalidInput as i32);
    }

    let solution = match plugin.solve(&problem) {
        Ok(s) => s,
        Err(e) => {
            error!("solve failed: {:#}", e);
            std::process::exit(ExitCode::SolverError as i32);
        }
    };

    if let Err(e) = write_solution(&solution) {
        error!("failed to reply: {:#}", e);
        std::process::exit(ExitCode::SolverError as i32);
    }

    info!(status = %solution.status, "solver plugin done");
    std::process::exit(ExitCode::Success as i32);
}
