//! Transcription and solve algorithms for trajectory optimization.
//!
//! The pipeline, scenario to answer:
//!
//! 1. [`formulate`]: transcribe a [`mpc_core::Scenario`] into a solver-ready
//!    [`mpc_solver_common::Problem`], substituting auxiliary variables for
//!    transcendental terms ([`substitute`]).
//! 2. [`refine`]: solve coarse, tighten bounds around the incumbent, solve
//!    fine, through a [`backend::SolverBackend`].
//! 3. [`report`]: recover the trajectory and measure violations against the
//!    exact nonlinear model.

pub mod backend;
pub mod formulate;
pub mod pwl;
pub mod refine;
pub mod report;
pub mod substitute;
pub mod test_utils;

pub use backend::{SolverBackend, SubprocessBackend};
pub use formulate::{formulate, zoom_demo_problem, FormulateError, Transcription, VarLayout};
pub use refine::{
    refine_scenario, refine_with, RefineConfig, RefineError, RefineOutcome, RefinePhase,
};
pub use report::TrajectoryReport;
pub use substitute::{aux_bounds, substitute};
