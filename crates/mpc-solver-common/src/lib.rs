//! Common types and subprocess protocol for MPC solver backends.
//!
//! This crate defines the optimization-problem data model shared between
//! the transcription layer (`mpc-algo`) and external solver backends, plus
//! the JSON-over-stdio protocol used to reach them.
//!
//! # Architecture
//!
//! Solvers are opaque black boxes reached through a subprocess boundary.
//! The subprocess model isolates solver failures (license errors, native
//! crashes) from the formulating process and keeps the core free of FFI.
//!
//! ```text
//! mpc (main) ──stdin──> solver backend (subprocess)
//!            <─stdout──
//!            <─stderr── (logs/errors)
//! ```
//!
//! A problem carries variables with bounds and kinds, linear, quadratic and
//! general-function constraints, one objective, and a configuration block
//! with named passthrough options. The solver replies with a status, an
//! optional incumbent, the objective value, and the solve time.
//!
//! # Protocol Version
//!
//! The protocol is versioned for compatibility checking. Breaking schema
//! changes increment [`PROTOCOL_VERSION`].

pub mod error;
pub mod expr;
pub mod plugin;
pub mod problem;
pub mod solution;
pub mod subprocess;

pub use error::{ExitCode, SolverError, SolverResult};
pub use expr::{LinExpr, QuadExpr, VarId};
pub use plugin::{run_solver_plugin, SolverPlugin};
pub use problem::{
    Constraint, FuncKind, ModelError, NonconvexPolicy, ObjExpr, Objective, Problem, RelOp,
    Resolution, Sense, SolverConfig, VarKind, Variable,
};
pub use solution::{Solution, SolutionStatus};
pub use subprocess::{is_solver_installed, SolverProcess};

/// Protocol version for compatibility checking.
/// Increment when making breaking changes to the schema.
pub const PROTOCOL_VERSION: i32 = 1;
