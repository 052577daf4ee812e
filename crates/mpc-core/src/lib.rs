//! # mpc-core: Scenario Model for Trajectory Optimization
//!
//! This crate holds the immutable domain input for the MPC transcription
//! toolkit: [`Scenario`] (horizon, dynamics, cost weights, bounds,
//! obstacles) and the unified [`MpcError`] used at API boundaries.
//!
//! The optimization-problem data model lives in `mpc-solver-common`; the
//! transcription and refinement algorithms live in `mpc-algo`.

pub mod error;
pub mod scenario;

pub use error::{MpcError, MpcResult};
pub use scenario::{presets, Bounds, Dynamics, Obstacle, Scenario};
