//! Successive-refinement solve loop.
//!
//! A tight piecewise-linear approximation over the full variable domain is
//! prohibitively large, so the loop solves twice:
//!
//! 1. **Coarse**: solve at a coarse resolution over the full domain to
//!    locate the optimum's neighborhood. Failure here is fatal, since there
//!    is nothing to zoom into.
//! 2. **Tighten**: shrink the bounds of every function-input variable to a
//!    window of half-width [`RefineConfig::window`] around its coarse
//!    value, clamped to the original bounds.
//! 3. **Fine**: re-formulate at the fine resolution, apply the window, and
//!    solve again. A time limit with an incumbent in hand is accepted as a
//!    best-effort answer.
//!
//! Problems are never mutated across passes. Each pass formulates afresh
//! through the caller's builder; transcription determinism makes the
//! coarse-pass variable ids valid against the fine-pass problem, which is
//! what lets the window transfer.

use std::collections::BTreeMap;

use mpc_solver_common::{
    Problem, Resolution, Solution, SolutionStatus, SolverError, VarId,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::SolverBackend;
use crate::formulate::{formulate, FormulateError};

/// Phase of the refinement loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinePhase {
    Coarse,
    Tightening,
    Fine,
    Done,
    Failed,
}

impl std::fmt::Display for RefinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefinePhase::Coarse => write!(f, "coarse"),
            RefinePhase::Tightening => write!(f, "tightening"),
            RefinePhase::Fine => write!(f, "fine"),
            RefinePhase::Done => write!(f, "done"),
            RefinePhase::Failed => write!(f, "failed"),
        }
    }
}

/// Refinement loop parameters.
#[derive(Debug, Clone)]
pub struct RefineConfig {
    /// Resolution of the exploratory full-domain pass.
    pub coarse: Resolution,
    /// Resolution of the zoomed pass.
    pub fine: Resolution,
    /// Half-width of the bounds window around the coarse incumbent.
    pub window: f64,
    /// Skip the zoom: one fine-resolution pass over the full domain.
    pub single_pass: bool,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            coarse: Resolution::PieceLength(1e-3),
            fine: Resolution::PieceLength(1e-5),
            window: 1e-2,
            single_pass: false,
        }
    }
}

/// Tightened per-variable bounds, keyed by variable id.
pub type BoundsWindow = BTreeMap<VarId, (f64, f64)>;

/// Outcome of one solver pass, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub phase: RefinePhase,
    pub resolution: Resolution,
    pub status: SolutionStatus,
    pub objective: Option<f64>,
    pub solve_time_ms: i64,
}

/// Where the loop currently stands. Returned with the outcome so callers
/// can report how the answer was reached.
#[derive(Debug, Clone)]
pub struct RefineState {
    pub phase: RefinePhase,
    pub resolution: Resolution,
    pub window: Option<BoundsWindow>,
    pub iterations: usize,
    pub best: Option<Solution>,
}

impl RefineState {
    fn start(resolution: Resolution) -> Self {
        Self {
            phase: RefinePhase::Coarse,
            resolution,
            window: None,
            iterations: 0,
            best: None,
        }
    }
}

/// Final result of the refinement loop.
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    /// The accepted solution (optimal, or best-effort on a fine-pass time
    /// limit).
    pub solution: Solution,
    /// One entry per solver pass, in order.
    pub passes: Vec<PassReport>,
    pub state: RefineState,
}

/// Errors from the refinement loop.
#[derive(Debug, Error)]
pub enum RefineError {
    #[error(transparent)]
    Formulate(#[from] FormulateError),

    /// The backend itself failed (process, protocol); distinct from the
    /// solver reporting an unsolvable problem.
    #[error("solver backend failed during {phase} pass ({resolution}): {source}")]
    Backend {
        phase: RefinePhase,
        resolution: Resolution,
        #[source]
        source: SolverError,
    },

    /// A pass ended in a status the loop cannot proceed from.
    #[error("{phase} pass ({resolution}) ended with status {status}")]
    PassFailed {
        phase: RefinePhase,
        resolution: Resolution,
        status: SolutionStatus,
        /// Last feasible incumbent, when one exists.
        incumbent: Option<Box<Solution>>,
    },
}

/// Compute the tightened window around an incumbent.
///
/// For each target with a value in the incumbent, the window is
/// `[max(lb, v - delta), min(ub, v + delta)]` against the variable's
/// original bounds. Targets without a value are skipped. Clamping
/// guarantees the window is a sub-interval of the original bounds, so the
/// incumbent stays feasible for the fine pass.
pub fn tighten_window(
    problem: &Problem,
    incumbent: &Solution,
    targets: &[VarId],
    delta: f64,
) -> BoundsWindow {
    targets
        .iter()
        .filter_map(|&id| {
            let (lb, ub) = problem.bounds(id)?;
            let v = incumbent.value(id)?;
            Some((id, (lb.max(v - delta), ub.min(v + delta))))
        })
        .collect()
}

/// Apply a bounds window to a freshly-formulated problem.
pub fn apply_window(problem: &mut Problem, window: &BoundsWindow) -> Result<(), FormulateError> {
    for (&id, &(lb, ub)) in window {
        problem.set_bounds(id, lb, ub)?;
    }
    Ok(())
}

fn solve_pass(
    backend: &dyn SolverBackend,
    problem: &Problem,
    phase: RefinePhase,
    resolution: Resolution,
    passes: &mut Vec<PassReport>,
) -> Result<Solution, RefineError> {
    info!(%phase, %resolution, solver = backend.id(), "starting solver pass");
    let solution = backend
        .solve(problem)
        .map_err(|source| RefineError::Backend {
            phase,
            resolution,
            source,
        })?;
    info!(
        %phase,
        status = %solution.status,
        objective = ?solution.objective,
        solve_time_ms = solution.solve_time_ms,
        "solver pass finished"
    );
    passes.push(PassReport {
        phase,
        resolution,
        status: solution.status,
        objective: solution.objective,
        solve_time_ms: solution.solve_time_ms,
    });
    Ok(solution)
}

/// Run the refinement loop with a caller-supplied problem builder.
///
/// The builder is invoked once per pass with the pass resolution and must
/// return the problem plus the refinement targets; it must be
/// deterministic in everything except the resolution.
pub fn refine_with<F>(
    backend: &dyn SolverBackend,
    config: &RefineConfig,
    mut build: F,
) -> Result<RefineOutcome, RefineError>
where
    F: FnMut(Resolution) -> Result<(Problem, Vec<VarId>), FormulateError>,
{
    let mut passes = Vec::new();

    if config.single_pass {
        let mut state = RefineState::start(config.fine);
        state.phase = RefinePhase::Fine;
        let (problem, _) = build(config.fine)?;
        let solution = solve_pass(backend, &problem, RefinePhase::Fine, config.fine, &mut passes)?;
        state.iterations = 1;
        return accept(RefinePhase::Fine, config.fine, solution, passes, state);
    }

    let mut state = RefineState::start(config.coarse);

    let (coarse_problem, targets) = build(config.coarse)?;
    let coarse = solve_pass(
        backend,
        &coarse_problem,
        RefinePhase::Coarse,
        config.coarse,
        &mut passes,
    )?;
    state.iterations += 1;
    if coarse.status != SolutionStatus::Optimal {
        state.phase = RefinePhase::Failed;
        // No neighborhood to zoom into.
        return Err(RefineError::PassFailed {
            phase: RefinePhase::Coarse,
            resolution: config.coarse,
            status: coarse.status,
            incumbent: coarse.has_incumbent().then(|| Box::new(coarse)),
        });
    }
    state.best = Some(coarse.clone());

    state.phase = RefinePhase::Tightening;
    let window = tighten_window(&coarse_problem, &coarse, &targets, config.window);
    debug!(targets = window.len(), delta = config.window, "tightened bounds window");
    state.window = Some(window.clone());

    state.phase = RefinePhase::Fine;
    state.resolution = config.fine;
    let (mut fine_problem, _) = build(config.fine)?;
    apply_window(&mut fine_problem, &window)?;
    let fine = solve_pass(
        backend,
        &fine_problem,
        RefinePhase::Fine,
        config.fine,
        &mut passes,
    )?;
    state.iterations += 1;

    accept(RefinePhase::Fine, config.fine, fine, passes, state)
}

/// Classify the final pass: optimal is accepted, a time limit with an
/// incumbent is accepted best-effort, anything else fails with the last
/// feasible incumbent attached.
fn accept(
    phase: RefinePhase,
    resolution: Resolution,
    solution: Solution,
    passes: Vec<PassReport>,
    mut state: RefineState,
) -> Result<RefineOutcome, RefineError> {
    match solution.status {
        SolutionStatus::Optimal => {
            state.phase = RefinePhase::Done;
            state.best = Some(solution.clone());
            Ok(RefineOutcome {
                solution,
                passes,
                state,
            })
        }
        SolutionStatus::TimeLimit if solution.has_incumbent() => {
            warn!(
                %phase,
                objective = ?solution.objective,
                "time limit hit; accepting incumbent as best-effort"
            );
            state.phase = RefinePhase::Done;
            state.best = Some(solution.clone());
            Ok(RefineOutcome {
                solution,
                passes,
                state,
            })
        }
        status => {
            state.phase = RefinePhase::Failed;
            let incumbent = if solution.has_incumbent() {
                Some(Box::new(solution))
            } else {
                state.best.clone().map(Box::new)
            };
            Err(RefineError::PassFailed {
                phase,
                resolution,
                status,
                incumbent,
            })
        }
    }
}

/// Refine a scenario end to end: formulate at each pass resolution and run
/// the loop against the given backend.
pub fn refine_scenario(
    backend: &dyn SolverBackend,
    config: &RefineConfig,
    scenario: &mpc_core::Scenario,
) -> Result<RefineOutcome, RefineError> {
    refine_with(backend, config, |resolution| {
        formulate(scenario, resolution).map(|t| (t.problem, t.refine_targets))
    })
}
