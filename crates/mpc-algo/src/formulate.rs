//! Scenario transcription into a solver-ready optimization problem.
//!
//! Direct transcription: one set of state variables per step `0..=N`, one
//! set of control variables per step `0..N`, the initial state pinned by
//! equality constraints, dynamics as per-step per-component equality
//! constraints, obstacles as non-convex quadratic keep-out constraints, and
//! a quadratic tracking objective.
//!
//! Nonlinear dynamics go through [`substitute`]: each transcendental term
//! becomes an auxiliary variable tied to its input by a general-function
//! constraint, so the emitted problem is at most quadratic.
//!
//! Transcription is deterministic: formulating the same scenario twice
//! yields the same variable ids, which is what lets the refinement loop
//! transfer a bounds window from the coarse problem to the fine one.

use mpc_core::{Dynamics, Scenario};
use mpc_solver_common::{
    Constraint, FuncKind, LinExpr, ModelError, Problem, QuadExpr, RelOp, Resolution, Sense, VarId,
    VarKind,
};
use thiserror::Error;
use tracing::debug;

use crate::substitute::substitute;

/// Errors from scenario transcription.
#[derive(Debug, Error)]
pub enum FormulateError {
    /// The scenario failed validation; nothing was formulated.
    #[error("invalid scenario '{name}': {detail}")]
    InvalidScenario { name: String, detail: String },

    /// Internal expression assembly bug surfaced by the problem's
    /// variable-ownership checks.
    #[error("malformed expression: {0}")]
    MalformedExpression(#[from] ModelError),
}

/// Auxiliary variables introduced for one step of nonlinear dynamics.
#[derive(Debug, Clone, Copy)]
pub struct StepAux {
    pub cos_theta: VarId,
    pub sin_theta: VarId,
    pub tan_steer: VarId,
}

/// Maps (step, component) pairs to the variable ids of a transcription.
#[derive(Debug, Clone)]
pub struct VarLayout {
    pub horizon: usize,
    pub n_states: usize,
    pub n_controls: usize,
    state: Vec<VarId>,
    control: Vec<VarId>,
    /// Per-step auxiliary variables; empty for linear dynamics.
    pub aux: Vec<StepAux>,
}

impl VarLayout {
    /// State component `i` at step `k` (`k` in `0..=horizon`).
    pub fn state(&self, k: usize, i: usize) -> VarId {
        debug_assert!(k <= self.horizon && i < self.n_states);
        self.state[k * self.n_states + i]
    }

    /// Control component `j` at step `k` (`k` in `0..horizon`).
    pub fn control(&self, k: usize, j: usize) -> VarId {
        debug_assert!(k < self.horizon && j < self.n_controls);
        self.control[k * self.n_controls + j]
    }

    /// All state ids for step `k`, in component order.
    pub fn state_at(&self, k: usize) -> &[VarId] {
        &self.state[k * self.n_states..(k + 1) * self.n_states]
    }

    /// All control ids for step `k`, in component order.
    pub fn control_at(&self, k: usize) -> &[VarId] {
        &self.control[k * self.n_controls..(k + 1) * self.n_controls]
    }
}

/// A formulated problem plus the layout needed to interpret its solution.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub problem: Problem,
    pub layout: VarLayout,
    /// Inputs of general-function constraints, in id order. These are the
    /// variables whose bounds the refinement loop tightens around the
    /// coarse incumbent.
    pub refine_targets: Vec<VarId>,
}

/// `sum_ij w[i][j] (v_i - ref_i)(v_j - ref_j)`, expanded into quadratic,
/// linear and constant parts.
fn add_weighted_deviation(
    obj: &mut QuadExpr,
    var_at: &dyn Fn(usize) -> VarId,
    w: &[Vec<f64>],
    reference: &[f64],
) {
    for (i, row) in w.iter().enumerate() {
        for (j, &c) in row.iter().enumerate() {
            if c == 0.0 {
                continue;
            }
            obj.add_quad_term(var_at(i), var_at(j), c);
            obj.add_term(var_at(i), -c * reference[j]);
            obj.add_term(var_at(j), -c * reference[i]);
            obj.add_constant(c * reference[i] * reference[j]);
        }
    }
}

/// Transcribe a scenario into an optimization problem at the given
/// approximation resolution.
pub fn formulate(scenario: &Scenario, resolution: Resolution) -> Result<Transcription, FormulateError> {
    scenario
        .validate()
        .map_err(|e| FormulateError::InvalidScenario {
            name: scenario.name.clone(),
            detail: e.to_string(),
        })?;

    let n = scenario.dynamics.state_dim();
    let m = scenario.dynamics.control_dim();
    let horizon = scenario.horizon;
    let dt = scenario.dt;

    let mut problem = Problem::new(scenario.name.clone());
    problem.config.resolution = resolution;
    problem.config.options = scenario.solver_options.clone();

    // Variables: states for 0..=N, controls for 0..N, component-major
    // within each step so ids are stable across resolutions.
    let state_names = scenario.dynamics.state_names();
    let control_names = scenario.dynamics.control_names();

    let mut state = Vec::with_capacity((horizon + 1) * n);
    for k in 0..=horizon {
        for (i, comp) in state_names.iter().enumerate() {
            let b = scenario.state_bound(i);
            state.push(problem.add_var(
                format!("{}_{}", comp, k),
                VarKind::Continuous,
                b.lower(),
                b.upper(),
            ));
        }
    }
    let mut control = Vec::with_capacity(horizon * m);
    for k in 0..horizon {
        for (j, comp) in control_names.iter().enumerate() {
            let b = scenario.control_bound(j);
            control.push(problem.add_var(
                format!("{}_{}", comp, k),
                VarKind::Continuous,
                b.lower(),
                b.upper(),
            ));
        }
    }

    let mut layout = VarLayout {
        horizon,
        n_states: n,
        n_controls: m,
        state,
        control,
        aux: Vec::new(),
    };
    let mut refine_targets = Vec::new();

    // Initial state pinned at step 0.
    for i in 0..n {
        problem.add_constraint(Constraint::Linear {
            name: format!("init_{}", i),
            expr: LinExpr::term(layout.state(0, i), 1.0),
            op: RelOp::Eq,
            rhs: scenario.x0[i],
        })?;
    }

    // Dynamics, one equality per step and state component.
    match &scenario.dynamics {
        Dynamics::Lti { a, b } => {
            for k in 0..horizon {
                for i in 0..n {
                    let mut expr = LinExpr::term(layout.state(k + 1, i), 1.0);
                    for (j, &coeff) in a[i].iter().enumerate() {
                        expr.add_term(layout.state(k, j), -coeff);
                    }
                    for (j, &coeff) in b[i].iter().enumerate() {
                        expr.add_term(layout.control(k, j), -coeff);
                    }
                    problem.add_constraint(Constraint::Linear {
                        name: format!("dyn_{}_{}", k, i),
                        expr,
                        op: RelOp::Eq,
                        rhs: 0.0,
                    })?;
                }
            }
        }
        Dynamics::Bicycle { wheelbase } => {
            for k in 0..horizon {
                let theta = layout.state(k, 2);
                let v = layout.state(k, 3);
                let steer = layout.control(k, 0);
                let accel = layout.control(k, 1);

                let cos_theta =
                    substitute(&mut problem, FuncKind::Cos, theta, &format!("cos_theta_{}", k), None)?;
                let sin_theta =
                    substitute(&mut problem, FuncKind::Sin, theta, &format!("sin_theta_{}", k), None)?;
                let tan_steer =
                    substitute(&mut problem, FuncKind::Tan, steer, &format!("tan_steer_{}", k), None)?;
                layout.aux.push(StepAux {
                    cos_theta,
                    sin_theta,
                    tan_steer,
                });
                refine_targets.push(theta);
                refine_targets.push(steer);

                // x+ = x + T v cos(theta)
                let mut qx = QuadExpr::new();
                qx.add_term(layout.state(k + 1, 0), 1.0);
                qx.add_term(layout.state(k, 0), -1.0);
                qx.add_quad_term(v, cos_theta, -dt);
                problem.add_constraint(Constraint::Quadratic {
                    name: format!("dyn_{}_0", k),
                    expr: qx,
                    op: RelOp::Eq,
                    rhs: 0.0,
                })?;

                // y+ = y + T v sin(theta)
                let mut qy = QuadExpr::new();
                qy.add_term(layout.state(k + 1, 1), 1.0);
                qy.add_term(layout.state(k, 1), -1.0);
                qy.add_quad_term(v, sin_theta, -dt);
                problem.add_constraint(Constraint::Quadratic {
                    name: format!("dyn_{}_1", k),
                    expr: qy,
                    op: RelOp::Eq,
                    rhs: 0.0,
                })?;

                // theta+ = theta + (T/L) v tan(steer)
                let mut qt = QuadExpr::new();
                qt.add_term(layout.state(k + 1, 2), 1.0);
                qt.add_term(theta, -1.0);
                qt.add_quad_term(v, tan_steer, -dt / wheelbase);
                problem.add_constraint(Constraint::Quadratic {
                    name: format!("dyn_{}_2", k),
                    expr: qt,
                    op: RelOp::Eq,
                    rhs: 0.0,
                })?;

                // v+ = v + T a
                let mut ev = LinExpr::term(layout.state(k + 1, 3), 1.0);
                ev.add_term(v, -1.0);
                ev.add_term(accel, -dt);
                problem.add_constraint(Constraint::Linear {
                    name: format!("dyn_{}_3", k),
                    expr: ev,
                    op: RelOp::Eq,
                    rhs: 0.0,
                })?;
            }
        }
        Dynamics::ReducedBicycle { wheelbase } => {
            for k in 0..horizon {
                let theta = layout.state(k, 2);
                let steer = layout.control(k, 0);

                let cos_theta =
                    substitute(&mut problem, FuncKind::Cos, theta, &format!("cos_theta_{}", k), None)?;
                let sin_theta =
                    substitute(&mut problem, FuncKind::Sin, theta, &format!("sin_theta_{}", k), None)?;
                let tan_steer =
                    substitute(&mut problem, FuncKind::Tan, steer, &format!("tan_steer_{}", k), None)?;
                layout.aux.push(StepAux {
                    cos_theta,
                    sin_theta,
                    tan_steer,
                });
                refine_targets.push(theta);
                refine_targets.push(steer);

                // Unit speed: x+ = x + T cos(theta), linear in the auxiliary.
                let mut ex = LinExpr::term(layout.state(k + 1, 0), 1.0);
                ex.add_term(layout.state(k, 0), -1.0);
                ex.add_term(cos_theta, -dt);
                problem.add_constraint(Constraint::Linear {
                    name: format!("dyn_{}_0", k),
                    expr: ex,
                    op: RelOp::Eq,
                    rhs: 0.0,
                })?;

                let mut ey = LinExpr::term(layout.state(k + 1, 1), 1.0);
                ey.add_term(layout.state(k, 1), -1.0);
                ey.add_term(sin_theta, -dt);
                problem.add_constraint(Constraint::Linear {
                    name: format!("dyn_{}_1", k),
                    expr: ey,
                    op: RelOp::Eq,
                    rhs: 0.0,
                })?;

                let mut et = LinExpr::term(layout.state(k + 1, 2), 1.0);
                et.add_term(theta, -1.0);
                et.add_term(tan_steer, -dt / wheelbase);
                problem.add_constraint(Constraint::Linear {
                    name: format!("dyn_{}_2", k),
                    expr: et,
                    op: RelOp::Eq,
                    rhs: 0.0,
                })?;
            }
        }
    }

    // Keep-out constraints at steps 1..=N. The initial position is fixed by
    // the init constraints, so constraining it would only risk infeasibility
    // when the vehicle starts at the keep-out boundary.
    //
    //   (x - ox)^2 + (y - oy)^2 >= (r + margin)^2
    for k in 1..=horizon {
        for (o, obs) in scenario.obstacles.iter().enumerate() {
            let x = layout.state(k, 0);
            let y = layout.state(k, 1);
            let keep = obs.radius + scenario.safety_margin;

            let mut q = QuadExpr::new();
            q.add_quad_term(x, x, 1.0);
            q.add_term(x, -2.0 * obs.x);
            q.add_quad_term(y, y, 1.0);
            q.add_term(y, -2.0 * obs.y);
            problem.add_constraint(Constraint::Quadratic {
                name: format!("obs_{}_{}", k, o),
                expr: q,
                op: RelOp::Ge,
                rhs: keep * keep - obs.x * obs.x - obs.y * obs.y,
            })?;
        }
    }

    // Quadratic tracking objective: stage deviations from the reference,
    // stage control effort, terminal deviation from the target.
    let reference = scenario.stage_reference();
    let control_ref = vec![0.0; m];
    let mut obj = QuadExpr::new();
    for k in 0..horizon {
        add_weighted_deviation(&mut obj, &|i| layout.state(k, i), &scenario.q, &reference);
        add_weighted_deviation(&mut obj, &|j| layout.control(k, j), &scenario.r, &control_ref);
    }
    add_weighted_deviation(
        &mut obj,
        &|i| layout.state(horizon, i),
        &scenario.qf,
        &scenario.target,
    );
    problem.set_objective(obj, Sense::Minimize)?;

    refine_targets.sort();
    refine_targets.dedup();

    debug!(
        scenario = %scenario.name,
        variables = problem.num_variables(),
        constraints = problem.num_constraints(),
        targets = refine_targets.len(),
        %resolution,
        "formulated problem"
    );

    Ok(Transcription {
        problem,
        layout,
        refine_targets,
    })
}

/// Hand-built demonstration problem for the refinement loop:
///
///   maximize 2x + y
///   s.t.     u + 4v <= 9,  u = exp(x),  v = y^0.5,  x, y >= 0
///
/// Small enough to read, yet its optimum sits on the curved boundary, so
/// the coarse-to-fine zoom visibly improves the answer. Returns the problem
/// and the refinement targets (the function inputs `x` and `y`).
pub fn zoom_demo_problem(resolution: Resolution) -> Result<(Problem, Vec<VarId>), FormulateError> {
    let mut p = Problem::new("zoom-demo");
    p.config.resolution = resolution;

    let x = p.add_var("x", VarKind::Continuous, 0.0, f64::INFINITY);
    let y = p.add_var("y", VarKind::Continuous, 0.0, f64::INFINITY);
    let u = substitute(&mut p, FuncKind::Exp, x, "u", None)?;
    let v = substitute(&mut p, FuncKind::Pow(0.5), y, "v", None)?;

    let mut lhs = LinExpr::term(u, 1.0);
    lhs.add_term(v, 4.0);
    p.add_constraint(Constraint::Linear {
        name: "budget".into(),
        expr: lhs,
        op: RelOp::Le,
        rhs: 9.0,
    })?;

    let mut obj = LinExpr::term(x, 2.0);
    obj.add_term(y, 1.0);
    p.set_objective(obj, Sense::Maximize)?;

    Ok((p, vec![x, y]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpc_core::scenario::presets;
    use mpc_solver_common::ObjExpr;

    #[test]
    fn objective_vanishes_at_the_reference() {
        // Q, R and Qf all reference the same point; a trajectory sitting on
        // it costs exactly zero.
        let scenario = presets::bicycle_obstacle();
        let t = formulate(&scenario, Resolution::Pieces(8)).unwrap();

        let mut values = vec![0.0; t.problem.num_variables()];
        for k in 0..=scenario.horizon {
            for i in 0..4 {
                values[t.layout.state(k, i).index()] = scenario.target[i];
            }
        }
        let obj = match &t.problem.objective().expr {
            ObjExpr::Quadratic(q) => q.value(&values),
            ObjExpr::Linear(l) => l.value(&values),
        };
        assert!(obj.abs() < 1e-9, "objective at reference was {}", obj);
    }

    #[test]
    fn zoom_demo_shape() {
        let (p, targets) = zoom_demo_problem(Resolution::PieceLength(1e-3)).unwrap();
        assert_eq!(p.num_variables(), 4);
        // Two function ties plus the budget row.
        assert_eq!(p.num_constraints(), 3);
        assert_eq!(targets.len(), 2);
        assert_eq!(p.objective().sense, Sense::Maximize);
    }
}
