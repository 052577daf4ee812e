//! Trajectory extraction and violation diagnostics.
//!
//! A solution comes back as a flat value vector; this module turns it back
//! into a per-step trajectory and measures how far it is from satisfying
//! the *exact* model. Function constraints are checked as `|y - h(x)|`;
//! linear and quadratic constraints are checked against corrected values in
//! which every auxiliary variable is replaced by the closed-form `h(x)`, so
//! the numbers reflect the true nonlinear model rather than the
//! piecewise-linear approximation the solver saw.

use std::fmt;

use mpc_core::Scenario;
use mpc_solver_common::{Constraint, Problem, RelOp, Solution, SolutionStatus};
use serde::Serialize;

use crate::formulate::Transcription;

/// One step of the recovered trajectory.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: usize,
    pub state: Vec<f64>,
    /// Absent at the terminal step.
    pub control: Option<Vec<f64>>,
}

/// A named constraint and how much the solution violates it.
#[derive(Debug, Clone, Serialize)]
pub struct ConstraintViolation {
    pub name: String,
    pub violation: f64,
}

fn residual(lhs: f64, op: RelOp, rhs: f64) -> f64 {
    match op {
        RelOp::Le => (lhs - rhs).max(0.0),
        RelOp::Ge => (rhs - lhs).max(0.0),
        RelOp::Eq => (lhs - rhs).abs(),
    }
}

/// Violation of one constraint against a value vector.
///
/// For function constraints this is the approximation gap `|y - h(x)|`;
/// for the others it is the one-sided (or absolute, for equalities)
/// residual.
pub fn constraint_violation(constraint: &Constraint, values: &[f64]) -> f64 {
    let at = |id: mpc_solver_common::VarId| values.get(id.index()).copied().unwrap_or(0.0);
    match constraint {
        Constraint::Linear { expr, op, rhs, .. } => residual(expr.value(values), *op, *rhs),
        Constraint::Quadratic { expr, op, rhs, .. } => residual(expr.value(values), *op, *rhs),
        Constraint::Func {
            kind,
            input,
            output,
            ..
        } => (at(*output) - kind.eval(at(*input))).abs(),
    }
}

/// Per-constraint violations of a solution against the exact model.
///
/// Returns the nonzero violations (above `tolerance`) and the maximum over
/// all constraints. Auxiliary variables are first replaced by their
/// closed-form function values, so a tight piecewise-linear approximation
/// shows up here as a small maximum.
pub fn violation_summary(
    problem: &Problem,
    solution: &Solution,
    tolerance: f64,
) -> (Vec<ConstraintViolation>, f64) {
    if !solution.has_incumbent() {
        return (Vec::new(), 0.0);
    }

    // Corrected values: exact function outputs in place of the solver's
    // piecewise-linear approximants.
    let mut corrected = solution.values.clone();
    for c in problem.constraints() {
        if let Constraint::Func {
            kind,
            input,
            output,
            ..
        } = c
        {
            if let (Some(x), true) = (
                solution.values.get(input.index()).copied(),
                output.index() < corrected.len(),
            ) {
                corrected[output.index()] = kind.eval(x);
            }
        }
    }

    let mut violations = Vec::new();
    let mut max = 0.0f64;
    for c in problem.constraints() {
        // Function gaps against the raw values, everything else against the
        // corrected ones.
        let v = match c {
            Constraint::Func { .. } => constraint_violation(c, &solution.values),
            _ => constraint_violation(c, &corrected),
        };
        max = max.max(v);
        if v > tolerance {
            violations.push(ConstraintViolation {
                name: c.name().to_string(),
                violation: v,
            });
        }
    }
    violations.sort_by(|a, b| b.violation.total_cmp(&a.violation));
    (violations, max)
}

/// Human- and machine-readable account of a solved scenario.
#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryReport {
    pub scenario: String,
    pub status: SolutionStatus,
    pub objective: Option<f64>,
    pub solve_time_ms: i64,
    pub state_names: Vec<String>,
    pub control_names: Vec<String>,
    pub steps: Vec<StepRecord>,
    /// Violations above tolerance, largest first.
    pub violations: Vec<ConstraintViolation>,
    pub max_violation: f64,
}

impl TrajectoryReport {
    pub fn build(scenario: &Scenario, transcription: &Transcription, solution: &Solution) -> Self {
        let layout = &transcription.layout;
        let mut steps = Vec::new();
        if solution.has_incumbent() {
            for k in 0..=layout.horizon {
                let state = layout
                    .state_at(k)
                    .iter()
                    .map(|&id| solution.value(id).unwrap_or(f64::NAN))
                    .collect();
                let control = (k < layout.horizon).then(|| {
                    layout
                        .control_at(k)
                        .iter()
                        .map(|&id| solution.value(id).unwrap_or(f64::NAN))
                        .collect()
                });
                steps.push(StepRecord {
                    step: k,
                    state,
                    control,
                });
            }
        }

        let (violations, max_violation) = violation_summary(
            &transcription.problem,
            solution,
            transcription.problem.config.tolerance,
        );

        Self {
            scenario: scenario.name.clone(),
            status: solution.status,
            objective: solution.objective,
            solve_time_ms: solution.solve_time_ms,
            state_names: scenario.dynamics.state_names(),
            control_names: scenario.dynamics.control_names(),
            steps,
            violations,
            max_violation,
        }
    }
}

fn fmt_vec(f: &mut fmt::Formatter<'_>, values: &[f64]) -> fmt::Result {
    write!(f, "(")?;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{:.4}", v)?;
    }
    write!(f, ")")
}

impl fmt::Display for TrajectoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scenario: {}", self.scenario)?;
        writeln!(f, "Status:   {}", self.status)?;
        if let Some(obj) = self.objective {
            writeln!(f, "Objective: {:.6}", obj)?;
        }
        writeln!(f, "Solve time: {} ms", self.solve_time_ms)?;
        for record in &self.steps {
            write!(f, "Step {:3}: state ", record.step)?;
            fmt_vec(f, &record.state)?;
            if let Some(control) = &record.control {
                write!(f, "  control ")?;
                fmt_vec(f, control)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "Max violation: {:.3e}", self.max_violation)?;
        for v in &self.violations {
            writeln!(f, "  {} violated by {:.3e}", v.name, v.violation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpc_solver_common::{FuncKind, LinExpr, VarId, VarKind};

    #[test]
    fn residuals_are_one_sided() {
        let mut p = Problem::new("r");
        let x = p.add_var("x", VarKind::Continuous, 0.0, 10.0);
        p.add_constraint(Constraint::Linear {
            name: "cap".into(),
            expr: LinExpr::term(x, 1.0),
            op: RelOp::Le,
            rhs: 5.0,
        })
        .unwrap();

        let c = &p.constraints()[0];
        assert_eq!(constraint_violation(c, &[4.0]), 0.0);
        assert_eq!(constraint_violation(c, &[6.5]), 1.5);
    }

    #[test]
    fn violation_summary_uses_exact_function_values() {
        // budget: u + 4v <= 9 with u = exp(x), v = sqrt(y).
        let mut p = Problem::new("v");
        let x = p.add_var("x", VarKind::Continuous, 0.0, f64::INFINITY);
        let y = p.add_var("y", VarKind::Continuous, 0.0, f64::INFINITY);
        let u = p.add_var("u", VarKind::Continuous, 0.0, f64::INFINITY);
        let v = p.add_var("v", VarKind::Continuous, 0.0, f64::INFINITY);
        p.add_constraint(Constraint::Func {
            name: "u_def".into(),
            kind: FuncKind::Exp,
            input: x,
            output: u,
            resolution: None,
        })
        .unwrap();
        p.add_constraint(Constraint::Func {
            name: "v_def".into(),
            kind: FuncKind::Sqrt,
            input: y,
            output: v,
            resolution: None,
        })
        .unwrap();
        let mut lhs = LinExpr::term(u, 1.0);
        lhs.add_term(v, 4.0);
        p.add_constraint(Constraint::Linear {
            name: "budget".into(),
            expr: lhs,
            op: RelOp::Le,
            rhs: 9.0,
        })
        .unwrap();

        // The solver's approximants are slightly off the true curve; the
        // true values exp(1) + 4*sqrt(4) = 10.718... exceed the budget.
        let solution = Solution::optimal(6.0, vec![1.0, 4.0, 2.7, 1.99]);
        let (violations, max) = violation_summary(&p, &solution, 1e-9);

        let budget = violations.iter().find(|v| v.name == "budget").unwrap();
        let expected = (1f64.exp() + 4.0 * 2.0) - 9.0;
        assert!((budget.violation - expected).abs() < 1e-9);
        assert!(max >= budget.violation);
        // The function gaps themselves are reported too.
        assert!(violations.iter().any(|v| v.name == "u_def"));
    }

    #[test]
    fn no_incumbent_means_no_violations() {
        let p = Problem::new("empty");
        let s = Solution::infeasible("no");
        let (violations, max) = violation_summary(&p, &s, 1e-9);
        assert!(violations.is_empty());
        assert_eq!(max, 0.0);
    }

    #[test]
    fn report_shape_matches_horizon() {
        let scenario = mpc_core::scenario::presets::double_integrator();
        let t = crate::formulate::formulate(
            &scenario,
            mpc_solver_common::Resolution::Pieces(8),
        )
        .unwrap();
        let values = vec![0.0; t.problem.num_variables()];
        let solution = Solution::optimal(0.0, values);

        let report = TrajectoryReport::build(&scenario, &t, &solution);
        assert_eq!(report.steps.len(), scenario.horizon + 1);
        assert!(report.steps.last().unwrap().control.is_none());
        assert_eq!(report.steps[0].control.as_ref().unwrap().len(), 1);
    }
}
