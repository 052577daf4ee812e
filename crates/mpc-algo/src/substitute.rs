//! Auxiliary-variable substitution for transcendental terms.
//!
//! Solvers in scope accept linear and quadratic expressions only. A
//! transcendental term `h(x)` is made representable by introducing a fresh
//! auxiliary variable `y`, tying it to `x` with a general-function
//! constraint `y = h(x)`, and using `y` in place of `h(x)` everywhere else.
//! The solver resolves the function constraint internally (piecewise-linear
//! approximation at the problem's resolution).
//!
//! The auxiliary variable gets the tightest bounds derivable from the range
//! of `h` over the input's bound interval; see [`aux_bounds`].

use std::f64::consts::FRAC_PI_2;

use mpc_solver_common::{Constraint, FuncKind, ModelError, Problem, Resolution, VarId, VarKind};
use tracing::trace;

/// Bounds of the auxiliary variable for `y = kind(x)` with `x` in `[lb, ub]`.
///
/// Uses range analysis where the function's range over the interval is
/// cheap to compute, and falls back to the function's global range (or
/// unbounded) where it is not:
///
/// - `sin`/`cos`: always `[-1, 1]`, regardless of the input interval.
/// - `exp`: monotone, `[exp(lb), exp(ub)]`, with 0 / +inf for infinite ends.
/// - `sqrt`: monotone on its domain, `[sqrt(max(lb, 0)), sqrt(ub)]`.
/// - `tan`: monotone within a branch; tightened only when the whole input
///   interval sits strictly inside `(-pi/2, pi/2)`.
/// - `pow(e)`: monotone for `e > 0` on non-negative inputs; unbounded
///   otherwise.
pub fn aux_bounds(kind: FuncKind, lb: f64, ub: f64) -> (f64, f64) {
    match kind {
        FuncKind::Sin | FuncKind::Cos => (-1.0, 1.0),
        FuncKind::Exp => (
            if lb.is_finite() { lb.exp() } else { 0.0 },
            if ub.is_finite() { ub.exp() } else { f64::INFINITY },
        ),
        FuncKind::Sqrt => (
            if lb.is_finite() && lb > 0.0 {
                lb.sqrt()
            } else {
                0.0
            },
            if ub.is_finite() && ub >= 0.0 {
                ub.sqrt()
            } else {
                f64::INFINITY
            },
        ),
        FuncKind::Tan => {
            if lb > -FRAC_PI_2 && ub < FRAC_PI_2 {
                (lb.tan(), ub.tan())
            } else {
                (f64::NEG_INFINITY, f64::INFINITY)
            }
        }
        FuncKind::Pow(e) => {
            if e > 0.0 && lb >= 0.0 {
                (
                    lb.powf(e),
                    if ub.is_finite() {
                        ub.powf(e)
                    } else {
                        f64::INFINITY
                    },
                )
            } else {
                (f64::NEG_INFINITY, f64::INFINITY)
            }
        }
    }
}

/// Introduce an auxiliary variable `y = kind(input)` into the problem.
///
/// Adds one continuous variable (bounded per [`aux_bounds`]) and one
/// general-function constraint named `name`, and returns the auxiliary
/// variable's id. The caller uses the returned id wherever the
/// transcendental term appears.
///
/// A `resolution` of `None` defers to the problem's default.
pub fn substitute(
    problem: &mut Problem,
    kind: FuncKind,
    input: VarId,
    name: &str,
    resolution: Option<Resolution>,
) -> Result<VarId, ModelError> {
    let (in_lb, in_ub) = problem
        .bounds(input)
        .ok_or_else(|| ModelError::UnknownVariable {
            id: input,
            context: name.to_string(),
        })?;
    let (lb, ub) = aux_bounds(kind, in_lb, in_ub);

    let output = problem.add_var(name, VarKind::Continuous, lb, ub);
    problem.add_constraint(Constraint::Func {
        name: name.to_string(),
        kind,
        input,
        output,
        resolution,
    })?;

    trace!(%kind, %input, %output, lb, ub, "substituted auxiliary variable");
    Ok(output)
}
