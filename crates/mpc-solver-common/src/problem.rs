//! Optimization problem representation.
//!
//! Defines the data structures sent from the formulator to solver backends:
//! variables with bounds and kinds, linear/quadratic/general-function
//! constraints, one objective, and a solver configuration block.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::{LinExpr, QuadExpr, VarId};

/// Infinite bounds cross the JSON boundary as `null`.
mod lower_bound {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_some(v)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NEG_INFINITY))
    }
}

mod upper_bound {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_some(v)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY))
    }
}

/// Kind of decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    Continuous,
    Integer,
    Binary,
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarKind::Continuous => write!(f, "continuous"),
            VarKind::Integer => write!(f, "integer"),
            VarKind::Binary => write!(f, "binary"),
        }
    }
}

/// A decision variable. Owned by the [`Problem`] that created it;
/// expressions refer to it by [`VarId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    #[serde(with = "lower_bound")]
    pub lb: f64,
    #[serde(with = "upper_bound")]
    pub ub: f64,
    /// Optional warm-start value.
    #[serde(default)]
    pub start: Option<f64>,
}

/// Relational operator of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelOp {
    Le,
    Ge,
    Eq,
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelOp::Le => write!(f, "<="),
            RelOp::Ge => write!(f, ">="),
            RelOp::Eq => write!(f, "="),
        }
    }
}

/// Scalar function kind of a general-function constraint `y = h(x)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuncKind {
    Exp,
    Sqrt,
    Sin,
    Cos,
    Tan,
    /// `y = x^exponent`.
    Pow(f64),
}

impl FuncKind {
    /// Closed-form evaluation, used for violation diagnostics.
    pub fn eval(&self, x: f64) -> f64 {
        match self {
            FuncKind::Exp => x.exp(),
            FuncKind::Sqrt => x.sqrt(),
            FuncKind::Sin => x.sin(),
            FuncKind::Cos => x.cos(),
            FuncKind::Tan => x.tan(),
            FuncKind::Pow(e) => x.powf(*e),
        }
    }
}

impl fmt::Display for FuncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncKind::Exp => write!(f, "exp"),
            FuncKind::Sqrt => write!(f, "sqrt"),
            FuncKind::Sin => write!(f, "sin"),
            FuncKind::Cos => write!(f, "cos"),
            FuncKind::Tan => write!(f, "tan"),
            FuncKind::Pow(e) => write!(f, "pow({})", e),
        }
    }
}

/// Piecewise-linear approximation resolution for general-function
/// constraints. Shorter pieces mean a tighter approximation and a larger
/// problem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Fixed number of segments over the input domain.
    Pieces(u32),
    /// Maximum segment length over the input domain.
    PieceLength(f64),
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Pieces(n) => write!(f, "{} pieces", n),
            Resolution::PieceLength(l) => write!(f, "piece length {}", l),
        }
    }
}

/// A constraint of the problem. Names are used for diagnostics only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    Linear {
        name: String,
        expr: LinExpr,
        op: RelOp,
        rhs: f64,
    },
    Quadratic {
        name: String,
        expr: QuadExpr,
        op: RelOp,
        rhs: f64,
    },
    /// General-function constraint `output = kind(input)`, approximated by
    /// the solver at the given resolution (problem default when `None`).
    Func {
        name: String,
        kind: FuncKind,
        input: VarId,
        output: VarId,
        #[serde(default)]
        resolution: Option<Resolution>,
    },
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Constraint::Linear { name, .. }
            | Constraint::Quadratic { name, .. }
            | Constraint::Func { name, .. } => name,
        }
    }

    /// Variables referenced by this constraint.
    pub fn vars(&self) -> Vec<VarId> {
        match self {
            Constraint::Linear { expr, .. } => expr.vars().collect(),
            Constraint::Quadratic { expr, .. } => expr.vars(),
            Constraint::Func { input, output, .. } => vec![*input, *output],
        }
    }
}

/// Optimization sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sense {
    Minimize,
    Maximize,
}

/// Objective expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjExpr {
    Linear(LinExpr),
    Quadratic(QuadExpr),
}

impl ObjExpr {
    pub fn vars(&self) -> Vec<VarId> {
        match self {
            ObjExpr::Linear(e) => e.vars().collect(),
            ObjExpr::Quadratic(e) => e.vars(),
        }
    }

    pub fn value(&self, values: &[f64]) -> f64 {
        match self {
            ObjExpr::Linear(e) => e.value(values),
            ObjExpr::Quadratic(e) => e.value(values),
        }
    }
}

impl From<LinExpr> for ObjExpr {
    fn from(e: LinExpr) -> Self {
        ObjExpr::Linear(e)
    }
}

impl From<QuadExpr> for ObjExpr {
    fn from(e: QuadExpr) -> Self {
        ObjExpr::Quadratic(e)
    }
}

/// The problem objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub expr: ObjExpr,
    pub sense: Sense,
}

impl Default for Objective {
    fn default() -> Self {
        Self {
            expr: ObjExpr::Linear(LinExpr::new()),
            sense: Sense::Minimize,
        }
    }
}

/// How non-convex quadratic constraints are handled.
///
/// Keep-out constraints are inherently non-convex; whether the backend's
/// non-convex path is used or the formulation is rejected up front is an
/// explicit configuration choice, never an assumption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonconvexPolicy {
    /// Pass the constraints through; the solver may handle or reject them.
    #[default]
    SolverNative,
    /// Refuse to submit a problem containing non-convex quadratics.
    Reject,
}

/// Global solver configuration attached to a problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Default approximation resolution for general-function constraints.
    pub resolution: Resolution,
    /// Convergence tolerance.
    pub tolerance: f64,
    /// Wall-clock budget in seconds (0 = no limit). Enforced by the solver.
    pub time_limit_seconds: u64,
    /// Relative integrality/optimality gap.
    pub mip_gap: f64,
    /// Solver thread count (0 = solver decides).
    pub threads: i32,
    pub nonconvex: NonconvexPolicy,
    /// Opaque named options, passed through to the solver unchanged.
    /// Unrecognized names are the solver's to reject.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::Pieces(64),
            tolerance: 1e-6,
            time_limit_seconds: 0,
            mip_gap: 1e-2,
            threads: 0,
            nonconvex: NonconvexPolicy::default(),
            options: BTreeMap::new(),
        }
    }
}

/// Errors from problem assembly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// An expression or constraint references a variable the problem does
    /// not own. Indicates a formulator bug; fatal.
    #[error("'{context}' references unknown variable {id}")]
    UnknownVariable { id: VarId, context: String },

    #[error("invalid bounds for variable '{name}': [{lb}, {ub}]")]
    InvalidBounds { name: String, lb: f64, ub: f64 },
}

/// A fully-assembled optimization problem.
///
/// Invariant: every [`VarId`] referenced by a constraint or the objective
/// indexes into `variables`. [`Problem::add_constraint`] and
/// [`Problem::set_objective`] enforce this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub name: String,
    /// Protocol version for backend compatibility checking.
    pub protocol_version: i32,
    pub config: SolverConfig,
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: Objective,
}

impl Problem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol_version: crate::PROTOCOL_VERSION,
            config: SolverConfig::default(),
            variables: Vec::new(),
            constraints: Vec::new(),
            objective: Objective::default(),
        }
    }

    /// Add a variable and return its id.
    pub fn add_var(&mut self, name: impl Into<String>, kind: VarKind, lb: f64, ub: f64) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(Variable {
            name: name.into(),
            kind,
            lb,
            ub,
            start: None,
        });
        id
    }

    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.index())
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Current bounds of a variable.
    pub fn bounds(&self, id: VarId) -> Option<(f64, f64)> {
        self.variables.get(id.index()).map(|v| (v.lb, v.ub))
    }

    /// Replace the bounds of a variable. Used by the refinement loop to
    /// apply a tightened window to a freshly-formulated problem.
    pub fn set_bounds(&mut self, id: VarId, lb: f64, ub: f64) -> Result<(), ModelError> {
        let var = self
            .variables
            .get_mut(id.index())
            .ok_or_else(|| ModelError::UnknownVariable {
                id,
                context: "set_bounds".to_string(),
            })?;
        if lb > ub {
            return Err(ModelError::InvalidBounds {
                name: var.name.clone(),
                lb,
                ub,
            });
        }
        var.lb = lb;
        var.ub = ub;
        Ok(())
    }

    /// Set the warm-start value of a variable.
    pub fn set_start(&mut self, id: VarId, value: f64) -> Result<(), ModelError> {
        let var = self
            .variables
            .get_mut(id.index())
            .ok_or_else(|| ModelError::UnknownVariable {
                id,
                context: "set_start".to_string(),
            })?;
        var.start = Some(value);
        Ok(())
    }

    fn check_vars(&self, ids: &[VarId], context: &str) -> Result<(), ModelError> {
        for &id in ids {
            if id.index() >= self.variables.len() {
                return Err(ModelError::UnknownVariable {
                    id,
                    context: context.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Append a constraint, validating every variable reference.
    /// Returns the constraint's index.
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<usize, ModelError> {
        self.check_vars(&constraint.vars(), constraint.name())?;
        self.constraints.push(constraint);
        Ok(self.constraints.len() - 1)
    }

    /// Set the objective, validating every variable reference.
    pub fn set_objective(
        &mut self,
        expr: impl Into<ObjExpr>,
        sense: Sense,
    ) -> Result<(), ModelError> {
        let expr = expr.into();
        self.check_vars(&expr.vars(), "objective")?;
        self.objective = Objective { expr, sense };
        Ok(())
    }

    /// Name of the first non-convex quadratic constraint, if any.
    ///
    /// A quadratic equality or a `>=` quadratic (keep-out) is non-convex.
    pub fn nonconvex_constraint(&self) -> Option<&str> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::Quadratic { name, expr, op, .. }
                if !expr.is_linear() && matches!(op, RelOp::Ge | RelOp::Eq) =>
            {
                Some(name.as_str())
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_var_problem() -> (Problem, VarId, VarId) {
        let mut p = Problem::new("test");
        let x = p.add_var("x", VarKind::Continuous, 0.0, f64::INFINITY);
        let y = p.add_var("y", VarKind::Continuous, f64::NEG_INFINITY, 1.0);
        (p, x, y)
    }

    #[test]
    fn add_constraint_rejects_foreign_variable() {
        let (mut p, x, _) = two_var_problem();
        let mut expr = LinExpr::term(x, 1.0);
        expr.add_term(VarId(99), 1.0);
        let err = p
            .add_constraint(Constraint::Linear {
                name: "c0".into(),
                expr,
                op: RelOp::Le,
                rhs: 1.0,
            })
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownVariable { .. }));
    }

    #[test]
    fn set_bounds_rejects_empty_interval() {
        let (mut p, x, _) = two_var_problem();
        let err = p.set_bounds(x, 2.0, 1.0).unwrap_err();
        assert!(matches!(err, ModelError::InvalidBounds { .. }));
    }

    #[test]
    fn objective_validates_variables() {
        let (mut p, _, _) = two_var_problem();
        let expr = LinExpr::term(VarId(7), 1.0);
        assert!(p.set_objective(expr, Sense::Minimize).is_err());
    }

    #[test]
    fn nonconvex_detection() {
        let (mut p, x, y) = two_var_problem();
        let mut q = QuadExpr::new();
        q.add_quad_term(x, x, 1.0);
        q.add_quad_term(y, y, 1.0);
        p.add_constraint(Constraint::Quadratic {
            name: "ball".into(),
            expr: q.clone(),
            op: RelOp::Le,
            rhs: 1.0,
        })
        .unwrap();
        assert!(p.nonconvex_constraint().is_none());

        p.add_constraint(Constraint::Quadratic {
            name: "keep_out".into(),
            expr: q,
            op: RelOp::Ge,
            rhs: 4.0,
        })
        .unwrap();
        assert_eq!(p.nonconvex_constraint(), Some("keep_out"));
    }

    #[test]
    fn infinite_bounds_round_trip_through_json() {
        let (p, _, _) = two_var_problem();
        let json = serde_json::to_string(&p).unwrap();
        let back: Problem = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bounds(VarId(0)), Some((0.0, f64::INFINITY)));
        assert_eq!(back.bounds(VarId(1)), Some((f64::NEG_INFINITY, 1.0)));
    }

    #[test]
    fn func_constraint_round_trips() {
        let (mut p, x, y) = two_var_problem();
        p.add_constraint(Constraint::Func {
            name: "gc0".into(),
            kind: FuncKind::Pow(0.5),
            input: x,
            output: y,
            resolution: Some(Resolution::PieceLength(1e-3)),
        })
        .unwrap();
        let json = serde_json::to_string(&p).unwrap();
        let back: Problem = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
