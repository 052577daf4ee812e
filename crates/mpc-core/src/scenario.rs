//! Scenario descriptions for trajectory optimization.
//!
//! A [`Scenario`] is the immutable input to the problem formulator: horizon,
//! timestep, dynamics, cost weights, bounds, obstacles, and the initial and
//! target states. Scenarios are constructed once (from a JSON file or one of
//! the built-in presets) and never mutated afterwards.

use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_4;

use serde::{Deserialize, Serialize};

use crate::error::{MpcError, MpcResult};

/// A circular keep-out region in the x/y plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

/// Per-component variable bounds. `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default)]
    pub lb: Option<f64>,
    #[serde(default)]
    pub ub: Option<f64>,
}

impl Bounds {
    pub fn new(lb: f64, ub: f64) -> Self {
        Self {
            lb: Some(lb),
            ub: Some(ub),
        }
    }

    /// Symmetric bounds `[-limit, limit]`.
    pub fn symmetric(limit: f64) -> Self {
        Self::new(-limit, limit)
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn lower(&self) -> f64 {
        self.lb.unwrap_or(f64::NEG_INFINITY)
    }

    pub fn upper(&self) -> f64 {
        self.ub.unwrap_or(f64::INFINITY)
    }
}

/// System dynamics `x[k+1] = f(x[k], u[k])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Dynamics {
    /// Linear time-invariant: `x[k+1] = A x[k] + B u[k]`.
    Lti { a: Vec<Vec<f64>>, b: Vec<Vec<f64>> },
    /// Kinematic bicycle: states (x, y, theta, v), controls (steer, accel).
    ///
    /// x+ = x + T v cos(theta), y+ = y + T v sin(theta),
    /// theta+ = theta + (T/L) v tan(steer), v+ = v + T a.
    Bicycle { wheelbase: f64 },
    /// Unit-speed bicycle: states (x, y, theta), control (steer).
    ///
    /// Same heading propagation as [`Dynamics::Bicycle`] with v fixed at 1.
    ReducedBicycle { wheelbase: f64 },
}

impl Dynamics {
    /// Number of state components.
    pub fn state_dim(&self) -> usize {
        match self {
            Dynamics::Lti { a, .. } => a.len(),
            Dynamics::Bicycle { .. } => 4,
            Dynamics::ReducedBicycle { .. } => 3,
        }
    }

    /// Number of control components.
    pub fn control_dim(&self) -> usize {
        match self {
            Dynamics::Lti { b, .. } => b.first().map_or(0, |row| row.len()),
            Dynamics::Bicycle { .. } => 2,
            Dynamics::ReducedBicycle { .. } => 1,
        }
    }

    /// True if the dynamics contain no transcendental terms.
    pub fn is_linear(&self) -> bool {
        matches!(self, Dynamics::Lti { .. })
    }

    /// Human-readable names for the state components.
    pub fn state_names(&self) -> Vec<String> {
        match self {
            Dynamics::Lti { a, .. } => (0..a.len()).map(|i| format!("x{}", i)).collect(),
            Dynamics::Bicycle { .. } => {
                vec!["x".into(), "y".into(), "theta".into(), "v".into()]
            }
            Dynamics::ReducedBicycle { .. } => vec!["x".into(), "y".into(), "theta".into()],
        }
    }

    /// Human-readable names for the control components.
    pub fn control_names(&self) -> Vec<String> {
        match self {
            Dynamics::Lti { b, .. } => {
                let m = b.first().map_or(0, |row| row.len());
                (0..m).map(|j| format!("u{}", j)).collect()
            }
            Dynamics::Bicycle { .. } => vec!["steer".into(), "accel".into()],
            Dynamics::ReducedBicycle { .. } => vec!["steer".into()],
        }
    }
}

fn default_safety_margin() -> f64 {
    1.0
}

/// A concrete trajectory optimization instance.
///
/// Obstacle constraints apply to the first two state components, which are
/// taken to be the x/y position of the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Number of discrete steps N. States run 0..=N, controls 0..N.
    pub horizon: usize,
    /// Timestep T in seconds (1.0 for already-discrete LTI systems).
    pub dt: f64,
    pub dynamics: Dynamics,
    /// Stage state weight matrix Q (n x n).
    pub q: Vec<Vec<f64>>,
    /// Stage control weight matrix R (m x m).
    pub r: Vec<Vec<f64>>,
    /// Terminal state weight matrix Qf (n x n).
    pub qf: Vec<Vec<f64>>,
    /// Initial state, pinned by equality constraints at step 0.
    pub x0: Vec<f64>,
    /// Target state, penalized by the terminal cost.
    pub target: Vec<f64>,
    /// Stage cost reference. Defaults to the origin when absent.
    #[serde(default)]
    pub reference: Option<Vec<f64>>,
    /// Per-component state bounds; absent means unbounded.
    #[serde(default)]
    pub state_bounds: Option<Vec<Bounds>>,
    /// Per-component control bounds; absent means unbounded.
    #[serde(default)]
    pub control_bounds: Option<Vec<Bounds>>,
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
    /// Added to every obstacle radius in the keep-out constraints.
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,
    /// Opaque named solver options, passed through to the backend unchanged.
    #[serde(default)]
    pub solver_options: BTreeMap<String, String>,
}

fn check_square(name: &str, m: &[Vec<f64>], dim: usize) -> MpcResult<()> {
    if m.len() != dim || m.iter().any(|row| row.len() != dim) {
        return Err(MpcError::Validation(format!(
            "{} must be {}x{}, got {}x{}",
            name,
            dim,
            dim,
            m.len(),
            m.first().map_or(0, |row| row.len())
        )));
    }
    Ok(())
}

impl Scenario {
    /// Validate dimensional consistency. Called by the formulator before any
    /// variable is allocated; a scenario that fails here is never solvable.
    pub fn validate(&self) -> MpcResult<()> {
        if self.horizon < 1 {
            return Err(MpcError::Validation(
                "horizon must be at least 1".to_string(),
            ));
        }
        if !(self.dt > 0.0) {
            return Err(MpcError::Validation(format!(
                "timestep must be positive, got {}",
                self.dt
            )));
        }

        let n = self.dynamics.state_dim();
        let m = self.dynamics.control_dim();
        if n == 0 {
            return Err(MpcError::Validation("state dimension is zero".to_string()));
        }
        if m == 0 {
            return Err(MpcError::Validation(
                "control dimension is zero".to_string(),
            ));
        }

        if let Dynamics::Lti { a, b } = &self.dynamics {
            check_square("A", a, n)?;
            if b.len() != n || b.iter().any(|row| row.len() != m) {
                return Err(MpcError::Validation(format!(
                    "B must be {}x{}, got {}x{}",
                    n,
                    m,
                    b.len(),
                    b.first().map_or(0, |row| row.len())
                )));
            }
        }

        check_square("Q", &self.q, n)?;
        check_square("R", &self.r, m)?;
        check_square("Qf", &self.qf, n)?;

        if self.x0.len() != n {
            return Err(MpcError::Validation(format!(
                "initial state has {} components, expected {}",
                self.x0.len(),
                n
            )));
        }
        if self.target.len() != n {
            return Err(MpcError::Validation(format!(
                "target state has {} components, expected {}",
                self.target.len(),
                n
            )));
        }
        if let Some(r) = &self.reference {
            if r.len() != n {
                return Err(MpcError::Validation(format!(
                    "reference state has {} components, expected {}",
                    r.len(),
                    n
                )));
            }
        }

        if let Some(sb) = &self.state_bounds {
            if sb.len() != n {
                return Err(MpcError::Validation(format!(
                    "state bounds have {} entries, expected {}",
                    sb.len(),
                    n
                )));
            }
        }
        if let Some(cb) = &self.control_bounds {
            if cb.len() != m {
                return Err(MpcError::Validation(format!(
                    "control bounds have {} entries, expected {}",
                    cb.len(),
                    m
                )));
            }
        }
        for b in self
            .state_bounds
            .iter()
            .chain(self.control_bounds.iter())
            .flatten()
        {
            if b.lower() > b.upper() {
                return Err(MpcError::Validation(format!(
                    "empty bound interval [{}, {}]",
                    b.lower(),
                    b.upper()
                )));
            }
        }

        if !self.obstacles.is_empty() && n < 2 {
            return Err(MpcError::Validation(
                "obstacles require at least two position states".to_string(),
            ));
        }
        for obs in &self.obstacles {
            if !(obs.radius > 0.0) {
                return Err(MpcError::Validation(format!(
                    "obstacle radius must be positive, got {}",
                    obs.radius
                )));
            }
        }
        if self.safety_margin < 0.0 {
            return Err(MpcError::Validation(format!(
                "safety margin must be non-negative, got {}",
                self.safety_margin
            )));
        }

        Ok(())
    }

    /// Effective stage cost reference (origin when unset).
    pub fn stage_reference(&self) -> Vec<f64> {
        self.reference
            .clone()
            .unwrap_or_else(|| vec![0.0; self.dynamics.state_dim()])
    }

    /// Bounds for a state component.
    pub fn state_bound(&self, i: usize) -> Bounds {
        self.state_bounds
            .as_ref()
            .and_then(|b| b.get(i).copied())
            .unwrap_or_default()
    }

    /// Bounds for a control component.
    pub fn control_bound(&self, j: usize) -> Bounds {
        self.control_bounds
            .as_ref()
            .and_then(|b| b.get(j).copied())
            .unwrap_or_default()
    }
}

fn diag(values: &[f64]) -> Vec<Vec<f64>> {
    let n = values.len();
    let mut m = vec![vec![0.0; n]; n];
    for (i, v) in values.iter().enumerate() {
        m[i][i] = *v;
    }
    m
}

/// Built-in scenario presets.
pub mod presets {
    use super::*;

    pub const NAMES: &[&str] = &[
        "double-integrator",
        "bicycle",
        "bicycle-obstacle",
        "reduced-bicycle",
    ];

    /// Look up a preset by name.
    pub fn by_name(name: &str) -> Option<Scenario> {
        match name {
            "double-integrator" => Some(double_integrator()),
            "bicycle" => Some(bicycle()),
            "bicycle-obstacle" => Some(bicycle_obstacle()),
            "reduced-bicycle" => Some(reduced_bicycle()),
            _ => None,
        }
    }

    /// Double integrator driven to (10, 0) under a unit control bound.
    pub fn double_integrator() -> Scenario {
        Scenario {
            name: "double-integrator".into(),
            horizon: 20,
            dt: 1.0,
            dynamics: Dynamics::Lti {
                a: vec![vec![1.0, 1.0], vec![0.0, 1.0]],
                b: vec![vec![0.5], vec![1.0]],
            },
            q: diag(&[1.0, 1.0]),
            r: diag(&[1.0]),
            qf: diag(&[10.0, 10.0]),
            x0: vec![0.0, 0.0],
            target: vec![10.0, 0.0],
            reference: None,
            state_bounds: Some(vec![Bounds::symmetric(10.0), Bounds::symmetric(10.0)]),
            control_bounds: Some(vec![Bounds::symmetric(1.0)]),
            obstacles: Vec::new(),
            safety_margin: 1.0,
            solver_options: BTreeMap::new(),
        }
    }

    /// Kinematic bicycle driven from the origin to (5, 5).
    pub fn bicycle() -> Scenario {
        Scenario {
            name: "bicycle".into(),
            horizon: 10,
            dt: 0.1,
            dynamics: Dynamics::Bicycle { wheelbase: 1.5 },
            q: diag(&[1.0, 1.0, 0.1, 0.1]),
            r: diag(&[0.1, 0.1]),
            qf: diag(&[10.0, 10.0, 1.0, 1.0]),
            x0: vec![0.0; 4],
            target: vec![5.0, 5.0, 0.0, 0.0],
            reference: None,
            state_bounds: None,
            control_bounds: Some(vec![
                Bounds::symmetric(FRAC_PI_4),
                Bounds::symmetric(3.0),
            ]),
            obstacles: Vec::new(),
            safety_margin: 1.0,
            solver_options: BTreeMap::new(),
        }
    }

    /// Bicycle with a single obstacle across the straight-line path.
    pub fn bicycle_obstacle() -> Scenario {
        let target = vec![5.0, 5.0, FRAC_PI_4, 0.0];
        let mut solver_options = BTreeMap::new();
        solver_options.insert("MIPFocus".to_string(), "1".to_string());
        solver_options.insert("PreSolve".to_string(), "2".to_string());
        solver_options.insert("Cuts".to_string(), "2".to_string());
        Scenario {
            name: "bicycle-obstacle".into(),
            horizon: 20,
            dt: 0.1,
            dynamics: Dynamics::Bicycle { wheelbase: 2.0 },
            q: diag(&[1.0, 1.0, 0.1, 0.1]),
            r: diag(&[0.1, 0.1]),
            qf: diag(&[10.0, 10.0, 1.0, 1.0]),
            x0: vec![0.0, 0.0, FRAC_PI_4, 0.0],
            reference: Some(target.clone()),
            target,
            state_bounds: Some(vec![
                Bounds::unbounded(),
                Bounds::unbounded(),
                Bounds::unbounded(),
                Bounds::new(0.0, 10.0),
            ]),
            control_bounds: Some(vec![
                Bounds::symmetric(FRAC_PI_4),
                Bounds::symmetric(2.0),
            ]),
            obstacles: vec![Obstacle {
                x: 2.0,
                y: 2.0,
                radius: 1.0,
            }],
            safety_margin: 1.0,
            solver_options,
        }
    }

    /// Unit-speed bicycle steered towards (10, 10) at 45 degrees.
    pub fn reduced_bicycle() -> Scenario {
        Scenario {
            name: "reduced-bicycle".into(),
            horizon: 10,
            dt: 0.1,
            dynamics: Dynamics::ReducedBicycle { wheelbase: 1.5 },
            q: diag(&[1.0, 1.0, 0.1]),
            r: diag(&[0.1]),
            qf: diag(&[10.0, 10.0, 1.0]),
            x0: vec![0.0; 3],
            target: vec![10.0, 10.0, FRAC_PI_4],
            reference: None,
            state_bounds: None,
            control_bounds: Some(vec![Bounds::symmetric(FRAC_PI_4)]),
            obstacles: Vec::new(),
            safety_margin: 1.0,
            solver_options: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        for name in presets::NAMES {
            let scenario = presets::by_name(name).unwrap();
            scenario.validate().unwrap_or_else(|e| {
                panic!("preset {} failed validation: {}", name, e);
            });
        }
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(presets::by_name("no-such-preset").is_none());
    }

    #[test]
    fn rejects_zero_horizon() {
        let mut scenario = presets::double_integrator();
        scenario.horizon = 0;
        assert!(matches!(
            scenario.validate(),
            Err(MpcError::Validation(_))
        ));
    }

    #[test]
    fn rejects_mismatched_q() {
        let mut scenario = presets::bicycle();
        scenario.q = vec![vec![1.0; 3]; 3];
        let err = scenario.validate().unwrap_err();
        assert!(err.to_string().contains("Q must be 4x4"));
    }

    #[test]
    fn rejects_mismatched_initial_state() {
        let mut scenario = presets::double_integrator();
        scenario.x0 = vec![0.0; 3];
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn rejects_obstacle_with_bad_radius() {
        let mut scenario = presets::bicycle_obstacle();
        scenario.obstacles[0].radius = 0.0;
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn scenario_round_trips_through_json() {
        let scenario = presets::bicycle_obstacle();
        let json = serde_json::to_string(&scenario).unwrap();
        let back: Scenario = serde_json::from_str(&json).unwrap();
        assert_eq!(scenario, back);
    }

    #[test]
    fn default_bounds_are_unbounded() {
        let scenario = presets::bicycle();
        let b = scenario.state_bound(0);
        assert_eq!(b.lower(), f64::NEG_INFINITY);
        assert_eq!(b.upper(), f64::INFINITY);
    }
}
