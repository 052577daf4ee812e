//! Linear and quadratic expression building over problem variables.
//!
//! Expressions refer to variables by [`VarId`] and are owned by whoever is
//! assembling a [`crate::Problem`]; membership of the ids in a particular
//! problem is checked when the expression is attached, not here.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Stable index of a variable within the problem that created it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VarId(pub usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A linear expression: unique per-variable coefficients plus a constant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinExpr {
    pub terms: BTreeMap<VarId, f64>,
    #[serde(default)]
    pub constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// The expression `coeff * var`.
    pub fn term(var: VarId, coeff: f64) -> Self {
        let mut e = Self::new();
        e.add_term(var, coeff);
        e
    }

    /// Add `coeff * var`, coalescing with any existing term for `var`.
    /// Adding a zero coefficient is a no-op.
    pub fn add_term(&mut self, var: VarId, coeff: f64) {
        if coeff == 0.0 {
            return;
        }
        let entry = self.terms.entry(var).or_insert(0.0);
        *entry += coeff;
        if *entry == 0.0 {
            self.terms.remove(&var);
        }
    }

    pub fn add_constant(&mut self, c: f64) {
        self.constant += c;
    }

    /// Multiply every coefficient (and the constant) by `k`.
    /// Scaling by zero empties the expression; it is not an error.
    pub fn scale(&mut self, k: f64) {
        if k == 0.0 {
            self.terms.clear();
            self.constant = 0.0;
            return;
        }
        for coeff in self.terms.values_mut() {
            *coeff *= k;
        }
        self.constant *= k;
    }

    /// Evaluate against a dense value vector indexed by `VarId`.
    pub fn value(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(v, c)| c * values.get(v.index()).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.constant == 0.0
    }

    /// Variables referenced by this expression, in id order.
    pub fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.terms.keys().copied()
    }
}

impl Add for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: LinExpr) -> LinExpr {
        for (var, coeff) in rhs.terms {
            self.add_term(var, coeff);
        }
        self.constant += rhs.constant;
        self
    }
}

impl AddAssign for LinExpr {
    fn add_assign(&mut self, rhs: LinExpr) {
        for (var, coeff) in rhs.terms {
            self.add_term(var, coeff);
        }
        self.constant += rhs.constant;
    }
}

impl Sub for LinExpr {
    type Output = LinExpr;

    fn sub(mut self, rhs: LinExpr) -> LinExpr {
        for (var, coeff) in rhs.terms {
            self.add_term(var, -coeff);
        }
        self.constant -= rhs.constant;
        self
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;

    fn mul(mut self, k: f64) -> LinExpr {
        self.scale(k);
        self
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;

    fn neg(mut self) -> LinExpr {
        self.scale(-1.0);
        self
    }
}

impl Add<f64> for LinExpr {
    type Output = LinExpr;

    fn add(mut self, c: f64) -> LinExpr {
        self.constant += c;
        self
    }
}

/// Normalize an unordered variable pair to `(lo, hi)`.
fn pair(a: VarId, b: VarId) -> (VarId, VarId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// JSON maps need string keys, so quadratic terms cross the solver boundary
/// as `(i, j, coeff)` triples.
mod quad_serde {
    use super::VarId;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<(VarId, VarId), f64>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        let triples: Vec<(VarId, VarId, f64)> =
            map.iter().map(|(&(a, b), &c)| (a, b, c)).collect();
        triples.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<(VarId, VarId), f64>, D::Error> {
        let triples = Vec::<(VarId, VarId, f64)>::deserialize(d)?;
        Ok(triples
            .into_iter()
            .map(|(a, b, c)| (super::pair(a, b), c))
            .collect())
    }
}

/// A quadratic expression: a linear part plus coefficients on unordered
/// variable pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuadExpr {
    #[serde(default)]
    pub linear: LinExpr,
    #[serde(default, with = "quad_serde")]
    pub quad: BTreeMap<(VarId, VarId), f64>,
}

impl QuadExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `coeff * a * b`. The pair is unordered; `a == b` gives a square
    /// term. Zero coefficients are a no-op.
    pub fn add_quad_term(&mut self, a: VarId, b: VarId, coeff: f64) {
        if coeff == 0.0 {
            return;
        }
        let key = pair(a, b);
        let entry = self.quad.entry(key).or_insert(0.0);
        *entry += coeff;
        if *entry == 0.0 {
            self.quad.remove(&key);
        }
    }

    pub fn add_term(&mut self, var: VarId, coeff: f64) {
        self.linear.add_term(var, coeff);
    }

    pub fn add_constant(&mut self, c: f64) {
        self.linear.add_constant(c);
    }

    pub fn is_linear(&self) -> bool {
        self.quad.is_empty()
    }

    pub fn value(&self, values: &[f64]) -> f64 {
        let at = |v: VarId| values.get(v.index()).copied().unwrap_or(0.0);
        self.quad
            .iter()
            .map(|(&(a, b), &c)| c * at(a) * at(b))
            .sum::<f64>()
            + self.linear.value(values)
    }

    /// Variables referenced by either part, deduplicated and ordered.
    pub fn vars(&self) -> Vec<VarId> {
        let mut ids: Vec<VarId> = self.linear.vars().collect();
        for &(a, b) in self.quad.keys() {
            ids.push(a);
            ids.push(b);
        }
        ids.sort();
        ids.dedup();
        ids
    }
}

impl From<LinExpr> for QuadExpr {
    fn from(linear: LinExpr) -> Self {
        Self {
            linear,
            quad: BTreeMap::new(),
        }
    }
}

impl Add for QuadExpr {
    type Output = QuadExpr;

    fn add(mut self, rhs: QuadExpr) -> QuadExpr {
        for ((a, b), coeff) in rhs.quad {
            self.add_quad_term(a, b, coeff);
        }
        self.linear += rhs.linear;
        self
    }
}

impl AddAssign for QuadExpr {
    fn add_assign(&mut self, rhs: QuadExpr) {
        for ((a, b), coeff) in rhs.quad {
            self.add_quad_term(a, b, coeff);
        }
        self.linear += rhs.linear;
    }
}

impl Mul<f64> for QuadExpr {
    type Output = QuadExpr;

    fn mul(mut self, k: f64) -> QuadExpr {
        if k == 0.0 {
            self.quad.clear();
        } else {
            for coeff in self.quad.values_mut() {
                *coeff *= k;
            }
        }
        self.linear.scale(k);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_terms_coalesce() {
        let mut e = LinExpr::new();
        e.add_term(VarId(3), 2.0);
        e.add_term(VarId(3), 0.5);
        assert_eq!(e.terms.len(), 1);
        assert_eq!(e.terms[&VarId(3)], 2.5);
    }

    #[test]
    fn cancelling_terms_disappear() {
        let mut e = LinExpr::new();
        e.add_term(VarId(0), 1.0);
        e.add_term(VarId(0), -1.0);
        assert!(e.is_empty());
    }

    #[test]
    fn scale_by_zero_is_a_noop_result() {
        let mut e = LinExpr::term(VarId(1), 4.0) + 2.0;
        e.scale(0.0);
        assert!(e.is_empty());
        assert_eq!(e.value(&[0.0, 9.0]), 0.0);
    }

    #[test]
    fn linear_evaluation() {
        let e = LinExpr::term(VarId(0), 2.0) + LinExpr::term(VarId(1), -1.0) + 3.0;
        assert_eq!(e.value(&[1.0, 4.0]), 2.0 - 4.0 + 3.0);
    }

    #[test]
    fn quad_pairs_are_unordered() {
        let mut q = QuadExpr::new();
        q.add_quad_term(VarId(2), VarId(1), 1.0);
        q.add_quad_term(VarId(1), VarId(2), 2.0);
        assert_eq!(q.quad.len(), 1);
        assert_eq!(q.quad[&(VarId(1), VarId(2))], 3.0);
    }

    #[test]
    fn quad_evaluation_includes_all_parts() {
        let mut q = QuadExpr::new();
        q.add_quad_term(VarId(0), VarId(0), 1.0);
        q.add_quad_term(VarId(0), VarId(1), 2.0);
        q.add_term(VarId(1), -1.0);
        q.add_constant(5.0);
        // x=3, y=2: 9 + 12 - 2 + 5 = 24
        assert_eq!(q.value(&[3.0, 2.0]), 24.0);
    }

    #[test]
    fn quad_expr_round_trips_through_json() {
        let mut q = QuadExpr::new();
        q.add_quad_term(VarId(0), VarId(1), 2.0);
        q.add_term(VarId(0), 1.0);
        let json = serde_json::to_string(&q).unwrap();
        let back: QuadExpr = serde_json::from_str(&json).unwrap();
        assert_eq!(q, back);
    }
}
