use std::cmp::Ordering;
use std::collections::BTreeMap;

use memo_core::{Param, Value};
use serde::{Deserialize, Serialize};

use crate::hash::normalize;

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

impl CompareOp {
    /// Parses the `__op` suffix of a filter expression.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "eq" => Some(CompareOp::Eq),
            "ne" => Some(CompareOp::Ne),
            "ge" => Some(CompareOp::Ge),
            "le" => Some(CompareOp::Le),
            "gt" => Some(CompareOp::Gt),
            "lt" => Some(CompareOp::Lt),
            _ => None,
        }
    }

    fn accepts(&self, stored: &Value, wanted: &Value) -> bool {
        match self {
            CompareOp::Eq => loose_eq(stored, wanted),
            CompareOp::Ne => !loose_eq(stored, wanted),
            CompareOp::Ge => matches!(
                compare(stored, wanted),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            CompareOp::Le => matches!(
                compare(stored, wanted),
                Some(Ordering::Less | Ordering::Equal)
            ),
            CompareOp::Gt => compare(stored, wanted) == Some(Ordering::Greater),
            CompareOp::Lt => compare(stored, wanted) == Some(Ordering::Less),
        }
    }
}

/// Predicate over a run's normalized parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    pub op: CompareOp,
    pub value: Param,
}

impl Filter {
    pub fn new(name: impl Into<String>, op: CompareOp, value: impl Into<Param>) -> Self {
        Self {
            name: name.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(name: impl Into<String>, value: impl Into<Param>) -> Self {
        Self::new(name, CompareOp::Eq, value)
    }

    /// Builds a filter from a `name__op` expression, e.g. `A__ge`. An
    /// expression without a recognised suffix is an equality on the whole name.
    pub fn parse(expr: &str, value: impl Into<Param>) -> Self {
        if let Some((name, suffix)) = expr.rsplit_once("__") {
            if let Some(op) = CompareOp::from_suffix(suffix) {
                return Self::new(name, op, value);
            }
        }
        Self::eq(expr, value)
    }

    /// Returns whether the parameters satisfy the predicate. A missing
    /// parameter, or a filter value that cannot be normalized, never matches.
    pub fn matches(&self, parameters: &BTreeMap<String, Value>) -> bool {
        let Some(stored) = parameters.get(&self.name) else {
            return false;
        };
        match normalize(&self.value) {
            Ok(wanted) => self.op.accepts(stored, &wanted),
            Err(_) => false,
        }
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
        (Value::Seq(xs), Value::Seq(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Map(xs), Value::Map(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys)
                    .all(|((kx, x), (ky, y))| kx == ky && loose_eq(x, y))
        }
        _ => a == b,
    }
}

/// Orders values of compatible kinds; integers and floats share one scale and
/// sequences compare lexicographically. Maps and mixed kinds are unordered.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::Seq(xs), Value::Seq(ys)) => {
            for (x, y) in xs.iter().zip(ys) {
                match compare(x, y)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(xs.len().cmp(&ys.len()))
        }
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(a: i64) -> BTreeMap<String, Value> {
        [
            ("A".to_string(), Value::Int(a)),
            (
                "B".to_string(),
                Value::Seq(vec![Value::Int(1), Value::Int(2)]),
            ),
            ("op".to_string(), Value::Str("max".into())),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn parses_suffixes() {
        assert_eq!(Filter::parse("A__ge", 2).op, CompareOp::Ge);
        assert_eq!(Filter::parse("A__ge", 2).name, "A");
        assert_eq!(Filter::parse("A", 2).op, CompareOp::Eq);
        let odd = Filter::parse("rate__decay", 2);
        assert_eq!(odd.name, "rate__decay");
        assert_eq!(odd.op, CompareOp::Eq);
    }

    #[test]
    fn numeric_comparisons_cross_int_and_float() {
        assert!(Filter::parse("A__ge", 1.5).matches(&params(2)));
        assert!(!Filter::parse("A__ge", 2.5).matches(&params(2)));
        assert!(Filter::eq("A", 2.0).matches(&params(2)));
        assert!(Filter::parse("A__lt", 3).matches(&params(2)));
    }

    #[test]
    fn sequences_and_callables() {
        let b = Param::seq([1, 2]);
        assert!(Filter::eq("B", b.clone()).matches(&params(1)));
        assert!(!Filter::parse("B__ne", b).matches(&params(1)));
        assert!(Filter::eq("op", Param::callable("max", 0u8)).matches(&params(1)));
    }

    #[test]
    fn unknown_names_and_mismatched_kinds_do_not_match() {
        assert!(!Filter::eq("missing", 1).matches(&params(1)));
        assert!(!Filter::parse("op__ge", 1).matches(&params(1)));
        assert!(Filter::parse("op__ne", 1).matches(&params(1)));
        assert!(!Filter::eq("A", Param::opaque(1u8)).matches(&params(1)));
    }
}
