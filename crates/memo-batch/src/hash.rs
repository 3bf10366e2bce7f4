//! Content-based run identity.
//!
//! A fingerprint is the lowercase hex SHA-256 of the canonical JSON encoding of
//! a parameter set's normalized `(name, value)` pairs, sorted by name.
//!
//! Parameters that cannot be normalized (opaque payloads, NaN, containers
//! holding either) are left out of the digest input entirely, not
//! replaced by a placeholder. Two runs that differ only in such a parameter
//! therefore share a fingerprint. Every exclusion is logged and reported in
//! [`Fingerprint::dropped`]; [`IdentityPolicy::Strict`] turns it into an error.

use std::collections::BTreeMap;

use memo_core::errors::{ErrorInfo, MemoError};
use memo_core::{to_canonical_json_bytes, Param, ParameterSet, Value};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// How unserializable parameters affect fingerprinting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// Exclude the parameter from the digest and log a warning.
    #[default]
    DropWithWarning,
    /// Refuse to fingerprint the parameter set.
    Strict,
}

/// Reason a parameter value could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unserializable {
    /// Location inside the value, empty for the top level (`[2].weights`).
    pub path: String,
    /// Human readable reason.
    pub reason: String,
}

impl Unserializable {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            reason: reason.into(),
        }
    }

    fn nested(mut self, segment: String) -> Self {
        self.path = segment + &self.path;
        self
    }
}

/// Parameter left out of a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedParam {
    /// Parameter name.
    pub name: String,
    /// Why the value was rejected.
    pub cause: Unserializable,
}

/// Identity derived from a parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    /// Lowercase hex digest.
    pub id: String,
    /// Normalized parameters that entered the digest.
    pub normalized: BTreeMap<String, Value>,
    /// Parameters excluded from the digest.
    pub dropped: Vec<DroppedParam>,
}

/// Computes a stable hexadecimal hash for the provided serializable payload.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, MemoError> {
    let bytes = to_canonical_json_bytes(value)?;
    let digest = Sha256::digest(bytes);
    Ok(format!("{:x}", digest))
}

/// Normalizes a parameter into the serializable value model.
///
/// Callables and type references reduce to their names.
pub fn normalize(param: &Param) -> Result<Value, Unserializable> {
    match param {
        Param::Bool(value) => Ok(Value::Bool(*value)),
        Param::Int(value) => Ok(Value::Int(*value)),
        // -0.0 and 0.0 compare equal, so they must hash equal.
        Param::Float(value) if *value == 0.0 => Ok(Value::Float(0.0)),
        Param::Float(value) if value.is_nan() => Err(Unserializable::new("NaN float")),
        Param::Float(value) => Ok(Value::Float(*value)),
        Param::Str(value) => Ok(Value::Str(value.clone())),
        Param::Bytes(value) => Ok(Value::Bytes(value.clone())),
        Param::Seq(items) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| normalize(item).map_err(|err| err.nested(format!("[{idx}]"))))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Seq),
        Param::Map(map) => map
            .iter()
            .map(|(key, item)| {
                normalize(item)
                    .map(|value| (key.clone(), value))
                    .map_err(|err| err.nested(format!(".{key}")))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Value::Map),
        Param::Callable(callable) => Ok(Value::Str(callable.name().to_string())),
        Param::Type(type_ref) => Ok(Value::Str(type_ref.name().to_string())),
        Param::Opaque(opaque) => Err(Unserializable::new(format!(
            "opaque value of type {}",
            opaque.type_name()
        ))),
    }
}

/// Fingerprints a parameter set, dropping unserializable parameters.
pub fn fingerprint(parameters: &ParameterSet) -> Result<Fingerprint, MemoError> {
    fingerprint_with(parameters, IdentityPolicy::DropWithWarning)
}

/// Fingerprints a parameter set under the given policy.
pub fn fingerprint_with(
    parameters: &ParameterSet,
    policy: IdentityPolicy,
) -> Result<Fingerprint, MemoError> {
    let mut normalized = BTreeMap::new();
    let mut dropped = Vec::new();
    for (name, param) in parameters {
        match normalize(param) {
            Ok(value) => {
                normalized.insert(name.clone(), value);
            }
            Err(cause) => {
                if policy == IdentityPolicy::Strict {
                    return Err(MemoError::Identity(
                        ErrorInfo::new("unserializable-parameter", cause.reason.clone())
                            .with_context("parameter", name.clone())
                            .with_context("path", cause.path.clone())
                            .with_hint("wrap the value in a named callable or a data variant"),
                    ));
                }
                warn!(
                    parameter = %name,
                    path = %cause.path,
                    reason = %cause.reason,
                    "parameter excluded from fingerprint"
                );
                dropped.push(DroppedParam {
                    name: name.clone(),
                    cause,
                });
            }
        }
    }
    let id = fingerprint_values(&normalized)?;
    Ok(Fingerprint {
        id,
        normalized,
        dropped,
    })
}

/// Hashes an already normalized parameter map.
pub fn fingerprint_values(normalized: &BTreeMap<String, Value>) -> Result<String, MemoError> {
    let pairs: Vec<(&String, &Value)> = normalized.iter().collect();
    stable_hash_string(&pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memo_core::TypeRef;

    fn set(pairs: Vec<(&str, Param)>) -> ParameterSet {
        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }

    #[test]
    fn golden_digest() {
        let params = set(vec![("B", Param::from("x")), ("A", Param::from(1))]);
        let fp = fingerprint(&params).expect("fingerprint");
        assert_eq!(
            fp.id,
            "c1d866cd2fe86d8e95b29682d6a81587976415db1e1b053a136c84567100e398"
        );
    }

    #[test]
    fn empty_set_has_a_digest() {
        let fp = fingerprint(&ParameterSet::new()).expect("fingerprint");
        assert_eq!(
            fp.id,
            "4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945"
        );
    }

    #[test]
    fn callables_hash_by_name() {
        let a = set(vec![
            ("A", Param::from(1)),
            ("C", Param::callable("rms", 0u8)),
        ]);
        let b = set(vec![("A", Param::from(1)), ("C", Param::from("rms"))]);
        let fa = fingerprint(&a).expect("fingerprint");
        assert_eq!(fa.id, fingerprint(&b).expect("fingerprint").id);
        assert_eq!(
            fa.id,
            "f551e4ec6d5d0e101077cc1ba1ad70ea0414bed86d782d26a376f71a1bd97fc8"
        );
    }

    #[test]
    fn type_refs_normalize_to_names() {
        let param = Param::Type(TypeRef::named("solver::Newton"));
        assert_eq!(
            normalize(&param),
            Ok(Value::Str("solver::Newton".to_string()))
        );
    }

    #[test]
    fn nested_opaque_reports_path() {
        let mut inner = BTreeMap::new();
        inner.insert("weights".to_string(), Param::opaque(vec![0.5f32]));
        let param = Param::Seq(vec![Param::from(1), Param::Map(inner)]);
        let err = normalize(&param).expect_err("opaque");
        assert_eq!(err.path, "[1].weights");
        assert!(err.reason.contains("opaque value"));
    }

    #[test]
    fn signed_zeros_share_a_fingerprint() {
        let pos = set(vec![("x", Param::from(0.0))]);
        let neg = set(vec![("x", Param::from(-0.0))]);
        assert_eq!(
            fingerprint(&pos).expect("fingerprint").id,
            fingerprint(&neg).expect("fingerprint").id
        );
    }

    #[test]
    fn infinities_keep_distinct_fingerprints() {
        let pos =
            fingerprint(&set(vec![("tol", Param::from(f64::INFINITY))])).expect("fingerprint");
        let neg =
            fingerprint(&set(vec![("tol", Param::from(f64::NEG_INFINITY))])).expect("fingerprint");
        let absent = fingerprint(&ParameterSet::new()).expect("fingerprint");
        assert!(pos.dropped.is_empty());
        assert!(neg.dropped.is_empty());
        assert_ne!(pos.id, neg.id);
        assert_ne!(pos.id, absent.id);
        assert_ne!(neg.id, absent.id);
        let text = fingerprint(&set(vec![("tol", Param::from("inf"))])).expect("fingerprint");
        assert_ne!(pos.id, text.id);
        assert_eq!(
            pos.id,
            fingerprint(&set(vec![("tol", Param::from(f64::INFINITY))]))
                .expect("fingerprint")
                .id
        );
    }

    #[test]
    fn nan_is_dropped() {
        let params = set(vec![("A", Param::from(1)), ("tol", Param::from(f64::NAN))]);
        let fp = fingerprint(&params).expect("fingerprint");
        assert_eq!(fp.dropped.len(), 1);
        assert_eq!(fp.dropped[0].name, "tol");
        assert!(!fp.normalized.contains_key("tol"));
    }

    #[test]
    fn dropped_parameters_collide() {
        let a = set(vec![("A", Param::from(1)), ("cache", Param::opaque(1u32))]);
        let b = set(vec![("A", Param::from(1)), ("cache", Param::opaque(2u32))]);
        let only = set(vec![("A", Param::from(1))]);
        let fa = fingerprint(&a).expect("fingerprint");
        assert_eq!(fa.id, fingerprint(&b).expect("fingerprint").id);
        assert_eq!(fa.id, fingerprint(&only).expect("fingerprint").id);
    }

    #[test]
    fn strict_policy_rejects_unserializable() {
        let params = set(vec![("cache", Param::opaque(1u32))]);
        let err = fingerprint_with(&params, IdentityPolicy::Strict).expect_err("strict");
        assert_eq!(err.info().code, "unserializable-parameter");
        assert_eq!(
            err.info().context.get("parameter").map(String::as_str),
            Some("cache")
        );
    }
}
