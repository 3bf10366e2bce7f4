//! Closed value model for run parameters and run results.
//!
//! [`Value`] is the serializable data kind: it is what results are made of and
//! what parameters normalize into before fingerprinting. [`Param`] is the
//! input kind accepted from callers; on top of the data variants it can carry
//! named callables, type references and opaque payloads, none of which can be
//! persisted directly.

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered mapping from parameter name to parameter value.
pub type ParameterSet = IndexMap<String, Param>;

/// Mapping of result keys to values returned by a computation.
pub type ResultMap = BTreeMap<String, Value>;

/// Serializable value kind shared by results and normalized parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Boolean scalar.
    Bool(bool),
    /// Signed integer scalar.
    Int(i64),
    /// Floating point scalar. Non-finite values are written as `"nan"`,
    /// `"inf"` or `"-inf"` in text formats.
    Float(#[serde(with = "float_repr")] f64),
    /// UTF-8 string.
    Str(String),
    /// Raw byte sequence.
    Bytes(Vec<u8>),
    /// Ordered sequence of values.
    Seq(Vec<Value>),
    /// String keyed mapping with sorted keys.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the integer payload.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the value as a float; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the sequence payload.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the mapping payload.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Seq(values)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

/// Serde adapter for [`Value::Float`]. JSON has no literal for NaN or the
/// infinities, so human readable formats spell them as strings; binary
/// formats keep the raw IEEE bits.
mod float_repr {
    use std::fmt;

    use serde::de::{self, Deserialize, Deserializer, Unexpected, Visitor};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() || !serializer.is_human_readable() {
            return serializer.serialize_f64(*value);
        }
        let text = if value.is_nan() {
            "nan"
        } else if value.is_sign_positive() {
            "inf"
        } else {
            "-inf"
        };
        serializer.serialize_str(text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(FloatVisitor)
        } else {
            f64::deserialize(deserializer)
        }
    }

    struct FloatVisitor;

    impl<'de> Visitor<'de> for FloatVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number or one of \"nan\", \"inf\", \"-inf\"")
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<f64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<f64, E> {
            Ok(value as f64)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<f64, E> {
            Ok(value as f64)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<f64, E> {
            match value {
                "nan" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(E::invalid_value(Unexpected::Str(other), &self)),
            }
        }
    }
}

/// A named function or bound method passed as a parameter.
///
/// Identity is the name alone; the payload is carried so the computation can
/// downcast and call it.
#[derive(Clone)]
pub struct NamedCallable {
    name: String,
    payload: Arc<dyn Any + Send + Sync>,
}

impl NamedCallable {
    /// Wraps a callable payload under a qualified name.
    pub fn new<F: Any + Send + Sync>(name: impl Into<String>, payload: F) -> Self {
        Self {
            name: name.into(),
            payload: Arc::new(payload),
        }
    }

    /// Qualified name used as the callable's identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attempts to recover the concrete payload.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl PartialEq for NamedCallable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for NamedCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamedCallable").field(&self.name).finish()
    }
}

/// Reference to a type, identified by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    name: String,
}

impl TypeRef {
    /// Reference to `T` named by [`std::any::type_name`].
    ///
    /// `type_name` output is stable for a given toolchain only; use
    /// [`TypeRef::named`] when fingerprints must survive compiler upgrades.
    pub fn of<T: ?Sized>() -> Self {
        Self {
            name: type_name::<T>().to_string(),
        }
    }

    /// Reference with an explicit name.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Name used as the type's identity.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Arbitrary value that cannot be normalized into a [`Value`].
#[derive(Clone)]
pub struct OpaqueParam {
    type_name: String,
    payload: Arc<dyn Any + Send + Sync>,
}

impl OpaqueParam {
    /// Wraps an arbitrary payload.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: type_name::<T>().to_string(),
            payload: Arc::new(value),
        }
    }

    /// Name of the wrapped type, used in diagnostics.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Attempts to recover the concrete payload.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl PartialEq for OpaqueParam {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for OpaqueParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OpaqueParam").field(&self.type_name).finish()
    }
}

/// Parameter value accepted from callers.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Boolean scalar.
    Bool(bool),
    /// Signed integer scalar.
    Int(i64),
    /// Floating point scalar.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw byte sequence.
    Bytes(Vec<u8>),
    /// Ordered sequence of parameters.
    Seq(Vec<Param>),
    /// String keyed mapping of parameters.
    Map(BTreeMap<String, Param>),
    /// Named function or bound method.
    Callable(NamedCallable),
    /// Named type reference.
    Type(TypeRef),
    /// Value outside the normalizable kinds.
    Opaque(OpaqueParam),
}

impl Param {
    /// Byte sequence parameter.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Param::Bytes(bytes.into())
    }

    /// Sequence parameter built from anything convertible into [`Param`].
    pub fn seq<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Param>,
    {
        Param::Seq(items.into_iter().map(Into::into).collect())
    }

    /// Named callable parameter.
    pub fn callable<F: Any + Send + Sync>(name: impl Into<String>, payload: F) -> Self {
        Param::Callable(NamedCallable::new(name, payload))
    }

    /// Type reference parameter for `T`.
    pub fn type_of<T: ?Sized>() -> Self {
        Param::Type(TypeRef::of::<T>())
    }

    /// Opaque parameter wrapping an arbitrary payload.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Param::Opaque(OpaqueParam::new(value))
    }

    /// Returns the boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Param::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the integer payload.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Param::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the parameter as a float; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Param::Int(value) => Some(*value as f64),
            Param::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Param::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the sequence payload.
    pub fn as_seq(&self) -> Option<&[Param]> {
        match self {
            Param::Seq(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the callable payload.
    pub fn as_callable(&self) -> Option<&NamedCallable> {
        match self {
            Param::Callable(callable) => Some(callable),
            _ => None,
        }
    }

    /// Returns the opaque payload downcast to `T`.
    pub fn downcast_opaque<T: Any>(&self) -> Option<&T> {
        match self {
            Param::Opaque(opaque) => opaque.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(value) => Param::Bool(value),
            Value::Int(value) => Param::Int(value),
            Value::Float(value) => Param::Float(value),
            Value::Str(value) => Param::Str(value),
            Value::Bytes(value) => Param::Bytes(value),
            Value::Seq(values) => Param::Seq(values.into_iter().map(Param::from).collect()),
            Value::Map(map) => Param::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Param::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Int(i64::from(value))
    }
}

impl From<u32> for Param {
    fn from(value: u32) -> Self {
        Param::Int(i64::from(value))
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Param::Float(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Str(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Str(value)
    }
}

impl From<Vec<Param>> for Param {
    fn from(values: Vec<Param>) -> Self {
        Param::Seq(values)
    }
}

impl From<TypeRef> for Param {
    fn from(value: TypeRef) -> Self {
        Param::Type(value)
    }
}

impl From<NamedCallable> for Param {
    fn from(value: NamedCallable) -> Self {
        Param::Callable(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64) -> f64 {
        x * x
    }

    #[test]
    fn callables_compare_by_name() {
        let a = Param::callable("square", square as fn(f64) -> f64);
        let b = Param::callable("square", (|x: f64| x) as fn(f64) -> f64);
        let c = Param::callable("cube", square as fn(f64) -> f64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn callable_payload_downcasts() {
        let param = Param::callable("square", square as fn(f64) -> f64);
        let func = param
            .as_callable()
            .and_then(|callable| callable.downcast_ref::<fn(f64) -> f64>())
            .expect("fn payload");
        assert_eq!(func(3.0), 9.0);
    }

    #[test]
    fn opaque_values_compare_by_identity() {
        let a = Param::opaque(vec![1u8, 2, 3]);
        let b = a.clone();
        let c = Param::opaque(vec![1u8, 2, 3]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast_opaque::<Vec<u8>>(), Some(&vec![1u8, 2, 3]));
    }

    #[test]
    fn non_finite_floats_survive_json() {
        let values = [f64::INFINITY, f64::NEG_INFINITY, f64::NAN, -0.0, 1.5e-300];
        for value in values {
            let json = serde_json::to_string(&Value::Float(value)).expect("serialize");
            let back: Value = serde_json::from_str(&json).expect("deserialize");
            let Value::Float(decoded) = back else {
                panic!("not a float: {json}");
            };
            assert_eq!(decoded.is_nan(), value.is_nan(), "{json}");
            if !value.is_nan() {
                assert_eq!(decoded.to_bits(), value.to_bits(), "{json}");
            }
        }
        assert_eq!(
            serde_json::to_string(&Value::Float(f64::NEG_INFINITY)).expect("serialize"),
            r#"{"float":"-inf"}"#
        );
        assert!(serde_json::from_str::<Value>(r#"{"float":"infinity"}"#).is_err());
    }

    #[test]
    fn bincode_keeps_float_bits() {
        for value in [f64::NAN, f64::INFINITY, -0.0] {
            let bytes = bincode::serialize(&Value::Float(value)).expect("serialize");
            let back: Value = bincode::deserialize(&bytes).expect("deserialize");
            let Value::Float(decoded) = back else {
                panic!("not a float");
            };
            assert_eq!(decoded.to_bits(), value.to_bits());
        }
    }

    #[test]
    fn value_converts_into_param() {
        let value = Value::Seq(vec![Value::Int(1), Value::from("x")]);
        assert_eq!(
            Param::from(value),
            Param::Seq(vec![Param::Int(1), Param::Str("x".into())])
        );
    }

    #[test]
    fn ints_widen_to_floats() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Param::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::Str("3".into()).as_f64(), None);
    }
}
