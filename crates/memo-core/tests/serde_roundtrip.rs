use std::collections::BTreeMap;

use memo_core::{ResultMap, SchemaVersion, Value};

fn sample_result() -> ResultMap {
    let mut nested = BTreeMap::new();
    nested.insert("mean".to_string(), Value::Float(499.5));
    nested.insert("label".to_string(), Value::from("uniform"));
    [
        ("a".to_string(), Value::Seq((0..5).map(Value::Int).collect())),
        ("b".to_string(), Value::Seq(Vec::new())),
        ("c".to_string(), Value::Map(nested)),
        ("raw".to_string(), Value::Bytes(vec![0, 255, 7])),
        ("ok".to_string(), Value::Bool(true)),
    ]
    .into_iter()
    .collect()
}

#[test]
fn results_round_trip_json() {
    let result = sample_result();
    let json = serde_json::to_string_pretty(&result).expect("serialize");
    let decoded: ResultMap = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(decoded, result);
}

#[test]
fn results_round_trip_bincode() {
    let result = sample_result();
    let bytes = bincode::serialize(&result).expect("serialize");
    let decoded: ResultMap = bincode::deserialize(&bytes).expect("deserialize");
    assert_eq!(decoded, result);
}

#[test]
fn value_kinds_have_distinct_encodings() {
    let encodings: Vec<String> = [
        Value::Int(1),
        Value::Float(1.0),
        Value::Str("1".into()),
        Value::Bytes(vec![1]),
        Value::Seq(vec![Value::Int(1)]),
    ]
    .iter()
    .map(|value| serde_json::to_string(value).expect("serialize"))
    .collect();
    for (i, a) in encodings.iter().enumerate() {
        for b in encodings.iter().skip(i + 1) {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn schema_versions_order_and_display() {
    assert!(SchemaVersion::LEGACY.is_outdated());
    assert!(!SchemaVersion::CURRENT.is_outdated());
    assert_eq!(SchemaVersion::default(), SchemaVersion::CURRENT);
    assert_eq!(SchemaVersion::new(1, 2, 3).to_string(), "1.2.3");
}
