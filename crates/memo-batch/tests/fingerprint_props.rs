use memo_batch::{fingerprint, normalize};
use memo_core::{Param, ParameterSet};
use proptest::prelude::*;

fn leaf() -> impl Strategy<Value = Param> {
    prop_oneof![
        any::<bool>().prop_map(Param::Bool),
        any::<i64>().prop_map(Param::Int),
        (-1.0e9f64..1.0e9).prop_map(Param::Float),
        "[a-z0-9 ]{0,8}".prop_map(Param::Str),
        prop::collection::vec(any::<u8>(), 0..4).prop_map(Param::Bytes),
        "[a-z]{1,6}".prop_map(|name| Param::callable(name, ())),
    ]
}

fn param() -> impl Strategy<Value = Param> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Param::Seq),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4).prop_map(Param::Map),
        ]
    })
}

fn pairs() -> impl Strategy<Value = Vec<(String, Param)>> {
    prop::collection::btree_map("[A-Za-z_]{1,6}", param(), 0..6)
        .prop_map(|map| map.into_iter().collect())
}

fn normalized(set: &ParameterSet) -> Vec<(String, memo_core::Value)> {
    let mut out: Vec<_> = set
        .iter()
        .map(|(key, value)| (key.clone(), normalize(value).expect("data params normalize")))
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

proptest! {
    #[test]
    fn insertion_order_does_not_matter(pairs in pairs()) {
        let forward: ParameterSet = pairs.iter().cloned().collect();
        let backward: ParameterSet = pairs.iter().rev().cloned().collect();
        prop_assert_eq!(
            fingerprint(&forward).expect("fingerprint").id,
            fingerprint(&backward).expect("fingerprint").id
        );
    }

    #[test]
    fn fingerprints_are_deterministic(pairs in pairs()) {
        let set: ParameterSet = pairs.into_iter().collect();
        let a = fingerprint(&set).expect("fingerprint");
        let b = fingerprint(&set.clone()).expect("fingerprint");
        prop_assert_eq!(a.id.len(), 64);
        prop_assert!(a.dropped.is_empty());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn equal_normal_forms_iff_equal_fingerprints(a in pairs(), b in pairs()) {
        let a: ParameterSet = a.into_iter().collect();
        let b: ParameterSet = b.into_iter().collect();
        let same_values = normalized(&a) == normalized(&b);
        let id_a = fingerprint(&a).expect("fingerprint").id;
        let id_b = fingerprint(&b).expect("fingerprint").id;
        let same_ids = id_a == id_b;
        prop_assert_eq!(same_values, same_ids);
    }

    #[test]
    fn changing_one_value_changes_the_fingerprint(pairs in pairs(), bump in 1i64..1000) {
        prop_assume!(!pairs.is_empty());
        let set: ParameterSet = pairs.iter().cloned().collect();
        let mut changed = set.clone();
        let first = changed.keys().next().cloned().expect("key");
        let replacement = match &changed[&first] {
            Param::Int(value) => Param::Int(value.wrapping_add(bump)),
            _ => Param::Int(bump),
        };
        changed.insert(first, replacement);
        prop_assert_ne!(
            fingerprint(&set).expect("fingerprint").id,
            fingerprint(&changed).expect("fingerprint").id
        );
    }
}
