//! Property tests for the snapshot differ
//!
//! These tests verify:
//! - Equal snapshots never produce leaf changes
//! - A change to exactly one leaf produces exactly one LeafChange at its path
//! - Value formatting tokens

use config_log::services::{diff, format_value};
use config_log::{ConfigSnapshot, Value};
use indexmap::IndexMap;
use proptest::prelude::*;

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-z /]{0,8}".prop_map(Value::String),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Sequence),
            prop::collection::btree_map("[a-z0-9]{1,5}", inner, 0..4)
                .prop_map(|map| Value::Mapping(map.into_iter().collect())),
        ]
    })
}

fn snapshot() -> impl Strategy<Value = ConfigSnapshot> {
    prop::collection::btree_map("[a-z0-9]{1,6}", value(), 0..6)
        .prop_map(|map| ConfigSnapshot::from_pairs(map))
}

fn flat_snapshot() -> impl Strategy<Value = ConfigSnapshot> {
    prop::collection::btree_map("[a-z]{1,6}", scalar(), 1..8)
        .prop_map(|map| ConfigSnapshot::from_pairs(map))
}

proptest! {
    #[test]
    fn test_equal_snapshots_have_no_changes(snapshot in snapshot()) {
        prop_assert!(diff(&snapshot, &snapshot.clone()).is_empty());
    }

    #[test]
    fn test_single_top_level_change(before in flat_snapshot(), index in any::<prop::sample::Index>()) {
        let keys: Vec<String> = before.iter().map(|(k, _)| k.clone()).collect();
        let key = index.get(&keys).clone();
        let old = before.get(&key).cloned().unwrap_or(Value::Null);

        let mut after = before.clone();
        after.insert(key.clone(), Value::String(format!("changed {}", old)));

        let changes = diff(&before, &after);
        prop_assert_eq!(changes.len(), 1);
        prop_assert_eq!(&changes[0].path, &key);
        prop_assert_eq!(&changes[0].old_value, &format_value(&old));
    }

    #[test]
    fn test_single_nested_change(inner in flat_snapshot(), index in any::<prop::sample::Index>()) {
        let map: IndexMap<String, Value> = inner.as_map().clone();
        let keys: Vec<String> = map.keys().cloned().collect();
        let key = index.get(&keys).clone();

        let mut changed = map.clone();
        changed.insert(key.clone(), Value::String("replacement value".to_string()));
        prop_assume!(changed != map);

        let before = ConfigSnapshot::from_pairs([("outer", Value::Mapping(map))]);
        let after = ConfigSnapshot::from_pairs([("outer", Value::Mapping(changed))]);

        let changes = diff(&before, &after);
        prop_assert_eq!(changes.len(), 1);
        prop_assert_eq!(&changes[0].path, &format!("outer.{}", key));
        prop_assert_eq!(&changes[0].new_value, "replacement value");
    }
}

#[test]
fn test_format_value_tokens() {
    assert_eq!(format_value(&Value::Null), "NULL");
    assert_eq!(format_value(&Value::from("")), "<empty string>");
    assert_eq!(format_value(&Value::from(true)), "TRUE");
    assert_eq!(format_value(&Value::from(false)), "FALSE");
    assert_eq!(format_value(&Value::from("x")), "x");
    assert_eq!(format_value(&Value::from(42i64)), "42");
}
