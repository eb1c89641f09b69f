use crate::models::{ConfigSnapshot, LeafChange, Value};
use indexmap::IndexMap;

/// Render a value for display in change descriptions.
///
/// `null`, the empty string and booleans get stable tokens so they stay
/// readable inside a sentence; everything else keeps its natural form.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) if s.is_empty() => "<empty string>".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}

/// Compute the leaf-level differences between two snapshots.
///
/// Keys are visited in the after snapshot's order, followed by keys that
/// only exist in the before snapshot. Identical values are omitted.
pub fn diff(before: &ConfigSnapshot, after: &ConfigSnapshot) -> Vec<LeafChange> {
    let mut changes = Vec::new();
    diff_maps(before.as_map(), after.as_map(), "", &mut changes);
    changes
}

static NULL: Value = Value::Null;

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn diff_maps(
    before: &IndexMap<String, Value>,
    after: &IndexMap<String, Value>,
    prefix: &str,
    changes: &mut Vec<LeafChange>,
) {
    for (key, new_value) in after {
        let old_value = before.get(key).unwrap_or(&NULL);
        diff_value(old_value, new_value, &join_path(prefix, key), changes);
    }

    for (key, old_value) in before {
        if !after.contains_key(key) {
            diff_value(old_value, &NULL, &join_path(prefix, key), changes);
        }
    }
}

/// Sequences are compared by index so `roles.0` addresses the first role.
fn diff_seqs(before: &[Value], after: &[Value], prefix: &str, changes: &mut Vec<LeafChange>) {
    for i in 0..before.len().max(after.len()) {
        let old_value = before.get(i).unwrap_or(&NULL);
        let new_value = after.get(i).unwrap_or(&NULL);
        diff_value(old_value, new_value, &join_path(prefix, &i.to_string()), changes);
    }
}

fn diff_value(old: &Value, new: &Value, path: &str, changes: &mut Vec<LeafChange>) {
    if old == new {
        return;
    }

    match (old, new) {
        (Value::Mapping(a), Value::Mapping(b)) => diff_maps(a, b, path, changes),
        (Value::Sequence(a), Value::Sequence(b)) => diff_seqs(a, b, path, changes),
        // A whole subtree appeared or disappeared: report each of its leaves.
        (Value::Null, Value::Mapping(added)) => diff_maps(&IndexMap::new(), added, path, changes),
        (Value::Null, Value::Sequence(added)) => diff_seqs(&[], added, path, changes),
        (Value::Mapping(removed), Value::Null) => {
            diff_maps(removed, &IndexMap::new(), path, changes)
        }
        (Value::Sequence(removed), Value::Null) => diff_seqs(removed, &[], path, changes),
        _ => changes.push(LeafChange::new(path, format_value(old), format_value(new))),
    }
}
