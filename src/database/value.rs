use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::database::error::{invalid_argument, DatabaseResult};
use crate::database::path::validate_key;

pub(crate) const VALUE_KEY: &str = ".value";
pub(crate) const PRIORITY_KEY: &str = ".priority";

pub(crate) fn validate_priority(priority: &Value) -> DatabaseResult<()> {
    match priority {
        Value::Null | Value::Number(_) | Value::String(_) => Ok(()),
        _ => Err(invalid_argument("Priority must be a string, number, or null")),
    }
}

/// Rejects values whose object keys could not be stored as child keys.
pub(crate) fn validate_value(value: &Value) -> DatabaseResult<()> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == PRIORITY_KEY {
                    validate_priority(child)?;
                    continue;
                }
                if key == VALUE_KEY {
                    validate_value(child)?;
                    continue;
                }
                validate_key(key)?;
                validate_value(child)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(validate_value),
        _ => Ok(()),
    }
}

/// Attaches a priority the way the tree stores it: objects carry a
/// `.priority` entry, leaves are wrapped in `{".value", ".priority"}`.
pub(crate) fn pack_with_priority(value: Value, priority: Value) -> Value {
    let value = normalize(value);
    if priority.is_null() || value.is_null() {
        return value;
    }
    match value {
        Value::Object(mut map) => {
            map.insert(PRIORITY_KEY.to_string(), priority);
            Value::Object(map)
        }
        leaf => {
            let mut map = Map::with_capacity(2);
            map.insert(VALUE_KEY.to_string(), leaf);
            map.insert(PRIORITY_KEY.to_string(), priority);
            Value::Object(map)
        }
    }
}

/// Strips priority metadata recursively, yielding plain data. Nodes whose
/// keys are all array indices come back as arrays, the way a client's
/// `val()` reports them.
pub(crate) fn export_data(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(inner) = map.get(VALUE_KEY) {
                return export_data(inner);
            }
            let cleaned: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| key.as_str() != PRIORITY_KEY)
                .map(|(key, child)| (key.clone(), export_data(child)))
                .collect();
            rebuild_array(cleaned)
        }
        other => other.clone(),
    }
}

/// Turns `{"0": a, "2": c}` back into `[a, null, c]` when every key is an
/// index and the largest index is below twice the number of children.
fn rebuild_array(map: Map<String, Value>) -> Value {
    let largest = map
        .keys()
        .map(String::as_str)
        .map(array_index)
        .collect::<Option<Vec<usize>>>()
        .and_then(|indices| indices.into_iter().max());
    match largest {
        Some(largest) if largest < 2 * map.len() => {
            let mut items = vec![Value::Null; largest + 1];
            for (key, child) in map {
                if let Some(index) = array_index(&key) {
                    items[index] = child;
                }
            }
            Value::Array(items)
        }
        _ => Value::Object(map),
    }
}

fn array_index(key: &str) -> Option<usize> {
    let canonical = !key.is_empty()
        && key.bytes().all(|byte| byte.is_ascii_digit())
        && (key == "0" || !key.starts_with('0'));
    if canonical {
        key.parse().ok()
    } else {
        None
    }
}

pub(crate) fn priority_of(value: &Value) -> Value {
    value
        .as_object()
        .and_then(|map| map.get(PRIORITY_KEY))
        .cloned()
        .unwrap_or(Value::Null)
}

fn data_ref(value: &Value) -> &Value {
    value
        .as_object()
        .and_then(|map| map.get(VALUE_KEY))
        .unwrap_or(value)
}

pub(crate) fn get_at_path<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        current = match data_ref(current) {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate objects and pruning
/// parents left empty by a `null` write.
pub(crate) fn set_at_path(root: &mut Value, path: &[String], value: Value) {
    let value = normalize(value);
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };

    if value.is_null() {
        delete_at_path(root, path);
        return;
    }

    let mut current = root;
    for segment in parents {
        current = child_slot(current, segment);
    }
    object_for_write(current).insert(last.clone(), value);
}

pub(crate) fn delete_at_path(root: &mut Value, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        *root = Value::Null;
        return;
    };

    if let Some(Value::Object(map)) = get_mut_at_path(root, parents) {
        map.remove(last);
    }
    prune_empty(root);
}

fn get_mut_at_path<'a>(root: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn child_slot<'a>(current: &'a mut Value, segment: &str) -> &'a mut Value {
    object_for_write(current)
        .entry(segment.to_string())
        .or_insert(Value::Null)
}

fn object_for_write(current: &mut Value) -> &mut Map<String, Value> {
    // A wrapped leaf gains children: the leaf goes away, its priority stays.
    if let Value::Object(map) = current {
        map.remove(VALUE_KEY);
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

/// Arrays are stored as objects keyed by index, and empty containers as null.
pub(crate) fn normalize(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            let map: Map<String, Value> = items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (index.to_string(), normalize(item)))
                .filter(|(_, item)| !item.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(key, item)| (key, normalize(item)))
                .filter(|(_, item)| !item.is_null())
                .collect();
            if is_hollow(&map) {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

fn prune_empty(value: &mut Value) {
    if let Value::Object(map) = value {
        for child in map.values_mut() {
            prune_empty(child);
        }
        map.retain(|_, child| !child.is_null());
        if is_hollow(map) {
            *value = Value::Null;
        }
    }
}

/// True when a node has no data left, only metadata such as a priority.
fn is_hollow(map: &Map<String, Value>) -> bool {
    map.keys().all(|key| key == PRIORITY_KEY)
}

/// Children of a node in key order, with priority metadata kept intact.
pub(crate) fn children(value: &Value) -> BTreeMap<String, Value> {
    match data_ref(value) {
        Value::Object(map) => map
            .iter()
            .filter(|(key, _)| !key.starts_with('.'))
            .map(|(key, child)| (key.clone(), child.clone()))
            .collect(),
        _ => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> Vec<String> {
        raw.split('/').map(str::to_string).collect()
    }

    #[test]
    fn set_creates_intermediate_nodes() {
        let mut root = Value::Null;
        set_at_path(&mut root, &path("a/b/c"), json!(1));
        assert_eq!(root, json!({ "a": { "b": { "c": 1 } } }));
    }

    #[test]
    fn null_write_prunes_empty_parents() {
        let mut root = json!({ "a": { "b": { "c": 1 } }, "keep": true });
        set_at_path(&mut root, &path("a/b/c"), Value::Null);
        assert_eq!(root, json!({ "keep": true }));
    }

    #[test]
    fn arrays_are_stored_as_indexed_objects() {
        let mut root = Value::Null;
        set_at_path(&mut root, &path("list"), json!(["x", "y"]));
        assert_eq!(root, json!({ "list": { "0": "x", "1": "y" } }));
        assert_eq!(export_data(&root), json!({ "list": ["x", "y"] }));
    }

    #[test]
    fn export_rebuilds_sparse_arrays_and_keeps_sparse_objects() {
        let stored = json!({ "0": "a", "2": "c" });
        assert_eq!(export_data(&stored), json!(["a", null, "c"]));

        let too_sparse = json!({ "0": "a", "5": "f" });
        assert_eq!(export_data(&too_sparse), too_sparse);

        let mixed = json!({ "0": "a", "name": "b" });
        assert_eq!(export_data(&mixed), mixed);

        let padded = json!({ "00": "a", "1": "b" });
        assert_eq!(export_data(&padded), padded);
    }

    #[test]
    fn export_strips_priorities() {
        let stored = json!({
            "a": { ".value": 1, ".priority": 5 },
            "b": { "c": 2, ".priority": "p" }
        });
        assert_eq!(export_data(&stored), json!({ "a": 1, "b": { "c": 2 } }));
        assert_eq!(priority_of(&stored["a"]), json!(5));
    }

    #[test]
    fn get_reads_through_priority_wrappers() {
        let root = json!({ "a": { ".value": { "b": 3 }, ".priority": 1 } });
        assert_eq!(get_at_path(&root, &path("a/b")), Some(&json!(3)));
    }

    #[test]
    fn writing_a_child_under_a_wrapped_leaf_keeps_priority() {
        let mut root = json!({ "a": { ".value": 1, ".priority": 2 } });
        set_at_path(&mut root, &path("a/b"), json!(true));
        assert_eq!(root, json!({ "a": { "b": true, ".priority": 2 } }));
    }

    #[test]
    fn validate_value_rejects_bad_keys() {
        assert!(validate_value(&json!({ "ok": { "bad.key": 1 } })).is_err());
        assert!(validate_value(&json!({ "ok": [1, 2, { "fine": null }] })).is_ok());
    }

    #[test]
    fn rejects_object_priorities() {
        assert!(validate_priority(&json!({ "x": 1 })).is_err());
        assert!(validate_priority(&json!(3)).is_ok());
    }
}
