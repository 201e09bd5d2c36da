use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::database::error::{invalid_argument, DatabaseResult};
use crate::database::path::normalize_path;
use crate::database::value::{export_data, get_at_path, priority_of};

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum QueryIndex {
    #[default]
    Key,
    Value,
    Priority,
    Child(Vec<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryBound {
    pub value: Value,
    pub key: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryLimit {
    First(u32),
    Last(u32),
}

/// Ordering, range and limit options attached to a listener.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    pub index: QueryIndex,
    pub start: Option<QueryBound>,
    pub end: Option<QueryBound>,
    pub limit: Option<QueryLimit>,
}

impl QueryOptions {
    pub fn is_default(&self) -> bool {
        self == &QueryOptions::default()
    }

    /// Parses the host's query object.
    ///
    /// Accepted keys: `orderBy` (`{"key": true}`, `{"value": true}`,
    /// `{"priority": true}` or `{"child": "path"}`), `startAt`, `endAt`,
    /// `equalTo` (a primitive, or `{"value": .., "key": ..}`), `limitToFirst`
    /// and `limitToLast`.
    pub fn from_json(raw: &Value) -> DatabaseResult<Self> {
        let map = match raw {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            _ => return Err(invalid_argument("Query options must be an object")),
        };

        let mut options = QueryOptions::default();
        for key in map.keys() {
            if !matches!(
                key.as_str(),
                "orderBy" | "startAt" | "endAt" | "equalTo" | "limitToFirst" | "limitToLast"
            ) {
                return Err(invalid_argument(format!("Unknown query option '{key}'")));
            }
        }

        if let Some(order_by) = map.get("orderBy") {
            options.index = parse_index(order_by)?;
        }

        if let Some(equal) = map.get("equalTo") {
            if map.contains_key("startAt") || map.contains_key("endAt") {
                return Err(invalid_argument(
                    "equalTo cannot be combined with startAt or endAt",
                ));
            }
            let bound = parse_bound(equal)?;
            options.start = Some(bound.clone());
            options.end = Some(bound);
        }
        if let Some(start) = map.get("startAt") {
            options.start = Some(parse_bound(start)?);
        }
        if let Some(end) = map.get("endAt") {
            options.end = Some(parse_bound(end)?);
        }

        match (map.get("limitToFirst"), map.get("limitToLast")) {
            (Some(_), Some(_)) => {
                return Err(invalid_argument(
                    "limitToFirst and limitToLast cannot both be specified",
                ))
            }
            (Some(first), None) => options.limit = Some(QueryLimit::First(parse_limit(first)?)),
            (None, Some(last)) => options.limit = Some(QueryLimit::Last(parse_limit(last)?)),
            (None, None) => {}
        }

        if options.index == QueryIndex::Key {
            for bound in options.start.iter().chain(options.end.iter()) {
                if !bound.value.is_string() || bound.key.is_some() {
                    return Err(invalid_argument(
                        "Bounds on a key-ordered query must be plain strings",
                    ));
                }
            }
        }

        Ok(options)
    }

    /// Orders the given children and applies bounds and limits.
    ///
    /// Children are passed as stored (priority metadata intact).
    pub fn apply(&self, children: impl IntoIterator<Item = (String, Value)>) -> Vec<(String, Value)> {
        let mut ordered: Vec<(String, Value)> = children.into_iter().collect();
        ordered.sort_by(|(left_key, left), (right_key, right)| {
            self.compare(left_key, left, right_key, right)
        });

        ordered.retain(|(key, value)| {
            let after_start = self
                .start
                .as_ref()
                .map_or(true, |bound| self.compare_to_bound(key, value, bound) != Ordering::Less);
            let before_end = self
                .end
                .as_ref()
                .map_or(true, |bound| self.compare_to_bound(key, value, bound) != Ordering::Greater);
            after_start && before_end
        });

        match self.limit {
            Some(QueryLimit::First(limit)) => ordered.truncate(limit as usize),
            Some(QueryLimit::Last(limit)) => {
                let skip = ordered.len().saturating_sub(limit as usize);
                ordered.drain(..skip);
            }
            None => {}
        }
        ordered
    }

    /// Total order over children used by this query.
    pub fn compare(&self, left_key: &str, left: &Value, right_key: &str, right: &Value) -> Ordering {
        let by_index = match &self.index {
            QueryIndex::Key => Ordering::Equal,
            QueryIndex::Value => compare_values(&export_data(left), &export_data(right)),
            // Children without a priority sort first, then numbers, then strings.
            QueryIndex::Priority => compare_values(&priority_of(left), &priority_of(right)),
            QueryIndex::Child(path) => compare_values(&child_value(left, path), &child_value(right, path)),
        };
        by_index.then_with(|| compare_keys(left_key, right_key))
    }

    fn compare_to_bound(&self, key: &str, value: &Value, bound: &QueryBound) -> Ordering {
        let indexed = match &self.index {
            QueryIndex::Key => return compare_keys(key, bound.value.as_str().unwrap_or_default()),
            QueryIndex::Value => compare_values(&export_data(value), &bound.value),
            QueryIndex::Priority => compare_values(&priority_of(value), &bound.value),
            QueryIndex::Child(path) => compare_values(&child_value(value, path), &bound.value),
        };
        match (&bound.key, indexed) {
            (Some(bound_key), Ordering::Equal) => compare_keys(key, bound_key),
            (_, ordering) => ordering,
        }
    }

    /// Rebuilds the object a value listener sees for this query window.
    pub fn window_value(&self, children: impl IntoIterator<Item = (String, Value)>) -> Value {
        let window: Map<String, Value> = self.apply(children).into_iter().collect();
        if window.is_empty() {
            Value::Null
        } else {
            Value::Object(window)
        }
    }
}

fn parse_index(raw: &Value) -> DatabaseResult<QueryIndex> {
    let invalid = || {
        invalid_argument(
            "orderBy must be one of {\"key\":true}, {\"value\":true}, {\"priority\":true} or {\"child\":\"path\"}",
        )
    };
    let map = raw.as_object().ok_or_else(invalid)?;
    if map.len() != 1 {
        return Err(invalid());
    }
    match map.iter().next() {
        Some((name, Value::Bool(true))) if name == "key" => Ok(QueryIndex::Key),
        Some((name, Value::Bool(true))) if name == "value" => Ok(QueryIndex::Value),
        Some((name, Value::Bool(true))) if name == "priority" => Ok(QueryIndex::Priority),
        Some((name, Value::String(path))) if name == "child" => {
            let segments = normalize_path(path)?;
            if segments.is_empty() {
                return Err(invalid_argument("orderBy child path cannot be empty"));
            }
            Ok(QueryIndex::Child(segments))
        }
        _ => Err(invalid()),
    }
}

fn parse_bound(raw: &Value) -> DatabaseResult<QueryBound> {
    let bound = match raw {
        Value::Object(map) => {
            if map.keys().any(|key| key != "value" && key != "key") {
                return Err(invalid_argument(
                    "Query bounds must be primitives or {\"value\": .., \"key\": ..}",
                ));
            }
            let key = match map.get("key") {
                None | Some(Value::Null) => None,
                Some(Value::String(key)) => Some(key.clone()),
                Some(_) => return Err(invalid_argument("Query bound key must be a string")),
            };
            QueryBound {
                value: map.get("value").cloned().unwrap_or(Value::Null),
                key,
            }
        }
        other => QueryBound {
            value: other.clone(),
            key: None,
        },
    };
    if bound.value.is_object() || bound.value.is_array() {
        return Err(invalid_argument("Query bound values must be primitives"));
    }
    Ok(bound)
}

fn parse_limit(raw: &Value) -> DatabaseResult<u32> {
    raw.as_u64()
        .filter(|limit| *limit > 0)
        .and_then(|limit| u32::try_from(limit).ok())
        .ok_or_else(|| invalid_argument("Query limits must be positive integers"))
}

fn child_value(value: &Value, path: &[String]) -> Value {
    get_at_path(value, path)
        .map(export_data)
        .unwrap_or(Value::Null)
}

/// Keys that look like 32-bit integers sort numerically before all others.
pub fn compare_keys(left: &str, right: &str) -> Ordering {
    match (as_index_key(left), as_index_key(right)) {
        (Some(a), Some(b)) => a.cmp(&b).then_with(|| left.len().cmp(&right.len())),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left.cmp(right),
    }
}

fn as_index_key(key: &str) -> Option<i32> {
    if key == "-0" || (key.len() > 1 && key.starts_with('0')) || key.starts_with("-0") {
        return None;
    }
    key.parse::<i32>().ok()
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) | Value::Object(_) => 5,
    }
}

/// null < false < true < numbers < strings < objects.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scores() -> Vec<(String, Value)> {
        vec![
            ("a".to_string(), json!({ "score": 30 })),
            ("b".to_string(), json!({ "score": 10 })),
            ("c".to_string(), json!({ "score": 20 })),
            ("d".to_string(), json!({ "name": "no score" })),
        ]
    }

    fn keys(window: Vec<(String, Value)>) -> Vec<String> {
        window.into_iter().map(|(key, _)| key).collect()
    }

    #[test]
    fn default_query_orders_by_key() {
        let options = QueryOptions::from_json(&Value::Null).unwrap();
        assert!(options.is_default());
        assert_eq!(keys(options.apply(scores())), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn order_by_child_puts_missing_values_first() {
        let options = QueryOptions::from_json(&json!({ "orderBy": { "child": "score" } })).unwrap();
        assert_eq!(keys(options.apply(scores())), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn limit_to_last_keeps_highest() {
        let options = QueryOptions::from_json(&json!({
            "orderBy": { "child": "score" },
            "limitToLast": 2
        }))
        .unwrap();
        assert_eq!(keys(options.apply(scores())), vec!["c", "a"]);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let options = QueryOptions::from_json(&json!({
            "orderBy": { "child": "score" },
            "startAt": 10,
            "endAt": 20
        }))
        .unwrap();
        assert_eq!(keys(options.apply(scores())), vec!["b", "c"]);
    }

    #[test]
    fn equal_to_with_key_narrows_ties() {
        let children = vec![
            ("x".to_string(), json!(1)),
            ("y".to_string(), json!(1)),
            ("z".to_string(), json!(2)),
        ];
        let options = QueryOptions::from_json(&json!({
            "orderBy": { "value": true },
            "equalTo": { "value": 1, "key": "y" }
        }))
        .unwrap();
        assert_eq!(keys(options.apply(children)), vec!["y"]);
    }

    #[test]
    fn integer_keys_sort_numerically() {
        let children = vec![
            ("10".to_string(), json!(true)),
            ("9".to_string(), json!(true)),
            ("apple".to_string(), json!(true)),
        ];
        let options = QueryOptions::default();
        assert_eq!(keys(options.apply(children)), vec!["9", "10", "apple"]);
    }

    #[test]
    fn order_by_priority_respects_priority_metadata() {
        let children = vec![
            ("a".to_string(), json!({ ".value": "x", ".priority": 2 })),
            ("b".to_string(), json!({ ".value": "y", ".priority": 1 })),
            ("c".to_string(), json!("no priority")),
        ];
        let options = QueryOptions::from_json(&json!({ "orderBy": { "priority": true } })).unwrap();
        assert_eq!(keys(options.apply(children)), vec!["c", "b", "a"]);
    }

    #[test]
    fn rejects_conflicting_limits() {
        let err = QueryOptions::from_json(&json!({ "limitToFirst": 1, "limitToLast": 1 })).unwrap_err();
        assert_eq!(err.code_str(), "database/invalid-argument");
    }

    #[test]
    fn rejects_zero_limit_and_unknown_keys() {
        assert!(QueryOptions::from_json(&json!({ "limitToFirst": 0 })).is_err());
        assert!(QueryOptions::from_json(&json!({ "orderByChild": "x" })).is_err());
        assert!(QueryOptions::from_json(&json!({ "orderBy": { "child": "" } })).is_err());
    }

    #[test]
    fn key_ordered_bounds_must_be_strings() {
        assert!(QueryOptions::from_json(&json!({ "startAt": 3 })).is_err());
        assert!(QueryOptions::from_json(&json!({ "startAt": "b" })).is_ok());
    }
}
