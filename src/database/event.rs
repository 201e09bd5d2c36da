use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::database::error::{invalid_argument, DatabaseError};

/// Kinds of events a listener can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Value,
    ChildAdded,
    ChildChanged,
    ChildRemoved,
    ChildMoved,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Value => "value",
            EventType::ChildAdded => "child_added",
            EventType::ChildChanged => "child_changed",
            EventType::ChildRemoved => "child_removed",
            EventType::ChildMoved => "child_moved",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(EventType::Value),
            "child_added" => Ok(EventType::ChildAdded),
            "child_changed" => Ok(EventType::ChildChanged),
            "child_removed" => Ok(EventType::ChildRemoved),
            "child_moved" => Ok(EventType::ChildMoved),
            other => Err(invalid_argument(format!("Unknown event type '{other}'"))),
        }
    }
}

/// A snapshot delivered to a listener.
///
/// `key` is `None` for the root. `previous_child_key` is only set on child
/// events and names the sibling ordered immediately before this child.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseEvent {
    pub event_type: EventType,
    pub key: Option<String>,
    pub value: Value,
    pub priority: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_child_key: Option<String>,
}
