use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::plugin::error::{invalid_action, invalid_arguments, CommandOutcome, PluginError};

/// Operations the plugin exposes to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    On,
    Off,
    Push,
    Set,
    Update,
    SetOnline,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::On => "on",
            Action::Off => "off",
            Action::Push => "push",
            Action::Set => "set",
            Action::Update => "update",
            Action::SetOnline => "setOnline",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(Action::On),
            "off" => Ok(Action::Off),
            "push" => Ok(Action::Push),
            "set" => Ok(Action::Set),
            "update" => Ok(Action::Update),
            "setOnline" => Ok(Action::SetOnline),
            other => Err(invalid_action(format!("Unknown action '{other}'"))),
        }
    }
}

/// One invocation from the host: action name, positional arguments and the
/// callback that receives the result(s).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub args: Vec<Value>,
    pub callback_id: String,
}

impl Command {
    pub fn new(action: impl Into<String>, args: Vec<Value>, callback_id: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            args,
            callback_id: callback_id.into(),
        }
    }

    /// Parses the host envelope `{"action": .., "args": [..], "callbackId": ..}`.
    pub fn from_json(raw: &str) -> CommandOutcome<Self> {
        serde_json::from_str(raw)
            .map_err(|err| invalid_arguments(format!("Malformed command envelope: {err}")))
    }

    pub fn arguments(&self) -> Arguments<'_> {
        Arguments {
            action: &self.action,
            args: &self.args,
        }
    }
}

/// Typed, positional access to a command's arguments.
///
/// Every accessor names the argument in its error so the host sees which
/// parameter was wrong.
#[derive(Clone, Copy, Debug)]
pub struct Arguments<'a> {
    action: &'a str,
    args: &'a [Value],
}

impl<'a> Arguments<'a> {
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn expect_at_most(&self, count: usize) -> CommandOutcome<()> {
        if self.args.len() > count {
            return Err(invalid_arguments(format!(
                "'{}' takes at most {count} arguments, got {}",
                self.action,
                self.args.len()
            )));
        }
        Ok(())
    }

    pub fn value(&self, index: usize, name: &str) -> CommandOutcome<&'a Value> {
        self.args
            .get(index)
            .ok_or_else(|| self.error(index, name, "is missing"))
    }

    /// Absent and `null` arguments both read as `None`.
    pub fn optional_value(&self, index: usize) -> Option<&'a Value> {
        self.args.get(index).filter(|value| !value.is_null())
    }

    pub fn string(&self, index: usize, name: &str) -> CommandOutcome<&'a str> {
        match self.value(index, name)? {
            Value::String(text) => Ok(text.as_str()),
            _ => Err(self.error(index, name, "must be a string")),
        }
    }

    pub fn optional_string(&self, index: usize, name: &str) -> CommandOutcome<Option<&'a str>> {
        match self.optional_value(index) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.as_str())),
            Some(_) => Err(self.error(index, name, "must be a string")),
        }
    }

    pub fn bool(&self, index: usize, name: &str) -> CommandOutcome<bool> {
        match self.value(index, name)? {
            Value::Bool(flag) => Ok(*flag),
            _ => Err(self.error(index, name, "must be a boolean")),
        }
    }

    pub fn object(&self, index: usize, name: &str) -> CommandOutcome<&'a Map<String, Value>> {
        match self.value(index, name)? {
            Value::Object(map) => Ok(map),
            _ => Err(self.error(index, name, "must be an object")),
        }
    }

    fn error(&self, index: usize, name: &str, problem: &str) -> PluginError {
        invalid_arguments(format!(
            "'{}' argument {index} ({name}) {problem}",
            self.action
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_host_envelope() {
        let command = Command::from_json(
            r#"{"action":"set","args":["/a",1],"callbackId":"FirebaseDatabase123"}"#,
        )
        .unwrap();
        assert_eq!(command.action, "set");
        assert_eq!(command.args, vec![json!("/a"), json!(1)]);
        assert_eq!(command.callback_id, "FirebaseDatabase123");
    }

    #[test]
    fn missing_args_default_to_empty() {
        let command = Command::from_json(r#"{"action":"on","callbackId":"cb"}"#).unwrap();
        assert!(command.arguments().is_empty());
    }

    #[test]
    fn malformed_envelope_is_invalid_arguments() {
        let err = Command::from_json("{").unwrap_err();
        assert_eq!(err.code_str(), "plugin/invalid-arguments");
    }

    #[test]
    fn accessors_report_argument_names() {
        let command = Command::new("on", vec![json!(3)], "cb");
        let err = command.arguments().string(0, "path").unwrap_err();
        assert_eq!(err.message(), "'on' argument 0 (path) must be a string");

        let err = command.arguments().string(1, "eventType").unwrap_err();
        assert_eq!(err.message(), "'on' argument 1 (eventType) is missing");
    }

    #[test]
    fn null_optional_arguments_are_absent() {
        let command = Command::new("on", vec![json!("p"), json!("value"), Value::Null], "cb");
        let args = command.arguments();
        assert!(args.optional_value(2).is_none());
        assert_eq!(args.optional_string(3, "listenerId").unwrap(), None);
    }

    #[test]
    fn too_many_arguments_are_rejected() {
        let command = Command::new("setOnline", vec![json!(true), json!(false)], "cb");
        assert!(command.arguments().expect_at_most(1).is_err());
    }

    #[test]
    fn action_names_round_trip() {
        for name in ["on", "off", "push", "set", "update", "setOnline"] {
            assert_eq!(name.parse::<Action>().unwrap().as_str(), name);
        }
        assert_eq!(
            "transaction".parse::<Action>().unwrap_err().code_str(),
            "plugin/invalid-action"
        );
    }
}
