use serde::Deserialize;

use crate::logger::LogLevel;
use crate::plugin::error::{invalid_arguments, CommandOutcome};

/// What `on` does when the listener key is already registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateListenerPolicy {
    /// Detach the existing listener and register the new one.
    #[default]
    Replace,
    /// Fail with `plugin/already-exists` and keep the existing listener.
    Reject,
}

/// What `off` does when no listener matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownListenerPolicy {
    /// Succeed without doing anything.
    #[default]
    Ignore,
    /// Fail with `plugin/not-found`.
    Report,
}

/// Plugin configuration, typically read from the host's preferences.
///
/// ```
/// use firebase_database_bridge::plugin::{DuplicateListenerPolicy, PluginSettings};
///
/// let settings = PluginSettings::from_json(r#"{ "duplicateListener": "reject" }"#).unwrap();
/// assert_eq!(settings.duplicate_listener, DuplicateListenerPolicy::Reject);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PluginSettings {
    pub duplicate_listener: DuplicateListenerPolicy,
    pub unknown_listener: UnknownListenerPolicy,
    /// Applied to every logger when the plugin is created.
    pub log_level: Option<LogLevel>,
}

impl PluginSettings {
    pub fn from_json(raw: &str) -> CommandOutcome<Self> {
        serde_json::from_str(raw)
            .map_err(|err| invalid_arguments(format!("Invalid plugin settings: {err}")))
    }

    pub fn with_duplicate_listener(mut self, policy: DuplicateListenerPolicy) -> Self {
        self.duplicate_listener = policy;
        self
    }

    pub fn with_unknown_listener(mut self, policy: UnknownListenerPolicy) -> Self {
        self.unknown_listener = policy;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }
}
