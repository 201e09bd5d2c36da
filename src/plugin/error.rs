use std::fmt::{Display, Formatter};

use serde_json::{json, Value};

use crate::database::DatabaseError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PluginErrorCode {
    InvalidArguments,
    InvalidAction,
    AlreadyExists,
    NotFound,
}

impl PluginErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginErrorCode::InvalidArguments => "plugin/invalid-arguments",
            PluginErrorCode::InvalidAction => "plugin/invalid-action",
            PluginErrorCode::AlreadyExists => "plugin/already-exists",
            PluginErrorCode::NotFound => "plugin/not-found",
        }
    }
}

/// Why a command failed. Reported to the host, never raised across it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PluginError {
    /// Rejected by the router before reaching the database.
    Command {
        code: PluginErrorCode,
        message: String,
    },
    /// Reported by the database client.
    Database(DatabaseError),
}

impl PluginError {
    pub fn new(code: PluginErrorCode, message: impl Into<String>) -> Self {
        PluginError::Command {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            PluginError::Command { code, .. } => code.as_str(),
            PluginError::Database(err) => err.code_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PluginError::Command { message, .. } => message,
            PluginError::Database(err) => err.message(),
        }
    }

    /// Failure payload sent through the callback channel.
    pub fn to_json(&self) -> Value {
        json!({ "code": self.code_str(), "message": self.message() })
    }
}

impl Display for PluginError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), self.code_str())
    }
}

impl std::error::Error for PluginError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PluginError::Database(err) => Some(err),
            PluginError::Command { .. } => None,
        }
    }
}

impl From<DatabaseError> for PluginError {
    fn from(err: DatabaseError) -> Self {
        PluginError::Database(err)
    }
}

pub type CommandOutcome<T> = Result<T, PluginError>;

pub fn invalid_arguments(message: impl Into<String>) -> PluginError {
    PluginError::new(PluginErrorCode::InvalidArguments, message)
}

pub fn invalid_action(message: impl Into<String>) -> PluginError {
    PluginError::new(PluginErrorCode::InvalidAction, message)
}

pub fn already_exists(message: impl Into<String>) -> PluginError {
    PluginError::new(PluginErrorCode::AlreadyExists, message)
}

pub fn not_found(message: impl Into<String>) -> PluginError {
    PluginError::new(PluginErrorCode::NotFound, message)
}
