//! # Host command router
//!
//! The host (a WebView bridge, a mobile shell, a test harness) sends
//! [`Command`]s: an action name, positional JSON arguments and a callback id.
//! [`FirebaseDatabasePlugin`] validates the arguments, forwards the call to a
//! [`DatabaseClient`](crate::database::DatabaseClient) and reports every
//! outcome through a [`CallbackChannel`].
//!
//! | action      | arguments                                   | success result          |
//! |-------------|---------------------------------------------|-------------------------|
//! | `on`        | `path, eventType, query?, listenerId?`      | a stream of events      |
//! | `off`       | `path, eventType?, listenerId?`             | number of listeners removed |
//! | `push`      | `path, value?`                              | the generated key       |
//! | `set`       | `path, value, priority?`                    | `null`                  |
//! | `update`    | `path, values`                              | `null`                  |
//! | `setOnline` | `enabled`                                   | `null`                  |
//!
//! Failures carry `{ "code", "message" }` with a `plugin/*` code when the
//! router rejected the command and a `database/*` code when the client did.
//!
//! A listener's callback stays open (`keepCallback: true`) until the listener
//! is detached by `off`, replaced by another `on` from a different callback,
//! or dropped by `reset`. It then receives one final `null` result with
//! `keepCallback: false`. A listener the database cancels ends with an error
//! result instead. `off` with a listener id only matches a listener
//! registered on that path.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use firebase_database_bridge::database::MemoryDatabase;
//! use firebase_database_bridge::plugin::{ChannelCallback, Command, FirebaseDatabasePlugin};
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let (channel, results) = ChannelCallback::new();
//! let plugin = FirebaseDatabasePlugin::new(Arc::new(MemoryDatabase::new()), Arc::new(channel));
//!
//! plugin
//!     .handle(Command::new("set", vec![json!("/users/ada"), json!({ "age": 36 })], "cb-1"))
//!     .await;
//!
//! let message = results.try_recv().unwrap();
//! assert_eq!(message.callback_id, "cb-1");
//! assert!(message.result.is_ok());
//! # });
//! ```

mod api;
mod command;
mod error;
mod registry;
mod result;
mod settings;

#[doc(inline)]
pub use api::FirebaseDatabasePlugin;

#[doc(inline)]
pub use command::{Action, Arguments, Command};

#[doc(inline)]
pub use error::{CommandOutcome, PluginError, PluginErrorCode};

#[doc(inline)]
pub use registry::{listener_key, DeliveryGate, ListenerEntry, ListenerRegistry, ListenerTable};

#[doc(inline)]
pub use result::{CallbackChannel, CallbackMessage, ChannelCallback, CommandStatus, PluginResult};

#[doc(inline)]
pub use settings::{DuplicateListenerPolicy, PluginSettings, UnknownListenerPolicy};
