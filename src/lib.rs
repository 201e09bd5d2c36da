//! # Firebase Realtime Database bridge
//!
//! A command router that exposes a Realtime Database client to a host
//! application (typically a WebView-based mobile shell) through a small set
//! of JSON commands: `on`, `off`, `push`, `set`, `update` and `setOnline`.
//!
//! - [`database`] defines the [`DatabaseClient`](database::DatabaseClient)
//!   seam the router talks to, plus [`MemoryDatabase`](database::MemoryDatabase),
//!   an in-process implementation with listener events, query windows,
//!   security rules and offline write acknowledgement.
//! - [`plugin`] parses host commands, validates their arguments, keeps the
//!   per-instance listener registry and streams listener events back through
//!   a [`CallbackChannel`](plugin::CallbackChannel).
//! - [`logger`] provides the named loggers both modules write to; records are
//!   forwarded to the [`log`] facade.
//! - [`platform`] holds the runtime glue used to run commands in the
//!   background.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use firebase_database_bridge::database::MemoryDatabase;
//! use firebase_database_bridge::plugin::{ChannelCallback, Command, FirebaseDatabasePlugin};
//!
//! # futures::executor::block_on(async {
//! let (channel, results) = ChannelCallback::new();
//! let plugin = FirebaseDatabasePlugin::new(Arc::new(MemoryDatabase::new()), Arc::new(channel));
//!
//! let command = Command::from_json(
//!     r#"{"action":"push","args":["/queue",{"job":"resize"}],"callbackId":"cb-7"}"#,
//! )
//! .unwrap();
//! plugin.handle(command).await;
//!
//! let message = results.try_recv().unwrap();
//! assert_eq!(message.result.message.as_str().map(str::len), Some(20));
//! # });
//! ```

pub mod database;
pub mod logger;
pub mod platform;
pub mod plugin;

#[cfg(test)]
pub(crate) mod test_support;
