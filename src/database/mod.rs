//! # Realtime Database client seam
//!
//! Everything the plugin needs from a Realtime Database lives behind the
//! [`DatabaseClient`] trait: attaching and detaching listeners, writing and
//! merging data, generating push keys and toggling connectivity.
//!
//! The module also carries the pieces shared by every client implementation:
//! path and key validation, listener query options, the event and error types,
//! and [`MemoryDatabase`], an in-process client that behaves like a local
//! Realtime Database cache.
//!
//! ## Example
//!
//! ```
//! use firebase_database_bridge::database::*;
//! use serde_json::{json, Value};
//!
//! # futures::executor::block_on(async {
//! let database = MemoryDatabase::new();
//! let path = normalize_path("/messages/first").unwrap();
//!
//! let subscription = database
//!     .listen(&path, EventType::Value, &QueryOptions::default())
//!     .await
//!     .unwrap();
//! database.set(&path, json!({ "text": "hello" }), Value::Null).await.unwrap();
//!
//! // The initial (empty) snapshot, then the write.
//! assert!(subscription.messages.try_recv().is_ok());
//! match subscription.messages.try_recv().unwrap() {
//!     SubscriptionMessage::Event(event) => assert_eq!(event.value, json!({ "text": "hello" })),
//!     SubscriptionMessage::Cancelled(err) => panic!("{err}"),
//! }
//! # });
//! ```

mod client;
pub mod error;
mod event;
mod memory;
mod path;
mod push_id;
mod query;
mod value;

#[doc(inline)]
pub use client::{DatabaseClient, ListenerId, Subscription, SubscriptionMessage};

#[doc(inline)]
pub use error::{DatabaseError, DatabaseErrorCode, DatabaseResult};

#[doc(inline)]
pub use event::{DatabaseEvent, EventType};

#[doc(inline)]
pub use memory::{MemoryDatabase, MemoryRules};

#[doc(inline)]
pub use path::{join_path, normalize_path, validate_key};

#[doc(inline)]
pub use push_id::PushIdGenerator;

#[doc(inline)]
pub use query::{QueryBound, QueryIndex, QueryLimit, QueryOptions};
