use std::fmt;

use async_channel::Receiver;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::event::{DatabaseEvent, EventType};
use crate::database::query::QueryOptions;

/// Identifier the client hands out for an attached listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Messages produced by an attached listener.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscriptionMessage {
    Event(DatabaseEvent),
    /// The client stopped the listener; nothing follows this message.
    Cancelled(DatabaseError),
}

/// A live listener: its id plus the stream of messages it produces.
///
/// The stream ends when the listener is detached with
/// [`DatabaseClient::unlisten`] or after a [`SubscriptionMessage::Cancelled`].
#[derive(Debug)]
pub struct Subscription {
    pub id: ListenerId,
    pub messages: Receiver<SubscriptionMessage>,
}

/// The database operations the plugin forwards to.
///
/// Paths are normalized segment lists; validation of user input happens
/// before a call reaches the client.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn listen(
        &self,
        path: &[String],
        event_type: EventType,
        query: &QueryOptions,
    ) -> DatabaseResult<Subscription>;

    /// Detaches a listener. Unknown ids are ignored.
    async fn unlisten(&self, id: ListenerId);

    async fn set(&self, path: &[String], value: Value, priority: Value) -> DatabaseResult<()>;

    /// Writes every `relative path -> value` entry below `path`; siblings that
    /// are not named keep their data.
    async fn update(&self, path: &[String], updates: Map<String, Value>) -> DatabaseResult<()>;

    /// Generates a child key below `path`, writes `value` there when given,
    /// and returns the key.
    async fn push(&self, path: &[String], value: Option<Value>) -> DatabaseResult<String>;

    async fn go_online(&self) -> DatabaseResult<()>;

    async fn go_offline(&self) -> DatabaseResult<()>;

    fn is_online(&self) -> bool;
}
