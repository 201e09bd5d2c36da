use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard};

use async_channel::Sender;
use async_trait::async_trait;
use futures::channel::oneshot;
use serde_json::{Map, Value};

use crate::database::client::{DatabaseClient, ListenerId, Subscription, SubscriptionMessage};
use crate::database::error::{
    disconnected, invalid_argument, permission_denied, DatabaseResult,
};
use crate::database::event::{DatabaseEvent, EventType};
use crate::database::path::{is_prefix, join_path, normalize_path, paths_related};
use crate::database::push_id::PushIdGenerator;
use crate::database::query::QueryOptions;
use crate::database::value::{
    children, export_data, get_at_path, pack_with_priority, priority_of, set_at_path,
    validate_priority, validate_value,
};
use crate::logger::Logger;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase/database"));

/// Path-prefix access rules for [`MemoryDatabase`].
///
/// A rule covers its path and everything below it.
#[derive(Clone, Debug, Default)]
pub struct MemoryRules {
    read_denied: Vec<Vec<String>>,
    write_denied: Vec<Vec<String>>,
}

impl MemoryRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_read(mut self, path: &str) -> DatabaseResult<Self> {
        self.read_denied.push(normalize_path(path)?);
        Ok(self)
    }

    pub fn deny_write(mut self, path: &str) -> DatabaseResult<Self> {
        self.write_denied.push(normalize_path(path)?);
        Ok(self)
    }

    fn can_read(&self, path: &[String]) -> bool {
        !self.read_denied.iter().any(|rule| is_prefix(rule, path))
    }

    /// Writing at an ancestor of a protected node would replace it too.
    fn can_write(&self, path: &[String]) -> bool {
        !self
            .write_denied
            .iter()
            .any(|rule| paths_related(rule, path))
    }
}

/// An in-process Realtime Database.
///
/// Keeps the whole tree in memory, raises listener events by diffing the tree
/// before and after each write, and models connectivity: while offline, writes
/// apply locally right away but their completion waits for [`go_online`].
///
/// [`go_online`]: DatabaseClient::go_online
#[derive(Debug)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
    next_listener_id: AtomicU64,
    push_ids: PushIdGenerator,
}

#[derive(Debug)]
struct MemoryState {
    root: Value,
    listeners: BTreeMap<ListenerId, MemoryListener>,
    rules: MemoryRules,
    online: bool,
    pending_acks: Vec<oneshot::Sender<()>>,
}

#[derive(Debug)]
struct MemoryListener {
    path: Vec<String>,
    event_type: EventType,
    query: QueryOptions,
    sender: Sender<SubscriptionMessage>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::with_rules(MemoryRules::default())
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: MemoryRules) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                root: Value::Null,
                listeners: BTreeMap::new(),
                rules,
                online: true,
                pending_acks: Vec::new(),
            }),
            next_listener_id: AtomicU64::new(1),
            push_ids: PushIdGenerator::new(),
        }
    }

    /// Current data at `path`, without priority metadata.
    pub fn snapshot(&self, path: &str) -> DatabaseResult<Value> {
        let segments = normalize_path(path)?;
        let state = self.lock();
        Ok(get_at_path(&state.root, &segments)
            .map(export_data)
            .unwrap_or(Value::Null))
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Denies reads below `path` from now on and cancels the listeners
    /// that can no longer see their data.
    pub fn revoke_read(&self, path: &str) -> DatabaseResult<()> {
        let segments = normalize_path(path)?;
        let mut state = self.lock();
        state.rules.read_denied.push(segments.clone());

        let revoked: Vec<ListenerId> = state
            .listeners
            .iter()
            .filter(|(_, listener)| is_prefix(&segments, &listener.path))
            .map(|(id, _)| *id)
            .collect();
        for id in revoked {
            if let Some(listener) = state.listeners.remove(&id) {
                let error = permission_denied(format!(
                    "Client no longer has permission to read '/{}'",
                    join_path(&listener.path)
                ));
                let _ = listener
                    .sender
                    .try_send(SubscriptionMessage::Cancelled(error));
                LOGGER.info(format!("{id} cancelled: read access revoked"));
            }
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Applies a batch of writes atomically, dispatches events, and returns
    /// the acknowledgement to wait on when offline.
    fn write(&self, writes: Vec<(Vec<String>, Value)>) -> DatabaseResult<Option<oneshot::Receiver<()>>> {
        let mut state = self.lock();
        if let Some((path, _)) = writes.iter().find(|(path, _)| !state.rules.can_write(path)) {
            return Err(permission_denied(format!(
                "Client doesn't have permission to write '/{}'",
                join_path(path)
            )));
        }

        let old_root = state.root.clone();
        let changed: Vec<Vec<String>> = writes.iter().map(|(path, _)| path.clone()).collect();
        for (path, value) in writes {
            set_at_path(&mut state.root, &path, value);
        }
        state.dispatch(&changed, &old_root);

        if state.online {
            Ok(None)
        } else {
            let (sender, receiver) = oneshot::channel();
            state.pending_acks.push(sender);
            Ok(Some(receiver))
        }
    }

    async fn write_and_wait(&self, writes: Vec<(Vec<String>, Value)>) -> DatabaseResult<()> {
        match self.write(writes)? {
            None => Ok(()),
            Some(ack) => ack
                .await
                .map_err(|_| disconnected("Database was closed before the write was acknowledged")),
        }
    }
}

impl MemoryState {
    fn dispatch(&mut self, changed: &[Vec<String>], old_root: &Value) {
        let mut closed = Vec::new();
        for (id, listener) in &self.listeners {
            if !changed.iter().any(|path| paths_related(&listener.path, path)) {
                continue;
            }
            let old_node = get_at_path(old_root, &listener.path).cloned().unwrap_or(Value::Null);
            let new_node = get_at_path(&self.root, &listener.path)
                .cloned()
                .unwrap_or(Value::Null);
            for event in listener.diff(&old_node, &new_node) {
                if listener
                    .sender
                    .try_send(SubscriptionMessage::Event(event))
                    .is_err()
                {
                    closed.push(*id);
                    break;
                }
            }
        }
        for id in closed {
            self.listeners.remove(&id);
        }
    }
}

impl MemoryListener {
    fn key(&self) -> Option<String> {
        self.path.last().cloned()
    }

    fn value_view(&self, node: &Value) -> Value {
        if self.query.is_default() {
            node.clone()
        } else {
            self.query.window_value(children(node))
        }
    }

    fn value_event(&self, node: &Value) -> DatabaseEvent {
        DatabaseEvent {
            event_type: EventType::Value,
            key: self.key(),
            value: export_data(&self.value_view(node)),
            priority: priority_of(node),
            previous_child_key: None,
        }
    }

    fn initial_events(&self, node: &Value) -> Vec<DatabaseEvent> {
        match self.event_type {
            EventType::Value => vec![self.value_event(node)],
            EventType::ChildAdded => self.diff(&Value::Null, node),
            _ => Vec::new(),
        }
    }

    fn diff(&self, old_node: &Value, new_node: &Value) -> Vec<DatabaseEvent> {
        if self.event_type == EventType::Value {
            if self.value_view(old_node) == self.value_view(new_node) {
                return Vec::new();
            }
            return vec![self.value_event(new_node)];
        }

        let old_window = self.query.apply(children(old_node));
        let new_window = self.query.apply(children(new_node));
        let old_index: BTreeMap<&str, (usize, &Value)> = old_window
            .iter()
            .enumerate()
            .map(|(position, (key, value))| (key.as_str(), (position, value)))
            .collect();
        let new_index: BTreeMap<&str, (usize, &Value)> = new_window
            .iter()
            .enumerate()
            .map(|(position, (key, value))| (key.as_str(), (position, value)))
            .collect();

        let mut events = Vec::new();
        match self.event_type {
            EventType::ChildRemoved => {
                for (position, (key, value)) in old_window.iter().enumerate() {
                    if !new_index.contains_key(key.as_str()) {
                        events.push(child_event(self.event_type, key, value, &old_window, position));
                    }
                }
            }
            EventType::ChildAdded => {
                for (position, (key, value)) in new_window.iter().enumerate() {
                    if !old_index.contains_key(key.as_str()) {
                        events.push(child_event(self.event_type, key, value, &new_window, position));
                    }
                }
            }
            EventType::ChildChanged | EventType::ChildMoved => {
                for (position, (key, value)) in new_window.iter().enumerate() {
                    let Some((old_position, old_value)) = old_index.get(key.as_str()) else {
                        continue;
                    };
                    if *old_value == value {
                        continue;
                    }
                    let moved = predecessor(&old_window, *old_position)
                        != predecessor(&new_window, position);
                    if self.event_type == EventType::ChildChanged || moved {
                        events.push(child_event(self.event_type, key, value, &new_window, position));
                    }
                }
            }
            EventType::Value => {}
        }
        events
    }
}

fn predecessor(window: &[(String, Value)], position: usize) -> Option<&str> {
    position
        .checked_sub(1)
        .and_then(|previous| window.get(previous))
        .map(|(key, _)| key.as_str())
}

fn child_event(
    event_type: EventType,
    key: &str,
    value: &Value,
    window: &[(String, Value)],
    position: usize,
) -> DatabaseEvent {
    DatabaseEvent {
        event_type,
        key: Some(key.to_string()),
        value: export_data(value),
        priority: priority_of(value),
        previous_child_key: predecessor(window, position).map(str::to_string),
    }
}

#[async_trait]
impl DatabaseClient for MemoryDatabase {
    async fn listen(
        &self,
        path: &[String],
        event_type: EventType,
        query: &QueryOptions,
    ) -> DatabaseResult<Subscription> {
        let mut state = self.lock();
        if !state.rules.can_read(path) {
            return Err(permission_denied(format!(
                "Client doesn't have permission to read '/{}'",
                join_path(path)
            )));
        }

        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::SeqCst));
        let (sender, messages) = async_channel::unbounded();
        let listener = MemoryListener {
            path: path.to_vec(),
            event_type,
            query: query.clone(),
            sender,
        };

        let node = get_at_path(&state.root, path).cloned().unwrap_or(Value::Null);
        for event in listener.initial_events(&node) {
            // The receiver is still in hand, so the channel cannot be closed.
            let _ = listener.sender.try_send(SubscriptionMessage::Event(event));
        }
        state.listeners.insert(id, listener);
        LOGGER.debug(format!("{id} attached to '/{}' ({event_type})", join_path(path)));

        Ok(Subscription { id, messages })
    }

    async fn unlisten(&self, id: ListenerId) {
        if self.lock().listeners.remove(&id).is_some() {
            LOGGER.debug(format!("{id} detached"));
        }
    }

    async fn set(&self, path: &[String], value: Value, priority: Value) -> DatabaseResult<()> {
        validate_value(&value)?;
        validate_priority(&priority)?;
        self.write_and_wait(vec![(path.to_vec(), pack_with_priority(value, priority))])
            .await
    }

    async fn update(&self, path: &[String], updates: Map<String, Value>) -> DatabaseResult<()> {
        if updates.is_empty() {
            return Err(invalid_argument("Update requires at least one child"));
        }

        let mut writes: Vec<(Vec<String>, Value)> = Vec::with_capacity(updates.len());
        for (relative, value) in updates {
            let relative_segments = normalize_path(&relative)?;
            if relative_segments.is_empty() {
                return Err(invalid_argument("Update keys cannot name the target itself"));
            }
            validate_value(&value)?;
            let mut absolute = path.to_vec();
            absolute.extend(relative_segments);
            if let Some((other, _)) = writes
                .iter()
                .find(|(other, _)| paths_related(other, &absolute))
            {
                return Err(invalid_argument(format!(
                    "Update paths '/{}' and '/{}' overlap",
                    join_path(other),
                    join_path(&absolute)
                )));
            }
            writes.push((absolute, value));
        }
        self.write_and_wait(writes).await
    }

    async fn push(&self, path: &[String], value: Option<Value>) -> DatabaseResult<String> {
        let key = self.push_ids.next_id();
        if let Some(value) = value {
            let mut child = path.to_vec();
            child.push(key.clone());
            self.set(&child, value, Value::Null).await?;
        }
        Ok(key)
    }

    async fn go_online(&self) -> DatabaseResult<()> {
        let pending = {
            let mut state = self.lock();
            state.online = true;
            std::mem::take(&mut state.pending_acks)
        };
        if !pending.is_empty() {
            LOGGER.info(format!("acknowledging {} queued writes", pending.len()));
        }
        for ack in pending {
            let _ = ack.send(());
        }
        Ok(())
    }

    async fn go_offline(&self) -> DatabaseResult<()> {
        self.lock().online = false;
        Ok(())
    }

    fn is_online(&self) -> bool {
        self.lock().online
    }
}
