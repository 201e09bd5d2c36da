use std::fmt;
use std::sync::{Arc, LazyLock};

use async_channel::Receiver;
use serde_json::{json, Value};

use crate::database::{
    join_path, normalize_path, DatabaseClient, DatabaseEvent, EventType, QueryOptions,
    SubscriptionMessage,
};
use crate::logger::{self, Logger};
use crate::platform::runtime::spawn_detached;
use crate::plugin::command::{Action, Command};
use crate::plugin::error::{already_exists, invalid_arguments, not_found, CommandOutcome, PluginError};
use crate::plugin::registry::{
    listener_key, DeliveryGate, ListenerEntry, ListenerRegistry, ListenerTable,
};
use crate::plugin::result::{CallbackChannel, PluginResult};
use crate::plugin::settings::{DuplicateListenerPolicy, PluginSettings, UnknownListenerPolicy};

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase/database-plugin"));

/// Routes host commands to a [`DatabaseClient`] and keeps track of the
/// listeners they register.
///
/// Cloning is cheap; clones share the client, callback channel and registry.
#[derive(Clone)]
pub struct FirebaseDatabasePlugin {
    inner: Arc<PluginInner>,
}

struct PluginInner {
    client: Arc<dyn DatabaseClient>,
    channel: Arc<dyn CallbackChannel>,
    registry: Arc<ListenerRegistry>,
    settings: PluginSettings,
}

impl fmt::Debug for FirebaseDatabasePlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseDatabasePlugin")
            .field("client", &"dynamic")
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl FirebaseDatabasePlugin {
    pub fn new(client: Arc<dyn DatabaseClient>, channel: Arc<dyn CallbackChannel>) -> Self {
        Self::with_settings(client, channel, PluginSettings::default())
    }

    pub fn with_settings(
        client: Arc<dyn DatabaseClient>,
        channel: Arc<dyn CallbackChannel>,
        settings: PluginSettings,
    ) -> Self {
        if let Some(level) = settings.log_level {
            logger::set_log_level(level);
        }
        Self {
            inner: Arc::new(PluginInner {
                client,
                channel,
                registry: Arc::new(ListenerRegistry::new()),
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.inner.settings
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.inner.registry
    }

    /// Starts `command` in the background and returns immediately.
    ///
    /// Returns `false` (after reporting the failure to the command's
    /// callback) when no runtime is available to run it.
    pub fn execute(&self, command: Command) -> bool {
        let plugin = self.clone();
        let callback_id = command.callback_id.clone();
        let spawned = spawn_detached(async move {
            plugin.handle(command).await;
        });
        if !spawned {
            LOGGER.error("no async runtime available to run commands");
            let err = crate::database::error::internal_error("No async runtime available");
            self.inner
                .channel
                .send(&callback_id, PluginResult::error(PluginError::from(err).to_json()));
        }
        spawned
    }

    /// Runs `command` to completion and reports its outcome through the
    /// callback channel.
    ///
    /// Listener events keep arriving on the channel after this returns.
    pub async fn handle(&self, command: Command) {
        let target = command.args.first().and_then(Value::as_str).unwrap_or("-");
        LOGGER.debug(format!(
            "{} '{target}' (callback {})",
            command.action, command.callback_id
        ));

        let outcome = match command.action.parse::<Action>() {
            Ok(Action::On) => self.on(&command).await.map(|()| None),
            Ok(Action::Off) => self.off(&command).await.map(Some),
            Ok(Action::Push) => self.push(&command).await.map(Some),
            Ok(Action::Set) => self.set(&command).await.map(Some),
            Ok(Action::Update) => self.update(&command).await.map(Some),
            Ok(Action::SetOnline) => self.set_online(&command).await.map(Some),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(Some(message)) => self
                .inner
                .channel
                .send(&command.callback_id, PluginResult::ok(message)),
            Ok(None) => {}
            Err(err) => {
                LOGGER.warn(format!("{} failed: {err}", command.action));
                self.inner
                    .channel
                    .send(&command.callback_id, PluginResult::error(err.to_json()));
            }
        }
    }

    /// `on(path, eventType, query?, listenerId?)`
    ///
    /// Attaches a listener and streams its events to the command's callback
    /// with `keep_callback` set. Nothing is sent on success besides events.
    pub async fn on(&self, command: &Command) -> CommandOutcome<()> {
        let args = command.arguments();
        args.expect_at_most(4)?;
        let path = parse_path(args.string(0, "path")?)?;
        let event_type: EventType = args
            .string(1, "eventType")?
            .parse()
            .map_err(|err: crate::database::DatabaseError| invalid_arguments(err.message()))?;
        let query = match args.optional_value(2) {
            Some(raw) => {
                QueryOptions::from_json(raw).map_err(|err| invalid_arguments(err.message()))?
            }
            None => QueryOptions::default(),
        };
        let listener_id = parse_listener_id(args.optional_string(3, "listenerId")?)?;
        let key = listener_key(&path, event_type, listener_id);

        let mut table = self.inner.registry.lock().await;
        if table.contains(&key)
            && self.inner.settings.duplicate_listener == DuplicateListenerPolicy::Reject
        {
            return Err(already_exists(format!(
                "A listener is already registered as '{key}'"
            )));
        }

        let subscription = self.inner.client.listen(&path, event_type, &query).await?;
        let entry = self.inner.registry.new_entry(
            path,
            event_type,
            subscription.id,
            command.callback_id.clone(),
        );
        let gate = Arc::clone(&entry.gate);
        let generation = entry.generation();

        if let Some(previous) = table.register(key.clone(), entry) {
            if previous.callback_id == command.callback_id {
                previous.gate.close();
            } else {
                self.release(&previous);
            }
            self.inner.client.unlisten(previous.listener_id).await;
            LOGGER.info(format!("replaced listener '{key}'"));
        } else {
            LOGGER.info(format!("registered listener '{key}'"));
        }
        drop(table);

        let forward = forward_events(
            subscription.messages,
            gate,
            Arc::clone(&self.inner.channel),
            Arc::clone(&self.inner.registry),
            command.callback_id.clone(),
            key,
            generation,
        );
        if !spawn_detached(forward) {
            LOGGER.error("no async runtime available to deliver listener events");
        }
        Ok(())
    }

    /// `off(path, eventType?, listenerId?)`
    ///
    /// Detaches the matching listener, or every listener on `path` when
    /// neither an event type nor a listener id is given. A listener id only
    /// matches a listener registered on `path` (and for `eventType`, when
    /// given). Resolves with the number of listeners removed.
    pub async fn off(&self, command: &Command) -> CommandOutcome<Value> {
        let args = command.arguments();
        args.expect_at_most(3)?;
        let path = parse_path(args.string(0, "path")?)?;
        let event_type = match args.optional_string(1, "eventType")? {
            Some(raw) => Some(
                raw.parse::<EventType>()
                    .map_err(|err| invalid_arguments(err.message()))?,
            ),
            None => None,
        };
        let listener_id = parse_listener_id(args.optional_string(2, "listenerId")?)?;

        let mut table = self.inner.registry.lock().await;
        let (target, keys) = match (listener_id, event_type) {
            (Some(id), _) => {
                let matches = table.get(id).is_some_and(|entry| {
                    entry.path == path && event_type.map_or(true, |kind| entry.event_type == kind)
                });
                let keys = if matches { vec![id.to_string()] } else { Vec::new() };
                (id.to_string(), keys)
            }
            (None, Some(event_type)) => {
                let key = listener_key(&path, event_type, None);
                (key.clone(), vec![key])
            }
            (None, None) => (join_path(&path), table.keys_for_path(&path)),
        };

        let removed = self.detach(&mut table, &keys).await;
        drop(table);

        if removed == 0 && self.inner.settings.unknown_listener == UnknownListenerPolicy::Report {
            return Err(not_found(format!("No listener registered for '{target}'")));
        }
        Ok(json!(removed))
    }

    /// `push(path, value?)` resolves with the generated child key.
    pub async fn push(&self, command: &Command) -> CommandOutcome<Value> {
        let args = command.arguments();
        args.expect_at_most(2)?;
        let path = parse_path(args.string(0, "path")?)?;
        let value = args.optional_value(1).cloned();

        let key = self.inner.client.push(&path, value).await?;
        Ok(Value::String(key))
    }

    /// `set(path, value, priority?)`; a `null` value deletes.
    pub async fn set(&self, command: &Command) -> CommandOutcome<Value> {
        let args = command.arguments();
        args.expect_at_most(3)?;
        let path = parse_path(args.string(0, "path")?)?;
        let value = args.value(1, "value")?.clone();
        let priority = match args.optional_value(2) {
            None => Value::Null,
            Some(priority @ (Value::Number(_) | Value::String(_))) => priority.clone(),
            Some(_) => {
                return Err(invalid_arguments(
                    "'set' argument 2 (priority) must be a string, number or null",
                ))
            }
        };

        self.inner.client.set(&path, value, priority).await?;
        Ok(Value::Null)
    }

    /// `update(path, values)` merges `values` into the data at `path`.
    pub async fn update(&self, command: &Command) -> CommandOutcome<Value> {
        let args = command.arguments();
        args.expect_at_most(2)?;
        let path = parse_path(args.string(0, "path")?)?;
        let updates = args.object(1, "values")?;
        if updates.is_empty() {
            return Err(invalid_arguments("'update' argument 1 (values) cannot be empty"));
        }

        self.inner.client.update(&path, updates.clone()).await?;
        Ok(Value::Null)
    }

    /// `setOnline(enabled)`
    pub async fn set_online(&self, command: &Command) -> CommandOutcome<Value> {
        let args = command.arguments();
        args.expect_at_most(1)?;
        let enabled = args.bool(0, "enabled")?;

        if enabled {
            self.inner.client.go_online().await?;
        } else {
            self.inner.client.go_offline().await?;
        }
        LOGGER.info(format!("database {}", if enabled { "online" } else { "offline" }));
        Ok(Value::Null)
    }

    /// Detaches every listener, e.g. when the host reloads its page.
    pub async fn reset(&self) -> usize {
        let mut table = self.inner.registry.lock().await;
        let keys = table.keys();
        let removed = self.detach(&mut table, &keys).await;
        if removed > 0 {
            LOGGER.info(format!("reset removed {removed} listeners"));
        }
        removed
    }

    async fn detach(&self, table: &mut ListenerTable, keys: &[String]) -> usize {
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = table.unregister(key) {
                self.release(&entry);
                self.inner.client.unlisten(entry.listener_id).await;
                LOGGER.info(format!("removed listener '{key}'"));
                removed += 1;
            }
        }
        removed
    }

    /// Ends a listener's callback on the host with a final `null` result, so
    /// the host can drop it. Nothing is delivered for it afterwards.
    fn release(&self, entry: &ListenerEntry) {
        entry.gate.finish(|| {
            self.inner
                .channel
                .send(&entry.callback_id, PluginResult::ok(Value::Null))
        });
    }
}

fn parse_path(raw: &str) -> CommandOutcome<Vec<String>> {
    normalize_path(raw).map_err(|err| invalid_arguments(err.message()))
}

fn parse_listener_id(raw: Option<&str>) -> CommandOutcome<Option<&str>> {
    match raw {
        Some("") => Err(invalid_arguments("listenerId cannot be empty")),
        other => Ok(other),
    }
}

/// Pumps one subscription's messages into the host callback until the
/// subscription ends or its gate closes.
async fn forward_events(
    messages: Receiver<SubscriptionMessage>,
    gate: Arc<DeliveryGate>,
    channel: Arc<dyn CallbackChannel>,
    registry: Arc<ListenerRegistry>,
    callback_id: String,
    key: String,
    generation: u64,
) {
    while let Ok(message) = messages.recv().await {
        match message {
            SubscriptionMessage::Event(event) => {
                let Some(payload) = event_payload(&event) else {
                    continue;
                };
                let result = PluginResult::ok(payload).keep_callback(true);
                if !gate.deliver(|| channel.send(&callback_id, result)) {
                    break;
                }
            }
            SubscriptionMessage::Cancelled(error) => {
                registry
                    .lock()
                    .await
                    .unregister_generation(&key, generation);
                LOGGER.warn(format!("listener '{key}' cancelled: {error}"));
                let failure = PluginError::from(error).to_json();
                gate.finish(|| channel.send(&callback_id, PluginResult::error(failure)));
                break;
            }
        }
    }
}

fn event_payload(event: &DatabaseEvent) -> Option<Value> {
    match serde_json::to_value(event) {
        Ok(payload) => Some(payload),
        Err(err) => {
            LOGGER.warn(format!("dropping unserializable event: {err}"));
            None
        }
    }
}
