use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_lock::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::database::{join_path, EventType, ListenerId};

/// Key under which a listener is registered: the client-supplied listener id
/// when there is one, otherwise `"<path>#<event type>"`.
pub fn listener_key(path: &[String], event_type: EventType, listener_id: Option<&str>) -> String {
    match listener_id {
        Some(id) => id.to_string(),
        None => format!("{}#{}", join_path(path), event_type),
    }
}

/// Open/closed switch every delivery for one subscription passes through.
///
/// Once [`close`](DeliveryGate::close) returns, no delivery runs again.
#[derive(Debug)]
pub struct DeliveryGate {
    open: Mutex<bool>,
}

impl DeliveryGate {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(true),
        }
    }

    /// Runs `deliver` if the gate is still open. Returns whether it ran.
    pub fn deliver<F: FnOnce()>(&self, deliver: F) -> bool {
        let open = self.open.lock().unwrap_or_else(|poison| poison.into_inner());
        if *open {
            deliver();
        }
        *open
    }

    /// Runs `last` and closes the gate, unless it was already closed.
    /// Returns whether `last` ran.
    pub fn finish<F: FnOnce()>(&self, last: F) -> bool {
        let mut open = self.open.lock().unwrap_or_else(|poison| poison.into_inner());
        if *open {
            last();
            *open = false;
            return true;
        }
        false
    }

    pub fn close(&self) {
        *self.open.lock().unwrap_or_else(|poison| poison.into_inner()) = false;
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Default for DeliveryGate {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered listener.
#[derive(Debug, Clone)]
pub struct ListenerEntry {
    pub path: Vec<String>,
    pub event_type: EventType,
    pub listener_id: ListenerId,
    pub callback_id: String,
    pub gate: Arc<DeliveryGate>,
    generation: u64,
}

impl ListenerEntry {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// The listener table, reachable only through [`ListenerRegistry::lock`].
#[derive(Debug, Default)]
pub struct ListenerTable {
    entries: HashMap<String, ListenerEntry>,
}

impl ListenerTable {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&ListenerEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores `entry` under `key`, returning the entry it replaced.
    pub fn register(&mut self, key: String, entry: ListenerEntry) -> Option<ListenerEntry> {
        self.entries.insert(key, entry)
    }

    pub fn unregister(&mut self, key: &str) -> Option<ListenerEntry> {
        self.entries.remove(key)
    }

    /// Removes `key` only if it still holds the given registration, so a
    /// stale subscription cannot evict the listener that replaced it.
    pub fn unregister_generation(&mut self, key: &str, generation: u64) -> Option<ListenerEntry> {
        match self.entries.get(key) {
            Some(entry) if entry.generation == generation => self.entries.remove(key),
            _ => None,
        }
    }

    /// Keys of every listener registered on exactly `path`.
    pub fn keys_for_path(&self, path: &[String]) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.path == path)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Instance-owned map from listener key to subscription.
///
/// All mutation goes through one async mutex. Callers hold the guard across
/// the database call that attaches or detaches the listener, so registering
/// and removing the same key never interleave.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    table: AsyncMutex<ListenerTable>,
    next_generation: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> AsyncMutexGuard<'_, ListenerTable> {
        self.table.lock().await
    }

    pub fn new_entry(
        &self,
        path: Vec<String>,
        event_type: EventType,
        listener_id: ListenerId,
        callback_id: String,
    ) -> ListenerEntry {
        ListenerEntry {
            path,
            event_type,
            listener_id,
            callback_id,
            gate: Arc::new(DeliveryGate::new()),
            generation: self.next_generation.fetch_add(1, Ordering::SeqCst),
        }
    }

    pub async fn len(&self) -> usize {
        self.lock().await.len()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.lock().await.contains(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.lock().await.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn path(raw: &str) -> Vec<String> {
        crate::database::normalize_path(raw).unwrap()
    }

    #[test]
    fn derived_keys_combine_path_and_event() {
        assert_eq!(
            listener_key(&path("/rooms/one/"), EventType::ChildAdded, None),
            "rooms/one#child_added"
        );
        assert_eq!(listener_key(&path(""), EventType::Value, None), "#value");
        assert_eq!(
            listener_key(&path("rooms"), EventType::Value, Some("uid-7")),
            "uid-7"
        );
    }

    #[test]
    fn register_returns_replaced_entry() {
        let registry = ListenerRegistry::new();
        let first = registry.new_entry(path("a"), EventType::Value, ListenerId(1), "cb1".into());
        let second = registry.new_entry(path("a"), EventType::Value, ListenerId(2), "cb2".into());

        block_on(async {
            let mut table = registry.lock().await;
            assert!(table.register("a#value".into(), first).is_none());
            let replaced = table.register("a#value".into(), second).unwrap();
            assert_eq!(replaced.listener_id, ListenerId(1));
            assert_eq!(table.len(), 1);
        });
    }

    #[test]
    fn stale_generation_does_not_evict_replacement() {
        let registry = ListenerRegistry::new();
        let first = registry.new_entry(path("a"), EventType::Value, ListenerId(1), "cb".into());
        let stale_generation = first.generation();
        let second = registry.new_entry(path("a"), EventType::Value, ListenerId(2), "cb".into());

        block_on(async {
            let mut table = registry.lock().await;
            table.register("k".into(), first);
            table.register("k".into(), second);
            assert!(table.unregister_generation("k", stale_generation).is_none());
            assert!(table.contains("k"));
        });
    }

    #[test]
    fn keys_for_path_matches_exact_path_only() {
        let registry = ListenerRegistry::new();
        block_on(async {
            let mut table = registry.lock().await;
            for (key, raw, event) in [
                ("a#value", "a", EventType::Value),
                ("a#child_added", "a", EventType::ChildAdded),
                ("a/b#value", "a/b", EventType::Value),
            ] {
                let entry = registry.new_entry(path(raw), event, ListenerId(0), "cb".into());
                table.register(key.into(), entry);
            }
            assert_eq!(table.keys_for_path(&path("a")), vec!["a#child_added", "a#value"]);
        });
    }

    #[test]
    fn closed_gate_skips_delivery() {
        let gate = DeliveryGate::new();
        let mut delivered = 0;
        assert!(gate.deliver(|| delivered += 1));
        gate.close();
        assert!(!gate.deliver(|| delivered += 1));
        assert_eq!(delivered, 1);
        assert!(!gate.is_open());
    }

    #[test]
    fn finish_runs_once_and_closes() {
        let gate = DeliveryGate::new();
        let mut finals = 0;
        assert!(gate.finish(|| finals += 1));
        assert!(!gate.finish(|| finals += 1));
        assert!(!gate.deliver(|| finals += 10));
        assert_eq!(finals, 1);
    }
}
