//! Test doubles shared by the crate's unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::database::{
    DatabaseClient, DatabaseResult, EventType, ListenerId, MemoryDatabase, QueryOptions,
    Subscription,
};
use crate::plugin::{CallbackChannel, PluginResult};

/// Records every result sent to the host, in order.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    results: Mutex<Vec<(String, PluginResult)>>,
}

impl RecordingChannel {
    pub fn results(&self) -> Vec<(String, PluginResult)> {
        self.results.lock().unwrap().clone()
    }

    /// Polls until `done` accepts the recorded results, failing the test
    /// after two seconds.
    pub async fn wait_for<F>(&self, done: F) -> Vec<(String, PluginResult)>
    where
        F: Fn(&[(String, PluginResult)]) -> bool,
    {
        for _ in 0..200 {
            let results = self.results();
            if done(&results) {
                return results;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for results: {:?}", self.results());
    }
}

impl CallbackChannel for RecordingChannel {
    fn send(&self, callback_id: &str, result: PluginResult) {
        self.results
            .lock()
            .unwrap()
            .push((callback_id.to_string(), result));
    }
}

/// A [`MemoryDatabase`] that counts how often each client method is called.
#[derive(Debug, Default)]
pub struct CountingClient {
    inner: MemoryDatabase,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl CountingClient {
    pub fn new(inner: MemoryDatabase) -> Self {
        Self {
            inner,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &MemoryDatabase {
        &self.inner
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn record(&self, method: &'static str) {
        *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
    }
}

#[async_trait]
impl DatabaseClient for CountingClient {
    async fn listen(
        &self,
        path: &[String],
        event_type: EventType,
        query: &QueryOptions,
    ) -> DatabaseResult<Subscription> {
        self.record("listen");
        self.inner.listen(path, event_type, query).await
    }

    async fn unlisten(&self, id: ListenerId) {
        self.record("unlisten");
        self.inner.unlisten(id).await
    }

    async fn set(&self, path: &[String], value: Value, priority: Value) -> DatabaseResult<()> {
        self.record("set");
        self.inner.set(path, value, priority).await
    }

    async fn update(&self, path: &[String], updates: Map<String, Value>) -> DatabaseResult<()> {
        self.record("update");
        self.inner.update(path, updates).await
    }

    async fn push(&self, path: &[String], value: Option<Value>) -> DatabaseResult<String> {
        self.record("push");
        self.inner.push(path, value).await
    }

    async fn go_online(&self) -> DatabaseResult<()> {
        self.record("go_online");
        self.inner.go_online().await
    }

    async fn go_offline(&self) -> DatabaseResult<()> {
        self.record("go_offline");
        self.inner.go_offline().await
    }

    fn is_online(&self) -> bool {
        self.inner.is_online()
    }
}
