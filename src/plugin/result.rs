use std::fmt;

use async_channel::{Receiver, Sender};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Ok,
    Error,
}

/// A result routed back to the command that produced it.
///
/// `keep_callback` tells the host the callback stays registered because more
/// results will follow (listener events).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginResult {
    pub status: CommandStatus,
    pub message: Value,
    pub keep_callback: bool,
}

impl PluginResult {
    pub fn ok(message: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message,
            keep_callback: false,
        }
    }

    pub fn error(message: Value) -> Self {
        Self {
            status: CommandStatus::Error,
            message,
            keep_callback: false,
        }
    }

    pub fn keep_callback(mut self, keep: bool) -> Self {
        self.keep_callback = keep;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == CommandStatus::Ok
    }
}

/// The host side of the bridge: delivers results to JavaScript callbacks.
pub trait CallbackChannel: Send + Sync {
    fn send(&self, callback_id: &str, result: PluginResult);
}

impl<F> CallbackChannel for F
where
    F: Fn(&str, PluginResult) + Send + Sync,
{
    fn send(&self, callback_id: &str, result: PluginResult) {
        self(callback_id, result)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackMessage {
    pub callback_id: String,
    pub result: PluginResult,
}

/// A [`CallbackChannel`] that queues results for the host to drain from its
/// own thread (for example the WebView's UI thread).
#[derive(Clone)]
pub struct ChannelCallback {
    sender: Sender<CallbackMessage>,
}

impl fmt::Debug for ChannelCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCallback")
            .field("queued", &self.sender.len())
            .finish()
    }
}

impl ChannelCallback {
    pub fn new() -> (Self, Receiver<CallbackMessage>) {
        let (sender, receiver) = async_channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl CallbackChannel for ChannelCallback {
    fn send(&self, callback_id: &str, result: PluginResult) {
        // A dropped receiver means the host went away; results have nowhere to go.
        let _ = self.sender.try_send(CallbackMessage {
            callback_id: callback_id.to_string(),
            result,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn results_serialize_for_the_host() {
        let result = PluginResult::ok(json!({ "value": 1 })).keep_callback(true);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "status": "ok", "message": { "value": 1 }, "keepCallback": true })
        );
    }

    #[test]
    fn channel_callback_queues_messages() {
        let (channel, receiver) = ChannelCallback::new();
        channel.send("cb-1", PluginResult::error(json!("boom")));
        let message = receiver.try_recv().unwrap();
        assert_eq!(message.callback_id, "cb-1");
        assert!(!message.result.is_ok());
    }

    #[test]
    fn closures_act_as_channels() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let channel = move |id: &str, result: PluginResult| {
            captured.lock().unwrap().push((id.to_string(), result));
        };
        channel.send("cb-2", PluginResult::ok(Value::Null));
        assert_eq!(seen.lock().unwrap()[0].0, "cb-2");
    }
}
