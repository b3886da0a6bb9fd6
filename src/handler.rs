//! Collaborator interfaces for payload interpretation.
//!
//! The bridge never looks inside a payload. Inbound traffic goes verbatim
//! to a [`MessageHandler`]; outbound configuration pushes are shaped by a
//! [`NotificationBuilder`]. Both are supplied by the device-management
//! layer that embeds the bridge.

use serde_json::Value;

/// Consumer of every inbound transport message.
///
/// Extracting the apiKey and device id from the topic and decoding the
/// payload is the handler's job, not the bridge's.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, topic: &str, payload: &[u8]);
}

impl<F> MessageHandler for F
where
    F: Fn(&str, &[u8]) + Send + Sync,
{
    fn handle(&self, topic: &str, payload: &[u8]) {
        self(topic, payload)
    }
}

/// Maps a context-broker result to the configuration notification pushed
/// to a device. The bridge serializes the output and never inspects it.
pub trait NotificationBuilder: Send + Sync {
    fn build(&self, context_result: &Value) -> Value;
}

impl<F> NotificationBuilder for F
where
    F: Fn(&Value) -> Value + Send + Sync,
{
    fn build(&self, context_result: &Value) -> Value {
        self(context_result)
    }
}
