//! Error definitions for the bridge.

use thiserror::Error;

/// Error types surfaced by the MQTT bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The transport session could not be established or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// The broker rejected one of the global subscriptions.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// A publish was not accepted by the transport.
    #[error("publish error: {0}")]
    Publish(String),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A configuration notification could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// An operation that needs a live session ran before `start`.
    #[error("bridge is not connected")]
    NotConnected,
}
