//! # MQTT Device Bridge
//!
//! Bridges MQTT topic traffic to a device-management layer: a device
//! registry and measurement/command dispatcher living outside this crate.
//! The bridge owns the topic naming scheme, the subscription lifecycle of
//! one broker session, verbatim routing of inbound messages to an external
//! handler, and outbound delivery of configuration pushes and commands.
//!
//! ## Module Architecture
//!
//! ```text
//! src/
//! ├── config.rs   - TOML-backed configuration surface and defaults
//! ├── error.rs    - error taxonomy
//! ├── topics.rs   - topic scheme (pure functions + suffix constants)
//! ├── device.rs   - device identity and logical-suffix normalization
//! ├── alarm.rs    - fault signaling towards external monitoring
//! ├── handler.rs  - collaborator traits for payload interpretation
//! ├── channel.rs  - narrow publish/subscribe capability + rumqttc impl
//! └── binding.rs  - connection manager, router, outbound dispatcher
//! ```
//!
//! ## Design Philosophy
//!
//! - **Flat subscriptions**: four global wildcard topics cover the whole
//!   fleet, so provisioning devices never touches the subscription set.
//! - **Single session ownership**: the connection manager holds the only
//!   transport handle; everything else works through the narrow
//!   [`MqttChannel`] capability, which keeps the bridge testable against a
//!   fake transport.
//! - **No hidden retries**: connection, subscription and publish failures
//!   surface to the embedding layer, which owns backoff policy.
//! - **Opaque payloads**: the bridge never interprets message bodies;
//!   decoding is the external handler's concern.

pub mod alarm;
pub mod binding;
pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod handler;
pub mod topics;

pub use alarm::{AlarmSink, LogAlarms, SUBSCRIPTION_ALARM};
pub use binding::{device_provisioning_handler, ConnectionState, MqttBinding, PROTOCOL};
pub use channel::{MqttChannel, PublishOptions};
pub use config::{BridgeConfig, MqttConfig, Protocol};
pub use device::{strip_logical_suffix, Device};
pub use error::BridgeError;
pub use handler::{MessageHandler, NotificationBuilder};
