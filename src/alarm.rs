//! Fault signaling towards an external monitoring collaborator.

use crate::error::BridgeError;
use tracing::{error, info};

/// Alarm id raised when the global subscriptions are rejected.
pub const SUBSCRIPTION_ALARM: &str = "MQTTB-ALARM";

/// Sink for named fault conditions.
///
/// Deployments wire this into their monitoring stack; [`LogAlarms`] is the
/// fallback that only writes to the log.
pub trait AlarmSink: Send + Sync {
    /// Signals that the fault identified by `id` is active.
    fn raise(&self, id: &str, error: &BridgeError);

    /// Signals that the fault identified by `id` is gone.
    fn release(&self, id: &str);
}

/// Alarm sink that reports through `tracing` only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlarms;

impl AlarmSink for LogAlarms {
    fn raise(&self, id: &str, error: &BridgeError) {
        error!("alarm {} raised: {}", id, error);
    }

    fn release(&self, id: &str) {
        info!("alarm {} released", id);
    }
}
