//! Connection manager, message router and outbound dispatcher.
//!
//! One [`MqttBinding`] owns one broker session. It drives the connect and
//! subscribe handshake, forwards every inbound publish to the external
//! message handler, and publishes configuration pushes and commands for the
//! registry layer. The session lifecycle is observable through a watch
//! channel:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Subscribing -> Ready
//! Ready -> Unsubscribing -> Disconnected        (stop)
//! any state -> Disconnected                     (fatal transport error)
//! ```
//!
//! There is no retry anywhere in here. A failed `start` leaves the binding
//! disconnected and callable again; backoff policy belongs to whoever
//! embeds the bridge.

use crate::alarm::{AlarmSink, SUBSCRIPTION_ALARM};
use crate::channel::{transport_config, ClientChannel, MqttChannel, PublishOptions};
use crate::config::MqttConfig;
use crate::device::Device;
use crate::error::BridgeError;
use crate::handler::{MessageHandler, NotificationBuilder};
use crate::topics;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, NetworkOptions, Packet, QoS, SubscribeFilter,
    SubscribeReasonCode,
};
use serde_json::Value;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Protocol name this binding answers to in the registry.
pub const PROTOCOL: &str = "MQTT";

/// Keepalive is disabled; the broker sees traffic only when devices talk.
const KEEP_ALIVE: Duration = Duration::ZERO;
/// Connect timeout, one hour.
const CONNECT_TIMEOUT_SECS: u64 = 3600;
/// QoS used for the global subscriptions.
const SUBSCRIBE_QOS: QoS = QoS::AtMostOnce;
/// Request queue depth towards the rumqttc event loop.
const CHANNEL_CAPACITY: usize = 32;

/// Lifecycle of the single broker session.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Subscribing,
    Ready,
    Unsubscribing,
}

/// Everything tied to one live broker session.
struct Session {
    channel: Arc<dyn MqttChannel>,
    cancel: CancellationToken,
    driver: JoinHandle<()>,
}

/// MQTT binding towards a fleet of devices.
pub struct MqttBinding {
    config: MqttConfig,
    handler: Arc<dyn MessageHandler>,
    notifier: Arc<dyn NotificationBuilder>,
    alarms: Arc<dyn AlarmSink>,
    state: Arc<watch::Sender<ConnectionState>>,
    session: Mutex<Option<Session>>,
}

impl MqttBinding {
    pub fn new(
        config: MqttConfig,
        handler: Arc<dyn MessageHandler>,
        notifier: Arc<dyn NotificationBuilder>,
        alarms: Arc<dyn AlarmSink>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            handler,
            notifier,
            alarms,
            state: Arc::new(state),
            session: Mutex::new(None),
        }
    }

    /// Observer for the session lifecycle.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Opens the broker session and subscribes to the global topics.
    ///
    /// Resolves once the broker has acknowledged the connection and all
    /// four subscriptions, or with the first error.
    pub async fn start(&self) -> Result<(), BridgeError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Err(BridgeError::Connection(
                "bridge is already started".to_string(),
            ));
        }
        self.config.validate()?;
        let options = connection_options(&self.config)?;

        self.state.send_replace(ConnectionState::Connecting);
        let (client, mut event_loop) = AsyncClient::new(options, CHANNEL_CAPACITY);
        let mut network_options = NetworkOptions::new();
        network_options.set_connection_timeout(CONNECT_TIMEOUT_SECS);
        event_loop.set_network_options(network_options);

        let channel: Arc<dyn MqttChannel> = Arc::new(ClientChannel::new(client));
        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        let driver = tokio::spawn(drive_session(
            event_loop,
            channel.clone(),
            self.handler.clone(),
            self.alarms.clone(),
            self.state.clone(),
            cancel.clone(),
            ready_tx,
        ));
        *session = Some(Session {
            channel,
            cancel,
            driver,
        });
        drop(session);

        match ready_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.teardown().await;
                Err(e)
            }
            // Driver went away without reporting, e.g. stop() mid-start.
            Err(_) => {
                self.teardown().await;
                Err(BridgeError::Connection(
                    "session closed before it became ready".to_string(),
                ))
            }
        }
    }

    /// Unsubscribes from the global topics and closes the session.
    ///
    /// Unsubscribe failures are logged and never abort the shutdown.
    /// Calling this on a binding that never started is a no-op.
    pub async fn stop(&self) -> Result<(), BridgeError> {
        let taken = self.session.lock().await.take();
        let Some(session) = taken else {
            self.state.send_replace(ConnectionState::Disconnected);
            return Ok(());
        };

        self.state.send_replace(ConnectionState::Unsubscribing);
        for topic in topics::global_topics() {
            if let Err(e) = session.channel.unsubscribe(&topic).await {
                warn!("failed to unsubscribe from {}: {}", topic, e);
            }
        }
        if let Err(e) = session.channel.disconnect().await {
            debug!("disconnect on closing session: {}", e);
        }

        session.cancel.cancel();
        session.driver.abort();
        let _ = session.driver.await;
        self.state.send_replace(ConnectionState::Disconnected);
        info!("MQTT binding stopped");
        Ok(())
    }

    /// Pushes requested configuration values down to a device.
    ///
    /// The context-broker result is mapped through the external
    /// notification builder and the publish result is returned to the
    /// caller unchanged.
    pub async fn send_configuration(
        &self,
        api_key: &str,
        device_id: &str,
        context_result: &Value,
    ) -> Result<(), BridgeError> {
        let channel = self.channel().await?;
        let notification = self.notifier.build(context_result);
        let payload = serde_json::to_vec(&notification)?;
        let topic = topics::config_response_topic(api_key, device_id);
        debug!("sending requested configuration to device on {}", topic);
        channel
            .publish(&topic, publish_options(&self.config), payload)
            .await
    }

    /// Publishes an already-serialized command payload to a device.
    ///
    /// The logical suffix is stripped from the device id before
    /// addressing. The publish is fire-and-forget: transport errors are
    /// logged but not returned, unlike [`MqttBinding::send_configuration`].
    pub async fn send_command(
        &self,
        api_key: &str,
        device: &Device,
        serialized_payload: &str,
    ) -> Result<(), BridgeError> {
        let channel = self.channel().await?;
        let topic = topics::command_topic(api_key, device.physical_id());
        debug!("sending command to device on {}", topic);
        let payload = serialized_payload.as_bytes().to_vec();
        if let Err(e) = channel
            .publish(&topic, publish_options(&self.config), payload)
            .await
        {
            warn!("command publish to {} failed: {}", topic, e);
        }
        Ok(())
    }

    async fn channel(&self) -> Result<Arc<dyn MqttChannel>, BridgeError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.channel.clone())
            .ok_or(BridgeError::NotConnected)
    }

    async fn teardown(&self) {
        let taken = self.session.lock().await.take();
        let Some(session) = taken else { return };
        session.cancel.cancel();
        session.driver.abort();
        let _ = session.driver.await;
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

/// Provisioning hook invoked by the registry. This transport needs no
/// per-device setup, so the device passes through unchanged.
pub fn device_provisioning_handler(device: Device) -> Result<Device, BridgeError> {
    Ok(device)
}

/// Builds the per-connection transport options from configuration.
fn connection_options(config: &MqttConfig) -> Result<MqttOptions, BridgeError> {
    let mut options = MqttOptions::new(
        config.client_id.clone(),
        config.host.clone(),
        config.port,
    );
    options.set_keep_alive(KEEP_ALIVE);
    options.set_transport(transport_config(config)?);
    if let Some(username) = &config.username {
        options.set_credentials(
            username.clone(),
            config.password.clone().unwrap_or_default(),
        );
    }
    Ok(options)
}

/// Builds the outbound publish options from configuration.
///
/// `qos` is carried only when configured to a non-zero level, `retain`
/// only when configured exactly `true`. Anything else leaves the field
/// absent so the transport's own defaults apply.
fn publish_options(config: &MqttConfig) -> PublishOptions {
    PublishOptions {
        qos: match config.qos {
            Some(1) => Some(QoS::AtLeastOnce),
            Some(2) => Some(QoS::ExactlyOnce),
            _ => None,
        },
        retain: config.retain.filter(|retain| *retain),
    }
}

/// Drives the rumqttc event loop for one session until cancellation or the
/// first fatal error.
async fn drive_session(
    mut event_loop: EventLoop,
    channel: Arc<dyn MqttChannel>,
    handler: Arc<dyn MessageHandler>,
    alarms: Arc<dyn AlarmSink>,
    state: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
    ready: oneshot::Sender<Result<(), BridgeError>>,
) {
    let mut ready = Some(ready);
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = event_loop.poll() => event,
        };
        let flow = handle_event(
            event,
            channel.as_ref(),
            handler.as_ref(),
            alarms.as_ref(),
            &state,
            &mut ready,
        )
        .await;
        if flow.is_break() {
            break;
        }
    }
    state.send_replace(ConnectionState::Disconnected);
}

/// Reacts to one transport event: connect acknowledgment, subscribe
/// acknowledgment, inbound publish or fatal error.
async fn handle_event(
    event: Result<Event, rumqttc::ConnectionError>,
    channel: &dyn MqttChannel,
    handler: &dyn MessageHandler,
    alarms: &dyn AlarmSink,
    state: &watch::Sender<ConnectionState>,
    ready: &mut Option<oneshot::Sender<Result<(), BridgeError>>>,
) -> ControlFlow<()> {
    match event {
        Ok(Event::Incoming(Packet::ConnAck(_))) => {
            info!("MQTT client connected");
            state.send_replace(ConnectionState::Connected);
            if let Err(e) = recreate_subscriptions(channel, state).await {
                alarms.raise(SUBSCRIPTION_ALARM, &e);
                error!("error subscribing to global topics: {}", e);
                report(ready, Err(e));
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }
        Ok(Event::Incoming(Packet::SubAck(ack))) => {
            let rejected = ack
                .return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure));
            if rejected {
                let e = BridgeError::Subscription(
                    "broker rejected a global topic".to_string(),
                );
                alarms.raise(SUBSCRIPTION_ALARM, &e);
                error!("error subscribing to global topics: {}", e);
                report(ready, Err(e));
                return ControlFlow::Break(());
            }
            alarms.release(SUBSCRIPTION_ALARM);
            debug!("successfully subscribed to the global topics");
            state.send_replace(ConnectionState::Ready);
            report(ready, Ok(()));
            ControlFlow::Continue(())
        }
        Ok(Event::Incoming(Packet::Publish(publish))) => {
            handler.handle(&publish.topic, &publish.payload);
            ControlFlow::Continue(())
        }
        Ok(_) => ControlFlow::Continue(()),
        Err(e) => {
            let e = BridgeError::Connection(e.to_string());
            match ready.take() {
                Some(tx) => {
                    let _ = tx.send(Err(e));
                }
                None => error!("MQTT session lost: {}", e),
            }
            ControlFlow::Break(())
        }
    }
}

/// Issues the four global subscriptions as a single subscribe request.
async fn recreate_subscriptions(
    channel: &dyn MqttChannel,
    state: &watch::Sender<ConnectionState>,
) -> Result<(), BridgeError> {
    state.send_replace(ConnectionState::Subscribing);
    let filters = topics::global_topics()
        .into_iter()
        .map(|topic| SubscribeFilter::new(topic, SUBSCRIBE_QOS))
        .collect();
    channel.subscribe_many(filters).await
}

fn report(
    slot: &mut Option<oneshot::Sender<Result<(), BridgeError>>>,
    result: Result<(), BridgeError>,
) {
    if let Some(tx) = slot.take() {
        let _ = tx.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::LogAlarms;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, PartialEq)]
    enum ChannelCall {
        Subscribe(Vec<String>),
        Unsubscribe(String),
        Publish {
            topic: String,
            options: PublishOptions,
            payload: Vec<u8>,
        },
        Disconnect,
    }

    #[derive(Default)]
    struct FakeChannel {
        calls: StdMutex<Vec<ChannelCall>>,
        fail_subscribe: bool,
        fail_unsubscribe: bool,
        fail_publish: bool,
    }

    impl FakeChannel {
        fn calls(&self) -> Vec<ChannelCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MqttChannel for FakeChannel {
        async fn subscribe_many(
            &self,
            filters: Vec<SubscribeFilter>,
        ) -> Result<(), BridgeError> {
            let paths = filters.into_iter().map(|f| f.path).collect();
            self.calls.lock().unwrap().push(ChannelCall::Subscribe(paths));
            if self.fail_subscribe {
                return Err(BridgeError::Subscription("request queue closed".to_string()));
            }
            Ok(())
        }

        async fn unsubscribe(&self, topic: &str) -> Result<(), BridgeError> {
            self.calls
                .lock()
                .unwrap()
                .push(ChannelCall::Unsubscribe(topic.to_string()));
            if self.fail_unsubscribe {
                return Err(BridgeError::Connection("session is gone".to_string()));
            }
            Ok(())
        }

        async fn publish(
            &self,
            topic: &str,
            options: PublishOptions,
            payload: Vec<u8>,
        ) -> Result<(), BridgeError> {
            self.calls.lock().unwrap().push(ChannelCall::Publish {
                topic: topic.to_string(),
                options,
                payload,
            });
            if self.fail_publish {
                return Err(BridgeError::Publish("broker refused".to_string()));
            }
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), BridgeError> {
            self.calls.lock().unwrap().push(ChannelCall::Disconnect);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingAlarms {
        events: StdMutex<Vec<String>>,
    }

    impl RecordingAlarms {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl AlarmSink for RecordingAlarms {
        fn raise(&self, id: &str, _error: &BridgeError) {
            self.events.lock().unwrap().push(format!("raise:{}", id));
        }

        fn release(&self, id: &str) {
            self.events.lock().unwrap().push(format!("release:{}", id));
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        messages: StdMutex<Vec<(String, Vec<u8>)>>,
    }

    impl MessageHandler for RecordingHandler {
        fn handle(&self, topic: &str, payload: &[u8]) {
            self.messages
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_vec()));
        }
    }

    fn binding(config: MqttConfig) -> MqttBinding {
        let handler: Arc<dyn MessageHandler> = Arc::new(|_: &str, _: &[u8]| {});
        let notifier: Arc<dyn NotificationBuilder> = Arc::new(|v: &Value| v.clone());
        MqttBinding::new(config, handler, notifier, Arc::new(LogAlarms))
    }

    async fn attach(binding: &MqttBinding, channel: Arc<FakeChannel>) {
        *binding.session.lock().await = Some(Session {
            channel,
            cancel: CancellationToken::new(),
            driver: tokio::spawn(async {}),
        });
    }

    fn conn_ack() -> Result<Event, rumqttc::ConnectionError> {
        Ok(Event::Incoming(Packet::ConnAck(rumqttc::ConnAck {
            session_present: false,
            code: rumqttc::ConnectReturnCode::Success,
        })))
    }

    fn sub_ack(codes: Vec<SubscribeReasonCode>) -> Result<Event, rumqttc::ConnectionError> {
        Ok(Event::Incoming(Packet::SubAck(rumqttc::SubAck {
            pkid: 1,
            return_codes: codes,
        })))
    }

    #[test]
    fn publish_options_omit_unset_fields() {
        let options = publish_options(&MqttConfig::default());
        assert_eq!(options, PublishOptions::default());
        assert!(options.qos.is_none());
        assert!(options.retain.is_none());
    }

    #[test]
    fn publish_options_skip_zero_qos_and_false_retain() {
        let config = MqttConfig {
            qos: Some(0),
            retain: Some(false),
            ..MqttConfig::default()
        };
        assert_eq!(publish_options(&config), PublishOptions::default());
    }

    #[test]
    fn publish_options_carry_configured_values() {
        let config = MqttConfig {
            qos: Some(1),
            retain: Some(true),
            ..MqttConfig::default()
        };
        let options = publish_options(&config);
        assert_eq!(options.qos, Some(QoS::AtLeastOnce));
        assert_eq!(options.retain, Some(true));
    }

    #[tokio::test]
    async fn stop_before_start_completes() {
        let binding = binding(MqttConfig::default());
        binding.stop().await.unwrap();
        assert_eq!(*binding.state().borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn stop_unsubscribes_all_topics_then_disconnects() {
        let binding = binding(MqttConfig::default());
        let channel = Arc::new(FakeChannel::default());
        attach(&binding, channel.clone()).await;

        binding.stop().await.unwrap();

        let mut expected: Vec<ChannelCall> = topics::global_topics()
            .into_iter()
            .map(ChannelCall::Unsubscribe)
            .collect();
        expected.push(ChannelCall::Disconnect);
        assert_eq!(channel.calls(), expected);
        assert_eq!(*binding.state().borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn stop_survives_unsubscribe_failures() {
        let binding = binding(MqttConfig::default());
        let channel = Arc::new(FakeChannel {
            fail_unsubscribe: true,
            ..FakeChannel::default()
        });
        attach(&binding, channel.clone()).await;

        binding.stop().await.unwrap();

        assert!(channel.calls().contains(&ChannelCall::Disconnect));
        assert_eq!(*binding.state().borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn send_before_start_reports_not_connected() {
        let binding = binding(MqttConfig::default());
        let result = binding
            .send_configuration("key", "dev1", &json!({}))
            .await;
        assert!(matches!(result, Err(BridgeError::NotConnected)));
    }

    #[tokio::test]
    async fn command_goes_to_stripped_device_topic_with_options() {
        let config = MqttConfig {
            qos: Some(1),
            retain: Some(true),
            ..MqttConfig::default()
        };
        let binding = binding(config);
        let channel = Arc::new(FakeChannel::default());
        attach(&binding, channel.clone()).await;

        binding
            .send_command("ABC123", &Device::new("therm7.L1"), r#"{"c":"on"}"#)
            .await
            .unwrap();

        assert_eq!(
            channel.calls(),
            vec![ChannelCall::Publish {
                topic: "/ABC123/therm7/cmd".to_string(),
                options: PublishOptions {
                    qos: Some(QoS::AtLeastOnce),
                    retain: Some(true),
                },
                payload: br#"{"c":"on"}"#.to_vec(),
            }]
        );
    }

    #[tokio::test]
    async fn command_publish_errors_are_swallowed() {
        let binding = binding(MqttConfig::default());
        let channel = Arc::new(FakeChannel {
            fail_publish: true,
            ..FakeChannel::default()
        });
        attach(&binding, channel.clone()).await;

        binding
            .send_command("key", &Device::new("dev1"), "{}")
            .await
            .unwrap();
        assert_eq!(channel.calls().len(), 1);
    }

    #[tokio::test]
    async fn configuration_publish_errors_propagate() {
        let binding = binding(MqttConfig::default());
        let channel = Arc::new(FakeChannel {
            fail_publish: true,
            ..FakeChannel::default()
        });
        attach(&binding, channel).await;

        let result = binding
            .send_configuration("key", "dev1", &json!({}))
            .await;
        assert!(matches!(result, Err(BridgeError::Publish(_))));
    }

    #[tokio::test]
    async fn configuration_payload_comes_from_notification_builder() {
        let handler: Arc<dyn MessageHandler> = Arc::new(|_: &str, _: &[u8]| {});
        let notifier: Arc<dyn NotificationBuilder> =
            Arc::new(|result: &Value| json!({ "values": result }));
        let binding = MqttBinding::new(
            MqttConfig::default(),
            handler,
            notifier,
            Arc::new(LogAlarms),
        );
        let channel = Arc::new(FakeChannel::default());
        attach(&binding, channel.clone()).await;

        let result = json!({ "sleep": "300" });
        binding
            .send_configuration("key", "light003", &result)
            .await
            .unwrap();

        let expected_payload = serde_json::to_vec(&json!({ "values": result })).unwrap();
        assert_eq!(
            channel.calls(),
            vec![ChannelCall::Publish {
                topic: "/key/light003/configuration/values".to_string(),
                options: PublishOptions::default(),
                payload: expected_payload,
            }]
        );
    }

    #[tokio::test]
    async fn connect_ack_issues_one_subscribe_for_all_topics() {
        let channel = FakeChannel::default();
        let handler = RecordingHandler::default();
        let alarms = RecordingAlarms::default();
        let (state, _keep) = watch::channel(ConnectionState::Connecting);
        let (tx, mut rx) = oneshot::channel();
        let mut ready = Some(tx);

        let flow = handle_event(conn_ack(), &channel, &handler, &alarms, &state, &mut ready).await;

        assert!(flow.is_continue());
        assert_eq!(
            channel.calls(),
            vec![ChannelCall::Subscribe(topics::global_topics().to_vec())]
        );
        assert!(alarms.events().is_empty());
        assert!(rx.try_recv().is_err());

        let flow = handle_event(
            sub_ack(vec![SubscribeReasonCode::Success(QoS::AtMostOnce); 4]),
            &channel,
            &handler,
            &alarms,
            &state,
            &mut ready,
        )
        .await;

        assert!(flow.is_continue());
        assert_eq!(alarms.events(), vec!["release:MQTTB-ALARM".to_string()]);
        assert_eq!(*state.borrow(), ConnectionState::Ready);
        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
    }

    #[tokio::test]
    async fn rejected_subscription_raises_alarm_and_fails_start() {
        let channel = FakeChannel::default();
        let handler = RecordingHandler::default();
        let alarms = RecordingAlarms::default();
        let (state, _keep) = watch::channel(ConnectionState::Subscribing);
        let (tx, mut rx) = oneshot::channel();
        let mut ready = Some(tx);

        let flow = handle_event(
            sub_ack(vec![
                SubscribeReasonCode::Success(QoS::AtMostOnce),
                SubscribeReasonCode::Failure,
            ]),
            &channel,
            &handler,
            &alarms,
            &state,
            &mut ready,
        )
        .await;

        assert!(flow.is_break());
        assert_eq!(alarms.events(), vec!["raise:MQTTB-ALARM".to_string()]);
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(BridgeError::Subscription(_)))
        ));
    }

    #[tokio::test]
    async fn failed_subscribe_request_raises_alarm_and_fails_start() {
        let channel = FakeChannel {
            fail_subscribe: true,
            ..FakeChannel::default()
        };
        let handler = RecordingHandler::default();
        let alarms = RecordingAlarms::default();
        let (state, _keep) = watch::channel(ConnectionState::Connecting);
        let (tx, mut rx) = oneshot::channel();
        let mut ready = Some(tx);

        let flow = handle_event(conn_ack(), &channel, &handler, &alarms, &state, &mut ready).await;

        assert!(flow.is_break());
        assert_eq!(alarms.events(), vec!["raise:MQTTB-ALARM".to_string()]);
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(BridgeError::Subscription(_)))
        ));
    }

    #[tokio::test]
    async fn inbound_publishes_are_forwarded_verbatim() {
        let channel = FakeChannel::default();
        let handler = RecordingHandler::default();
        let alarms = RecordingAlarms::default();
        let (state, _keep) = watch::channel(ConnectionState::Ready);
        let mut ready = None;

        let publish = rumqttc::Publish::new(
            "/ABC123/therm7/attrs",
            QoS::AtMostOnce,
            &b"{\"t\":21.5}"[..],
        );
        let flow = handle_event(
            Ok(Event::Incoming(Packet::Publish(publish))),
            &channel,
            &handler,
            &alarms,
            &state,
            &mut ready,
        )
        .await;

        assert!(flow.is_continue());
        assert!(channel.calls().is_empty());
        assert_eq!(
            handler.messages.lock().unwrap().clone(),
            vec![(
                "/ABC123/therm7/attrs".to_string(),
                b"{\"t\":21.5}".to_vec()
            )]
        );
    }

    #[tokio::test]
    async fn transport_error_before_ready_fails_start() {
        let channel = FakeChannel::default();
        let handler = RecordingHandler::default();
        let alarms = RecordingAlarms::default();
        let (state, _keep) = watch::channel(ConnectionState::Connecting);
        let (tx, mut rx) = oneshot::channel();
        let mut ready = Some(tx);

        let event = Err(rumqttc::ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        let flow = handle_event(event, &channel, &handler, &alarms, &state, &mut ready).await;

        assert!(flow.is_break());
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(BridgeError::Connection(_)))
        ));
    }

    #[test]
    fn provisioning_is_a_passthrough() {
        let device = Device::new("therm7.L1");
        let result = device_provisioning_handler(device.clone()).unwrap();
        assert_eq!(result, device);
    }
}
