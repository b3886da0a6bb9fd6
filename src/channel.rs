//! Narrow transport capability handed out by the connection manager.
//!
//! The connection manager owns the one rumqttc session; the router and the
//! outbound dispatcher only ever see [`MqttChannel`]. That keeps the single
//! handle single and lets tests substitute a recording fake.

use crate::config::{MqttConfig, Protocol};
use crate::error::BridgeError;
use async_trait::async_trait;
use rumqttc::tokio_rustls::rustls;
use rumqttc::{AsyncClient, QoS, SubscribeFilter, TlsConfiguration, Transport};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Transport options attached to an outbound publish.
///
/// Fields that are `None` are genuinely absent: the rumqttc implementation
/// falls back to the transport defaults, and a fake channel observes the
/// absence as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub qos: Option<QoS>,
    pub retain: Option<bool>,
}

/// Publish/subscribe capability of one live MQTT session.
#[async_trait]
pub trait MqttChannel: Send + Sync {
    /// Issues all `filters` as a single subscribe request.
    async fn subscribe_many(&self, filters: Vec<SubscribeFilter>) -> Result<(), BridgeError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), BridgeError>;

    async fn publish(
        &self,
        topic: &str,
        options: PublishOptions,
        payload: Vec<u8>,
    ) -> Result<(), BridgeError>;

    /// Closes the session. Callers treat failures as already-closed.
    async fn disconnect(&self) -> Result<(), BridgeError>;
}

/// [`MqttChannel`] backed by a rumqttc [`AsyncClient`].
pub struct ClientChannel {
    client: AsyncClient,
}

impl ClientChannel {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MqttChannel for ClientChannel {
    async fn subscribe_many(&self, filters: Vec<SubscribeFilter>) -> Result<(), BridgeError> {
        self.client
            .subscribe_many(filters)
            .await
            .map_err(|e| BridgeError::Subscription(e.to_string()))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BridgeError> {
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|e| BridgeError::Connection(e.to_string()))
    }

    async fn publish(
        &self,
        topic: &str,
        options: PublishOptions,
        payload: Vec<u8>,
    ) -> Result<(), BridgeError> {
        let qos = options.qos.unwrap_or(QoS::AtMostOnce);
        let retain = options.retain.unwrap_or(false);
        self.client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|e| BridgeError::Publish(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), BridgeError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| BridgeError::Connection(e.to_string()))
    }
}

/// Maps the configured protocol to a rumqttc transport.
pub(crate) fn transport_config(config: &MqttConfig) -> Result<Transport, BridgeError> {
    match config.protocol {
        Protocol::Mqtt => Ok(Transport::Tcp),
        Protocol::Mqtts if config.reject_unauthorized => {
            let ca_path = config.ca.as_ref().ok_or_else(|| {
                BridgeError::Config(
                    "mqtts with certificate verification needs a ca bundle".to_string(),
                )
            })?;
            let ca = read_pem(ca_path)?;
            let client_auth = match (&config.cert, &config.key) {
                (Some(cert), Some(key)) => Some((read_pem(cert)?, read_pem(key)?)),
                _ => None,
            };
            Ok(Transport::Tls(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth,
            }))
        }
        Protocol::Mqtts => {
            if config.cert.is_some() || config.key.is_some() {
                warn!("client certificate is ignored while reject_unauthorized is off");
            }
            let tls = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                .with_no_client_auth();
            Ok(Transport::Tls(TlsConfiguration::Rustls(Arc::new(tls))))
        }
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, BridgeError> {
    fs::read(path)
        .map_err(|e| BridgeError::Config(format!("failed to read {}: {}", path.display(), e)))
}

/// Certificate verifier that trusts any broker. Active only while
/// `reject_unauthorized` is turned off.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
