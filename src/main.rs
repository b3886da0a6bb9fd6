use color_eyre::eyre::eyre;
use color_eyre::Result;
use mqtt_bridge::{BridgeConfig, LogAlarms, MessageHandler, MqttBinding, NotificationBuilder};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(BridgeConfig::default_path);
    let config = if config_path.exists() {
        info!("Loading configuration from {}", config_path.display());
        BridgeConfig::load(&config_path).map_err(|e| eyre!("{}", e))?
    } else {
        info!(
            "No configuration file at {}, using defaults",
            config_path.display()
        );
        BridgeConfig::default()
    };

    // Standalone operation logs inbound traffic and echoes configuration
    // results; an embedding device-management layer replaces both.
    let handler: Arc<dyn MessageHandler> = Arc::new(|topic: &str, payload: &[u8]| {
        info!("Message on {} ({} bytes)", topic, payload.len());
    });
    let notifier: Arc<dyn NotificationBuilder> = Arc::new(|result: &Value| result.clone());

    let binding = MqttBinding::new(config.mqtt, handler, notifier, Arc::new(LogAlarms));
    binding
        .start()
        .await
        .map_err(|e| eyre!("Failed to start MQTT binding: {}", e))?;
    info!("MQTT bridge ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    binding
        .stop()
        .await
        .map_err(|e| eyre!("Failed to stop MQTT binding: {}", e))?;

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
