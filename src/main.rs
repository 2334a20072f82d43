use anyhow::{Context, Result};
use clubwire::client::RealtimeClient;
use clubwire::config::{load_config, ClubwireConfig};
use clubwire::transport::WsTransport;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clubwire=info".into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&path)?,
        None => ClubwireConfig::default(),
    };

    let transport = Arc::new(WsTransport::new(
        config.connection.url.clone(),
        Duration::from_secs(config.connection.reconnect_delay_secs),
    ));
    let client = RealtimeClient::new(&config, transport);

    if let Ok(user_id) = std::env::var("CLUBWIRE_USER_ID") {
        client.set_user_id(user_id);
    }

    client
        .connect()
        .await
        .context("Failed to reach the realtime backend")?;

    client
        .subscribe_to_user_queue(|payload| info!(payload = %payload, "Message on user queue"))
        .await?;

    info!("Connected, waiting for messages (ctrl-c to exit)");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    client.disconnect().await;
    Ok(())
}
