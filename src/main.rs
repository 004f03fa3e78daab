use relay_server::ServerConfig;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting relay server");

    let config = ServerConfig::from_env();
    let handle = relay_server::start(config)
        .await
        .expect("Failed to start server");

    tracing::info!(port = handle.port, "Relay ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    handle.stop();
    tracing::info!("Shutting down");
}
