//! Gateway service entry point.

use anyhow::Result;
use broker_client::{Broker, MemoryBroker, RedisBroker};
use gateway::{create_router, AppState, BrokerKind, GatewayConfig, RelayConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Gateway service");

    let config = GatewayConfig::from_env()?;

    info!("Configuration:");
    info!("  HTTP_PORT: {}", config.http_port);
    info!("  METRICS_PORT: {}", config.metrics_port);
    info!("  BROKER: {:?}", config.broker);
    info!("  PUBSUB_CHANNEL: {}", config.channel);
    info!("  POLL_INTERVAL: {:?}", config.poll_interval);
    info!("  FORWARD_POLICY: {:?}", config.forward_policy);

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()?;
    info!("Prometheus metrics server started on port {}", config.metrics_port);

    let broker: Arc<dyn Broker> = match config.broker {
        BrokerKind::Redis => {
            info!("Connecting to Redis at {}", config.redis_url);
            let redis = RedisBroker::new(&config.redis_url)?;
            redis.ping().await?;
            Arc::new(redis)
        }
        BrokerKind::Memory => {
            info!("Using in-process broker");
            Arc::new(MemoryBroker::new())
        }
    };

    let state = Arc::new(AppState::new(broker, RelayConfig::from(&config)));
    let app = create_router(state, config.assets_dir.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr).await?;
    info!("Gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
