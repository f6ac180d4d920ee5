//! Presage gateway entry point.
//!
//! Starts the Axum server hosting the real-time presence, messaging and
//! call-signaling gateway.

use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = presage::backend::server::GatewayConfig::from_env();
    let addr: SocketAddr = format!("{}:{}", config.bind_addr, config.port).parse()?;

    let app = presage::backend::server::create_app(config).await;

    tracing::info!("gateway listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
