use std::net::SocketAddr;

use anyhow::Context;
use db::DBService;
use server::{AppState, routes};
use services::services::{config::GarmentAiConfig, garment_ai::GarmentAiService};
use tracing::{info, warn};
use utils::logging::init_tracing;

const DEFAULT_DATABASE_URL: &str = "sqlite://wardrobe.db";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
    let db = DBService::new(&database_url)
        .await
        .context("failed to open catalog database")?;

    let config = GarmentAiConfig::from_env()?;
    if config.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; AI enrichment calls will be rejected");
    }
    info!(model = %config.model, endpoint = %config.endpoint, "Loaded garment AI configuration");
    let garment_ai = GarmentAiService::from_config(config)?;

    let app = routes::router(AppState::new(db, garment_ai));

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = match std::env::var("PORT") {
        Ok(port) => port
            .parse::<u16>()
            .with_context(|| format!("invalid PORT: {port}"))?,
        Err(_) => 3000,
    };
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid HOST: {host}"))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
