//! Deep Research server binary

use anyhow::{Context, Result};
use deep_research::api::{create_router, ApiState};
use deep_research::client::{ClientConfig, ResearchClient};
use deep_research::export::Exporter;
use deep_research::markdown::Renderer;
use deep_research::AppConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Deep Research server v{}", env!("CARGO_PKG_VERSION"));

    // Load config from file
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config_contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path))?;

    let mut config: AppConfig = toml::from_str(&config_contents)
        .with_context(|| format!("Failed to parse config file: {}", config_path))?;

    // Environment wins over the file for the service URL
    if let Ok(url) = std::env::var("CORE_API_URL") {
        config.core_api_url = url;
    }

    info!(
        config_path = config_path,
        core_api_url = config.core_api_url,
        enable_export = config.enable_export,
        "Loaded configuration"
    );

    let client_config = ClientConfig::new(config.core_api_url.as_str())
        .with_timeout(Duration::from_secs(config.request_timeout_secs));

    let state = Arc::new(ApiState {
        backend: Arc::new(ResearchClient::new(client_config)),
        renderer: Arc::new(Renderer::new(config.export.render_cache_size)),
        exporter: Arc::new(Exporter::new(Duration::from_secs(
            config.export.image_timeout_secs,
        ))),
        enable_export: config.enable_export,
    });

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
