use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::anyhow;
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use leadline_gateway::{AppState, ServerConfig, handlers, routes};

/// Leadline Gateway - voice lead qualification server
#[derive(Parser, Debug)]
#[command(name = "leadline-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen port (overrides PORT)
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Lead CSV path (overrides LEADS_CSV_PATH)
    #[arg(long = "leads", value_name = "FILE")]
    leads: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections to the AI backend.
    // This must be done before any TLS connections are attempted.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Parse CLI arguments and apply overrides on top of the environment
    let cli = Cli::parse();
    let mut config = ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(leads) = cli.leads {
        config.leads_path = leads;
    }

    let address = config.address();
    info!(
        leads = %config.leads_path.display(),
        model = %config.openai_model,
        "Starting server on {address}"
    );

    // Create application state
    let app_state = AppState::new(config);

    // Webhook routes for call setup
    let call_routes = routes::call::create_call_router();

    // Media stream WebSocket route (one call relay per connection)
    let media_routes = routes::media::create_media_router();

    // Public health check route
    let public_routes = Router::new().route(
        "/",
        axum::routing::get(handlers::api::health_check),
    );

    // Security headers
    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    let app = public_routes
        .merge(call_routes)
        .merge(media_routes)
        .with_state(app_state)
        .layer(security_headers);

    // Parse socket address
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    info!("Server listening on http://{socket_addr}");

    // Failure to bind is the only process-fatal condition.
    let listener = TcpListener::bind(&socket_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
