//! Pubaccess Gateway - portal process serving publink content
//!
//! The gateway exposes the pubaccess retrieval, upload, pin, policy and
//! stats routes over HTTP. Storage runs over the service crate's
//! in-memory backend; deployments that embed a real storage engine build
//! their own state and reuse the same router.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use http::header::{ACCEPT, CONTENT_TYPE, ORIGIN};
use http::Method;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use service::{Config, ServiceState};

/// Pubaccess Gateway - portal process serving publink content
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on for HTTP requests
    #[arg(short, long, default_value = "4280")]
    port: u16,

    /// Directory holding the access-policy logs
    #[arg(long)]
    persist_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    let log_level: tracing::Level = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();

    tracing::info!("Starting Pubaccess Gateway");

    // Create configuration
    let mut config = Config::default();
    config.log_level = log_level;
    if let Some(persist_dir) = args.persist_dir {
        config.persist_path = Some(persist_dir);
    }

    // Create state
    let state = match ServiceState::from_config(&config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to create service state: {}", e);
            std::process::exit(1);
        }
    };

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let graceful_shutdown = async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl+c");
        tracing::info!("Received shutdown signal");
        let _ = shutdown_tx.send(());
    };
    tokio::spawn(graceful_shutdown);

    // Build gateway router
    let listen_addr = SocketAddr::from_str(&format!("0.0.0.0:{}", args.port))?;
    let router = build_gateway_router(state);

    tracing::info!("Gateway listening on {}", listen_addr);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    let mut server_rx = shutdown_rx.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = server_rx.changed().await;
        })
        .await?;

    tracing::info!("Gateway shutdown complete");
    Ok(())
}

/// Build the gateway router with the pubaccess routes
fn build_gateway_router(state: ServiceState) -> axum::Router {
    let cors_layer = CorsLayer::new()
        .allow_methods(vec![Method::GET, Method::HEAD, Method::POST])
        .allow_headers(vec![ACCEPT, ORIGIN, CONTENT_TYPE])
        .allow_origin(Any)
        .allow_credentials(false);

    let trace_layer = TraceLayer::new_for_http();

    service::http::router(state).layer(cors_layer).layer(trace_layer)
}
