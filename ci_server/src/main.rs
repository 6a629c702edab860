//! Pipeline lifecycle manager server.
//!
//! Serves the pipeline API over HTTP, registering SCM webhooks that call back
//! into `CI_CALLBACK_URL` and keeping pipelines in an in-process store.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use ci_pipeline_manager::config::ManagerConfig;
use ci_pipeline_manager::manager::PipelineService;
use ci_pipeline_manager::metrics;
use ci_pipeline_manager::quality_gate::SonarQube;
use ci_pipeline_manager::routes::{api_router, RouterState};
use ci_pipeline_manager::scm::DefaultProviderFactory;
use ci_pipeline_manager::store::{DataStore, MemoryStore};

#[derive(Parser)]
#[command(name = "ci-pipeline-manager", about = "CI pipeline lifecycle manager")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "CI_PORT", default_value = "7099")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();
    let config = ManagerConfig::from_env();

    tracing::info!(
        callback_url = %config.callback_url,
        log_home = %config.log_home.display(),
        "Starting pipeline manager..."
    );

    let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
    let providers = Arc::new(DefaultProviderFactory::new(&config)?);
    let quality_gate = Arc::new(SonarQube::new(config.http_timeout_secs)?);
    let manager = PipelineService::new(&config, store.clone(), providers, quality_gate);

    let app = api_router(RouterState {
        manager: Arc::new(manager),
        store,
    });

    // Initialize metrics
    metrics::init_metrics();

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!("Pipeline manager listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
