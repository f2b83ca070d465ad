//! hjf-agent - job ingestion and application assistant
//!
//! Pulls postings from the configured sources on a schedule, scores them
//! against the candidate profile, and drives a browser through application
//! forms up to the submit button, where a human confirms or cancels.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hjf_common::events::EventBus;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hjf_agent::automation::{
    AutomationEngine, BrowserLauncher, FieldDetector, HeuristicFieldDetector, OracleFieldDetector,
    WebDriverLauncher,
};
use hjf_agent::config::{resolve_oracle, AgentConfig};
use hjf_agent::services::connectors::{ConnectorDeps, DefaultConnectorFactory};
use hjf_agent::services::{
    BackoffPolicy, ClassificationOracle, DomainRateLimiter, HttpFetcher, IngestionOrchestrator,
    MatchScorer, OpenAiCompatibleOracle, ResumeStructurer, RetentionSweep, RobotsPolicy,
};
use hjf_agent::worker::BackgroundWorker;
use hjf_agent::AppState;

const DB_FILE_NAME: &str = "hjf.db";

#[derive(Parser, Debug)]
#[command(name = "hjf-agent")]
#[command(about = "Job ingestion and human-confirmed application agent")]
#[command(version)]
struct Args {
    /// Bootstrap TOML file
    #[arg(short, long, env = "HJF_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the database
    #[arg(short, long)]
    data_folder: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "HJF_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path =
        hjf_common::config::locate_config_file(args.config.as_deref(), "HJF_CONFIG", "hjf-agent");
    let config: AgentConfig = hjf_common::config::load_toml_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting hjf-agent v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: compiled defaults"),
    }

    let data_folder = hjf_common::config::resolve_data_folder(
        args.data_folder.as_deref(),
        "HJF_DATA_FOLDER",
        config.data_folder.as_deref(),
    );
    let db_path = hjf_common::config::prepare_data_folder(&data_folder, DB_FILE_NAME)
        .context("Failed to prepare data folder")?;
    info!("Database: {}", db_path.display());

    let db = hjf_agent::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);

    let oracle: Option<Arc<dyn ClassificationOracle>> = match resolve_oracle(&config.oracle) {
        Some(settings) => {
            info!(model = %settings.model, base_url = %settings.base_url, "Oracle configured");
            Some(Arc::new(
                OpenAiCompatibleOracle::new(settings.api_key, settings.model, settings.base_url)
                    .context("Failed to build oracle client")?,
            ))
        }
        None => {
            warn!("No OPENAI_API_KEY or GROQ_API_KEY: postings stay unscored, field detection uses heuristics, resume structuring is disabled");
            None
        }
    };

    let detector: Arc<dyn FieldDetector> = match &oracle {
        Some(oracle) => Arc::new(OracleFieldDetector::new(oracle.clone())),
        None => Arc::new(HeuristicFieldDetector),
    };
    let scorer = oracle.clone().map(|o| Arc::new(MatchScorer::new(o)));
    let structurer = oracle.clone().map(|o| Arc::new(ResumeStructurer::new(o)));

    // Applications run in a visible browser for review; scraping does not
    let automation_launcher: Arc<dyn BrowserLauncher> =
        Arc::new(WebDriverLauncher::new(&config.webdriver.url, false)?);
    let scrape_launcher: Arc<dyn BrowserLauncher> =
        Arc::new(WebDriverLauncher::new(&config.webdriver.url, true)?);

    let engine = Arc::new(AutomationEngine::new(
        db.clone(),
        event_bus.clone(),
        automation_launcher,
        detector,
    ));

    let limiter = Arc::new(DomainRateLimiter::new());
    let fetcher = HttpFetcher::new(limiter, BackoffPolicy::default())?;
    let deps = ConnectorDeps {
        robots: Arc::new(RobotsPolicy::new(fetcher.clone())),
        fetcher,
        launcher: scrape_launcher,
        scope: config.search.scope(),
    };

    let orchestrator = Arc::new(IngestionOrchestrator::new(
        db.clone(),
        event_bus.clone(),
        Arc::new(DefaultConnectorFactory::new(deps)),
        scorer,
        config.sources(),
        config.search.query.clone(),
    ));

    let worker_cancel = CancellationToken::new();
    let worker_handle = if config.worker.enabled {
        let retention = Arc::new(RetentionSweep::new(db.clone(), config.worker.retention_days));
        let worker = BackgroundWorker::new(
            orchestrator.clone(),
            retention,
            Duration::from_secs(config.worker.interval_secs),
        );
        Some(worker.spawn(worker_cancel.clone()))
    } else {
        info!("Background worker disabled");
        None
    };

    let state = AppState::new(db, event_bus, engine.clone(), orchestrator, structurer);
    let app = hjf_agent::build_router(state);

    let port = args.port.unwrap_or(config.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    worker_cancel.cancel();
    let closed = engine.kill_all().await;
    if closed > 0 {
        warn!(closed, "Closed automation sessions on shutdown");
    }
    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            warn!("Background worker ended abnormally: {}", e);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
