//! hoist webhook server

use anyhow::Context;
use clap::Parser;
use hoist_api::services::bitbucket::BitbucketClient;
use hoist_api::services::github::GithubClient;
use hoist_api::{AppState, GithubWebhook, routes};
use hoist_config::system::DEFAULT_CONFIG_PATH;
use hoist_config::{
    BootstrapSteps, SchedulerKind, SecretHelper, ServerConfig, effective_max_workers,
    load_server_config,
};
use hoist_core::job::JobScheduler;
use hoist_core::provider::BuildStore;
use hoist_db::{PgBuildStore, create_pool, run_migrations};
use hoist_executor::{DockerJobScheduler, KubernetesJobScheduler};
use hoist_scheduler::{BuildOrchestrator, Dispatcher};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hoist-server")]
#[command(about = "Webhook server for hoist", long_about = None)]
struct Args {
    /// Path of the server configuration file.
    #[arg(long, env = "HOIST_CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    config_path: String,

    /// Key for decrypting secret envelopes in the configuration file.
    #[arg(long, env = "SECRET_DECRYPTION_KEY", hide_env_values = true)]
    secret_decryption_key: Option<String>,

    /// Address the HTTP server listens on.
    #[arg(long, env = "HOIST_LISTEN_ADDRESS", default_value = "0.0.0.0:5000")]
    listen_address: SocketAddr,

    /// Log as JSON lines.
    #[arg(long, env = "HOIST_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let secrets = args.secret_decryption_key.as_deref().map(SecretHelper::new);
    if secrets.is_none() {
        warn!("No secret decryption key set, configuration is read as-is");
    }
    let config = load_server_config(&args.config_path, secrets.as_ref())
        .with_context(|| format!("loading configuration from {}", args.config_path))?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database.connection_url()?).await?;
    run_migrations(&pool).await?;
    info!("Database connected");

    let store: Arc<dyn BuildStore> = Arc::new(PgBuildStore::new(pool));
    let scheduler = job_scheduler(&config).await?;
    let state = start_integrations(&config, store, scheduler)?;

    let app = routes::router(state.clone()).layer(TraceLayer::new_for_http());

    info!("Starting server on {}", args.listen_address);
    let listener = TcpListener::bind(args.listen_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, waiting for running builds");
    state.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn job_scheduler(config: &ServerConfig) -> anyhow::Result<Arc<dyn JobScheduler>> {
    let jobs = &config.jobs;
    let scheduler: Arc<dyn JobScheduler> = match jobs.scheduler {
        SchedulerKind::Kubernetes => Arc::new(
            KubernetesJobScheduler::new(jobs.namespace.clone(), jobs.builder_image.clone())
                .await?,
        ),
        SchedulerKind::Docker => Arc::new(DockerJobScheduler::new(jobs.builder_image.clone())?),
    };
    info!(scheduler = scheduler.name(), "Using job scheduler");
    Ok(scheduler)
}

/// Start one dispatcher per configured integration.
fn start_integrations(
    config: &ServerConfig,
    store: Arc<dyn BuildStore>,
    scheduler: Arc<dyn JobScheduler>,
) -> anyhow::Result<AppState> {
    let augmenter = Arc::new(BootstrapSteps::default());
    let mut state = AppState::default();

    if let Some(github) = &config.integrations.github {
        let client = Arc::new(GithubClient::from_config(github)?);
        let orchestrator = BuildOrchestrator::new(
            client.clone(),
            client,
            augmenter.clone(),
            store.clone(),
            scheduler.clone(),
        );
        let dispatcher = Dispatcher::start(
            "github",
            effective_max_workers(github.max_workers),
            Arc::new(orchestrator),
        );
        state.github = Some(GithubWebhook {
            webhook_secret: github.webhook_secret.clone(),
            dispatcher,
        });
    }

    if let Some(bitbucket) = &config.integrations.bitbucket {
        let client = Arc::new(BitbucketClient::from_config(bitbucket));
        let orchestrator =
            BuildOrchestrator::new(client.clone(), client, augmenter, store, scheduler);
        state.bitbucket = Some(Dispatcher::start(
            "bitbucket",
            effective_max_workers(bitbucket.max_workers),
            Arc::new(orchestrator),
        ));
    }

    if state.github.is_none() && state.bitbucket.is_none() {
        warn!("No integrations configured, every webhook will be rejected");
    }

    Ok(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for ctrl-c");
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
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
