use std::{sync::Arc, time::Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vigil::{
    config::AppConfig,
    dispatch::{
        DispatchSignal, Dispatcher,
        channel::ChannelRegistry,
        email::EmailAdapter,
        webhook::WebhookAdapter,
    },
    engine::{ingest::IngestService, matcher::MatchEngine, rule_index::RuleIndexService},
    http_client::HttpClientPool,
    http_server::{ApiState, run_server},
    persistence::sqlite::SqliteStore,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the ingest pipeline, dispatcher and API server.
    Run,
    /// Replays a failed archived batch by its archive id, then exits.
    Replay {
        /// Archive entry to replay.
        #[arg(long)]
        archive_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber =
        FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env()).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run().await?,
        Commands::Replay { archive_id } => replay(archive_id).await?,
    }

    Ok(())
}

async fn build_ingest(
    config: &AppConfig,
) -> Result<(Arc<SqliteStore>, Arc<IngestService>, tokio::sync::mpsc::Receiver<()>), Box<dyn std::error::Error>>
{
    tracing::debug!("Initializing store...");
    let store = Arc::new(SqliteStore::new(&config.database_url).await?);
    store.run_migrations().await?;
    tracing::info!("Database migrations completed.");

    let rules = Arc::new(RuleIndexService::new(store.clone()).await?);
    let (signal, wake) = DispatchSignal::channel();
    let ingest =
        Arc::new(IngestService::new(store.clone(), MatchEngine::new(rules), signal));
    Ok((store, ingest, wake))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!("Loading application configuration...");
    let config = AppConfig::new(None)?;
    tracing::debug!(database_url = %config.database_url, "Configuration loaded.");

    let (store, ingest, wake) = build_ingest(&config).await?;

    let pool = HttpClientPool::new(config.http_base_config.clone());
    let webhook_client = pool.get_or_create(&config.http_retry_config).await?;

    let mut channels = ChannelRegistry::new();
    channels.register(Arc::new(WebhookAdapter::new(
        webhook_client,
        config.webhook_secret.clone(),
    )));
    if let Some(smtp) = &config.smtp {
        channels.register(Arc::new(EmailAdapter::from_config(smtp)?));
        tracing::info!(relay = %smtp.host, "Email channel enabled.");
    }

    let dispatcher =
        Arc::new(Dispatcher::new(store.clone(), channels, config.dispatcher.clone()));
    let dispatcher_task = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run(wake).await })
    };

    let state = ApiState { ingest, store, started_at: Instant::now() };
    let server_config = config.server.clone();
    let server_task = tokio::spawn(async move { run_server(&server_config, state).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received.");

    // Dropping the server drops the last dispatch signal, which stops the
    // dispatcher loop once the current cycle finishes.
    server_task.abort();
    if tokio::time::timeout(config.shutdown_timeout, dispatcher_task).await.is_err() {
        tracing::warn!("Dispatcher did not stop within the shutdown timeout.");
    }

    Ok(())
}

async fn replay(archive_id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::new(None)?;
    let (_store, ingest, _wake) = build_ingest(&config).await?;

    let report = ingest.replay(archive_id).await?;
    tracing::info!(archive_id, applied = report.applied, rolled_back = report.rolled_back,
        "Replay finished; any new notifications will be delivered on the next run.");
    Ok(())
}
