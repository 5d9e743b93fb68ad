use anyhow::Result;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use slot_watcher::browser::ChromeLauncher;
use slot_watcher::config::{AppConfig, LoggingConfig};
use slot_watcher::notifications::{ChannelSink, LogHandler, NotificationDispatcher, WebhookHandler};
use slot_watcher::storage::{MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore};
use slot_watcher::{catalog, Orchestrator, SessionManager};

#[derive(Parser)]
#[command(name = "slot-watcher", version, about = "Watches an appointment scheduler for newly opened slots")]
struct Cli {
    /// Extra configuration file layered over config/*
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Keep snapshots in memory instead of the database
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Crawl until interrupted (default)
    Run,
    /// Run a single cycle and print its result
    Once,
    /// Print every stored snapshot
    Snapshots,
    /// Print the configured check targets
    Targets,
}

fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let stderr = fmt::layer().with_writer(std::io::stderr);

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            Ok(None)
        }
    }
}

async fn open_store(config: &AppConfig, dry_run: bool) -> Result<Arc<dyn SnapshotStore>> {
    if dry_run {
        info!("Dry run: snapshots are kept in memory");
        return Ok(Arc::new(MemorySnapshotStore::new()));
    }
    Ok(Arc::new(SqliteSnapshotStore::connect(&config.database).await?))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    let _log_guard = init_tracing(&config.logging)?;

    let command = cli.command.unwrap_or(Command::Run);

    if let Command::Targets = command {
        let categories = catalog::select_categories(&config.crawler.categories)?;
        let locations = catalog::select_locations(&config.crawler.locations)?;
        for target in catalog::enumerate_targets(&categories, &locations) {
            println!("{}\t{}\t{}", target.category.key, target.category.name, target.location.name);
        }
        return Ok(());
    }

    let store = open_store(&config, cli.dry_run).await?;

    if let Command::Snapshots = command {
        let snapshots = store.list_snapshots().await?;
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()?;
        info!(port = config.metrics.port, "Prometheus exporter listening");
    }

    info!("Starting slot watcher...");

    let (sink, receiver) = ChannelSink::channel(config.notifications.queue_capacity);
    let mut dispatcher = NotificationDispatcher::new(receiver).with_handler(Arc::new(LogHandler));
    if let Some(webhook) = WebhookHandler::from_config(&config.notifications)? {
        dispatcher = dispatcher.with_handler(Arc::new(webhook));
    }
    let dispatcher = tokio::spawn(dispatcher.run());

    let launcher = Arc::new(ChromeLauncher::new(&config.browser, &config.navigation));
    let session = Arc::new(SessionManager::new(launcher, config.browser.restart_after_cycles));
    let orchestrator = Orchestrator::new(&config, session.clone(), store, Arc::new(sink))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested, finishing current targets...");
        let _ = shutdown_tx.send(true);
    });

    let outcome = match command {
        Command::Once => {
            let result = orchestrator.run_cycle(&shutdown_rx).await;
            session.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        _ => orchestrator.run(shutdown_rx).await,
    };

    let stats = orchestrator.stats().await;
    info!(
        cycles = stats.cycles_run,
        succeeded = stats.targets_succeeded,
        failed = stats.targets_failed,
        notifications = stats.notifications_emitted,
        uptime_seconds = stats.uptime_seconds,
        "Shutting down..."
    );

    // Closing the queue lets the dispatcher drain what is left
    drop(orchestrator);
    let delivered = dispatcher.await?;
    info!(delivered, "Notification dispatcher finished");

    outcome?;
    Ok(())
}
