use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use etl_runner::{
    config::Config,
    connectors::{BuildContext, ConnectorRegistry},
    database::Database,
    notify::Notifier,
    runner::TaskRunner,
    transfer::CurlClientFactory,
};

#[derive(Parser)]
#[command(name = "etl-runner")]
#[command(version = "0.1.0")]
#[command(about = "An admin-configured ETL task runner with recurring schedules")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute every due task once and exit (the cron entrypoint)
    Run,
    /// Keep executing due tasks on the configured interval
    Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with specified level
    let log_filter = format!("etl_runner={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ETL runner v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration from specified file
    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    info!("Using database: {}", config.database.url);

    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    let registry = Arc::new(ConnectorRegistry::with_builtins(BuildContext {
        scratch_root: config.storage.scratch_path.clone(),
        data_root: config.storage.data_root.clone(),
        pool: database.pool(),
        transfer_clients: Arc::new(CurlClientFactory),
        timezone: config.runner.timezone,
        query_user_id: config.runner.query_user_id,
    }));
    info!("Connector registry initialized");

    let notifier = Notifier::from_config(&config.notifications)?;
    if notifier.is_some() {
        info!("Failure notifications enabled via {}", config.notifications.smtp_host);
    }

    let runner = TaskRunner::new(
        database,
        registry,
        notifier,
        config.runner.timezone,
    );

    match cli.command {
        Command::Run => {
            let summary = runner.run_due_tasks().await?;
            info!(
                "Run {} finished: {} executed, {} skipped, {} failed",
                summary.run_id, summary.executed, summary.skipped, summary.failed
            );
        }
        Command::Daemon => {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(
                config.runner.tick_interval_secs.max(1),
            ));
            info!(
                "Running due tasks every {} seconds",
                config.runner.tick_interval_secs.max(1)
            );
            loop {
                interval.tick().await;
                if let Err(e) = runner.run_due_tasks().await {
                    tracing::error!("Task run failed: {e}");
                }
            }
        }
    }

    Ok(())
}
