pub mod api;
pub mod cli;
pub mod clients;
pub mod config;
pub mod constants;
pub mod db;
pub mod entities;
pub mod parser;
pub mod services;
pub mod state;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub use config::Config;
use state::SharedState;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    run_with_config(config).await
}

pub async fn run_with_config(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    init_prometheus(&config)?;
    init_logging(&config)?;

    let cli = Cli::parse();
    execute_command(cli, config).await
}

fn init_prometheus(config: &config::Config) -> anyhow::Result<()> {
    if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        PrometheusBuilder::new()
            .install()
            .context("failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
    }
    Ok(())
}

fn init_logging(config: &config::Config) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    let use_json =
        config.observability.loki_enabled || config.general.log_format == config::LogFormat::Json;

    if use_json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false);

        if config.observability.loki_enabled {
            let url =
                url::Url::parse(&config.observability.loki_url).context("invalid Loki URL")?;
            let (loki_layer, task) = tracing_loki::builder()
                .label("app", "curatr")?
                .extra_field("env", "production")?
                .extra_field("version", env!("CARGO_PKG_VERSION"))?
                .build_url(url)?;
            tokio::spawn(task);
            registry.with(fmt_layer).with(loki_layer).init();
            info!(url = %config.observability.loki_url, "Loki logging initialized");
        } else {
            registry.with(fmt_layer).init();
        }
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
    Ok(())
}

async fn execute_command(cli: Cli, config: config::Config) -> anyhow::Result<()> {
    match cli.command {
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
        Some(Commands::Daemon) => run_daemon(config).await,
        Some(Commands::Check) => run_single_check(config).await,
        Some(Commands::Intake { path }) => cli::cmd_intake(&config, &path).await,
        Some(Commands::Status { show_id }) => cli::cmd_status(&config, show_id).await,
        Some(Commands::Reconcile) => cli::cmd_reconcile(&config).await,
        Some(Commands::SyncMetadata) => cli::cmd_sync_metadata(&config).await,
        Some(Commands::QbitMaintenance) => cli::cmd_qbit_maintenance(&config).await,
        Some(Commands::Web) => {
            info!("starting web server only");
            let api_state = api::create_app_state_from_config(config.clone()).await?;
            let port = config.server.port;
            let app = api::router(api_state);
            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
            axum::serve(listener, app).await?;
            Ok(())
        }
    }
}

async fn run_daemon(config: config::Config) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "curatr starting in daemon mode");

    let shared = SharedState::new(config.clone()).await?;
    let api_state = api::create_app_state(shared.clone()).await;
    let scheduler = shared.scheduler();

    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            error!("scheduler error: {}", e);
        }
    });

    let server_handle: Option<tokio::task::JoinHandle<()>> = if config.server.enabled {
        let port = config.server.port;
        let app = api::router(api_state);
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        info!(port, "web API listening");
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("web server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("daemon running, press Ctrl+C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("error listening for shutdown: {}", e);
    }

    scheduler_handle.abort();
    if let Some(handle) = server_handle {
        handle.abort();
    }
    info!("daemon stopped");
    Ok(())
}

async fn run_single_check(config: config::Config) -> anyhow::Result<()> {
    info!("running single check");
    let shared = SharedState::new(config).await?;

    let sync = shared.resolver.sync_all().await?;
    services::resolver::log_sync_summary(&sync);

    let poll = shared.pipeline.poll_and_enqueue(None).await?;
    info!(added = poll.added, candidates = poll.candidates, "pipeline poll finished");

    let reconcile = shared.reconciler.run().await?;
    info!(moved = reconcile.moved, invalid = reconcile.invalid, "reconcile finished");

    info!("check complete");
    Ok(())
}
