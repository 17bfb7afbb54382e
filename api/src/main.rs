//! Job scheduling service entry point.
//!
//! Loads configuration, wires the task store, scheduler, and pipeline
//! executor into the HTTP control plane, and serves it with graceful
//! shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use scheduler_core::ServiceConfig;
use scheduler_engine::{registry::register_demo_callables, CallableRegistry, LogFilter, PipelineExecutor, Scheduler, TaskStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

mod api;

use api::{create_router, AppState};

/// Command-line arguments for the job scheduling service.
#[derive(Parser, Debug)]
#[command(name = "scheduler-api")]
#[command(about = "HTTP control plane for the job scheduling service", long_about = None)]
struct CliArgs {
    /// Path to the service configuration file (scheduler.toml)
    #[arg(value_name = "CONFIG_FILE", default_value = "scheduler.toml")]
    config_file: PathBuf,

    /// Override the listen address from the config file
    #[arg(long = "listen-address", value_name = "ADDRESS")]
    listen_address: Option<String>,

    /// Open the default web browser to the control plane once it is listening
    #[arg(long = "open-browser")]
    open_browser: bool,
}

/// Event formatter for the task execution log: `YYYY-mm-dd HH:MM:SS,mmm -
/// LEVEL - message`, the line shape `LogFilter` parses back out of the
/// file. Level names follow the log's existing convention (`WARNING`, not
/// `WARN`), and timestamps are local time to match the day-window filter.
struct TaskLogFormat;

impl<S, N> FormatEvent<S, N> for TaskLogFormat
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata_level = *event.metadata().level();
        let level = if metadata_level == tracing::Level::ERROR {
            "ERROR"
        } else if metadata_level == tracing::Level::WARN {
            "WARNING"
        } else if metadata_level == tracing::Level::INFO {
            "INFO"
        } else {
            "DEBUG"
        };
        write!(
            writer,
            "{} - {level} - ",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f")
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn open_browser_best_effort(url: &str) {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "start"
    } else {
        "xdg-open"
    };
    if let Err(e) = std::process::Command::new(opener).arg(url).spawn() {
        info!("could not open browser automatically ({opener} failed: {e})");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let mut config = if cli_args.config_file.exists() {
        ServiceConfig::load(&cli_args.config_file)
            .with_context(|| format!("failed to load config file {}", cli_args.config_file.display()))?
    } else {
        ServiceConfig::default()
    };
    if let Some(listen_address) = cli_args.listen_address {
        config.listen_address = listen_address;
    }
    config.validate().context("invalid configuration")?;

    std::fs::create_dir_all(&config.log_directory)
        .with_context(|| format!("failed to create log directory {}", config.log_directory))?;

    // General operational diagnostics, one file per day.
    let app_appender = tracing_appender::rolling::daily(&config.log_directory, "app.log");
    let (app_writer, _app_guard) = tracing_appender::non_blocking(app_appender);

    // Task execution log: a single continuously-appended file so the log
    // filter's day-window scan (`LogFilter`) can read it back as one stream.
    let task_appender = tracing_appender::rolling::never(&config.log_directory, &config.log_file_name);
    let (task_writer, _task_guard) = tracing_appender::non_blocking(task_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scheduler_api=info,scheduler_engine=info,scheduler_core=info"));

    let app_layer = tracing_subscriber::fmt::layer()
        .with_writer(app_writer)
        .with_filter(env_filter);
    let task_layer = tracing_subscriber::fmt::layer()
        .event_format(TaskLogFormat)
        .with_writer(task_writer)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target().starts_with("scheduler_engine::executor")
                || metadata.target().starts_with("scheduler_engine::http_action")
                || metadata.target().starts_with("scheduler_engine::scheduler")
                || metadata.target().starts_with("scheduler_core::template")
        }));

    tracing_subscriber::registry()
        .with(app_layer)
        .with(task_layer)
        .init();

    info!("job scheduling service starting up");
    info!(listen_address = %config.listen_address, "configuration loaded");

    let listen_address: SocketAddr = config
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen address '{}'", config.listen_address))?;

    let mut registry = CallableRegistry::new();
    register_demo_callables(&mut registry);

    let http_client = reqwest::Client::new();
    let executor = PipelineExecutor::new(registry, http_client, config.http_default_timeout_seconds);
    let store = Arc::new(TaskStore::new());
    let scheduler = Arc::new(Scheduler::new());
    let log_path = std::path::Path::new(&config.log_directory).join(&config.log_file_name);
    let logs = Arc::new(LogFilter::new(log_path));

    let state = AppState::new(store, scheduler, executor, logs);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(listen_address)
        .await
        .with_context(|| format!("failed to bind to {listen_address}"))?;
    info!("listening on {listen_address}");

    if cli_args.open_browser {
        open_browser_best_effort(&format!("http://{listen_address}"));
    }

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let mut shutdown_rx = shutdown_tx.subscribe();
    let shutdown_signal = async move {
        let _ = shutdown_rx.recv().await;
        info!("shutdown signal propagated to HTTP server");
    };

    let shutdown_timeout = config.graceful_shutdown_timeout_seconds;
    tokio::select! {
        result = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal) => {
            if let Err(e) = result {
                error!("server error: {e}");
            }
        }
        _ = setup_shutdown_signal() => {
            info!("shutdown signal received, notifying in-flight requests (timeout {shutdown_timeout}s)");
            let _ = shutdown_tx.send(());
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    info!("job scheduling service shutdown complete");
    Ok(())
}

async fn setup_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let sigterm = signal(SignalKind::terminate());
        let sigint = signal(SignalKind::interrupt());
        match (sigterm, sigint) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("received SIGTERM"),
                    _ = sigint.recv() => info!("received SIGINT"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("failed to register signal handlers: {e}");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("failed to wait for Ctrl+C: {e}");
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to receive Ctrl+C signal: {e}");
        }
    }
}
