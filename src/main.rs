use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use whiskproxy::config::ProxyConfig;
use whiskproxy::dispatch::{router, AppState};
use whiskproxy::executor::LogSinks;
use whiskproxy::loader::ActionLoader;
use whiskproxy::registry::ExecutorRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (silently ignored if missing)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = ProxyConfig::from_env();
    tracing::info!(port = config.port, "whiskproxy starting");

    let log_sinks = open_log_sinks(&config).await?;
    let loader = ActionLoader::new(config.base_dir.clone());
    let registry = ExecutorRegistry::new(&config, log_sinks);

    let state = Arc::new(AppState {
        registry,
        config: config.clone(),
        loader,
        initialized: AtomicBool::new(false),
    });

    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    tracing::info!("whiskproxy shutting down");
    Ok(())
}

/// Opens the append-only log sinks child stdout/stderr are mirrored into
/// (spec §6). The original writes directly to the proxy's own stdout/stderr;
/// here they're named files so the paths are overridable for tests.
async fn open_log_sinks(config: &ProxyConfig) -> anyhow::Result<LogSinks> {
    let stdout = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_stdout_path)
        .await?;
    let stderr = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_stderr_path)
        .await?;
    Ok(LogSinks {
        stdout: Arc::new(tokio::sync::Mutex::new(stdout)),
        stderr: Arc::new(tokio::sync::Mutex::new(stderr)),
    })
}
