use anyhow::Result;
use codeindex_backend::{config, embedder, routes, server, state, watcher};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

/// Shortest accepted watcher interval.
const MIN_POLL_INTERVAL_MS: u64 = 100;

fn main() -> Result<()> {
    // Resolve log directory (from env, or next to the default data dir)
    let log_dir = std::env::var("CODEINDEX_LOG_DIR").unwrap_or_else(|_| {
        dirs::data_local_dir()
            .map(|d| d.join("codeindex-backend").join("logs").to_string_lossy().to_string())
            .unwrap_or_else(|| ".codeindex-data/logs".to_string())
    });
    std::fs::create_dir_all(&log_dir).ok();

    // File appender: daily rotated log files
    let file_appender = tracing_appender::rolling::daily(&log_dir, "codeindex-backend.log");
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "codeindex_backend=info,tower_http=info".into());

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .compact();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(non_blocking_writer)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Install panic hook that logs before aborting
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_default();
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        error!(target: "codeindex_backend::panic", location = %location, payload = %payload, "PANIC: thread panicked");
        default_panic(info);
    }));

    routes::health::init_start_time();

    let config = config::AppConfig::from_env();
    let addr: SocketAddr = config.listen_addr.parse()?;

    info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        root = %config.root.display(),
        poll_interval_ms = config.poll_interval_ms,
        chunk_lines = config.chunk_lines,
        chunk_overlap = config.chunk_overlap,
        max_file_size_bytes = config.max_file_size_bytes,
        embedder = ?config.embedder.kind,
        log_dir = %log_dir,
        "codeindex backend starting"
    );

    // The remote embedder owns a blocking HTTP client, which must be created
    // and finally dropped outside the async runtime. `embedder` outlives it.
    let embedder = embedder::build_embedder(&config.embedder)?;
    let app_state = state::AppState::new(config, embedder.clone())?;

    if app_state.config.sync_on_start {
        let report = app_state.indexer.reindex_tree(&app_state.root)?;
        if !report.failures.is_empty() {
            warn!("{} files could not be indexed at startup", report.failures.len());
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(app_state, addr))?;
    drop(runtime);
    drop(embedder);

    info!("codeindex backend shutdown complete");
    Ok(())
}

async fn serve(app_state: state::AppState, addr: SocketAddr) -> Result<()> {
    let interval = Duration::from_millis(app_state.config.poll_interval_ms.max(MIN_POLL_INTERVAL_MS));
    let watcher = watcher::start(
        app_state.indexer.clone(),
        &app_state.root,
        interval,
        app_state.config.prune_deleted,
        app_state.watcher_stats.clone(),
    )?;

    // Initialize the shutdown notify channel for graceful HTTP-based shutdown
    routes::health::init_shutdown_notify();

    let app = server::create_app(app_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("codeindex backend listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    watcher.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let http_shutdown = routes::health::wait_for_shutdown();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, initiating shutdown"); },
        _ = terminate => { info!("Received terminate signal, initiating shutdown"); },
        _ = http_shutdown => { info!("Received HTTP shutdown request, initiating shutdown"); },
    }
}
