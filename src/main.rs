//! Simulated streaming LLM API.
//!
//! Streams a canned response to `POST /generate` as Server-Sent Events.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 0.0.0.0:8000, 3 words per chunk, 500ms startup, 50ms between chunks
//! canned-stream-api
//!
//! # Stream a different text, faster
//! canned-stream-api --payload-file answer.txt --chunk-delay-ms 20
//!
//! # Environment variables work too
//! LISTEN_ADDR=127.0.0.1:9000 CHUNK_SIZE=5 canned-stream-api
//! ```

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use canned_stream_api::{
    config::{Config, LogFormat},
    handlers::AppState,
    payload::Payload,
    server,
    shutdown::ShutdownCoordinator,
};

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate()?;

    init_logging(&config)?;

    // Build the runtime with configured worker threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()?;

    runtime.block_on(run_server(config))
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let payload = Arc::new(Payload::load(config.payload_file.as_ref())?);
    let pacing = config.pacing();
    let chunk_count = payload.chunk_count(config.chunk_size);
    let stream_ms = pacing.total_duration(chunk_count).as_millis();

    info!(
        words = payload.word_count(),
        chunks = chunk_count,
        chunk_size = config.chunk_size.get(),
        startup_delay_ms = config.startup_delay_ms,
        chunk_delay_ms = config.chunk_delay_ms,
        stream_ms = u64::try_from(stream_ms).unwrap_or(u64::MAX),
        "Payload loaded"
    );

    let shutdown = ShutdownCoordinator::new();
    let state = Arc::new(AppState {
        payload,
        chunk_size: config.chunk_size,
        pacing,
        shutdown: shutdown.clone(),
    });
    let app = server::router(state);

    let tcp_listener = TcpListener::bind(&config.listen).await?;
    info!(
        listen = %config.listen,
        workers = config.worker_threads(),
        "Streaming LLM API listening"
    );

    let mut accept_tasks = vec![tokio::spawn(server::serve_tcp(
        tcp_listener,
        app.clone(),
        shutdown.clone(),
    ))];

    #[cfg(unix)]
    if let Some(socket_path) = &config.socket {
        let unix_listener = server::bind_unix(socket_path)?;
        info!(socket = %socket_path.display(), "Also listening on Unix socket");
        accept_tasks.push(tokio::spawn(server::serve_unix(
            unix_listener,
            app.clone(),
            shutdown.clone(),
        )));
    }

    tokio::spawn(handle_signals(shutdown.clone()));

    for task in accept_tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Accept loop task failed");
        }
    }

    info!(
        active = shutdown.active_streams(),
        timeout_secs = config.shutdown_timeout_secs,
        "Waiting for streams to drain"
    );

    match tokio::time::timeout(config.shutdown_timeout(), shutdown.wait_for_drain()).await {
        Ok(()) => info!("All streams drained"),
        Err(_) => tracing::warn!(
            active = shutdown.active_streams(),
            "Shutdown timeout reached, forcing exit"
        ),
    }

    #[cfg(unix)]
    if let Some(socket_path) = &config.socket {
        let _ = std::fs::remove_file(socket_path);
    }

    info!("Server stopped");
    Ok(())
}

/// Initialize logging with tracing.
fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = if config.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?
    };

    match config.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false))
                .init();
        }
    }

    Ok(())
}

/// Wait for SIGINT or SIGTERM, then signal shutdown.
async fn handle_signals(shutdown: ShutdownCoordinator) {
    match wait_for_signal().await {
        Ok(name) => {
            info!(signal = name, "Received signal, initiating shutdown");
            shutdown.shutdown();
        }
        Err(e) => tracing::error!(error = %e, "Failed to register signal handlers"),
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
}
