//! Routing and connection handling.
//!
//! One accept loop per listener. Each accepted connection is served by
//! hyper-util's auto builder, so plain HTTP/1.1 clients and h2c clients
//! share the same router.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tower_http::cors::CorsLayer;

use crate::handlers::{self, AppState};
use crate::shutdown::ShutdownCoordinator;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/generate", post(handlers::generate))
        .route("/health", get(handlers::health))
        .layer(cors_layer())
        .with_state(state)
}

/// Any origin, method and header, with credentials allowed.
///
/// Credentials cannot be combined with a `*` wildcard, so the request's own
/// origin, method and headers are mirrored back instead.
fn cors_layer() -> CorsLayer {
    CorsLayer::very_permissive()
}

/// Accept TCP connections until shutdown is signaled.
pub async fn serve_tcp(listener: TcpListener, app: Router, shutdown: ShutdownCoordinator) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.signaled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept TCP connection");
                // Brief backoff on error to avoid busy loop
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        // Nagle would hold small SSE frames back
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        tracing::trace!(%peer, "Accepted TCP connection");
        tokio::spawn(serve_connection(stream, app.clone()));
    }

    tracing::info!("TCP accept loop stopped");
}

/// Bind a Unix socket, replacing a stale socket file.
#[cfg(unix)]
pub fn bind_unix(path: &std::path::Path) -> crate::Result<UnixListener> {
    use std::os::unix::fs::PermissionsExt;

    // Remove existing socket file if it exists
    let _ = std::fs::remove_file(path);

    let listener = UnixListener::bind(path)?;
    // Allow other processes to connect
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))?;
    Ok(listener)
}

/// Accept Unix socket connections until shutdown is signaled.
#[cfg(unix)]
pub async fn serve_unix(listener: UnixListener, app: Router, shutdown: ShutdownCoordinator) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.signaled() => break,
            accepted = listener.accept() => accepted,
        };

        let stream = match accepted {
            Ok((stream, _)) => stream,
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept Unix connection");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        tokio::spawn(serve_connection(stream, app.clone()));
    }

    tracing::info!("Unix accept loop stopped");
}

async fn serve_connection<I>(io: I, app: Router)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = TowerToHyperService::new(app);
    let builder = auto::Builder::new(TokioExecutor::new());

    if let Err(e) = builder.serve_connection(TokioIo::new(io), service).await {
        // Clients hanging up mid-stream are routine
        tracing::debug!(error = %e, "Connection closed with error");
    }
}
