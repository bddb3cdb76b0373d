use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use axum::Router;
use axum_server::{Handle, tls_rustls::RustlsConfig};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

/// How often the stop file is checked.
const STOP_FILE_POLL: Duration = Duration::from_secs(1);
/// Time in-flight requests get to finish once shutdown starts.
const GRACE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to load TLS certificate {cert:?} / key {key:?}: {source}")]
    Tls {
        cert: PathBuf,
        key: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// run
///
/// Serves `app` over TLS on the configured port until `shutdown` is cancelled, then
/// drains in-flight requests and returns.
pub async fn run(app: Router, config: &AppConfig, shutdown: CancellationToken) -> Result<(), ServerError> {
    let tls = RustlsConfig::from_pem_file(&config.tls_cert_path, &config.tls_key_path)
        .await
        .map_err(|source| ServerError::Tls {
            cert: config.tls_cert_path.clone(),
            key: config.tls_key_path.clone(),
            source,
        })?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let handle = Handle::new();

    tokio::spawn(watch_stop_file(config.stop_file.clone(), shutdown.clone()));
    tokio::spawn(shutdown_on_signal(shutdown.clone()));
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown.cancelled().await;
            tracing::info!("Shutting down server...");
            handle.graceful_shutdown(Some(GRACE_PERIOD));
        }
    });

    let started = Instant::now();
    tracing::info!("Listening on https://{addr}");
    tracing::info!("API Documentation (Swagger UI) available at: https://localhost:{}/swagger-ui", config.port);

    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    tracing::info!(uptime_secs = started.elapsed().as_secs(), "Server stopped");
    Ok(())
}

/// Cancels `shutdown` on Ctrl-C or SIGTERM.
async fn shutdown_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}

/// watch_stop_file
///
/// Polls for `path` once a second and cancels `shutdown` when it appears. The file is
/// removed so the next start is not stopped immediately.
pub async fn watch_stop_file(path: PathBuf, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(STOP_FILE_POLL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                if stop_requested(&path).await {
                    tracing::info!(path = %path.display(), "Stop file detected");
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        tracing::warn!(error = %e, "failed to remove stop file");
                    }
                    shutdown.cancel();
                    return;
                }
            }
        }
    }
}

async fn stop_requested(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_file_cancels_the_token() {
        let dir = std::env::temp_dir().join(format!("devices-api-stop-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let stop_file = dir.join("stop");

        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn(watch_stop_file(stop_file.clone(), shutdown.clone()));

        tokio::fs::write(&stop_file, b"").await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), shutdown.cancelled())
            .await
            .expect("stop file was not detected");

        watcher.await.unwrap();
        assert!(!stop_file.exists());
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn watcher_exits_when_cancelled_elsewhere() {
        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn(watch_stop_file(
            PathBuf::from("/nonexistent/devices-api/stop"),
            shutdown.clone(),
        ));
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), watcher).await.unwrap().unwrap();
    }
}
