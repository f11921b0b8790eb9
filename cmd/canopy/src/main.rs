//! # Canopy
//!
//! Read-only web front end for a hierarchical content database. Wires the
//! SQLite executor, Argon2 digest, session store and thumbnail cache into
//! the axum router, then serves until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use api_adapters::{router, AppState, Metrics, WebConfig};
use auth_adapters::Argon2Digest;
use configs::{LogFormat, Settings};
use domains::SqlExecutor;
use secrecy::ExposeSecret;
use services::{AuthService, ContentTreeResolver, SearchEngine, SessionStore};
use std::sync::Arc;
use storage_adapters::{SqliteExecutor, ThumbnailCache, ThumbnailConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    init_tracing(settings.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), "starting canopy");

    let db = SqliteExecutor::connect(
        settings.database_url.expose_secret(),
        settings.max_connections,
    )
    .await?;
    let db: Arc<dyn SqlExecutor> = Arc::new(db);

    let thumbnails = ThumbnailCache::new(ThumbnailConfig {
        uploads_dir: settings.uploads_dir.clone(),
        thumbnail_dir: settings.thumbnail_dir.clone(),
        size: settings.thumbnail_size,
        jpeg_quality: settings.thumbnail_jpeg_quality,
    })?;
    info!(dir = ?settings.thumbnail_dir, "thumbnail cache ready");

    let sessions = Arc::new(SessionStore::new(
        settings.login_expiry(),
        settings.max_sessions,
    ));
    let tree = ContentTreeResolver::new(Arc::clone(&db));
    let state = Arc::new(AppState {
        auth: AuthService::new(Arc::clone(&db), Arc::new(Argon2Digest::default()), sessions),
        search: SearchEngine::new(db, tree.clone()),
        tree,
        thumbnails: Arc::new(thumbnails),
        metrics: Metrics::new(),
        config: WebConfig {
            login_cookie: settings.login_cookie.clone(),
            login_expiry: settings.login_expiry(),
            results_per_page: settings.results_per_page,
            static_dir: settings.static_dir.clone(),
            uploads_dir: settings.uploads_dir.clone(),
            request_timeout: settings.request_timeout(),
            root_path: settings.root_path.clone(),
            max_header_bytes: settings.max_header_bytes,
        },
    });
    info!(static_dir = ?settings.static_dir, uploads_dir = ?settings.uploads_dir, "hosting files");

    let listener = tokio::net::TcpListener::bind(&settings.address)
        .await
        .with_context(|| format!("Failed to bind {}", settings.address))?;
    info!(address = %settings.address, "listening");

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router(state))
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        joined = &mut server => {
            joined.context("server task panicked")?.context("server error")?;
            return Ok(());
        }
        () = shutdown_signal() => info!("shutdown signal received"),
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(settings.shutdown_timeout(), server).await {
        Ok(joined) => joined.context("server task panicked")?.context("server error")?,
        Err(_) => warn!(
            timeout_secs = settings.shutdown_timeout_secs,
            "in-flight requests did not finish, exiting anyway"
        ),
    }
    info!("stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "couldn't listen for ctrl-c");
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
                warn!(error = %e, "couldn't listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
