//! # api-adapters
//!
//! The HTTP surface: an axum router over the Canopy services. Views are
//! served as JSON; errors go through one status table in [`error`].

pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod middleware;

use axum::routing::{get, post};
use axum::Router;
use services::{AuthService, ContentTreeResolver, SearchEngine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storage_adapters::ThumbnailCache;

pub use error::ApiError;
pub use metrics::Metrics;

/// Settings the handlers read per request.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub login_cookie: String,
    pub login_expiry: Duration,
    pub results_per_page: u32,
    pub static_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub request_timeout: Duration,
    /// URL prefix when hosted behind a reverse proxy; empty at the root
    pub root_path: String,
    /// Largest total size of request headers accepted
    pub max_header_bytes: usize,
}

impl WebConfig {
    /// Where `/` and unsafe login/logout returns redirect to.
    pub fn pages_url(&self) -> String {
        format!("{}/pages", self.root_path.trim_end_matches('/'))
    }
}

/// Shared by every request.
pub struct AppState {
    pub auth: AuthService,
    pub tree: ContentTreeResolver,
    pub search: SearchEngine,
    pub thumbnails: Arc<ThumbnailCache>,
    pub metrics: Metrics,
    pub config: WebConfig,
}

pub type SharedState = Arc<AppState>;

/// Builds the full application router.
pub fn router(state: SharedState) -> Router {
    let static_files = middleware::static_files(&state.config.static_dir);
    let uploads = middleware::static_files(&state.config.uploads_dir);
    let timeout = state.config.request_timeout;
    let header_limit = state.config.max_header_bytes;

    let app = Router::new()
        .route("/", get(handlers::index))
        .route("/pages", get(handlers::root_page))
        .route("/pages/{hash}", get(handlers::page))
        .route("/comments/{hash}", get(handlers::comments))
        .route("/search", get(handlers::search))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/thumbnails/{key}", get(handlers::thumbnail))
        .route("/metrics", get(handlers::metrics))
        .route("/robots.txt", get(handlers::robots))
        .nest_service("/static", static_files)
        .nest_service("/uploads", uploads)
        .with_state(state);

    middleware::standard_layers(app, timeout, header_limit)
}
