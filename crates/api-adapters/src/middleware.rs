//! Layers applied around the whole router: request logging, per-request
//! timeouts, permissive CORS and a cap on request header size. Also the
//! long-cached file services for `/static` and `/uploads`.

use axum::extract::{Request, State};
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::path::Path;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeader;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{warn, Level};

/// Six months; uploaded and static files never change in place.
pub const STATIC_CACHE_CONTROL: &str = "public, max-age=15552000";

pub fn standard_layers(app: Router, timeout: Duration, max_header_bytes: usize) -> Router {
    app.layer(TimeoutLayer::new(timeout))
        .layer(from_fn_with_state(max_header_bytes, limit_header_size))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

pub fn static_files(dir: &Path) -> SetResponseHeader<ServeDir, HeaderValue> {
    SetResponseHeader::overriding(
        ServeDir::new(dir),
        CACHE_CONTROL,
        HeaderValue::from_static(STATIC_CACHE_CONTROL),
    )
}

/// Rejects requests whose target plus header names and values exceed
/// `limit` bytes.
async fn limit_header_size(State(limit): State<usize>, request: Request, next: Next) -> Response {
    let size = request.uri().to_string().len()
        + request
            .headers()
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum::<usize>();
    if size > limit {
        warn!(size, limit, "request headers too large");
        return StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE.into_response();
    }
    next.run(request).await
}
