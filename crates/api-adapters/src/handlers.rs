//! # Handlers
//!
//! Each handler resolves the viewer from the session cookie, calls one
//! service and serialises the result. Permission filtering happens in the
//! services; nothing here inspects grants.

use crate::error::{ApiError, ApiResult};
use crate::extract::{removal_cookie, session_cookie, session_token, Viewer};
use crate::metrics::LoginOutcome;
use crate::SharedState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{
    CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, LOCATION,
};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use domains::{
    CommentFilter, CommentsView, Content, ContentType, DomainError, PageRequest, PageView, Paged,
    SearchFilter, Session,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::debug;

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// A view plus the logged-in user it was rendered for.
#[derive(Debug, Serialize)]
pub struct Rendered<T> {
    pub user: Option<Session>,
    #[serde(flatten)]
    pub view: T,
}

fn rendered<T>(viewer: Viewer, view: T) -> Json<Rendered<T>> {
    Json(Rendered {
        user: viewer.0,
        view,
    })
}

pub async fn index(State(state): State<SharedState>) -> impl IntoResponse {
    (StatusCode::FOUND, [(LOCATION, state.config.pages_url())])
}

pub async fn root_page(
    State(state): State<SharedState>,
    viewer: Viewer,
) -> ApiResult<Json<Rendered<PageView>>> {
    let view = state.tree.load_page("", viewer.id()).await?;
    Ok(rendered(viewer, view))
}

pub async fn page(
    State(state): State<SharedState>,
    viewer: Viewer,
    Path(hash): Path<String>,
) -> ApiResult<Json<Rendered<PageView>>> {
    let view = state.tree.load_page(&hash, viewer.id()).await?;
    Ok(rendered(viewer, view))
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentParams {
    pub search: Option<String>,
    pub user: Option<i64>,
    pub start: Option<String>,
    /// Present (any value) means oldest first
    pub oldest: Option<String>,
    pub page: Option<u32>,
}

pub async fn comments(
    State(state): State<SharedState>,
    viewer: Viewer,
    Path(hash): Path<String>,
    Query(params): Query<CommentParams>,
) -> ApiResult<Json<Rendered<CommentsView>>> {
    let filter = CommentFilter {
        text: params.search.unwrap_or_default(),
        user: params.user.unwrap_or(0),
        start: params.start.unwrap_or_default(),
        oldest: params.oldest.is_some(),
    };
    let page = PageRequest::new(params.page.unwrap_or(0), state.config.results_per_page);
    let view = state
        .search
        .load_comments(&hash, viewer.id(), &filter, page)
        .await?;
    Ok(rendered(viewer, view))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub search: Option<String>,
    pub user: Option<i64>,
    /// Comma-separated numeric content types to exclude
    pub ignoretypes: Option<String>,
    pub page: Option<u32>,
}

pub async fn search(
    State(state): State<SharedState>,
    viewer: Viewer,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Rendered<Paged<Content>>>> {
    let filter = SearchFilter {
        text: params.search.unwrap_or_default(),
        user: params.user.unwrap_or(0),
        ignore_types: parse_content_types(params.ignoretypes.as_deref().unwrap_or(""))?,
    };
    let page = PageRequest::new(params.page.unwrap_or(0), state.config.results_per_page);
    let results = state.search.search(&filter, viewer.id(), page).await?;
    Ok(rendered(viewer, results))
}

fn parse_content_types(raw: &str) -> ApiResult<Vec<ContentType>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .map(ContentType::from_i64)
                .map_err(|_| ApiError::bad_request(format!("invalid content type {part:?}")))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "return")]
    pub return_to: String,
}

pub async fn login(
    State(state): State<SharedState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> ApiResult<(CookieJar, Redirect)> {
    let user = match state.auth.login(&form.username, &form.password).await {
        Ok(user) => {
            state.metrics.login(LoginOutcome::Ok);
            user
        }
        Err(err) => {
            if matches!(err, DomainError::Unauthorized | DomainError::BadRequest(_)) {
                state.metrics.login(LoginOutcome::Failed);
            }
            return Err(err.into());
        }
    };

    let token = state.auth.create_session(&user).map_err(|err| {
        if matches!(err, DomainError::CapacityExceeded(_)) {
            state.metrics.session_rejected();
        }
        ApiError(err)
    })?;

    let cookie = session_cookie(&state.config.login_cookie, &token, state.config.login_expiry);
    let fallback = state.config.pages_url();
    Ok((jar.add(cookie), Redirect::to(safe_return(&form.return_to, &fallback))))
}

#[derive(Debug, Deserialize)]
pub struct LogoutForm {
    #[serde(default, rename = "return")]
    pub return_to: String,
}

pub async fn logout(
    State(state): State<SharedState>,
    jar: CookieJar,
    Form(form): Form<LogoutForm>,
) -> (CookieJar, Redirect) {
    if let Some(token) = session_token(&jar, &state.config.login_cookie) {
        state.auth.destroy_session(token);
    }
    let fallback = state.config.pages_url();
    (
        jar.add(removal_cookie(&state.config.login_cookie)),
        Redirect::to(safe_return(&form.return_to, &fallback)),
    )
}

/// Only same-site absolute paths are followed after login/logout.
fn safe_return<'a>(raw: &'a str, fallback: &'a str) -> &'a str {
    if raw.starts_with('/') && !raw.starts_with("//") && !raw.contains('\\') {
        raw
    } else {
        fallback
    }
}

pub async fn thumbnail(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let thumb = state.thumbnails.get_or_create(&key).await?;
    state.metrics.thumbnail_served(thumb.generated);

    let etag = state.thumbnails.etag(&key);
    let last_modified = state.thumbnails.last_modified();
    let validators = [
        (ETAG, etag.clone()),
        (LAST_MODIFIED, last_modified.format(HTTP_DATE).to_string()),
    ];

    if not_modified(&headers, &etag, last_modified) {
        debug!(key, "thumbnail not modified");
        return Ok((StatusCode::NOT_MODIFIED, validators).into_response());
    }

    Ok((
        [
            (CONTENT_TYPE, mime::IMAGE_JPEG.to_string()),
            (CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        validators,
        Body::from_stream(ReaderStream::new(thumb.file)),
    )
        .into_response())
}

/// `If-None-Match` wins over `If-Modified-Since` when both are sent.
fn not_modified(headers: &HeaderMap, etag: &str, last_modified: DateTime<Utc>) -> bool {
    if let Some(candidates) = headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        return candidates
            .split(',')
            .map(|tag| tag.trim().trim_start_matches("W/"))
            .any(|tag| tag == "*" || tag == etag);
    }
    headers
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .is_some_and(|since| last_modified.timestamp() <= since.timestamp())
}

pub async fn metrics(State(state): State<SharedState>) -> ApiResult<Response> {
    let body = state.metrics.render()?;
    Ok((
        [(
            CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    )
        .into_response())
}

pub async fn robots() -> &'static str {
    "User-agent: *\nDisallow: /\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::TimeZone;

    #[test]
    fn test_content_types_parsed() {
        let types = parse_content_types(" 3, 2,,5 ").unwrap();
        assert_eq!(types, [ContentType::File, ContentType::Module, ContentType::System]);
        assert!(parse_content_types("").unwrap().is_empty());
        assert!(parse_content_types("3,x").is_err());
    }

    #[test]
    fn test_return_must_be_local_path() {
        let fallback = "/canopy/pages";
        assert_eq!(safe_return("/pages/abc", fallback), "/pages/abc");
        assert_eq!(safe_return("", fallback), fallback);
        assert_eq!(safe_return("https://evil.example", fallback), fallback);
        assert_eq!(safe_return("//evil.example", fallback), fallback);
        assert_eq!(safe_return("/\\evil.example", fallback), fallback);
    }

    #[test]
    fn test_conditional_headers() {
        let lm = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let etag = "\"1714564800-cat\"";

        let mut headers = HeaderMap::new();
        assert!(!not_modified(&headers, etag, lm));

        headers.insert(IF_MODIFIED_SINCE, HeaderValue::from_static("Wed, 01 May 2024 12:00:00 GMT"));
        assert!(not_modified(&headers, etag, lm));

        headers.insert(IF_MODIFIED_SINCE, HeaderValue::from_static("Tue, 30 Apr 2024 12:00:00 GMT"));
        assert!(!not_modified(&headers, etag, lm));

        // a mismatched etag overrides a satisfied date
        headers.insert(IF_MODIFIED_SINCE, HeaderValue::from_static("Wed, 01 May 2024 12:00:00 GMT"));
        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("\"other\""));
        assert!(!not_modified(&headers, etag, lm));

        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("\"a\", W/\"1714564800-cat\""));
        assert!(not_modified(&headers, etag, lm));
    }
}
