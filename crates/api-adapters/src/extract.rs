//! Session cookie handling.

use crate::SharedState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use domains::Session;
use std::convert::Infallible;
use std::time::Duration;

/// The logged-in session, if the request carries a live session cookie.
/// Never rejects: a missing, unknown or expired token is just anonymous.
#[derive(Debug, Clone)]
pub struct Viewer(pub Option<Session>);

impl Viewer {
    /// User id for permission checks; 0 is anonymous.
    pub fn id(&self) -> i64 {
        self.0.as_ref().map_or(0, |session| session.user_id)
    }
}

impl FromRequestParts<SharedState> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let session = session_token(&jar, &state.config.login_cookie)
            .and_then(|token| state.auth.resolve_user(token));
        Ok(Viewer(session))
    }
}

/// The session token in `jar`, if present and non-empty.
pub fn session_token<'j>(jar: &'j CookieJar, name: &str) -> Option<&'j str> {
    jar.get(name)
        .map(Cookie::value)
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(name: &str, token: &str, max_age: Duration) -> Cookie<'static> {
    let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
    base_cookie(name.to_string(), token.to_string())
        .max_age(cookie::time::Duration::seconds(max_age))
        .build()
}

/// Same name and path as [`session_cookie`], already expired.
pub fn removal_cookie(name: &str) -> Cookie<'static> {
    let mut removal = base_cookie(name.to_string(), String::new()).build();
    removal.make_removal();
    removal
}

fn base_cookie(name: String, value: String) -> cookie::CookieBuilder<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
}
