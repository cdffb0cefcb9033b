//! Session cookie handling and the extractors that expose the signed-in user.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::OffsetDateTime;
use tracing::debug;
use url::form_urlencoded;

use crate::application::auth::{Identity, SessionAuthError};
use crate::presentation::views::ViewerView;

use super::{HttpState, found, middleware::record_user};

pub const SESSION_COOKIE: &str = "yatube_session";
pub const LOGIN_PATH: &str = "/auth/login/";

/// Resolve the session cookie into an [`Identity`] stored in request extensions.
pub async fn resolve_identity(
    State(state): State<HttpState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        match state.auth.authenticate(cookie.value()).await {
            Ok(identity) => {
                record_user(identity.user_id);
                request.extensions_mut().insert(identity);
            }
            Err(SessionAuthError::Expired) => {
                debug!(target: "yatube::http::session", "session cookie expired")
            }
            Err(SessionAuthError::Invalid) => {
                debug!(target: "yatube::http::session", "session cookie rejected")
            }
        }
    }

    next.run(request).await
}

/// The signed-in user, if any.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<Identity>);

impl CurrentUser {
    pub fn viewer(&self) -> Option<ViewerView> {
        self.0.as_ref().map(viewer_view)
    }

    pub fn user_id(&self) -> Option<i64> {
        self.0.as_ref().map(|identity| identity.user_id)
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Identity>().cloned()))
    }
}

/// The signed-in user. Anonymous requests are redirected to the login page.
#[derive(Debug, Clone)]
pub struct RequireUser(pub Identity);

impl RequireUser {
    pub fn viewer(&self) -> Option<ViewerView> {
        Some(viewer_view(&self.0))
    }
}

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Identity>() {
            Some(identity) => Ok(Self(identity.clone())),
            None => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|value| value.as_str())
                    .unwrap_or("/");
                Err(found(&login_url(next)).into_response())
            }
        }
    }
}

fn viewer_view(identity: &Identity) -> ViewerView {
    ViewerView {
        username: identity.username.clone(),
    }
}

/// `/auth/login/?next=...` with `next` percent-encoded, keeping `/` readable.
pub fn login_url(next: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(next.as_bytes()).collect();
    format!("{LOGIN_PATH}?next={}", encoded.replace("%2F", "/"))
}

/// Only same-site absolute paths are followed after login.
pub fn safe_next(next: Option<&str>) -> &str {
    match next.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/",
    }
}

pub fn session_cookie(token: String, expires_at: OffsetDateTime, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .expires(expires_at)
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}
