use std::{io::ErrorKind, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use tracing::error;

use crate::{
    application::{
        auth::AuthService, comments::CommentService, error::HttpError, follows::FollowService,
        posts::PostService, repos::HealthProbe,
    },
    infra::uploads::{UploadStorage, UploadStorageError},
    presentation::views::render_not_found_response,
};

use super::{
    auth, db_health_response, follow,
    middleware::{log_responses, set_request_context},
    posts,
    session::{CurrentUser, resolve_identity},
};

#[derive(Clone)]
pub struct HttpState {
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub follows: Arc<FollowService>,
    pub auth: Arc<AuthService>,
    pub upload_storage: Arc<UploadStorage>,
    pub health: Arc<dyn HealthProbe>,
    /// Mark the session cookie `Secure`.
    pub secure_cookies: bool,
    pub upload_limit_bytes: usize,
}

pub fn build_router(state: HttpState) -> Router {
    let upload_limit = state.upload_limit_bytes;

    let pages = Router::new()
        .route("/", get(posts::index))
        .route("/group/{slug}/", get(posts::group_posts))
        .route("/profile/{username}/", get(posts::profile))
        .route("/posts/{post_id}/", get(posts::post_detail))
        .route(
            "/create/",
            get(posts::post_create_form).post(posts::post_create),
        )
        .route(
            "/posts/{post_id}/edit/",
            get(posts::post_edit_form).post(posts::post_edit),
        )
        .route(
            "/posts/{post_id}/comment/",
            axum::routing::post(posts::add_comment),
        )
        .route("/follow/", get(follow::follow_index))
        .route(
            "/profile/{username}/follow/",
            get(follow::profile_follow).post(follow::profile_follow),
        )
        .route(
            "/profile/{username}/unfollow/",
            get(follow::profile_unfollow).post(follow::profile_unfollow),
        )
        .route("/auth/signup/", get(auth::signup_form).post(auth::signup))
        .route("/auth/login/", get(auth::login_form).post(auth::login))
        .route("/auth/logout/", get(auth::logout).post(auth::logout))
        .route("/media/{*path}", get(serve_media))
        .route("/_health/db", get(db_health))
        .fallback(fallback);

    pages
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            resolve_identity,
        ))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn fallback(user: CurrentUser) -> Response {
    render_not_found_response(user.viewer())
}

async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::routes::serve_media";

    match state.upload_storage.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(UploadStorageError::InvalidPath) => media_not_found(SOURCE),
        Err(UploadStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            media_not_found(SOURCE)
        }
        Err(err) => {
            error!(
                target: "yatube::http::media",
                path = %path,
                error = %err,
                "failed to read stored image"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read stored image",
                err.to_string(),
            )
            .into_response()
        }
    }
}

fn media_not_found(source: &'static str) -> Response {
    HttpError::new(
        source,
        StatusCode::NOT_FOUND,
        "Image not found",
        "The requested image is not available",
    )
    .into_response()
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
