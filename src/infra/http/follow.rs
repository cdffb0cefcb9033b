use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    application::follows::FollowError,
    presentation::views::{
        FeedContext, FollowTemplate, LayoutContext, PostListContext, ViewerView, profile_href,
        render_not_found_response, render_template_response,
    },
};

use super::{
    HttpState, found, forms::PageQuery, posts::post_error_response, repo_error_to_http,
    session::RequireUser,
};

pub(super) async fn follow_index(
    State(state): State<HttpState>,
    user: RequireUser,
    Query(query): Query<PageQuery>,
) -> Response {
    match state
        .posts
        .follow_feed(user.0.user_id, query.page.as_deref())
        .await
    {
        Ok(page) => {
            let content = FeedContext {
                listing: PostListContext::from_page(page),
            };
            let view = LayoutContext::new("Subscriptions", user.viewer(), content);
            render_template_response(FollowTemplate { view }, StatusCode::OK)
        }
        Err(err) => post_error_response("infra::http::follow::follow_index", err, user.viewer()),
    }
}

pub(super) async fn profile_follow(
    State(state): State<HttpState>,
    user: RequireUser,
    Path(username): Path<String>,
) -> Response {
    let result = state.follows.follow(user.0.user_id, &username).await;
    follow_result_response("infra::http::follow::profile_follow", result, &username, user.viewer())
}

pub(super) async fn profile_unfollow(
    State(state): State<HttpState>,
    user: RequireUser,
    Path(username): Path<String>,
) -> Response {
    let result = state.follows.unfollow(user.0.user_id, &username).await;
    follow_result_response(
        "infra::http::follow::profile_unfollow",
        result,
        &username,
        user.viewer(),
    )
}

fn follow_result_response<T>(
    source: &'static str,
    result: Result<T, FollowError>,
    username: &str,
    viewer: Option<ViewerView>,
) -> Response {
    match result {
        Ok(_) => found(&profile_href(username)),
        Err(FollowError::AuthorNotFound) => render_not_found_response(viewer),
        Err(FollowError::Repo(err)) => repo_error_to_http(source, err).into_response(),
    }
}
