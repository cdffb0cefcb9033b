//! Post pages: listings, detail, create, edit and comments.

use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{
    Multipart,
    multipart::{MultipartError, MultipartRejection},
};

use crate::{
    application::{
        auth::Identity,
        comments::CommentError,
        error::HttpError,
        posts::{EditAccess, PostError},
    },
    domain::{entities::GroupRecord, posts::PostInput, validation::FieldErrors},
    presentation::views::{
        CommentView, FeedContext, GroupListContext, GroupListTemplate, GroupOption,
        IndexTemplate, LayoutContext, PostCard, PostDetailContext, PostDetailTemplate,
        PostFormContext, PostFormErrors, PostFormTemplate, PostListContext, ProfileContext,
        ProfileTemplate, ViewerView, media_href, post_href, profile_href,
        render_not_found_response, render_template_response,
    },
};

use super::{
    HttpState, found,
    forms::{CommentForm, PageQuery, read_post_form},
    repo_error_to_http,
    session::{CurrentUser, RequireUser},
};

pub(super) async fn index(
    State(state): State<HttpState>,
    user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> Response {
    match state.posts.index(query.page.as_deref()).await {
        Ok(page) => {
            let content = FeedContext {
                listing: PostListContext::from_page(page),
            };
            let view = LayoutContext::new("Latest posts", user.viewer(), content);
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => post_error_response("infra::http::posts::index", err, user.viewer()),
    }
}

pub(super) async fn group_posts(
    State(state): State<HttpState>,
    user: CurrentUser,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    match state.posts.group_feed(&slug, query.page.as_deref()).await {
        Ok((group, page)) => {
            let content = GroupListContext {
                title: group.title.clone(),
                slug: group.slug,
                description: group.description,
                listing: PostListContext::from_page(page),
            };
            let view = LayoutContext::new(group.title, user.viewer(), content);
            render_template_response(GroupListTemplate { view }, StatusCode::OK)
        }
        Err(err) => post_error_response("infra::http::posts::group_posts", err, user.viewer()),
    }
}

pub(super) async fn profile(
    State(state): State<HttpState>,
    user: CurrentUser,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    const SOURCE: &str = "infra::http::posts::profile";

    let (author, page) = match state.posts.profile(&username, query.page.as_deref()).await {
        Ok(result) => result,
        Err(err) => return post_error_response(SOURCE, err, user.viewer()),
    };

    let viewer_id = user.user_id();
    let show_follow_controls = viewer_id.is_some_and(|id| id != author.id);
    let following = match viewer_id {
        Some(viewer_id) if show_follow_controls => {
            match state.follows.is_following(viewer_id, author.id).await {
                Ok(following) => following,
                Err(err) => {
                    return HttpError::from_error(
                        SOURCE,
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to load profile",
                        &err,
                    )
                    .into_response();
                }
            }
        }
        _ => false,
    };

    let content = ProfileContext {
        follow_href: format!("/profile/{}/follow/", author.username),
        unfollow_href: format!("/profile/{}/unfollow/", author.username),
        post_count: page.total,
        following,
        show_follow_controls,
        listing: PostListContext::from_page(page),
        username: author.username,
    };
    let title = format!("Profile of {}", content.username);
    let view = LayoutContext::new(title, user.viewer(), content);
    render_template_response(ProfileTemplate { view }, StatusCode::OK)
}

pub(super) async fn post_detail(
    State(state): State<HttpState>,
    user: CurrentUser,
    Path(raw_id): Path<String>,
) -> Response {
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(user.viewer());
    };

    match state.posts.detail(post_id).await {
        Ok(detail) => {
            let title = format!("Post {}", detail.post.post.preview());
            let can_edit = user.user_id() == Some(detail.post.post.author_id);
            let content = PostDetailContext {
                post: PostCard::from_record(detail.post),
                author_post_count: detail.author_post_count,
                comments: detail
                    .comments
                    .into_iter()
                    .map(CommentView::from_record)
                    .collect(),
                can_edit,
                edit_href: format!("/posts/{post_id}/edit/"),
                can_comment: user.0.is_some(),
                comment_action: format!("/posts/{post_id}/comment/"),
            };
            let view = LayoutContext::new(title, user.viewer(), content);
            render_template_response(PostDetailTemplate { view }, StatusCode::OK)
        }
        Err(err) => post_error_response("infra::http::posts::post_detail", err, user.viewer()),
    }
}

pub(super) async fn post_create_form(
    State(state): State<HttpState>,
    user: RequireUser,
) -> Response {
    let form = PostForm {
        is_edit: false,
        action: "/create/".to_string(),
        input: &PostInput::default(),
        current_image: None,
        errors: &FieldErrors::new(),
    };
    render_post_form(&state, user.viewer(), form).await
}

pub(super) async fn post_create(
    State(state): State<HttpState>,
    user: RequireUser,
    multipart: Multipart,
) -> Response {
    const SOURCE: &str = "infra::http::posts::post_create";

    let submission = match read_post_form(multipart).await {
        Ok(submission) => submission,
        Err(err) => return multipart_error_response(SOURCE, err),
    };
    let RequireUser(Identity { user_id, username }) = &user;

    match state
        .posts
        .create(*user_id, &submission.input, submission.image)
        .await
    {
        Ok(_) => found(&profile_href(username)),
        Err(PostError::Invalid(errors)) => {
            let form = PostForm {
                is_edit: false,
                action: "/create/".to_string(),
                input: &submission.input,
                current_image: None,
                errors: &errors,
            };
            render_post_form(&state, user.viewer(), form).await
        }
        Err(err) => post_error_response(SOURCE, err, user.viewer()),
    }
}

pub(super) async fn post_edit_form(
    State(state): State<HttpState>,
    user: RequireUser,
    Path(raw_id): Path<String>,
) -> Response {
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(user.viewer());
    };

    let record = match state.posts.edit_access(user.0.user_id, post_id).await {
        Ok(EditAccess::Allowed(record)) => record,
        Ok(EditAccess::Denied) => return found(&post_href(post_id)),
        Ok(EditAccess::NotFound) => return render_not_found_response(user.viewer()),
        Err(err) => {
            return post_error_response("infra::http::posts::post_edit_form", err, user.viewer());
        }
    };

    let input = PostInput {
        text: record.post.text.clone(),
        group: record
            .post
            .group_id
            .map(|id| id.to_string())
            .unwrap_or_default(),
    };
    let form = PostForm {
        is_edit: true,
        action: format!("/posts/{post_id}/edit/"),
        input: &input,
        current_image: record.post.image.as_deref(),
        errors: &FieldErrors::new(),
    };
    render_post_form(&state, user.viewer(), form).await
}

pub(super) async fn post_edit(
    State(state): State<HttpState>,
    user: RequireUser,
    Path(raw_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    const SOURCE: &str = "infra::http::posts::post_edit";

    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(user.viewer());
    };

    let record = match state.posts.edit_access(user.0.user_id, post_id).await {
        Ok(EditAccess::Allowed(record)) => record,
        Ok(EditAccess::Denied) => return found(&post_href(post_id)),
        Ok(EditAccess::NotFound) => return render_not_found_response(user.viewer()),
        Err(err) => return post_error_response(SOURCE, err, user.viewer()),
    };

    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => return rejected_body_response(SOURCE, rejection),
    };
    let mut submission = match read_post_form(multipart).await {
        Ok(submission) => submission,
        Err(err) => return multipart_error_response(SOURCE, err),
    };
    let image = submission.image_change();

    match state
        .posts
        .update(&record.post, &submission.input, image)
        .await
    {
        Ok(_) => found(&post_href(post_id)),
        Err(PostError::Invalid(errors)) => {
            let form = PostForm {
                is_edit: true,
                action: format!("/posts/{post_id}/edit/"),
                input: &submission.input,
                current_image: record.post.image.as_deref(),
                errors: &errors,
            };
            render_post_form(&state, user.viewer(), form).await
        }
        Err(err) => post_error_response(SOURCE, err, user.viewer()),
    }
}

pub(super) async fn add_comment(
    State(state): State<HttpState>,
    user: RequireUser,
    Path(raw_id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Response {
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(user.viewer());
    };

    match state
        .comments
        .add(post_id, user.0.user_id, &form.text)
        .await
    {
        Ok(_) | Err(CommentError::Invalid(_)) => found(&post_href(post_id)),
        Err(CommentError::PostNotFound) => render_not_found_response(user.viewer()),
        Err(CommentError::Repo(err)) => {
            repo_error_to_http("infra::http::posts::add_comment", err).into_response()
        }
    }
}

/// Values needed to render the create/edit form.
struct PostForm<'a> {
    is_edit: bool,
    action: String,
    input: &'a PostInput,
    current_image: Option<&'a str>,
    errors: &'a FieldErrors,
}

async fn render_post_form(
    state: &HttpState,
    viewer: Option<ViewerView>,
    form: PostForm<'_>,
) -> Response {
    let groups = match state.posts.group_choices().await {
        Ok(groups) => groups,
        Err(err) => return post_error_response("infra::http::posts::render_post_form", err, viewer),
    };

    let title = if form.is_edit { "Edit post" } else { "New post" };
    let content = post_form_context(form, groups);
    let view = LayoutContext::new(title, viewer, content);
    render_template_response(PostFormTemplate { view }, StatusCode::OK)
}

fn post_form_context(form: PostForm<'_>, groups: Vec<GroupRecord>) -> PostFormContext {
    let selected = form.input.group.trim();
    let groups: Vec<GroupOption> = groups
        .into_iter()
        .map(|group| GroupOption {
            selected: group.id.to_string() == selected,
            id: group.id,
            title: group.title,
        })
        .collect();

    PostFormContext {
        is_edit: form.is_edit,
        action: form.action,
        text: form.input.text.clone(),
        no_group_selected: !groups.iter().any(|group| group.selected),
        groups,
        current_image: form.current_image.map(media_href),
        errors: PostFormErrors {
            text: form.errors.messages("text"),
            group: form.errors.messages("group"),
            image: form.errors.messages("image"),
        },
    }
}

fn parse_post_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

pub(super) fn post_error_response(
    source: &'static str,
    err: PostError,
    viewer: Option<ViewerView>,
) -> Response {
    match err {
        PostError::NotFound => render_not_found_response(viewer),
        PostError::Repo(err) => repo_error_to_http(source, err).into_response(),
        PostError::Storage(err) => {
            let status = if err.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            HttpError::from_error(source, status, "Failed to store image", &err).into_response()
        }
        PostError::Invalid(errors) => HttpError::new(
            source,
            StatusCode::BAD_REQUEST,
            "Invalid post",
            errors.to_string(),
        )
        .into_response(),
    }
}

fn rejected_body_response(source: &'static str, rejection: MultipartRejection) -> Response {
    HttpError::new(
        source,
        rejection.status(),
        "Invalid form submission",
        rejection.body_text(),
    )
    .into_response()
}

fn multipart_error_response(source: &'static str, err: MultipartError) -> Response {
    let status = err.status();
    HttpError::from_error(source, status, "Invalid form submission", &err).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: i64, title: &str) -> GroupRecord {
        GroupRecord {
            id,
            title: title.to_string(),
            slug: title.to_lowercase(),
            description: String::new(),
        }
    }

    #[test]
    fn post_ids_must_be_positive_integers() {
        assert_eq!(parse_post_id("12"), Some(12));
        assert_eq!(parse_post_id("0"), None);
        assert_eq!(parse_post_id("abc"), None);
        assert_eq!(parse_post_id("1.5"), None);
    }

    #[test]
    fn form_context_marks_selected_group() {
        let input = PostInput {
            text: "draft".to_string(),
            group: "2".to_string(),
        };
        let errors = FieldErrors::single("text", "bad");
        let context = post_form_context(
            PostForm {
                is_edit: true,
                action: "/posts/1/edit/".to_string(),
                input: &input,
                current_image: Some("posts/a.gif"),
                errors: &errors,
            },
            vec![group(1, "Cats"), group(2, "Dogs")],
        );

        assert!(!context.no_group_selected);
        assert!(!context.groups[0].selected);
        assert!(context.groups[1].selected);
        assert_eq!(context.current_image.as_deref(), Some("/media/posts/a.gif"));
        assert_eq!(context.errors.text, vec!["bad".to_string()]);
    }
}
