use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::Page;
use crate::application::repos::{CommentListRecord, PostListRecord};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description};

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(viewer: Option<ViewerView>) -> Response {
    let view = LayoutContext::new("Page not found", viewer, ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// The signed-in visitor, as shown in the page header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerView {
    pub username: String,
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub title: String,
    pub viewer: Option<ViewerView>,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(title: impl Into<String>, viewer: Option<ViewerView>, content: T) -> Self {
        Self {
            title: title.into(),
            viewer,
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBadge {
    pub title: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCard {
    pub id: i64,
    pub text: String,
    pub author_username: String,
    pub author_href: String,
    pub published: String,
    pub iso_date: String,
    pub group: Option<GroupBadge>,
    pub image_url: Option<String>,
    pub detail_href: String,
}

impl PostCard {
    pub fn from_record(record: PostListRecord) -> Self {
        let PostListRecord {
            post,
            author_username,
            group,
        } = record;

        Self {
            id: post.id,
            author_href: profile_href(&author_username),
            author_username,
            published: format_date(post.pub_date),
            iso_date: format_iso(post.pub_date),
            group: group.map(|group| GroupBadge {
                href: group_href(&group.slug),
                title: group.title,
            }),
            image_url: post.image.as_deref().map(media_href),
            detail_href: post_href(post.id),
            text: post.text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationView {
    pub number: u32,
    pub num_pages: u32,
    pub first_href: Option<String>,
    pub previous_href: Option<String>,
    pub next_href: Option<String>,
    pub last_href: Option<String>,
}

impl PaginationView {
    pub fn from_page<T>(page: &Page<T>) -> Self {
        let href = |number: u32| format!("?page={number}");
        Self {
            number: page.number,
            num_pages: page.num_pages,
            first_href: page.has_previous.then(|| href(1)),
            previous_href: page.previous_number().map(href),
            next_href: page.next_number().map(href),
            last_href: page.has_next.then(|| href(page.num_pages)),
        }
    }

    pub fn is_multi_page(&self) -> bool {
        self.num_pages > 1
    }
}

pub struct PostListContext {
    pub posts: Vec<PostCard>,
    pub pagination: PaginationView,
}

impl PostListContext {
    pub fn from_page(page: Page<PostListRecord>) -> Self {
        let pagination = PaginationView::from_page(&page);
        Self {
            posts: page.items.into_iter().map(PostCard::from_record).collect(),
            pagination,
        }
    }

    pub fn has_posts(&self) -> bool {
        !self.posts.is_empty()
    }
}

/// Front page and subscription feed content.
pub struct FeedContext {
    pub listing: PostListContext,
}

#[derive(Template)]
#[template(path = "posts/index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<FeedContext>,
}

#[derive(Template)]
#[template(path = "posts/follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FeedContext>,
}

pub struct GroupListContext {
    pub title: String,
    pub slug: String,
    pub description: String,
    pub listing: PostListContext,
}

#[derive(Template)]
#[template(path = "posts/group_list.html")]
pub struct GroupListTemplate {
    pub view: LayoutContext<GroupListContext>,
}

pub struct ProfileContext {
    pub username: String,
    pub post_count: u64,
    pub following: bool,
    /// Follow controls are hidden for anonymous visitors and on one's own profile.
    pub show_follow_controls: bool,
    pub follow_href: String,
    pub unfollow_href: String,
    pub listing: PostListContext,
}

#[derive(Template)]
#[template(path = "posts/profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileContext>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentView {
    pub author_username: String,
    pub author_href: String,
    pub text: String,
    pub created: String,
}

impl CommentView {
    pub fn from_record(record: CommentListRecord) -> Self {
        Self {
            author_href: profile_href(&record.author_username),
            author_username: record.author_username,
            text: record.comment.text,
            created: format_date(record.comment.created),
        }
    }
}

pub struct PostDetailContext {
    pub post: PostCard,
    pub author_post_count: u64,
    pub comments: Vec<CommentView>,
    pub can_edit: bool,
    pub edit_href: String,
    pub can_comment: bool,
    pub comment_action: String,
}

#[derive(Template)]
#[template(path = "posts/post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOption {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFormErrors {
    pub text: Vec<String>,
    pub group: Vec<String>,
    pub image: Vec<String>,
}

impl PostFormErrors {
    pub fn any(&self) -> bool {
        !(self.text.is_empty() && self.group.is_empty() && self.image.is_empty())
    }
}

pub struct PostFormContext {
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupOption>,
    pub no_group_selected: bool,
    pub current_image: Option<String>,
    pub errors: PostFormErrors,
}

#[derive(Template)]
#[template(path = "posts/create_post.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormContext>,
}

pub struct LoginContext {
    pub username: String,
    pub next: String,
    pub errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "users/login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupErrors {
    pub username: Vec<String>,
    pub password1: Vec<String>,
    pub password2: Vec<String>,
}

pub struct SignupContext {
    pub username: String,
    pub errors: SignupErrors,
}

#[derive(Template)]
#[template(path = "users/signup.html")]
pub struct SignupTemplate {
    pub view: LayoutContext<SignupContext>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page not found".to_string(),
            message: "The page you requested does not exist.".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "core/404.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

pub fn profile_href(username: &str) -> String {
    format!("/profile/{username}/")
}

pub fn post_href(id: i64) -> String {
    format!("/posts/{id}/")
}

pub fn group_href(slug: &str) -> String {
    format!("/group/{slug}/")
}

pub fn media_href(stored_path: &str) -> String {
    format!("/media/{stored_path}")
}

/// Long human date such as `17 October 2026`.
pub fn format_date(value: OffsetDateTime) -> String {
    value
        .format(format_description!(
            "[day padding:none] [month repr:long] [year]"
        ))
        .unwrap_or_default()
}

pub fn format_iso(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_default()
}
