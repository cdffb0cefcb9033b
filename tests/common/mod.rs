#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{
        Request, StatusCode,
        header::{CONTENT_TYPE, COOKIE, LOCATION},
    },
    response::Response,
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tower::ServiceExt;
use yatube::{
    application::{
        auth::AuthService,
        comments::CommentService,
        follows::FollowService,
        posts::PostService,
        repos::{
            CommentListRecord, CommentsRepo, CreateCommentParams, CreateGroupParams,
            CreatePostParams, CreateSessionParams, CreateUserParams, FollowsRepo, GroupSummary,
            GroupsRepo, HealthProbe, PostFilter, PostListRecord, PostsRepo, PostsWriteRepo,
            RepoError, SessionsRepo, UpdatePostParams, UsersRepo,
        },
    },
    domain::entities::{
        CommentRecord, FollowRecord, GroupRecord, PostRecord, SessionRecord, UserRecord,
    },
    infra::{
        http::{HttpState, SESSION_COOKIE, build_router},
        uploads::UploadStorage,
    },
};

pub const PASSWORD: &str = "correct-horse-battery";

/// 1x1 transparent GIF.
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

#[derive(Default)]
struct Tables {
    next_id: i64,
    clock: i64,
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<PostRecord>,
    comments: Vec<CommentRecord>,
    follows: Vec<FollowRecord>,
    sessions: Vec<SessionRecord>,
    session_deletes_fail: bool,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing timestamps so that insertion order is publication order.
    fn tick(&mut self) -> OffsetDateTime {
        self.clock += 1;
        OffsetDateTime::UNIX_EPOCH + Duration::days(20_000) + Duration::seconds(self.clock)
    }

    fn matches(&self, post: &PostRecord, filter: PostFilter) -> bool {
        match filter {
            PostFilter::All => true,
            PostFilter::Group(group_id) => post.group_id == Some(group_id),
            PostFilter::Author(author_id) => post.author_id == author_id,
            PostFilter::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|follow| follow.user_id == user_id && follow.author_id == post.author_id),
        }
    }

    fn list_record(&self, post: &PostRecord) -> PostListRecord {
        let author_username = self
            .users
            .iter()
            .find(|user| user.id == post.author_id)
            .map(|user| user.username.clone())
            .unwrap_or_default();
        let group = post.group_id.and_then(|group_id| {
            self.groups
                .iter()
                .find(|group| group.id == group_id)
                .map(|group| GroupSummary {
                    id: group.id,
                    slug: group.slug.clone(),
                    title: group.title.clone(),
                })
        });
        PostListRecord {
            post: post.clone(),
            author_username,
            group,
        }
    }

    fn filtered(&self, filter: PostFilter) -> Vec<&PostRecord> {
        let mut posts: Vec<&PostRecord> = self
            .posts
            .iter()
            .filter(|post| self.matches(post, filter))
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        posts
    }
}

/// In-memory storage with the same referential actions as the Postgres schema.
#[derive(Default)]
pub struct MemoryRepos {
    tables: Mutex<Tables>,
}

impl MemoryRepos {
    pub async fn post(&self, id: i64) -> Option<PostRecord> {
        let tables = self.tables.lock().await;
        tables.posts.iter().find(|post| post.id == id).cloned()
    }

    pub async fn post_count(&self) -> usize {
        self.tables.lock().await.posts.len()
    }

    pub async fn comments(&self) -> Vec<CommentRecord> {
        self.tables.lock().await.comments.clone()
    }

    pub async fn follow_count(&self) -> usize {
        self.tables.lock().await.follows.len()
    }

    pub async fn session_count(&self) -> usize {
        self.tables.lock().await.sessions.len()
    }

    pub async fn expire_sessions(&self, user_id: i64) {
        let mut tables = self.tables.lock().await;
        for session in tables
            .sessions
            .iter_mut()
            .filter(|session| session.user_id == user_id)
        {
            session.expires_at = OffsetDateTime::now_utc() - Duration::minutes(1);
        }
    }

    pub async fn fail_session_deletes(&self) {
        self.tables.lock().await.session_deletes_fail = true;
    }

    /// Move a post's publication date, leaving its id untouched.
    pub async fn set_pub_date(&self, id: i64, pub_date: OffsetDateTime) {
        let mut tables = self.tables.lock().await;
        let post = tables
            .posts
            .iter_mut()
            .find(|post| post.id == id)
            .expect("post exists");
        post.pub_date = pub_date;
    }
}

#[async_trait]
impl UsersRepo for MemoryRepos {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables
            .users
            .iter()
            .any(|user| user.username == params.username)
        {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let user = UserRecord {
            id: tables.next_id(),
            username: params.username,
            password_hash: params.password_hash,
            created_at: tables.tick(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn delete_user(&self, id: i64) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.iter().any(|user| user.id == id) {
            return Err(RepoError::NotFound);
        }
        let removed_posts: Vec<i64> = tables
            .posts
            .iter()
            .filter(|post| post.author_id == id)
            .map(|post| post.id)
            .collect();
        tables.users.retain(|user| user.id != id);
        tables.posts.retain(|post| post.author_id != id);
        tables.comments.retain(|comment| comment.author_id != id);
        for comment in tables.comments.iter_mut() {
            if comment
                .post_id
                .is_some_and(|post_id| removed_posts.contains(&post_id))
            {
                comment.post_id = None;
            }
        }
        tables
            .follows
            .retain(|follow| follow.user_id != id && follow.author_id != id);
        tables.sessions.retain(|session| session.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl GroupsRepo for MemoryRepos {
    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.groups.iter().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }
        let group = GroupRecord {
            id: tables.next_id(),
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        tables.groups.push(group.clone());
        Ok(group)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|group| group.id == id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|group| group.slug == slug).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        let mut groups = tables.groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn delete_group(&self, id: i64) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        if !tables.groups.iter().any(|group| group.id == id) {
            return Err(RepoError::NotFound);
        }
        tables.groups.retain(|group| group.id != id);
        for post in tables.posts.iter_mut() {
            if post.group_id == Some(id) {
                post.group_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PostsRepo for MemoryRepos {
    async fn list_posts(
        &self,
        filter: PostFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<PostListRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .filtered(filter)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|post| tables.list_record(post))
            .collect())
    }

    async fn count_posts(&self, filter: PostFilter) -> Result<u64, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.filtered(filter).len() as u64)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PostListRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| tables.list_record(post)))
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryRepos {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.iter().any(|user| user.id == params.author_id) {
            return Err(RepoError::InvalidInput {
                message: "posts_author_id_fkey".to_string(),
            });
        }
        let post = PostRecord {
            id: tables.next_id(),
            text: params.text,
            pub_date: tables.tick(),
            author_id: params.author_id,
            group_id: params.group_id,
            image: params.image,
        };
        tables.posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let post = tables
            .posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        Ok(post.clone())
    }

    async fn delete_post(&self, id: i64) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        if !tables.posts.iter().any(|post| post.id == id) {
            return Err(RepoError::NotFound);
        }
        tables.posts.retain(|post| post.id != id);
        for comment in tables.comments.iter_mut() {
            if comment.post_id == Some(id) {
                comment.post_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for MemoryRepos {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if !tables.posts.iter().any(|post| post.id == params.post_id) {
            return Err(RepoError::InvalidInput {
                message: "comments_post_id_fkey".to_string(),
            });
        }
        let comment = CommentRecord {
            id: tables.next_id(),
            post_id: Some(params.post_id),
            author_id: params.author_id,
            text: params.text,
            created: tables.tick(),
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<CommentRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .comments
            .iter()
            .find(|comment| comment.id == id)
            .cloned())
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentListRecord>, RepoError> {
        let tables = self.tables.lock().await;
        let mut comments: Vec<&CommentRecord> = tables
            .comments
            .iter()
            .filter(|comment| comment.post_id == Some(post_id))
            .collect();
        comments.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
        Ok(comments
            .into_iter()
            .map(|comment| CommentListRecord {
                comment: comment.clone(),
                author_username: tables
                    .users
                    .iter()
                    .find(|user| user.id == comment.author_id)
                    .map(|user| user.username.clone())
                    .unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl FollowsRepo for MemoryRepos {
    async fn create_follow(
        &self,
        user_id: i64,
        author_id: i64,
    ) -> Result<FollowRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let follow = FollowRecord {
            id: tables.next_id(),
            user_id,
            author_id,
        };
        tables.follows.push(follow.clone());
        Ok(follow)
    }

    async fn delete_follows(&self, user_id: i64, author_id: i64) -> Result<u64, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.follows.len();
        tables
            .follows
            .retain(|follow| !(follow.user_id == user_id && follow.author_id == author_id));
        Ok((before - tables.follows.len()) as u64)
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .follows
            .iter()
            .any(|follow| follow.user_id == user_id && follow.author_id == author_id))
    }
}

#[async_trait]
impl SessionsRepo for MemoryRepos {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let session = SessionRecord {
            id: tables.next_id(),
            user_id: params.user_id,
            prefix: params.prefix,
            hashed_secret: params.hashed_secret,
            created_at: OffsetDateTime::now_utc(),
            expires_at: params.expires_at,
        };
        tables.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<SessionRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .iter()
            .find(|session| session.prefix == prefix)
            .cloned())
    }

    async fn delete_session(&self, prefix: &str) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.session_deletes_fail {
            return Err(RepoError::Timeout);
        }
        tables.sessions.retain(|session| session.prefix != prefix);
        Ok(())
    }
}

#[async_trait]
impl HealthProbe for MemoryRepos {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub repos: Arc<MemoryRepos>,
    pub auth: Arc<AuthService>,
    pub storage: Arc<UploadStorage>,
    _media: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let media = TempDir::new().expect("media dir");
        let repos = Arc::new(MemoryRepos::default());
        let storage =
            Arc::new(UploadStorage::new(media.path().to_path_buf()).expect("upload storage"));

        let posts = Arc::new(PostService::new(
            repos.clone(),
            repos.clone(),
            repos.clone(),
            repos.clone(),
            repos.clone(),
            storage.clone(),
        ));
        let comments = Arc::new(CommentService::new(repos.clone(), repos.clone()));
        let follows = Arc::new(FollowService::new(repos.clone(), repos.clone()));
        let auth = Arc::new(AuthService::new(
            repos.clone(),
            repos.clone(),
            Duration::days(14),
        ));

        let state = HttpState {
            posts,
            comments,
            follows,
            auth: auth.clone(),
            upload_storage: storage.clone(),
            health: repos.clone(),
            secure_cookies: false,
            upload_limit_bytes: 2 * 1024 * 1024,
        };

        Self {
            router: build_router(state),
            repos,
            auth,
            storage,
            _media: media,
        }
    }

    pub async fn user(&self, username: &str) -> UserRecord {
        self.auth
            .signup(username, PASSWORD, PASSWORD)
            .await
            .expect("signup")
    }

    /// `Cookie` header value carrying a fresh session for `user`.
    pub async fn cookie_for(&self, user: &UserRecord) -> String {
        let session = self.auth.start_session(user).await.expect("session");
        format!("{SESSION_COOKIE}={}", session.token)
    }

    pub async fn group(&self, title: &str, slug: &str) -> GroupRecord {
        GroupsRepo::create_group(
            self.repos.as_ref(),
            CreateGroupParams {
                title: title.to_string(),
                slug: slug.to_string(),
                description: format!("About {title}"),
            },
        )
        .await
        .expect("group")
    }

    pub async fn post(&self, author: &UserRecord, text: &str, group_id: Option<i64>) -> PostRecord {
        PostsWriteRepo::create_post(
            self.repos.as_ref(),
            CreatePostParams {
                author_id: author.id,
                text: text.to_string(),
                group_id,
                image: None,
            },
        )
        .await
        .expect("post")
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).expect("request"))
            .await
    }

    pub async fn post_form(&self, uri: &str, cookie: Option<&str>, body: &str) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).expect("request"))
            .await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        cookie: Option<&str>,
        form: MultipartBody,
    ) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, form.content_type());
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.finish())).expect("request"))
            .await
    }
}

const BOUNDARY: &str = "yatube-test-boundary";

/// Minimal `multipart/form-data` encoder for the post form.
#[derive(Default)]
pub struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.bytes
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.bytes
    }
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes()
        .to_vec()
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).expect("utf-8 body")
}

pub fn location(response: &Response) -> String {
    assert_eq!(response.status(), StatusCode::FOUND, "expected a redirect");
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location header")
        .to_string()
}

/// Records the target of every event emitted while installed as the default subscriber.
#[derive(Clone, Default)]
pub struct EventTargets(Arc<std::sync::Mutex<Vec<String>>>);

impl EventTargets {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        use tracing_subscriber::layer::SubscriberExt;

        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.0
            .lock()
            .expect("targets lock")
            .iter()
            .any(|seen| seen == target)
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventTargets {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        self.0
            .lock()
            .expect("targets lock")
            .push(event.metadata().target().to_string());
    }
}
