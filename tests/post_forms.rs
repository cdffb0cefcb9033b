mod common;

use axum::http::{StatusCode, header::CONTENT_TYPE};
use common::{
    EventTargets, MultipartBody, SMALL_GIF, TestApp, body_bytes, body_text, location,
};

#[tokio::test]
async fn anonymous_users_are_sent_to_login() {
    let app = TestApp::new();
    let author = app.user("leo").await;
    let post = app.post(&author, "existing", None).await;

    let response = app.get("/create/", None).await;
    assert_eq!(location(&response), "/auth/login/?next=/create/");

    let response = app.get(&format!("/posts/{}/edit/", post.id), None).await;
    assert_eq!(
        location(&response),
        format!("/auth/login/?next=/posts/{}/edit/", post.id)
    );

    let form = MultipartBody::new().text("text", "sneaky");
    let response = app.post_multipart("/create/", None, form).await;
    assert_eq!(location(&response), "/auth/login/?next=/create/");
    assert_eq!(app.repos.post_count().await, 1);
}

#[tokio::test]
async fn create_form_lists_groups() {
    let app = TestApp::new();
    let leo = app.user("leo").await;
    let cookie = app.cookie_for(&leo).await;
    let cats = app.group("Cats", "cats").await;

    let response = app.get("/create/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("New post"));
    assert!(body.contains("name=\"text\""));
    assert!(body.contains(&format!("<option value=\"{}\">Cats</option>", cats.id)));
    assert!(!body.contains("image-clear"));
}

#[tokio::test]
async fn valid_post_is_created_and_redirects_to_profile() {
    let app = TestApp::new();
    let leo = app.user("leo").await;
    let cookie = app.cookie_for(&leo).await;
    let cats = app.group("Cats", "cats").await;

    let form = MultipartBody::new()
        .text("text", "Fresh post")
        .text("group", &cats.id.to_string());
    let response = app.post_multipart("/create/", Some(&cookie), form).await;
    assert_eq!(location(&response), "/profile/leo/");

    assert_eq!(app.repos.post_count().await, 1);
    let body = body_text(app.get("/group/cats/", None).await).await;
    assert!(body.contains("Fresh post"));
}

#[tokio::test]
async fn empty_text_rerenders_form_without_saving() {
    let app = TestApp::new();
    let leo = app.user("leo").await;
    let cookie = app.cookie_for(&leo).await;

    let form = MultipartBody::new().text("text", "   ").text("group", "");
    let response = app.post_multipart("/create/", Some(&cookie), form).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    assert!(body.contains("This field is required."));
    assert_eq!(app.repos.post_count().await, 0);
}

#[tokio::test]
async fn unknown_group_is_a_field_error() {
    let app = TestApp::new();
    let leo = app.user("leo").await;
    let cookie = app.cookie_for(&leo).await;

    let form = MultipartBody::new()
        .text("text", "Keep this text")
        .text("group", "424242");
    let response = app.post_multipart("/create/", Some(&cookie), form).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    assert!(body.contains("Select a valid choice."));
    assert!(body.contains(">Keep this text</textarea>"));
    assert_eq!(app.repos.post_count().await, 0);
}

#[tokio::test]
async fn uploaded_image_is_stored_and_served() {
    let app = TestApp::new();
    let leo = app.user("leo").await;
    let cookie = app.cookie_for(&leo).await;

    let form = MultipartBody::new()
        .text("text", "Post with a picture")
        .file("image", "small.gif", "image/gif", SMALL_GIF);
    let response = app.post_multipart("/create/", Some(&cookie), form).await;
    assert_eq!(location(&response), "/profile/leo/");

    let body = body_text(app.get("/", None).await).await;
    let start = body.find("src=\"/media/").expect("image rendered") + "src=\"".len();
    let end = start + body[start..].find('"').expect("closing quote");
    let image_url = body[start..end].to_string();
    assert!(image_url.starts_with("/media/posts/"));
    assert!(image_url.ends_with(".gif"));

    let response = app.get(&image_url, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("image/gif")
    );
    assert_eq!(body_bytes(response).await, SMALL_GIF);
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let app = TestApp::new();
    let leo = app.user("leo").await;
    let cookie = app.cookie_for(&leo).await;

    let form = MultipartBody::new()
        .text("text", "Post with a bogus picture")
        .file("image", "notes.gif", "image/gif", b"definitely not an image");
    let response = app.post_multipart("/create/", Some(&cookie), form).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    assert!(body.contains("Upload a valid image."));
    assert_eq!(app.repos.post_count().await, 0);
}

#[tokio::test]
async fn media_paths_cannot_escape_storage() {
    let app = TestApp::new();

    let response = app.get("/media/posts/missing.gif", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/media/../Cargo.toml", None).await;
    assert_ne!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn author_sees_prefilled_edit_form() {
    let app = TestApp::new();
    let leo = app.user("leo").await;
    let cookie = app.cookie_for(&leo).await;
    let cats = app.group("Cats", "cats").await;
    let post = app.post(&leo, "Original text", Some(cats.id)).await;

    let response = app
        .get(&format!("/posts/{}/edit/", post.id), Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    assert!(body.contains("Edit post"));
    assert!(body.contains(">Original text</textarea>"));
    assert!(body.contains(&format!(
        "<option value=\"{}\" selected>Cats</option>",
        cats.id
    )));
}

#[tokio::test]
async fn non_author_is_redirected_to_post() {
    let app = TestApp::new();
    let leo = app.user("leo").await;
    let mia = app.user("mia").await;
    let post = app.post(&leo, "Leo's words", None).await;
    let cookie = app.cookie_for(&mia).await;
    let edit = format!("/posts/{}/edit/", post.id);
    let detail = format!("/posts/{}/", post.id);

    let response = app.get(&edit, Some(&cookie)).await;
    assert_eq!(location(&response), detail);

    let form = MultipartBody::new().text("text", "Mia's words");
    let response = app.post_multipart(&edit, Some(&cookie), form).await;
    assert_eq!(location(&response), detail);

    let stored = app.repos.post(post.id).await.expect("post kept");
    assert_eq!(stored.text, "Leo's words");
}

#[tokio::test]
async fn author_edit_updates_post() {
    let app = TestApp::new();
    let leo = app.user("leo").await;
    let cookie = app.cookie_for(&leo).await;
    let cats = app.group("Cats", "cats").await;
    let post = app.post(&leo, "Before", Some(cats.id)).await;

    let form = MultipartBody::new().text("text", "After").text("group", "");
    let response = app
        .post_multipart(&format!("/posts/{}/edit/", post.id), Some(&cookie), form)
        .await;
    assert_eq!(location(&response), format!("/posts/{}/", post.id));

    let stored = app.repos.post(post.id).await.expect("post kept");
    assert_eq!(stored.text, "After");
    assert_eq!(stored.group_id, None);
    assert_eq!(stored.author_id, leo.id);
    assert_eq!(stored.pub_date, post.pub_date);
    assert_eq!(app.repos.post_count().await, 1);
}

#[tokio::test]
async fn invalid_edit_keeps_post_unchanged() {
    let app = TestApp::new();
    let leo = app.user("leo").await;
    let cookie = app.cookie_for(&leo).await;
    let post = app.post(&leo, "Stable", None).await;

    let form = MultipartBody::new().text("text", "");
    let response = app
        .post_multipart(&format!("/posts/{}/edit/", post.id), Some(&cookie), form)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("This field is required."));

    let stored = app.repos.post(post.id).await.expect("post kept");
    assert_eq!(stored.text, "Stable");
}

#[tokio::test]
async fn edit_can_clear_image() {
    let app = TestApp::new();
    let leo = app.user("leo").await;
    let cookie = app.cookie_for(&leo).await;

    let form = MultipartBody::new()
        .text("text", "Pictured")
        .file("image", "small.gif", "image/gif", SMALL_GIF);
    app.post_multipart("/create/", Some(&cookie), form).await;

    let body = body_text(app.get("/", None).await).await;
    let start = body.find("id=\"post-").expect("post rendered") + "id=\"post-".len();
    let end = start + body[start..].find('"').expect("closing quote");
    let post_id: i64 = body[start..end].parse().expect("post id");
    let stored = app.repos.post(post_id).await.expect("post");
    let image = stored.image.expect("image stored");
    assert!(app.storage.read(&image).await.is_ok());

    let edit_form = body_text(
        app.get(&format!("/posts/{post_id}/edit/"), Some(&cookie))
            .await,
    )
    .await;
    assert!(edit_form.contains("image-clear"));

    let form = MultipartBody::new()
        .text("text", "Pictured")
        .text("image-clear", "on");
    let response = app
        .post_multipart(&format!("/posts/{post_id}/edit/"), Some(&cookie), form)
        .await;
    assert_eq!(location(&response), format!("/posts/{post_id}/"));

    let stored = app.repos.post(post_id).await.expect("post");
    assert_eq!(stored.image, None);
    assert!(app.storage.read(&image).await.is_err());
}

#[tokio::test]
async fn editing_missing_post_is_not_found() {
    let app = TestApp::new();
    let leo = app.user("leo").await;
    let cookie = app.cookie_for(&leo).await;

    let response = app.get("/posts/777/edit/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn edit_access_is_checked_before_reading_the_body() {
    let app = TestApp::new();
    let leo = app.user("leo").await;
    let mia = app.user("mia").await;
    let post = app.post(&leo, "Leo's words", None).await;
    let edit = format!("/posts/{}/edit/", post.id);

    let mia_cookie = app.cookie_for(&mia).await;
    let response = app.post_form(&edit, Some(&mia_cookie), "text=hijack").await;
    assert_eq!(location(&response), format!("/posts/{}/", post.id));

    let leo_cookie = app.cookie_for(&leo).await;
    let response = app
        .post_form("/posts/999/edit/", Some(&leo_cookie), "text=ghost")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.post_form(&edit, Some(&leo_cookie), "text=plain").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let stored = app.repos.post(post.id).await.expect("post kept");
    assert_eq!(stored.text, "Leo's words");
}

#[tokio::test]
async fn post_and_comment_events_use_yatube_targets() {
    let targets = EventTargets::default();
    let _guard = targets.install();

    let app = TestApp::new();
    let leo = app.user("leo").await;
    let cookie = app.cookie_for(&leo).await;
    let form = MultipartBody::new().text("text", "Logged post");
    app.post_multipart("/create/", Some(&cookie), form).await;

    let post = app.post(&leo, "Commented post", None).await;
    app.post_form(
        &format!("/posts/{}/comment/", post.id),
        Some(&cookie),
        "text=noted",
    )
    .await;

    assert!(targets.contains("yatube::posts"));
    assert!(targets.contains("yatube::comments"));
    assert!(targets.contains("yatube::auth"));
}
