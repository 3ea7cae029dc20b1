//! End-to-end request handling through the public router.

mod support;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use tempfile::TempDir;
use tower::ServiceExt;

use yatube::application::pagination::Paginator;
use yatube::cache::{CacheConfig, CacheState};
use yatube::config::AuthSettings;
use yatube::infra::http::{HttpState, ViewerResolver, build_router};
use yatube::infra::uploads::UploadStorage;

use support::MemoryStore;

const USER_HEADER: &str = "x-remote-user";
const BOUNDARY: &str = "yatube-test-boundary";

struct TestApp {
    store: MemoryStore,
    router: Router,
    _media_dir: TempDir,
}

fn app(store: &MemoryStore) -> TestApp {
    let media_dir = TempDir::new().expect("temp dir");
    let shared = Arc::new(store.clone());
    let auth = AuthSettings::default();

    let state = HttpState {
        feed: Arc::new(store.feed_service(Paginator::default())),
        posts: Arc::new(store.post_service()),
        comments: Arc::new(store.comment_service()),
        follows: Arc::new(store.follow_service()),
        health: shared.clone(),
        media: Arc::new(UploadStorage::new(media_dir.path().to_path_buf()).expect("storage")),
        cache: Some(CacheState::new(CacheConfig::default())),
        viewer_resolver: ViewerResolver::new(shared, auth.user_header.clone()),
        auth,
        upload_limit_bytes: 1024 * 1024,
    };

    TestApp {
        store: store.clone(),
        router: build_router(state),
        _media_dir: media_dir,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    async fn get(&self, uri: &str, user: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        self.send(builder.body(Body::empty()).expect("request")).await
    }
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

fn multipart_text_form(fields: &[(&str, &str)]) -> Body {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Body::from(body)
}

fn multipart_request(uri: &str, user: &str, fields: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(USER_HEADER, user)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart_text_form(fields))
        .expect("request")
}

#[tokio::test(start_paused = true)]
async fn index_serves_stale_content_until_ttl_expires() {
    let store = MemoryStore::new();
    let leo = store.add_user("leo").await;
    let post = store.add_post(&leo, "cached-post-marker").await;
    let app = app(&store);

    let first = app.get("/", None).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert!(body_text(first).await.contains("cached-post-marker"));

    app.store.remove_post(post.id).await;

    let within_ttl = app.get("/", None).await;
    assert!(body_text(within_ttl).await.contains("cached-post-marker"));

    tokio::time::advance(Duration::from_secs(21)).await;

    let after_ttl = app.get("/", None).await;
    assert_eq!(after_ttl.status(), StatusCode::OK);
    assert!(!body_text(after_ttl).await.contains("cached-post-marker"));
}

#[tokio::test(start_paused = true)]
async fn index_cache_never_leaks_a_signed_in_viewer_page() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    store.add_post(&alice, "alice-post").await;
    let app = app(&store);

    let personal = body_text(app.get("/", Some("alice")).await).await;
    assert!(personal.contains("New post"));
    assert!(personal.contains("Edit"));

    let anonymous = body_text(app.get("/", None).await).await;
    assert!(anonymous.contains("alice-post"));
    assert!(!anonymous.contains("New post"));
    assert!(!anonymous.contains("Edit"));

    let personal_again = body_text(app.get("/", Some("alice")).await).await;
    assert!(personal_again.contains("New post"));
}

#[tokio::test]
async fn group_and_profile_pages_are_not_cached() {
    let store = MemoryStore::new();
    let leo = store.add_user("leo").await;
    let cats = store.add_group("Cats", "cats").await;
    let post = store.add_post_in(&leo, "group-marker", Some(&cats)).await;
    let app = app(&store);

    assert!(body_text(app.get("/group/cats/", None).await).await.contains("group-marker"));
    app.store.remove_post(post.id).await;

    let group = app.get("/group/cats/", None).await;
    assert_eq!(group.status(), StatusCode::OK);
    assert!(!body_text(group).await.contains("group-marker"));
}

#[tokio::test]
async fn anonymous_followed_feed_redirects_to_login() {
    let store = MemoryStore::new();
    let app = app(&store);

    let response = app.get("/follow/?page=2", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        "/auth/login/?next=%2Ffollow%2F%3Fpage%3D2"
    );
}

#[tokio::test]
async fn unknown_user_header_is_treated_as_anonymous() {
    let store = MemoryStore::new();
    let app = app(&store);

    let response = app.get("/follow/", Some("ghost")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn followed_feed_renders_for_authenticated_viewer() {
    let store = MemoryStore::new();
    let anna = store.add_user("anna").await;
    let leo = store.add_user("leo").await;
    store.add_follow(&anna, &leo).await;
    store.add_post(&leo, "followed-marker").await;
    let app = app(&store);

    let response = app.get("/follow/", Some("anna")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("followed-marker"));

    let other = app.get("/follow/", Some("leo")).await;
    assert!(!body_text(other).await.contains("followed-marker"));
}

#[tokio::test]
async fn unknown_group_author_post_and_path_give_not_found() {
    let store = MemoryStore::new();
    let app = app(&store);

    for uri in [
        "/group/missing/",
        "/profile/ghost/",
        "/posts/not-a-uuid/",
        "/posts/5f0c1b9e-8a3d-4c62-9b1e-2d7f4a6c8e10/",
        "/no/such/page/",
    ] {
        let response = app.get(uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn page_beyond_last_renders_empty_list() {
    let store = MemoryStore::new();
    let leo = store.add_user("leo").await;
    store.add_post(&leo, "only-post").await;
    let app = app(&store);

    let response = app.get("/profile/leo/?page=5", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!body_text(response).await.contains("only-post"));

    let fallback = app.get("/profile/leo/?page=abc", None).await;
    assert!(body_text(fallback).await.contains("only-post"));
}

#[tokio::test]
async fn repeated_page_parameter_uses_the_first_value() {
    let store = MemoryStore::new();
    let leo = store.add_user("leo").await;
    store.add_post(&leo, "only-post").await;
    let app = app(&store);

    let response = app.get("/profile/leo/?page=1&page=2", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("only-post"));
}

#[tokio::test]
async fn anonymous_submissions_without_a_body_redirect_to_login() {
    let store = MemoryStore::new();
    let leo = store.add_user("leo").await;
    let post = store.add_post(&leo, "post").await;
    let app = app(&store);

    for uri in [
        "/create/".to_string(),
        format!("/posts/{}/edit/", post.id),
        format!("/posts/{}/comment/", post.id),
    ] {
        let request = Request::builder()
            .method("POST")
            .uri(&uri)
            .body(Body::empty())
            .expect("request");
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
        assert!(location(&response).starts_with("/auth/login/?next="), "{uri}");
    }
    assert_eq!(store.comment_count().await, 0);
}

#[tokio::test]
async fn create_post_redirects_to_author_profile() {
    let store = MemoryStore::new();
    store.add_user("leo").await;
    let app = app(&store);

    let response = app
        .send(multipart_request("/create/", "leo", &[("text", "fresh post"), ("group", "")]))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/leo/");

    let profile = app.get("/profile/leo/", None).await;
    assert!(body_text(profile).await.contains("fresh post"));
}

#[tokio::test]
async fn invalid_post_form_is_rerendered() {
    let store = MemoryStore::new();
    store.add_user("leo").await;
    let app = app(&store);

    let response = app
        .send(multipart_request("/create/", "leo", &[("text", "   ")]))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(response).await.contains("This field is required."));
}

#[tokio::test]
async fn anonymous_create_redirects_to_login() {
    let store = MemoryStore::new();
    let app = app(&store);

    let response = app.get("/create/", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login/?next=%2Fcreate%2F");
}

#[tokio::test]
async fn non_author_edit_redirects_to_detail_without_changes() {
    let store = MemoryStore::new();
    let leo = store.add_user("leo").await;
    store.add_user("anna").await;
    let post = store.add_post(&leo, "original text").await;
    let app = app(&store);
    let edit_uri = format!("/posts/{}/edit/", post.id);
    let detail_uri = format!("/posts/{}/", post.id);

    let form = app.get(&edit_uri, Some("anna")).await;
    assert_eq!(form.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&form), detail_uri);

    let submit = app
        .send(multipart_request(&edit_uri, "anna", &[("text", "hijacked")]))
        .await;
    assert_eq!(submit.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&submit), detail_uri);

    let current = store.post(post.id).await.expect("post exists");
    assert_eq!(current.text, "original text");
}

#[tokio::test]
async fn author_edit_updates_post() {
    let store = MemoryStore::new();
    let leo = store.add_user("leo").await;
    let post = store.add_post(&leo, "before").await;
    let app = app(&store);
    let edit_uri = format!("/posts/{}/edit/", post.id);

    let form = app.get(&edit_uri, Some("leo")).await;
    assert_eq!(form.status(), StatusCode::OK);

    let submit = app
        .send(multipart_request(&edit_uri, "leo", &[("text", "after")]))
        .await;
    assert_eq!(submit.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&submit), format!("/posts/{}/", post.id));
    assert_eq!(store.post(post.id).await.expect("post").text, "after");
}

#[tokio::test]
async fn empty_comment_rerenders_detail_without_creating() {
    let store = MemoryStore::new();
    let leo = store.add_user("leo").await;
    let post = store.add_post(&leo, "commented post").await;
    let app = app(&store);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/posts/{}/comment/", post.id))
        .header(USER_HEADER, "leo")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("text=+++"))
        .expect("request");
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_text(response).await;
    assert!(body.contains("This field is required."));
    assert!(body.contains("commented post"));
    assert_eq!(store.comment_count().await, 0);
}

#[tokio::test]
async fn valid_comment_redirects_to_detail() {
    let store = MemoryStore::new();
    let leo = store.add_user("leo").await;
    let post = store.add_post(&leo, "post").await;
    let app = app(&store);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/posts/{}/comment/", post.id))
        .header(USER_HEADER, "leo")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("text=nice"))
        .expect("request");
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", post.id));
    assert_eq!(store.comment_count().await, 1);
}

#[tokio::test]
async fn follow_and_unfollow_redirect_to_profile() {
    let store = MemoryStore::new();
    store.add_user("anna").await;
    store.add_user("leo").await;
    let app = app(&store);

    let follow = app.get("/profile/leo/follow/", Some("anna")).await;
    assert_eq!(follow.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&follow), "/profile/leo/");
    assert_eq!(store.follow_count().await, 1);

    let again = app.get("/profile/leo/follow/", Some("anna")).await;
    assert_eq!(again.status(), StatusCode::SEE_OTHER);
    assert_eq!(store.follow_count().await, 1);

    let own = app.get("/profile/anna/follow/", Some("anna")).await;
    assert_eq!(location(&own), "/profile/anna/");
    assert_eq!(store.follow_count().await, 1);

    let unfollow = app.get("/profile/leo/unfollow/", Some("anna")).await;
    assert_eq!(location(&unfollow), "/profile/leo/");
    assert_eq!(store.follow_count().await, 0);

    let anonymous = app.get("/profile/leo/follow/", None).await;
    assert_eq!(
        location(&anonymous),
        "/auth/login/?next=%2Fprofile%2Fleo%2Ffollow%2F"
    );
}

#[tokio::test]
async fn follow_redirect_percent_encodes_non_ascii_usernames() {
    let store = MemoryStore::new();
    store.add_user("anna").await;
    store.add_user("лев").await;
    let app = app(&store);

    let response = app
        .get("/profile/%D0%BB%D0%B5%D0%B2/follow/", Some("anna"))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/%D0%BB%D0%B5%D0%B2/");
    assert_eq!(store.follow_count().await, 1);
}

#[tokio::test]
async fn health_endpoint_reports_no_content() {
    let store = MemoryStore::new();
    let app = app(&store);

    let response = app.get("/_health/db", None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
