use std::{convert::Infallible, io::ErrorKind, sync::Arc};

use axum::{
    Form, Router,
    extract::{DefaultBodyLimit, FromRequestParts, Path, State, rejection::FormRejection},
    http::{
        HeaderValue, StatusCode, Uri,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
        request::Parts,
    },
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::{Multipart, multipart::MultipartRejection};
use bytes::Bytes;
use tracing::error;
use url::form_urlencoded;
use uuid::Uuid;

use crate::{
    application::{
        comments::{CommentError, CommentService},
        error::HttpError,
        feed::{FeedError, FeedService},
        follows::{FollowError, FollowService},
        forms::FormErrors,
        pagination::PageNumber,
        posts::{PostError, PostService},
        repos::HealthRepo,
    },
    cache::{CacheState, response_cache_layer},
    config::AuthSettings,
    domain::types::Viewer,
    infra::uploads::{UploadStorage, UploadStorageError},
    presentation::views::{
        CommentFormView, CommentView, FeedView, FollowControlView, FollowFeedView,
        FollowTemplate, GroupTemplate, GroupView, IndexTemplate, LayoutChrome, LayoutContext,
        PaginationView, PostCard, PostDetailTemplate, PostDetailView, PostFormTemplate,
        PostFormView, ProfileTemplate, ProfileView, post_href, post_title, profile_href,
        render_not_found_response, render_template_response,
    },
};

use super::{
    db_health_response,
    forms::{CommentForm, read_post_draft},
    middleware::{log_responses, set_request_context},
    viewer::{CurrentViewer, ViewerResolver, login_redirect, resolve_viewer},
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub follows: Arc<FollowService>,
    pub health: Arc<dyn HealthRepo>,
    pub media: Arc<UploadStorage>,
    pub cache: Option<CacheState>,
    pub auth: AuthSettings,
    pub viewer_resolver: ViewerResolver,
    pub upload_limit_bytes: usize,
}

impl HttpState {
    fn chrome(&self, viewer: &Viewer) -> LayoutChrome {
        LayoutChrome::new(viewer, &self.auth.login_url)
    }
}

pub fn build_router(state: HttpState) -> Router {
    // Only the global feed is cached, keyed by path and query alone.
    let index_route = Router::new().route("/", get(index));
    let index_route = if let Some(cache_state) = state.cache.clone() {
        index_route.layer(middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ))
    } else {
        index_route
    };

    let routes = Router::new()
        .route("/group/{slug}/", get(group_feed))
        .route("/profile/{username}/", get(profile))
        .route(
            "/profile/{username}/follow/",
            get(profile_follow).post(profile_follow),
        )
        .route(
            "/profile/{username}/unfollow/",
            get(profile_unfollow).post(profile_unfollow),
        )
        .route("/follow/", get(follow_index))
        .route("/posts/{post_id}/", get(post_detail))
        .route("/posts/{post_id}/comment/", post(add_comment))
        .route(
            "/posts/{post_id}/edit/",
            get(post_edit_form).post(post_edit_submit),
        )
        .route("/create/", get(post_create_form).post(post_create_submit))
        .route("/media/{*path}", get(serve_media))
        .route("/_health/db", get(db_health))
        .fallback(fallback);

    let viewer_resolver = state.viewer_resolver.clone();
    let body_limit = state.upload_limit_bytes;

    index_route
        .merge(routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            viewer_resolver,
            resolve_viewer,
        ))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

/// Requested page number. The first `page` parameter wins; anything that
/// does not parse means the first page.
struct PageQuery(PageNumber);

impl<S> FromRequestParts<S> for PageQuery
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(page_from_query(parts.uri.query())))
    }
}

fn page_from_query(query: Option<&str>) -> PageNumber {
    let raw = query.and_then(|query| {
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "page")
            .map(|(_, value)| value.into_owned())
    });
    PageNumber::parse(raw.as_deref())
}

async fn index(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    uri: Uri,
    PageQuery(page): PageQuery,
) -> Response {
    let chrome = state.chrome(&viewer);

    match state.feed.global_feed(page).await {
        Ok(feed) => {
            let content = FeedView {
                heading: "Latest updates".to_string(),
                posts: PostCard::from_listings(&feed.page.items, &viewer),
                pagination: PaginationView::new(&feed.page.meta, "/"),
            };
            let view = LayoutContext::new(chrome, content);
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, &state, chrome, &uri),
    }
}

async fn group_feed(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    uri: Uri,
    Path(slug): Path<String>,
    PageQuery(page): PageQuery,
) -> Response {
    let chrome = state.chrome(&viewer);

    match state.feed.group_feed(&slug, page).await {
        Ok(feed) => {
            let base_path = format!("/group/{}/", feed.group.slug);
            let content = GroupView::new(
                &feed.group,
                PostCard::from_listings(&feed.page.items, &viewer),
                PaginationView::new(&feed.page.meta, &base_path),
            );
            let title = format!("Posts of group {}", feed.group.title);
            let view = LayoutContext::new(chrome.with_title(title), content);
            render_template_response(GroupTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, &state, chrome, &uri),
    }
}

async fn profile(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    uri: Uri,
    Path(username): Path<String>,
    PageQuery(page): PageQuery,
) -> Response {
    let chrome = state.chrome(&viewer);

    match state
        .feed
        .author_feed(&username, &viewer, page)
        .await
    {
        Ok(feed) => {
            let username = feed.author.username.clone();
            let title = format!("Profile of {username}");
            let content = ProfileView {
                follow: FollowControlView::new(feed.follow_status, &username),
                posts: PostCard::from_listings(&feed.page.items, &viewer),
                pagination: PaginationView::new(&feed.page.meta, &profile_href(&username)),
                post_count: feed.post_count,
                follower_count: feed.follower_count,
                username,
            };
            let view = LayoutContext::new(chrome.with_title(title), content);
            render_template_response(ProfileTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, &state, chrome, &uri),
    }
}

async fn follow_index(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    uri: Uri,
    PageQuery(page): PageQuery,
) -> Response {
    let chrome = state.chrome(&viewer);

    match state.feed.followed_feed(&viewer, page).await {
        Ok(feed) => {
            let content = FollowFeedView {
                follow_count: feed.follow_count,
                posts: PostCard::from_listings(&feed.page.items, &viewer),
                pagination: PaginationView::new(&feed.page.meta, "/follow/"),
            };
            let view = LayoutContext::new(chrome.with_title("Followed authors"), content);
            render_template_response(FollowTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, &state, chrome, &uri),
    }
}

async fn profile_follow(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    uri: Uri,
    Path(username): Path<String>,
) -> Response {
    match state.follows.follow(&viewer, &username).await {
        Ok(_) => Redirect::to(&profile_href(&username)).into_response(),
        Err(err) => follow_error_to_response(err, &state, &viewer, &uri),
    }
}

async fn profile_unfollow(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    uri: Uri,
    Path(username): Path<String>,
) -> Response {
    match state.follows.unfollow(&viewer, &username).await {
        Ok(_) => Redirect::to(&profile_href(&username)).into_response(),
        Err(err) => follow_error_to_response(err, &state, &viewer, &uri),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    Path(post_id): Path<String>,
) -> Response {
    let Some(post_id) = parse_post_id(&post_id) else {
        return render_not_found_response(state.chrome(&viewer));
    };
    render_post_detail(&state, &viewer, post_id, None).await
}

async fn add_comment(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    uri: Uri,
    Path(post_id): Path<String>,
    form: Result<Form<CommentForm>, FormRejection>,
) -> Response {
    if !viewer.is_authenticated() {
        return login_redirect(&state.auth.login_url, &uri);
    }
    let Some(post_id) = parse_post_id(&post_id) else {
        return render_not_found_response(state.chrome(&viewer));
    };
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => return rejection.into_response(),
    };

    match state
        .comments
        .add_comment(&viewer, post_id, &form.text)
        .await
    {
        Ok(_) => Redirect::to(&post_href(post_id)).into_response(),
        Err(CommentError::Invalid(errors)) => {
            render_post_detail(&state, &viewer, post_id, Some((&form.text, &errors))).await
        }
        Err(CommentError::AuthenticationRequired) => login_redirect(&state.auth.login_url, &uri),
        Err(CommentError::PostNotFound) => render_not_found_response(state.chrome(&viewer)),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn post_create_form(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    uri: Uri,
) -> Response {
    if !viewer.is_authenticated() {
        return login_redirect(&state.auth.login_url, &uri);
    }

    match state.posts.groups().await {
        Ok(groups) => render_post_form(
            &state,
            &viewer,
            PostFormView::create(&groups),
            StatusCode::OK,
        ),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn post_create_submit(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    uri: Uri,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    if !viewer.is_authenticated() {
        return login_redirect(&state.auth.login_url, &uri);
    }

    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => return rejection.into_response(),
    };
    let draft = match read_post_draft(&mut multipart).await {
        Ok(draft) => draft,
        Err(err) => return err.into_response(),
    };
    let text = draft.text.clone();
    let group = draft.group_id.clone();

    match state.posts.create(&viewer, draft).await {
        Ok(_) => {
            let username = viewer
                .user()
                .map(|user| user.username.as_str())
                .unwrap_or_default();
            Redirect::to(&profile_href(username)).into_response()
        }
        Err(PostError::Invalid(errors)) => match state.posts.groups().await {
            Ok(groups) => {
                let form = PostFormView::create(&groups).resubmitted(
                    &text,
                    group.as_deref(),
                    &groups,
                    &errors,
                );
                render_post_form(&state, &viewer, form, StatusCode::UNPROCESSABLE_ENTITY)
            }
            Err(err) => HttpError::from(err).into_response(),
        },
        Err(err) => post_error_to_response(err, &state, &viewer, &uri),
    }
}

async fn post_edit_form(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    uri: Uri,
    Path(post_id): Path<String>,
) -> Response {
    let Some(post_id) = parse_post_id(&post_id) else {
        return render_not_found_response(state.chrome(&viewer));
    };

    let listing = match state.posts.load_for_edit(&viewer, post_id).await {
        Ok(listing) => listing,
        Err(err) => return post_error_to_response(err, &state, &viewer, &uri),
    };

    match state.posts.groups().await {
        Ok(groups) => render_post_form(
            &state,
            &viewer,
            PostFormView::edit(&listing, &groups),
            StatusCode::OK,
        ),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn post_edit_submit(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
    uri: Uri,
    Path(post_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    if !viewer.is_authenticated() {
        return login_redirect(&state.auth.login_url, &uri);
    }
    let Some(post_id) = parse_post_id(&post_id) else {
        return render_not_found_response(state.chrome(&viewer));
    };

    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => return rejection.into_response(),
    };

    let draft = match read_post_draft(&mut multipart).await {
        Ok(draft) => draft,
        Err(err) => return err.into_response(),
    };
    let text = draft.text.clone();
    let group = draft.group_id.clone();

    match state.posts.edit(&viewer, post_id, draft).await {
        Ok(post) => Redirect::to(&post_href(post.id)).into_response(),
        Err(PostError::Invalid(errors)) => {
            let listing = match state.posts.load_for_edit(&viewer, post_id).await {
                Ok(listing) => listing,
                Err(err) => return post_error_to_response(err, &state, &viewer, &uri),
            };
            match state.posts.groups().await {
                Ok(groups) => {
                    let form = PostFormView::edit(&listing, &groups).resubmitted(
                        &text,
                        group.as_deref(),
                        &groups,
                        &errors,
                    );
                    render_post_form(&state, &viewer, form, StatusCode::UNPROCESSABLE_ENTITY)
                }
                Err(err) => HttpError::from(err).into_response(),
            }
        }
        Err(err) => post_error_to_response(err, &state, &viewer, &uri),
    }
}

fn render_post_form(
    state: &HttpState,
    viewer: &Viewer,
    form: PostFormView,
    status: StatusCode,
) -> Response {
    let title = if form.is_edit { "Edit post" } else { "New post" };
    let view = LayoutContext::new(state.chrome(viewer).with_title(title), form);
    render_template_response(PostFormTemplate { view }, status)
}

/// Render the post page. `rejected` carries a comment that failed validation.
async fn render_post_detail(
    state: &HttpState,
    viewer: &Viewer,
    post_id: Uuid,
    rejected: Option<(&str, &FormErrors)>,
) -> Response {
    let chrome = state.chrome(viewer);

    let detail = match state.posts.detail(post_id).await {
        Ok(detail) => detail,
        Err(PostError::NotFound) => return render_not_found_response(chrome),
        Err(err) => return HttpError::from(err).into_response(),
    };

    let mut comment_form = CommentFormView::empty(post_id);
    let status = match rejected {
        Some((text, errors)) => {
            comment_form = comment_form.with_errors(text, errors);
            StatusCode::UNPROCESSABLE_ENTITY
        }
        None => StatusCode::OK,
    };

    let title = post_title(&detail.listing);
    let content = PostDetailView {
        title: title.clone(),
        post: PostCard::from_listing(&detail.listing, viewer),
        comment_count: detail.comment_count,
        author_post_count: detail.author_post_count,
        comments: detail.comments.iter().map(CommentView::from).collect(),
        comment_form,
        can_comment: viewer.is_authenticated(),
    };
    let view = LayoutContext::new(chrome.with_title(title), content);
    render_template_response(PostDetailTemplate { view }, status)
}

fn parse_post_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.media.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(UploadStorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Media not found",
            "The requested media file is not available",
        )
        .into_response(),
        Err(UploadStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Media not found",
            "The requested media file is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored media"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read media file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let len = bytes.len();
    let mut response = Response::new(bytes.into());
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.health_check().await)
}

async fn fallback(
    State(state): State<HttpState>,
    CurrentViewer(viewer): CurrentViewer,
) -> Response {
    render_not_found_response(state.chrome(&viewer))
}

fn feed_error_to_response(
    err: FeedError,
    state: &HttpState,
    chrome: LayoutChrome,
    uri: &Uri,
) -> Response {
    match err {
        FeedError::UnknownGroup(_) | FeedError::UnknownAuthor(_) => {
            render_not_found_response(chrome)
        }
        FeedError::AuthenticationRequired => login_redirect(&state.auth.login_url, uri),
        other => HttpError::from(other).into_response(),
    }
}

fn post_error_to_response(
    err: PostError,
    state: &HttpState,
    viewer: &Viewer,
    uri: &Uri,
) -> Response {
    match err {
        PostError::NotFound => render_not_found_response(state.chrome(viewer)),
        PostError::AuthenticationRequired => login_redirect(&state.auth.login_url, uri),
        // Only the author may edit; everyone else lands back on the post.
        PostError::NotAuthor { post_id } => Redirect::to(&post_href(post_id)).into_response(),
        other => HttpError::from(other).into_response(),
    }
}

fn follow_error_to_response(
    err: FollowError,
    state: &HttpState,
    viewer: &Viewer,
    uri: &Uri,
) -> Response {
    match err {
        FollowError::UnknownAuthor(_) => render_not_found_response(state.chrome(viewer)),
        FollowError::AuthenticationRequired => login_redirect(&state.auth.login_url, uri),
        other => HttpError::from(other).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_falls_back_to_first_page() {
        assert_eq!(page_from_query(Some("page=nope")), PageNumber::FIRST);
        assert_eq!(page_from_query(Some("page=0")), PageNumber::FIRST);
        assert_eq!(page_from_query(None), PageNumber::FIRST);
    }

    #[test]
    fn repeated_page_parameter_uses_the_first_value() {
        let page = page_from_query(Some("page=3&page=2"));
        assert_eq!(page, PageNumber::parse(Some("3")));
        assert_eq!(page_from_query(Some("sort=new&page=2")), PageNumber::parse(Some("2")));
    }

    #[test]
    fn media_response_guesses_content_type() {
        let response = build_media_response("posts/2025/03/01/cat.png", Bytes::from_static(b"x"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(b"image/png".as_slice())
        );
    }

    #[test]
    fn post_ids_must_be_uuids() {
        assert!(parse_post_id("not-a-uuid").is_none());
        assert!(parse_post_id(&Uuid::new_v4().to_string()).is_some());
    }
}
