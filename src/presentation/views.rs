use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use url::form_urlencoded;

use crate::application::error::{ErrorReport, HttpError};
use crate::application::forms::FormErrors;
use crate::application::pagination::PageMeta;
use crate::domain::entities::{CommentListing, GroupRecord, PostListing};
use crate::domain::posts::{format_human_datetime, preview};
use crate::domain::types::{FollowStatus, Viewer};

/// Neighbouring page links shown on each side of the current page.
const PAGINATION_SPREAD: usize = 2;

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

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let content = ErrorPageView::not_found();
    let view = LayoutContext::new(chrome.with_title("Page not found"), content);
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

pub fn profile_href(username: &str) -> String {
    format!("/profile/{}/", path_segment(username))
}

/// Percent-encode `value` for use as a single path segment.
fn path_segment(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

pub fn group_href(slug: &str) -> String {
    format!("/group/{slug}/")
}

pub fn post_href(id: impl std::fmt::Display) -> String {
    format!("/posts/{id}/")
}

pub fn media_href(stored_path: &str) -> String {
    format!("/media/{stored_path}")
}

#[derive(Clone)]
pub struct ViewerView {
    pub authenticated: bool,
    pub username: String,
    pub profile_href: String,
    pub login_href: String,
}

#[derive(Clone)]
pub struct PageMetaView {
    pub title: String,
}

/// Per-request frame shared by every page.
#[derive(Clone)]
pub struct LayoutChrome {
    pub viewer: ViewerView,
    pub meta: PageMetaView,
}

impl LayoutChrome {
    pub fn new(viewer: &Viewer, login_url: &str) -> Self {
        let (authenticated, username) = match viewer.user() {
            Some(user) => (true, user.username.clone()),
            None => (false, String::new()),
        };
        Self {
            viewer: ViewerView {
                authenticated,
                profile_href: profile_href(&username),
                username,
                login_href: login_url.to_string(),
            },
            meta: PageMetaView {
                title: "Yatube".to_string(),
            },
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.meta.title = title.into();
        self
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub viewer: ViewerView,
    pub meta: PageMetaView,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            viewer: chrome.viewer,
            meta: chrome.meta,
            content,
        }
    }
}

#[derive(Clone)]
pub struct PostCard {
    pub id: String,
    pub text: String,
    pub author_username: String,
    pub author_href: String,
    pub created_human: String,
    pub has_group: bool,
    pub group_title: String,
    pub group_href: String,
    pub has_image: bool,
    pub image_url: String,
    pub detail_href: String,
    pub edit_href: String,
    pub can_edit: bool,
}

impl PostCard {
    pub fn from_listing(listing: &PostListing, viewer: &Viewer) -> Self {
        let post = &listing.post;
        let (has_group, group_title, group_href) = match listing.group.as_ref() {
            Some(group) => (true, group.title.clone(), self::group_href(&group.slug)),
            None => (false, String::new(), String::new()),
        };
        let (has_image, image_url) = match post.image.as_deref() {
            Some(path) => (true, media_href(path)),
            None => (false, String::new()),
        };

        Self {
            id: post.id.to_string(),
            text: post.text.clone(),
            author_username: listing.author_username.clone(),
            author_href: profile_href(&listing.author_username),
            created_human: format_human_datetime(post.created_at),
            has_group,
            group_title,
            group_href,
            has_image,
            image_url,
            detail_href: post_href(post.id),
            edit_href: format!("/posts/{}/edit/", post.id),
            can_edit: viewer.is_user(post.author_id),
        }
    }

    pub fn from_listings(listings: &[PostListing], viewer: &Viewer) -> Vec<Self> {
        listings
            .iter()
            .map(|listing| Self::from_listing(listing, viewer))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageLinkView {
    pub number: usize,
    pub href: String,
    pub is_current: bool,
}

#[derive(Clone, Debug)]
pub struct PaginationView {
    pub visible: bool,
    pub number: usize,
    pub total_pages: usize,
    pub has_previous: bool,
    pub previous_href: String,
    pub has_next: bool,
    pub next_href: String,
    pub links: Vec<PageLinkView>,
}

impl PaginationView {
    pub fn new(meta: &PageMeta, base_path: &str) -> Self {
        let href = |number: usize| format!("{base_path}?page={number}");

        let first = meta.number.saturating_sub(PAGINATION_SPREAD).max(1);
        let last = (meta.number + PAGINATION_SPREAD).min(meta.total_pages);
        let links = (first..=last)
            .map(|number| PageLinkView {
                number,
                href: href(number),
                is_current: number == meta.number,
            })
            .collect();

        Self {
            visible: meta.total_pages > 1 || meta.is_beyond_last(),
            number: meta.number,
            total_pages: meta.total_pages,
            has_previous: meta.has_previous,
            previous_href: meta.previous_page_number().map(href).unwrap_or_default(),
            has_next: meta.has_next,
            next_href: meta.next_page_number().map(href).unwrap_or_default(),
            links,
        }
    }
}

#[derive(Clone)]
pub struct FeedView {
    pub heading: String,
    pub posts: Vec<PostCard>,
    pub pagination: PaginationView,
}

#[derive(Clone)]
pub struct GroupView {
    pub title: String,
    pub description: String,
    pub posts: Vec<PostCard>,
    pub pagination: PaginationView,
}

impl GroupView {
    pub fn new(group: &GroupRecord, posts: Vec<PostCard>, pagination: PaginationView) -> Self {
        Self {
            title: group.title.clone(),
            description: group.description.clone(),
            posts,
            pagination,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowControlView {
    pub show_follow: bool,
    pub show_unfollow: bool,
    pub own_profile: bool,
    pub follow_href: String,
    pub unfollow_href: String,
}

impl FollowControlView {
    pub fn new(status: FollowStatus, username: &str) -> Self {
        Self {
            show_follow: status.can_follow(),
            show_unfollow: status.can_unfollow(),
            own_profile: status == FollowStatus::OwnProfile,
            follow_href: format!("{}follow/", profile_href(username)),
            unfollow_href: format!("{}unfollow/", profile_href(username)),
        }
    }
}

#[derive(Clone)]
pub struct ProfileView {
    pub username: String,
    pub post_count: u64,
    pub follower_count: u64,
    pub follow: FollowControlView,
    pub posts: Vec<PostCard>,
    pub pagination: PaginationView,
}

#[derive(Clone)]
pub struct FollowFeedView {
    pub follow_count: u64,
    pub posts: Vec<PostCard>,
    pub pagination: PaginationView,
}

#[derive(Clone)]
pub struct CommentView {
    pub author_username: String,
    pub author_href: String,
    pub text: String,
    pub created_human: String,
}

impl From<&CommentListing> for CommentView {
    fn from(listing: &CommentListing) -> Self {
        Self {
            author_username: listing.author_username.clone(),
            author_href: profile_href(&listing.author_username),
            text: listing.comment.text.clone(),
            created_human: format_human_datetime(listing.comment.created_at),
        }
    }
}

#[derive(Clone, Default)]
pub struct CommentFormView {
    pub action: String,
    pub text: String,
    pub has_error: bool,
    pub error: String,
}

impl CommentFormView {
    pub fn empty(post_id: impl std::fmt::Display) -> Self {
        Self {
            action: format!("/posts/{post_id}/comment/"),
            ..Default::default()
        }
    }

    pub fn with_errors(mut self, text: &str, errors: &FormErrors) -> Self {
        self.text = text.to_string();
        if let Some(message) = errors.get("text") {
            self.has_error = true;
            self.error = message.to_string();
        }
        self
    }
}

#[derive(Clone)]
pub struct PostDetailView {
    pub title: String,
    pub post: PostCard,
    pub comment_count: u64,
    pub author_post_count: u64,
    pub comments: Vec<CommentView>,
    pub comment_form: CommentFormView,
    pub can_comment: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupOptionView {
    pub id: String,
    pub title: String,
    pub selected: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldErrorView {
    pub present: bool,
    pub message: String,
}

impl FieldErrorView {
    fn from_errors(errors: &FormErrors, field: &str) -> Self {
        match errors.get(field) {
            Some(message) => Self {
                present: true,
                message: message.to_string(),
            },
            None => Self::default(),
        }
    }
}

#[derive(Clone)]
pub struct PostFormView {
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub no_group_selected: bool,
    pub groups: Vec<GroupOptionView>,
    pub text_error: FieldErrorView,
    pub group_error: FieldErrorView,
    pub image_error: FieldErrorView,
    pub has_current_image: bool,
    pub current_image_url: String,
}

impl PostFormView {
    pub fn create(groups: &[GroupRecord]) -> Self {
        Self::build("/create/".to_string(), false, "", None, groups, None)
    }

    pub fn edit(listing: &PostListing, groups: &[GroupRecord]) -> Self {
        let post = &listing.post;
        let selected = post.group_id.map(|id| id.to_string());
        Self::build(
            format!("/posts/{}/edit/", post.id),
            true,
            &post.text,
            selected.as_deref(),
            groups,
            post.image.as_deref(),
        )
    }

    /// Rebuild a submitted form so the user sees their input next to the errors.
    pub fn resubmitted(
        mut self,
        text: &str,
        selected_group: Option<&str>,
        groups: &[GroupRecord],
        errors: &FormErrors,
    ) -> Self {
        let selected = selected_group.map(str::trim).filter(|value| !value.is_empty());
        self.text = text.to_string();
        self.no_group_selected = selected.is_none();
        self.groups = group_options(groups, selected);
        self.text_error = FieldErrorView::from_errors(errors, "text");
        self.group_error = FieldErrorView::from_errors(errors, "group");
        self.image_error = FieldErrorView::from_errors(errors, "image");
        self
    }

    fn build(
        action: String,
        is_edit: bool,
        text: &str,
        selected_group: Option<&str>,
        groups: &[GroupRecord],
        current_image: Option<&str>,
    ) -> Self {
        Self {
            is_edit,
            action,
            text: text.to_string(),
            no_group_selected: selected_group.is_none(),
            groups: group_options(groups, selected_group),
            text_error: FieldErrorView::default(),
            group_error: FieldErrorView::default(),
            image_error: FieldErrorView::default(),
            has_current_image: current_image.is_some(),
            current_image_url: current_image.map(media_href).unwrap_or_default(),
        }
    }
}

fn group_options(groups: &[GroupRecord], selected: Option<&str>) -> Vec<GroupOptionView> {
    groups
        .iter()
        .map(|group| {
            let id = group.id.to_string();
            GroupOptionView {
                selected: selected == Some(id.as_str()),
                id,
                title: group.title.clone(),
            }
        })
        .collect()
}

#[derive(Clone)]
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
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<FeedView>,
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupView>,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileView>,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FollowFeedView>,
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailView>,
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormView>,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

/// Title shown for a post page: the first characters of its text.
pub fn post_title(listing: &PostListing) -> String {
    preview(&listing.post.text)
}
