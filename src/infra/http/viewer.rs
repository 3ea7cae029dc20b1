//! Viewer identity for HTTP requests.
//!
//! Authentication happens upstream: a trusted proxy puts the username into a
//! configured header. The middleware looks that user up once per request and
//! stores the resulting [`Viewer`] in the request extensions.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderName, Request, Uri, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;
use url::form_urlencoded;

use crate::application::repos::UsersRepo;
use crate::domain::types::Viewer;

use super::repo_error_to_http;

const SOURCE: &str = "infra::http::viewer::resolve_viewer";

#[derive(Clone)]
pub struct ViewerResolver {
    users: Arc<dyn UsersRepo>,
    header: HeaderName,
}

impl ViewerResolver {
    pub fn new(users: Arc<dyn UsersRepo>, header: HeaderName) -> Self {
        Self { users, header }
    }
}

pub async fn resolve_viewer(
    State(resolver): State<ViewerResolver>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let username = request
        .headers()
        .get(&resolver.header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    let viewer = match username {
        None => Viewer::Anonymous,
        Some(username) => match resolver.users.find_user_by_username(&username).await {
            Ok(Some(user)) => Viewer::Authenticated(user),
            Ok(None) => {
                debug!(username = %username, "identity header names an unknown user");
                Viewer::Anonymous
            }
            Err(err) => return repo_error_to_http(SOURCE, err).into_response(),
        },
    };

    request.extensions_mut().insert(viewer.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(viewer);
    response
}

/// The viewer resolved for this request; anonymous when no middleware ran.
#[derive(Debug, Clone)]
pub struct CurrentViewer(pub Viewer);

impl<S> FromRequestParts<S> for CurrentViewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts.extensions.get::<Viewer>().cloned().unwrap_or_default(),
        ))
    }
}

/// Location of the login page that returns to `uri` afterwards.
pub fn login_location(login_url: &str, uri: &Uri) -> String {
    let next = uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or("/");
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();
    let separator = if login_url.contains('?') { '&' } else { '?' };
    format!("{login_url}{separator}{query}")
}

pub fn login_redirect(login_url: &str, uri: &Uri) -> Response {
    Redirect::to(&login_location(login_url, uri)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_location_encodes_next() {
        let uri: Uri = "/follow/?page=2".parse().expect("uri");
        assert_eq!(
            login_location("/auth/login/", &uri),
            "/auth/login/?next=%2Ffollow%2F%3Fpage%3D2"
        );
    }

    #[test]
    fn login_location_appends_to_existing_query() {
        let uri: Uri = "/create/".parse().expect("uri");
        assert_eq!(
            login_location("https://sso.example/login?app=yatube", &uri),
            "https://sso.example/login?app=yatube&next=%2Fcreate%2F"
        );
    }
}
