use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{
        admin::AdminError, comments::CommentError, feed::FeedError, follows::FollowError,
        posts::PostError, repos::RepoError,
    },
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

const ERROR_SOURCE: &str = "application::error::service_error_to_http";

fn repo_failure(error: &RepoError) -> HttpError {
    HttpError::from_error(
        ERROR_SOURCE,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
        error,
    )
}

fn authentication_required() -> HttpError {
    HttpError::new(
        ERROR_SOURCE,
        StatusCode::UNAUTHORIZED,
        "Authentication required",
        "Anonymous viewer attempted an authenticated action",
    )
}

impl From<FeedError> for HttpError {
    fn from(error: FeedError) -> Self {
        match error {
            FeedError::UnknownGroup(slug) => HttpError::new(
                ERROR_SOURCE,
                StatusCode::NOT_FOUND,
                "Unknown group",
                format!("Group `{slug}` does not exist"),
            ),
            FeedError::UnknownAuthor(username) => HttpError::new(
                ERROR_SOURCE,
                StatusCode::NOT_FOUND,
                "Unknown author",
                format!("User `{username}` does not exist"),
            ),
            FeedError::AuthenticationRequired => authentication_required(),
            FeedError::Repo(err) => repo_failure(&err),
        }
    }
}

impl From<PostError> for HttpError {
    fn from(error: PostError) -> Self {
        match error {
            PostError::NotFound => HttpError::new(
                ERROR_SOURCE,
                StatusCode::NOT_FOUND,
                "Post not found",
                "Requested post does not exist",
            ),
            PostError::AuthenticationRequired => authentication_required(),
            PostError::NotAuthor { post_id } => HttpError::new(
                ERROR_SOURCE,
                StatusCode::FORBIDDEN,
                "Not allowed",
                format!("Viewer is not the author of post {post_id}"),
            ),
            PostError::Invalid(errors) => HttpError::new(
                ERROR_SOURCE,
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid post",
                errors.to_string(),
            ),
            PostError::Repo(err) => repo_failure(&err),
        }
    }
}

impl From<CommentError> for HttpError {
    fn from(error: CommentError) -> Self {
        match error {
            CommentError::PostNotFound => HttpError::new(
                ERROR_SOURCE,
                StatusCode::NOT_FOUND,
                "Post not found",
                "Comment target does not exist",
            ),
            CommentError::AuthenticationRequired => authentication_required(),
            CommentError::Invalid(errors) => HttpError::new(
                ERROR_SOURCE,
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid comment",
                errors.to_string(),
            ),
            CommentError::Repo(err) => repo_failure(&err),
        }
    }
}

impl From<FollowError> for HttpError {
    fn from(error: FollowError) -> Self {
        match error {
            FollowError::UnknownAuthor(username) => HttpError::new(
                ERROR_SOURCE,
                StatusCode::NOT_FOUND,
                "Unknown author",
                format!("User `{username}` does not exist"),
            ),
            FollowError::AuthenticationRequired => authentication_required(),
            FollowError::Repo(err) => repo_failure(&err),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Infra(InfraError::Configuration { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Infra(InfraError::Telemetry(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Infra(InfraError::Database { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Infra(InfraError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "Resource not found",
            AppError::Validation(_) => "Request could not be processed",
            AppError::Infra(InfraError::Database { .. }) => "Service temporarily unavailable",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

impl From<AdminError> for AppError {
    fn from(error: AdminError) -> Self {
        match error {
            AdminError::NotFound(entity) => AppError::NotFound(entity),
            AdminError::ConstraintViolation(field) => {
                AppError::validation(format!("invalid or conflicting value for `{field}`"))
            }
            AdminError::Slug(err) => AppError::validation(err.to_string()),
            AdminError::Repo(err) => AppError::Infra(InfraError::database(err.to_string())),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_admin_target_maps_to_not_found() {
        let error = AppError::from(AdminError::NotFound("group"));
        assert_eq!(error.to_string(), "group not found");
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }
}
