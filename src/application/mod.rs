//! Application services: feeds, posts, comments, follows and operator tooling.

pub mod admin;
pub mod comments;
pub mod error;
pub mod feed;
pub mod follows;
pub mod forms;
pub mod pagination;
pub mod posts;
pub mod repos;
