//! HTML presentation: view models and askama templates.

pub mod views;
