//! Domain layer types and invariants.

pub mod entities;
pub mod posts;
pub mod slug;
pub mod types;
