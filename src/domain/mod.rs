//! Domain layer types and invariants.

pub mod entities;
pub mod error;
pub mod groups;
pub mod posts;
pub mod slug;
pub mod users;
pub mod validation;
