//! Application services: validation, authorization, and orchestration over the repositories.

pub mod auth;
pub mod comments;
pub mod error;
pub mod follows;
pub mod groups;
pub mod pagination;
pub mod posts;
pub mod repos;
