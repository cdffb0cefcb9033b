//! Yatube: a small publishing site where authors write posts, file them under
//! groups, comment on each other's work, and follow the authors they like.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
