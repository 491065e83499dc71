//! Server-rendered reader for a curated feed of company engineering-blog posts.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
pub(crate) mod util;
