//! Traits describing the adapters the feed depends on.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::query::FeedQuery;
use crate::domain::entities::PostRecord;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("response is missing an exact row count")]
    MissingCount,
    #[error("backend timeout")]
    Timeout,
}

impl SourceError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

/// One page of posts plus the total number of rows matching the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPage {
    pub posts: Vec<PostRecord>,
    pub total_count: u64,
}

impl PostPage {
    pub fn empty() -> Self {
        Self {
            posts: Vec::new(),
            total_count: 0,
        }
    }
}

/// Read access to the hosted posts table.
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_page(&self, query: &FeedQuery) -> Result<PostPage, SourceError>;

    /// Company names offered by the filter control, ascending.
    async fn list_companies(&self) -> Result<Vec<String>, SourceError>;
}

/// String key/value storage that lives as long as one browsing session.
pub trait SessionStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;

    fn set_item(&self, key: &str, value: String);

    fn remove_item(&self, key: &str);
}
