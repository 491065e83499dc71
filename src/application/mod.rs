//! Feed orchestration: query building, session caching, prefetch and state.

pub mod error;
pub mod feed;
pub mod page_cache;
pub mod prefetch;
pub mod query;
pub mod repos;
