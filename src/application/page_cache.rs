//! Session-scoped cache of unfiltered feed pages.
//!
//! Entries live in the session's [`SessionStorage`] under `poasts-{page}`, next to
//! `totalPages` (last known page count) and `currentPage` (last viewed page).
//! Entries carry no TTL; a session sees the feed as it was when each page was
//! first fetched.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::application::repos::SessionStorage;
use crate::domain::entities::PostRecord;
use crate::domain::feed::PageIndex;

const SOURCE: &str = "application::page_cache";

pub const CURRENT_PAGE_KEY: &str = "currentPage";
pub const TOTAL_PAGES_KEY: &str = "totalPages";

pub fn page_key(page: PageIndex) -> String {
    format!("poasts-{page}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    pub posts: Vec<PostRecord>,
    pub total_pages: u32,
}

#[derive(Clone)]
pub struct PageCache {
    storage: Arc<dyn SessionStorage>,
}

impl PageCache {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    /// Cached posts for `page`, present only when both the page and the page count are stored.
    pub fn get(&self, page: PageIndex) -> Option<CachedPage> {
        let key = page_key(page);
        let cached = self
            .storage
            .get_item(&key)
            .zip(self.storage.get_item(TOTAL_PAGES_KEY));

        let Some((raw_posts, raw_total)) = cached else {
            counter!("engblogs_page_cache_miss_total").increment(1);
            return None;
        };

        let posts = match serde_json::from_str::<Vec<PostRecord>>(&raw_posts) {
            Ok(posts) => posts,
            Err(err) => {
                warn!(
                    target = SOURCE,
                    key = %key,
                    error = %err,
                    "discarding unreadable cache entry"
                );
                self.storage.remove_item(&key);
                counter!("engblogs_page_cache_miss_total").increment(1);
                return None;
            }
        };

        let Ok(total_pages) = raw_total.trim().parse::<u32>() else {
            warn!(
                target = SOURCE,
                value = %raw_total,
                "discarding unreadable page count"
            );
            self.storage.remove_item(TOTAL_PAGES_KEY);
            counter!("engblogs_page_cache_miss_total").increment(1);
            return None;
        };

        counter!("engblogs_page_cache_hit_total").increment(1);
        Some(CachedPage { posts, total_pages })
    }

    pub fn contains(&self, page: PageIndex) -> bool {
        self.storage.get_item(&page_key(page)).is_some()
    }

    pub fn put(&self, page: PageIndex, posts: &[PostRecord], total_pages: u32) {
        match serde_json::to_string(posts) {
            Ok(serialized) => {
                self.storage.set_item(&page_key(page), serialized);
                self.storage
                    .set_item(TOTAL_PAGES_KEY, total_pages.to_string());
                debug!(target = SOURCE, page = page.get(), total_pages, "cached page");
            }
            Err(err) => {
                warn!(
                    target = SOURCE,
                    page = page.get(),
                    error = %err,
                    "failed to serialise page for cache"
                );
            }
        }
    }

    pub fn current_page(&self) -> Option<PageIndex> {
        self.storage
            .get_item(CURRENT_PAGE_KEY)
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .map(PageIndex::new)
    }

    pub fn set_current_page(&self, page: PageIndex) {
        self.storage.set_item(CURRENT_PAGE_KEY, page.to_string());
    }
}
