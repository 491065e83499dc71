//! Best-effort warming of the pages adjacent to the one being viewed.

use std::{num::NonZeroU32, sync::Arc};

use futures::future::join_all;
use metrics::counter;
use tracing::{debug, warn};

use crate::application::page_cache::PageCache;
use crate::application::query::{FeedQuery, SearchScope};
use crate::application::repos::PostSource;
use crate::domain::feed::{FeedCriteria, PageBounds, PageIndex};

const SOURCE: &str = "application::prefetch";

/// Pages worth warming around `current`: the next page first, then the previous one.
pub fn neighbours(current: PageIndex, total_pages: u32) -> Vec<PageIndex> {
    let bounds = PageBounds::new(current, total_pages);
    let mut pages = Vec::with_capacity(2);
    if bounds.has_next() {
        pages.push(current.next());
    }
    if let Some(previous) = current.previous() {
        pages.push(previous);
    }
    pages
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    pub warmed: Vec<PageIndex>,
    pub already_cached: Vec<PageIndex>,
    pub failed: Vec<PageIndex>,
    /// Set when the criteria were not cacheable and nothing was attempted.
    pub bypassed: bool,
}

#[derive(Clone)]
pub struct Prefetcher {
    source: Arc<dyn PostSource>,
    cache: PageCache,
    page_size: NonZeroU32,
    scope: SearchScope,
}

impl Prefetcher {
    pub fn new(
        source: Arc<dyn PostSource>,
        cache: PageCache,
        page_size: NonZeroU32,
        scope: SearchScope,
    ) -> Self {
        Self {
            source,
            cache,
            page_size,
            scope,
        }
    }

    /// Fetch and cache uncached neighbours of `current`. Never fails; errors are logged.
    pub async fn warm(
        &self,
        criteria: &FeedCriteria,
        current: PageIndex,
        total_pages: u32,
    ) -> PrefetchReport {
        let mut report = PrefetchReport::default();

        if !criteria.is_cacheable() {
            report.bypassed = true;
            counter!("engblogs_prefetch_total", "outcome" => "bypassed").increment(1);
            return report;
        }

        let mut pending = Vec::new();
        for page in neighbours(current, total_pages) {
            if self.cache.contains(page) {
                report.already_cached.push(page);
            } else {
                pending.push(page);
            }
        }

        let fetches = pending.into_iter().map(|page| {
            let query = FeedQuery::new(page, self.page_size, criteria.clone(), self.scope);
            async move {
                let result = self.source.fetch_page(&query).await;
                (page, result, query)
            }
        });

        for (page, result, query) in join_all(fetches).await {
            match result {
                Ok(fetched) => {
                    let total = query.total_pages(fetched.total_count);
                    self.cache.put(page, &fetched.posts, total);
                    counter!("engblogs_prefetch_total", "outcome" => "warmed").increment(1);
                    debug!(target = SOURCE, page = page.get(), "prefetched page");
                    report.warmed.push(page);
                }
                Err(err) => {
                    counter!("engblogs_prefetch_total", "outcome" => "failed").increment(1);
                    warn!(
                        target = SOURCE,
                        page = page.get(),
                        error = %err,
                        "prefetch failed"
                    );
                    report.failed.push(page);
                }
            }
        }

        report
    }
}
