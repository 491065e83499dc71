//! Feed state per browsing session and the service that drives it.
//!
//! [`FeedController`] is the synchronous state machine: it owns the page index,
//! criteria, current posts and status, decides between the page cache and a remote
//! fetch, and only accepts results carrying the most recently issued token.
//! [`FeedService`] performs the I/O around it without holding the session lock
//! across network calls.

use std::{
    num::NonZeroU32,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use metrics::counter;
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::page_cache::PageCache;
use crate::application::prefetch::{PrefetchReport, Prefetcher};
use crate::application::query::{FeedQuery, SearchScope};
use crate::application::repos::{PostPage, PostSource, SessionStorage, SourceError};
use crate::domain::entities::PostRecord;
use crate::domain::feed::{
    DEFAULT_PAGE_SIZE, FeedCriteria, FilterSet, PageBounds, PageIndex, SearchTerm,
};
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "application::feed";
const DEFAULT_COMPANIES_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("page {requested} is outside the {total_pages} available pages")]
    PageOutOfRange { requested: u32, total_pages: u32 },
    #[error("already on the first page")]
    NoPreviousPage,
}

/// Identifies one issued fetch; only the latest may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestToken(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    /// Nothing requested yet in this session.
    Idle,
    Loading,
    Loaded,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Load the current page if nothing has been loaded yet.
    Load,
    FiltersChanged(FilterSet),
    SearchCommitted(SearchTerm),
    PageSelected(PageIndex),
    NextPage,
    PreviousPage,
    Retry,
}

#[derive(Debug, Clone)]
pub struct FetchTicket {
    pub token: RequestToken,
    pub query: FeedQuery,
}

#[derive(Debug, Clone)]
pub enum FetchPlan {
    /// State was served from the page cache; nothing to fetch.
    Cached,
    Remote(FetchTicket),
    /// The event did not require any fetch.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Applied,
    Stale,
}

/// Read-only copy of a session's feed state for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub page: PageIndex,
    pub total_pages: u32,
    pub posts: Vec<PostRecord>,
    pub criteria: FeedCriteria,
    pub status: FeedStatus,
}

impl FeedSnapshot {
    pub fn bounds(&self) -> PageBounds {
        PageBounds::new(self.page, self.total_pages)
    }

    pub fn is_loaded(&self) -> bool {
        self.status == FeedStatus::Loaded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    pub page_size: NonZeroU32,
    pub scope: SearchScope,
    pub prefetch: bool,
    pub companies_ttl: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            scope: SearchScope::default(),
            prefetch: true,
            companies_ttl: DEFAULT_COMPANIES_TTL,
        }
    }
}

impl From<&crate::config::Settings> for FeedOptions {
    fn from(settings: &crate::config::Settings) -> Self {
        Self {
            page_size: settings.feed.page_size,
            scope: settings.feed.search_scope,
            prefetch: settings.feed.prefetch,
            companies_ttl: settings.session.companies_ttl,
        }
    }
}

pub struct FeedController {
    cache: PageCache,
    page_size: NonZeroU32,
    scope: SearchScope,
    page: PageIndex,
    total_pages: u32,
    posts: Vec<PostRecord>,
    criteria: FeedCriteria,
    status: FeedStatus,
    last_issued: u64,
}

impl FeedController {
    /// Start a controller over `cache`, resuming the last viewed page if its storage has one.
    ///
    /// Storage outlives the controller only when the caller keeps it; the session
    /// registry keeps the whole [`FeedSession`] instead.
    pub fn restore(cache: PageCache, page_size: NonZeroU32, scope: SearchScope) -> Self {
        let page = cache.current_page().unwrap_or(PageIndex::FIRST);
        Self {
            cache,
            page_size,
            scope,
            page,
            total_pages: 0,
            posts: Vec::new(),
            criteria: FeedCriteria::default(),
            status: FeedStatus::Idle,
            last_issued: 0,
        }
    }

    pub fn page(&self) -> PageIndex {
        self.page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn criteria(&self) -> &FeedCriteria {
        &self.criteria
    }

    pub fn status(&self) -> &FeedStatus {
        &self.status
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            page: self.page,
            total_pages: self.total_pages,
            posts: self.posts.clone(),
            criteria: self.criteria.clone(),
            status: self.status.clone(),
        }
    }

    pub fn apply(&mut self, event: FeedEvent) -> Result<FetchPlan, FeedError> {
        match event {
            FeedEvent::Load => {
                if self.status == FeedStatus::Idle {
                    Ok(self.begin())
                } else {
                    Ok(FetchPlan::Unchanged)
                }
            }
            FeedEvent::FiltersChanged(filters) => {
                self.criteria.filters = filters;
                self.page = PageIndex::FIRST;
                Ok(self.begin())
            }
            FeedEvent::SearchCommitted(term) => {
                self.criteria.search = term;
                self.page = PageIndex::FIRST;
                Ok(self.begin())
            }
            FeedEvent::PageSelected(page) => {
                self.ensure_navigable(page)?;
                self.page = page;
                Ok(self.begin())
            }
            FeedEvent::NextPage => {
                let next = self.page.next();
                self.ensure_navigable(next)?;
                self.page = next;
                Ok(self.begin())
            }
            FeedEvent::PreviousPage => {
                let previous = self.page.previous().ok_or(FeedError::NoPreviousPage)?;
                self.page = previous;
                Ok(self.begin())
            }
            FeedEvent::Retry => {
                if matches!(self.status, FeedStatus::Failed { .. }) {
                    Ok(self.begin())
                } else {
                    Ok(FetchPlan::Unchanged)
                }
            }
        }
    }

    /// Commit the outcome of a remote fetch issued by [`FeedController::apply`].
    pub fn resolve(
        &mut self,
        ticket: FetchTicket,
        outcome: Result<PostPage, SourceError>,
    ) -> Commit {
        if ticket.token.0 != self.last_issued {
            counter!("engblogs_stale_response_total").increment(1);
            debug!(
                target = SOURCE,
                token = ticket.token.0,
                latest = self.last_issued,
                "discarding stale response"
            );
            return Commit::Stale;
        }

        match outcome {
            Ok(fetched) => {
                let total_pages = ticket.query.total_pages(fetched.total_count);
                if ticket.query.criteria.is_cacheable() {
                    self.cache.put(ticket.query.page, &fetched.posts, total_pages);
                }
                self.posts = fetched.posts;
                self.total_pages = total_pages;
                self.status = FeedStatus::Loaded;
            }
            Err(err) => {
                self.posts.clear();
                self.status = FeedStatus::Failed {
                    message: err.to_string(),
                };
            }
        }
        Commit::Applied
    }

    /// Page to move to when a loaded page lies beyond the available pages.
    pub fn clamp_target(&self) -> Option<PageIndex> {
        if self.status != FeedStatus::Loaded || self.page.is_within(self.total_pages) {
            return None;
        }
        if self.page == PageIndex::FIRST {
            return None;
        }
        Some(
            PageBounds::new(self.page, self.total_pages)
                .last()
                .unwrap_or(PageIndex::FIRST),
        )
    }

    fn ensure_navigable(&self, page: PageIndex) -> Result<(), FeedError> {
        if page == PageIndex::FIRST || page.is_within(self.total_pages) {
            Ok(())
        } else {
            Err(FeedError::PageOutOfRange {
                requested: page.page_number(),
                total_pages: self.total_pages,
            })
        }
    }

    fn begin(&mut self) -> FetchPlan {
        self.cache.set_current_page(self.page);
        self.last_issued += 1;
        let token = RequestToken(self.last_issued);

        if self.criteria.is_cacheable()
            && let Some(cached) = self.cache.get(self.page)
        {
            self.posts = cached.posts;
            self.total_pages = cached.total_pages;
            self.status = FeedStatus::Loaded;
            return FetchPlan::Cached;
        }

        self.status = FeedStatus::Loading;
        FetchPlan::Remote(FetchTicket {
            token,
            query: FeedQuery::new(self.page, self.page_size, self.criteria.clone(), self.scope),
        })
    }
}

/// Feed state bound to one browser session.
pub struct FeedSession {
    id: Uuid,
    storage: Arc<dyn SessionStorage>,
    controller: Arc<Mutex<FeedController>>,
}

impl FeedSession {
    pub fn new(id: Uuid, storage: Arc<dyn SessionStorage>, options: &FeedOptions) -> Self {
        let cache = PageCache::new(storage.clone());
        Self {
            id,
            storage,
            controller: Arc::new(Mutex::new(FeedController::restore(
                cache,
                options.page_size,
                options.scope,
            ))),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    pub async fn snapshot(&self) -> FeedSnapshot {
        self.controller.lock().await.snapshot()
    }
}

/// Result of dispatching one event.
pub struct FeedOutcome {
    pub snapshot: FeedSnapshot,
    /// Neighbour warming started for the committed state, if any.
    pub prefetch: Option<JoinHandle<PrefetchReport>>,
}

struct CompanyDirectory {
    fetched_at: Instant,
    companies: Arc<Vec<String>>,
}

#[derive(Clone)]
pub struct FeedService {
    source: Arc<dyn PostSource>,
    options: FeedOptions,
    companies: Arc<RwLock<Option<CompanyDirectory>>>,
}

impl FeedService {
    pub fn new(source: Arc<dyn PostSource>, options: FeedOptions) -> Self {
        Self {
            source,
            options,
            companies: Arc::new(RwLock::new(None)),
        }
    }

    pub fn options(&self) -> &FeedOptions {
        &self.options
    }

    pub fn open_session(&self, id: Uuid, storage: Arc<dyn SessionStorage>) -> FeedSession {
        FeedSession::new(id, storage, &self.options)
    }

    /// Apply `event` to the session, fetching as needed, and start neighbour prefetch.
    pub async fn dispatch(
        &self,
        session: &FeedSession,
        event: FeedEvent,
    ) -> Result<FeedOutcome, FeedError> {
        let plan = session.controller.lock().await.apply(event)?;
        let mut changed = self.execute(session, plan).await;

        let clamp = session.controller.lock().await.clamp_target();
        if let Some(target) = clamp {
            info!(
                target = SOURCE,
                session = %session.id,
                page = target.get(),
                "stored page is past the end of the feed; moving to last page"
            );
            let plan = session
                .controller
                .lock()
                .await
                .apply(FeedEvent::PageSelected(target))?;
            changed |= self.execute(session, plan).await;
        }

        let controller = session.controller.lock().await;
        let snapshot = controller.snapshot();
        let prefetch = if changed && snapshot.is_loaded() {
            self.spawn_prefetch(controller.cache().clone(), &snapshot)
        } else {
            None
        };

        Ok(FeedOutcome { snapshot, prefetch })
    }

    async fn execute(&self, session: &FeedSession, plan: FetchPlan) -> bool {
        match plan {
            FetchPlan::Unchanged => false,
            FetchPlan::Cached => {
                debug!(target = SOURCE, session = %session.id, "served page from cache");
                true
            }
            FetchPlan::Remote(ticket) => {
                // The commit runs detached from the request: a dropped request must
                // not leave the session waiting on a ticket that never resolves.
                let task = tokio::spawn(fetch_and_commit(
                    self.source.clone(),
                    session.controller.clone(),
                    session.id,
                    ticket.clone(),
                ));
                match task.await {
                    Ok(commit) => commit == Commit::Applied,
                    Err(err) => {
                        error!(
                            target = SOURCE,
                            session = %session.id,
                            error = %err,
                            "fetch task aborted"
                        );
                        let outcome = Err(SourceError::transport(err));
                        session.controller.lock().await.resolve(ticket, outcome) == Commit::Applied
                    }
                }
            }
        }
    }

    fn spawn_prefetch(
        &self,
        cache: PageCache,
        snapshot: &FeedSnapshot,
    ) -> Option<JoinHandle<PrefetchReport>> {
        if !self.options.prefetch || !snapshot.criteria.is_cacheable() {
            return None;
        }

        let prefetcher = Prefetcher::new(
            self.source.clone(),
            cache,
            self.options.page_size,
            self.options.scope,
        );
        let criteria = snapshot.criteria.clone();
        let page = snapshot.page;
        let total_pages = snapshot.total_pages;
        Some(tokio::spawn(async move {
            prefetcher.warm(&criteria, page, total_pages).await
        }))
    }

    /// Companies offered by the filter control. Failures fall back to the last known list.
    pub async fn companies(&self) -> Arc<Vec<String>> {
        {
            let guard = rw_read(&self.companies, SOURCE, "companies");
            if let Some(directory) = guard.as_ref()
                && directory.fetched_at.elapsed() < self.options.companies_ttl
            {
                return directory.companies.clone();
            }
        }

        match self.source.list_companies().await {
            Ok(mut companies) => {
                companies.sort();
                companies.dedup();
                let companies = Arc::new(companies);
                *rw_write(&self.companies, SOURCE, "companies") = Some(CompanyDirectory {
                    fetched_at: Instant::now(),
                    companies: companies.clone(),
                });
                companies
            }
            Err(err) => {
                warn!(
                    target = SOURCE,
                    error = %err,
                    "error fetching companies"
                );
                rw_read(&self.companies, SOURCE, "companies")
                    .as_ref()
                    .map(|directory| directory.companies.clone())
                    .unwrap_or_default()
            }
        }
    }
}

async fn fetch_and_commit(
    source: Arc<dyn PostSource>,
    controller: Arc<Mutex<FeedController>>,
    session: Uuid,
    ticket: FetchTicket,
) -> Commit {
    let outcome = source.fetch_page(&ticket.query).await;
    if let Err(err) = &outcome {
        counter!("engblogs_fetch_error_total").increment(1);
        error!(
            target = SOURCE,
            session = %session,
            page = ticket.query.page.get(),
            error = %err,
            "error fetching posts"
        );
    }
    controller.lock().await.resolve(ticket, outcome)
}
