//! Per-browser session state held in process memory.

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::{Arc, Mutex, RwLock},
    time::{Duration, Instant},
};

use lru::LruCache;
use metrics::gauge;
use tracing::debug;
use uuid::Uuid;

use crate::application::feed::{FeedService, FeedSession};
use crate::application::repos::SessionStorage;
use crate::util::lock::{mutex_lock, rw_read, rw_write};

const SOURCE: &str = "infra::session";

/// String map scoped to one session, mirroring the browser's `sessionStorage`.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.items, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        rw_read(&self.items, SOURCE, "get_item").get(key).cloned()
    }

    fn set_item(&self, key: &str, value: String) {
        rw_write(&self.items, SOURCE, "set_item").insert(key.to_string(), value);
    }

    fn remove_item(&self, key: &str) {
        rw_write(&self.items, SOURCE, "remove_item").remove(key);
    }
}

struct SessionEntry {
    session: Arc<FeedSession>,
    last_seen: Instant,
}

/// Live sessions, bounded by count and idle time.
///
/// Least recently used order doubles as last-seen order, so idle sessions are
/// always at the cold end of the cache.
pub struct SessionRegistry {
    feed: FeedService,
    sessions: Mutex<LruCache<Uuid, SessionEntry>>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(feed: FeedService, max_sessions: NonZeroUsize, idle_ttl: Duration) -> Self {
        Self {
            feed,
            sessions: Mutex::new(LruCache::new(max_sessions)),
            idle_ttl,
        }
    }

    /// Session for `id`, or a fresh one when the id is unknown or has expired.
    ///
    /// A reload within the session gets the same [`FeedSession`] back, so its
    /// page, criteria and page cache carry over. An expired or evicted session
    /// loses its storage with it and starts again on the first page.
    ///
    /// The boolean is `true` when a new session was created and its id must be
    /// handed back to the client.
    pub fn resolve(&self, id: Option<Uuid>) -> (Arc<FeedSession>, bool) {
        let now = Instant::now();
        let mut sessions = mutex_lock(&self.sessions, SOURCE, "resolve");
        self.prune_idle(&mut sessions, now);

        if let Some(entry) = id.and_then(|id| sessions.get_mut(&id)) {
            entry.last_seen = now;
            return (entry.session.clone(), false);
        }

        let id = Uuid::new_v4();
        let session = Arc::new(
            self.feed
                .open_session(id, Arc::new(MemorySessionStorage::new())),
        );
        if let Some((evicted, _)) = sessions.push(
            id,
            SessionEntry {
                session: session.clone(),
                last_seen: now,
            },
        ) && evicted != id
        {
            debug!(target = SOURCE, session = %evicted, "evicted least recently used session");
        }
        gauge!("engblogs_sessions_active").set(sessions.len() as f64);
        debug!(target = SOURCE, session = %id, "opened session");

        (session, true)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.sessions, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune_idle(&self, sessions: &mut LruCache<Uuid, SessionEntry>, now: Instant) {
        let mut pruned = 0usize;
        while let Some((_, entry)) = sessions.peek_lru() {
            if now.duration_since(entry.last_seen) < self.idle_ttl {
                break;
            }
            sessions.pop_lru();
            pruned += 1;
        }
        if pruned > 0 {
            debug!(target = SOURCE, pruned, "expired idle sessions");
            gauge!("engblogs_sessions_active").set(sessions.len() as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::feed::FeedOptions;
    use crate::application::query::FeedQuery;
    use crate::application::repos::{PostPage, PostSource, SourceError};
    use async_trait::async_trait;

    struct NoPosts;

    #[async_trait]
    impl PostSource for NoPosts {
        async fn fetch_page(&self, _query: &FeedQuery) -> Result<PostPage, SourceError> {
            Ok(PostPage::empty())
        }

        async fn list_companies(&self) -> Result<Vec<String>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn registry(max: usize, ttl: Duration) -> SessionRegistry {
        SessionRegistry::new(
            FeedService::new(Arc::new(NoPosts), FeedOptions::default()),
            NonZeroUsize::new(max).expect("non-zero"),
            ttl,
        )
    }

    #[test]
    fn storage_behaves_like_a_string_map() {
        let storage = MemorySessionStorage::new();
        assert!(storage.get_item("currentPage").is_none());

        storage.set_item("currentPage", "1".to_string());
        storage.set_item("currentPage", "2".to_string());
        assert_eq!(storage.get_item("currentPage").as_deref(), Some("2"));
        assert_eq!(storage.len(), 1);

        storage.remove_item("currentPage");
        assert!(storage.is_empty());
    }

    #[test]
    fn known_sessions_are_reused() {
        let registry = registry(4, Duration::from_secs(60));
        let (first, created) = registry.resolve(None);
        assert!(created);

        let (again, created) = registry.resolve(Some(first.id()));
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[tokio::test]
    async fn reload_keeps_the_live_feed_state() {
        let registry = registry(4, Duration::from_secs(60));
        let (first, _) = registry.resolve(None);
        registry
            .feed
            .dispatch(
                &first,
                crate::application::feed::FeedEvent::SearchCommitted(
                    crate::domain::feed::SearchTerm::new("rust"),
                ),
            )
            .await
            .expect("search");

        let (again, created) = registry.resolve(Some(first.id()));
        assert!(!created);
        assert!(Arc::ptr_eq(first.storage(), again.storage()));
        let snapshot = again.snapshot().await;
        assert_eq!(snapshot.criteria.search.as_str(), "rust");
        assert!(snapshot.is_loaded());
        assert_eq!(again.storage().get_item("currentPage").as_deref(), Some("0"));
    }

    #[test]
    fn unknown_ids_get_a_fresh_session() {
        let registry = registry(4, Duration::from_secs(60));
        let stranger = Uuid::new_v4();

        let (session, created) = registry.resolve(Some(stranger));

        assert!(created);
        assert_ne!(session.id(), stranger);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let registry = registry(2, Duration::from_secs(60));
        let (a, _) = registry.resolve(None);
        let (b, _) = registry.resolve(None);
        registry.resolve(Some(a.id()));
        registry.resolve(None);

        assert_eq!(registry.len(), 2);
        let (_, recreated) = registry.resolve(Some(b.id()));
        assert!(recreated);
    }

    #[test]
    fn idle_sessions_expire() {
        let registry = registry(4, Duration::from_millis(1));
        let (a, _) = registry.resolve(None);
        std::thread::sleep(Duration::from_millis(5));

        let (_, created) = registry.resolve(Some(a.id()));
        assert!(created);
        assert_eq!(registry.len(), 1);
    }
}
