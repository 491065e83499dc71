#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use engblogs::application::query::FeedQuery;
use engblogs::application::repos::{PostPage, PostSource, SourceError};
use engblogs::domain::entities::{CompanyLinkRecord, PostRecord};
use engblogs::domain::feed::PageIndex;
use time::{Date, Duration, macros::date};
use tokio::sync::Notify;

/// In-memory posts table honouring the same filter, order and range semantics as the remote one.
pub struct FakeSource {
    posts: Vec<PostRecord>,
    calls: AtomicUsize,
    requested: Mutex<Vec<PageIndex>>,
    failing: AtomicBool,
    gate: Option<(PageIndex, Arc<Notify>)>,
}

impl FakeSource {
    pub fn new(mut posts: Vec<PostRecord>) -> Self {
        posts.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Self {
            posts,
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            gate: None,
        }
    }

    /// Hold fetches of `page` until `gate` is notified.
    pub fn gated(mut self, page: PageIndex, gate: Arc<Notify>) -> Self {
        self.gate = Some((page, gate));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<PageIndex> {
        self.requested.lock().expect("requested lock").clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PostSource for FakeSource {
    async fn fetch_page(&self, query: &FeedQuery) -> Result<PostPage, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .expect("requested lock")
            .push(query.page);

        if let Some((page, gate)) = &self.gate
            && *page == query.page
        {
            gate.notified().await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Timeout);
        }

        let matching: Vec<&PostRecord> = self.posts.iter().filter(|post| query.matches(post)).collect();
        let (first, _) = query.row_range();
        let posts = matching
            .iter()
            .skip(first as usize)
            .take(query.page_size.get() as usize)
            .map(|post| (*post).clone())
            .collect();

        Ok(PostPage {
            posts,
            total_count: matching.len() as u64,
        })
    }

    async fn list_companies(&self) -> Result<Vec<String>, SourceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Timeout);
        }
        let mut companies: Vec<String> = self.posts.iter().map(|post| post.company.clone()).collect();
        companies.sort();
        companies.dedup();
        Ok(companies)
    }
}

pub fn post(id: i64, company: &str, title: &str, published_at: Date) -> PostRecord {
    PostRecord {
        id,
        title: title.to_string(),
        published_at,
        link: format!("https://blog.example.com/{id}"),
        summary: format!("Notes from {company}"),
        company: company.to_string(),
        description: String::new(),
        logo: Some(CompanyLinkRecord {
            logo_url: Some(format!("https://cdn.example.com/{}.png", company.to_lowercase())),
        }),
    }
}

/// 25 posts over four companies, one per day, newest with the highest id.
pub fn catalogue() -> Vec<PostRecord> {
    let companies = ["Acme", "Globex", "Initech", "Umbrella"];
    let start = date!(2024 - 01 - 01);
    (1..=25)
        .map(|id| {
            let company = companies[(id as usize) % companies.len()];
            let mut record = post(
                id,
                company,
                &format!("{company} post {id}"),
                start + Duration::days(id),
            );
            if id == 7 {
                record.summary = "How we planned the launch".to_string();
            }
            if id == 19 {
                record.title = "Launch week recap".to_string();
            }
            record
        })
        .collect()
}
