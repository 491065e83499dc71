//! Value types describing which slice of the feed is being viewed.

use std::{collections::BTreeSet, fmt, num::NonZeroU32};

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Posts shown per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: NonZeroU32 = match NonZeroU32::new(12) {
    Some(size) => size,
    None => panic!("page size must be non-zero"),
};

/// Zero-based page position within the feed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PageIndex(u32);

impl PageIndex {
    pub const FIRST: PageIndex = PageIndex(0);

    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Convert the 1-based number shown in the page selector.
    pub fn from_page_number(number: u32) -> Result<Self, DomainError> {
        number
            .checked_sub(1)
            .map(Self)
            .ok_or_else(|| DomainError::validation("page numbers start at 1"))
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn page_number(self) -> u32 {
        self.0 + 1
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }

    /// First row of this page, inclusive.
    pub fn first_row(self, page_size: NonZeroU32) -> u64 {
        u64::from(self.0) * u64::from(page_size.get())
    }

    /// Last row of this page, inclusive.
    pub fn last_row(self, page_size: NonZeroU32) -> u64 {
        self.first_row(page_size) + u64::from(page_size.get()) - 1
    }

    pub fn is_within(self, total_pages: u32) -> bool {
        self.0 < total_pages
    }
}

impl fmt::Display for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of pages needed to show `total_count` rows.
pub fn total_pages(total_count: u64, page_size: NonZeroU32) -> u32 {
    let pages = total_count.div_ceil(u64::from(page_size.get()));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Sorted, deduplicated set of company names restricting the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSet(BTreeSet<String>);

impl FilterSet {
    pub fn new<I, S>(companies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            companies
                .into_iter()
                .map(Into::into)
                .filter(|company| !company.trim().is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, company: &str) -> bool {
        self.0.contains(company)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Free-text search; the empty term means "no search".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchTerm(String);

impl SearchTerm {
    pub fn new(term: impl AsRef<str>) -> Self {
        Self(term.as_ref().trim().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Filter set and search term in effect for a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FeedCriteria {
    pub filters: FilterSet,
    pub search: SearchTerm,
}

impl FeedCriteria {
    pub fn new(filters: FilterSet, search: SearchTerm) -> Self {
        Self { filters, search }
    }

    /// Page results may only be cached for the unfiltered, unsearched feed.
    pub fn is_cacheable(&self) -> bool {
        self.filters.is_empty() && self.search.is_empty()
    }
}

/// Which navigation actions are available for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    pub current: PageIndex,
    pub total_pages: u32,
}

impl PageBounds {
    pub fn new(current: PageIndex, total_pages: u32) -> Self {
        Self {
            current,
            total_pages,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.current.get() > 0
    }

    pub fn has_next(&self) -> bool {
        self.current.get().saturating_add(1) < self.total_pages
    }

    pub fn contains(&self, page: PageIndex) -> bool {
        page.is_within(self.total_pages)
    }

    pub fn last(&self) -> Option<PageIndex> {
        self.total_pages.checked_sub(1).map(PageIndex::new)
    }
}
