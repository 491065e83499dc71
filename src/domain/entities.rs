//! Records mirrored from the hosted `poasts` / `links` tables.

use serde::{Deserialize, Serialize};
use time::{Date, format_description::FormatItem, macros::format_description};

pub const PUBLISHED_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

time::serde::format_description!(published_date, Date, "[year]-[month]-[day]");

/// A single blog entry surfaced to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: i64,
    pub title: String,
    #[serde(with = "published_date")]
    pub published_at: Date,
    pub link: String,
    #[serde(default)]
    pub summary: String,
    pub company: String,
    #[serde(default)]
    pub description: String,
    /// Joined through `posts_company_fkey`; absent when the company has no `links` row.
    #[serde(default, rename = "links")]
    pub logo: Option<CompanyLinkRecord>,
}

impl PostRecord {
    pub fn logo_url(&self) -> Option<&str> {
        self.logo
            .as_ref()
            .and_then(|link| link.logo_url.as_deref())
            .filter(|url| !url.is_empty())
    }

    pub fn published_label(&self) -> String {
        self.published_at
            .format(PUBLISHED_DATE_FORMAT)
            .unwrap_or_else(|_| self.published_at.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyLinkRecord {
    #[serde(default)]
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompanyRecord {
    pub company: String,
}
