use crate::application::error::{ErrorReport, HttpError};
use crate::application::feed::{FeedSnapshot, FeedStatus};
use crate::domain::entities::PostRecord;
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

/// Seconds before a page still waiting on the remote source asks for itself again.
const LOADING_REFRESH_SECONDS: u32 = 1;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Render the feed page. A failed load is still a 200 with the error panel,
/// but carries an [`ErrorReport`] so the response log records the cause.
pub fn render_feed_response(view: FeedPageView) -> Response {
    let failure = view.error.clone();
    let mut response = render_template_response(IndexTemplate { view }, StatusCode::OK);
    if let Some(message) = failure {
        ErrorReport::from_message(
            "presentation::views::render_feed_response",
            StatusCode::OK,
            message,
        )
        .attach(&mut response);
    }
    response
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostCardView {
    pub title: String,
    pub link: String,
    pub company: String,
    pub published: String,
    pub summary: String,
    pub logo_url: Option<String>,
}

impl From<&PostRecord> for PostCardView {
    fn from(post: &PostRecord) -> Self {
        Self {
            title: post.title.clone(),
            link: post.link.clone(),
            company: post.company.clone(),
            published: post.published_label(),
            summary: punctuated(&post.summary),
            logo_url: post.logo_url().map(str::to_string),
        }
    }
}

/// Close a summary with a period unless it already ends in terminal punctuation.
pub fn punctuated(summary: &str) -> String {
    let trimmed = summary.trim_end();
    if trimmed.is_empty() || trimmed.ends_with(['.', '!', '?']) {
        trimmed.to_string()
    } else {
        format!("{trimmed}.")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageOptionView {
    pub number: u32,
    pub selected: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaginationView {
    pub current: u32,
    pub total_pages: u32,
    pub has_previous: bool,
    pub has_next: bool,
    pub options: Vec<PageOptionView>,
}

impl PaginationView {
    pub fn from_snapshot(snapshot: &FeedSnapshot) -> Option<Self> {
        if snapshot.total_pages == 0 {
            return None;
        }
        let bounds = snapshot.bounds();
        let current = snapshot.page.page_number();
        Some(Self {
            current,
            total_pages: snapshot.total_pages,
            has_previous: bounds.has_previous(),
            has_next: bounds.has_next(),
            options: (1..=snapshot.total_pages)
                .map(|number| PageOptionView {
                    number,
                    selected: number == current,
                })
                .collect(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterOptionView {
    pub name: String,
    pub selected: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterView {
    pub placeholder: String,
    pub options: Vec<FilterOptionView>,
}

impl FilterView {
    pub fn new(companies: &[String], snapshot: &FeedSnapshot) -> Self {
        let filters = &snapshot.criteria.filters;
        let placeholder = match filters.len() {
            0 => "filter by company".to_string(),
            1 => "1 company selected".to_string(),
            n => format!("{n} companies selected"),
        };

        let mut options: Vec<FilterOptionView> = companies
            .iter()
            .map(|name| FilterOptionView {
                selected: filters.contains(name),
                name: name.clone(),
            })
            .collect();
        // Keep active filters visible even if the company list is stale or unavailable.
        for name in filters.iter() {
            if !companies.iter().any(|company| company == name) {
                options.push(FilterOptionView {
                    name: name.to_string(),
                    selected: true,
                });
            }
        }

        Self {
            placeholder,
            options,
        }
    }
}

pub struct FeedPageView {
    pub posts: Vec<PostCardView>,
    pub pagination: Option<PaginationView>,
    pub filter: FilterView,
    pub search_term: String,
    pub loading: bool,
    pub error: Option<String>,
    pub refresh_seconds: u32,
}

impl FeedPageView {
    pub fn new(snapshot: &FeedSnapshot, companies: &[String]) -> Self {
        let (loading, error) = match &snapshot.status {
            FeedStatus::Idle | FeedStatus::Loading => (true, None),
            FeedStatus::Loaded => (false, None),
            FeedStatus::Failed { message } => (false, Some(message.clone())),
        };

        Self {
            posts: snapshot.posts.iter().map(PostCardView::from).collect(),
            pagination: PaginationView::from_snapshot(snapshot),
            filter: FilterView::new(companies, snapshot),
            search_term: snapshot.criteria.search.as_str().to_string(),
            loading,
            error,
            refresh_seconds: LOADING_REFRESH_SECONDS,
        }
    }

    /// Whether the grid and footer are shown.
    pub fn is_ready(&self) -> bool {
        !self.loading && self.error.is_none()
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: FeedPageView,
}
