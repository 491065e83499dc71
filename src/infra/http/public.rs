use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::{
    Form,
    cookie::{Cookie, CookieJar, SameSite},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    application::{
        error::HttpError,
        feed::{FeedEvent, FeedService, FeedSession},
    },
    config::SessionSettings,
    domain::feed::{FilterSet, PageIndex, SearchTerm},
    infra::session::SessionRegistry,
    presentation::views::{FeedPageView, render_feed_response},
};

use super::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub feed: FeedService,
    pub sessions: Arc<SessionRegistry>,
    pub cookie_name: Arc<str>,
}

impl HttpState {
    pub fn new(feed: FeedService, settings: &SessionSettings) -> Self {
        let sessions = SessionRegistry::new(feed.clone(), settings.max_sessions, settings.idle_ttl);
        Self {
            feed,
            sessions: Arc::new(sessions),
            cookie_name: Arc::from(settings.cookie_name.as_str()),
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/filters", post(change_filters))
        .route("/search", post(commit_search))
        .route("/page", post(select_page))
        .route("/page/next", post(next_page))
        .route("/page/prev", post(previous_page))
        .route("/retry", post(retry))
        .route("/_health", get(health))
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FilterForm {
    company: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchForm {
    q: String,
}

#[derive(Debug, Deserialize)]
struct PageForm {
    page: u32,
}

async fn index(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let (session, jar) = open_session(&state, jar);

    let snapshot = match state.feed.dispatch(&session, FeedEvent::Load).await {
        Ok(outcome) => outcome.snapshot,
        Err(err) => return (jar, HttpError::from(err)).into_response(),
    };
    let companies = state.feed.companies().await;

    (
        jar,
        render_feed_response(FeedPageView::new(&snapshot, &companies)),
    )
        .into_response()
}

async fn change_filters(
    State(state): State<HttpState>,
    jar: CookieJar,
    Form(form): Form<FilterForm>,
) -> Response {
    apply_event(state, jar, FeedEvent::FiltersChanged(FilterSet::new(form.company))).await
}

async fn commit_search(
    State(state): State<HttpState>,
    jar: CookieJar,
    Form(form): Form<SearchForm>,
) -> Response {
    apply_event(state, jar, FeedEvent::SearchCommitted(SearchTerm::new(form.q))).await
}

async fn select_page(
    State(state): State<HttpState>,
    jar: CookieJar,
    Form(form): Form<PageForm>,
) -> Response {
    let page = match PageIndex::from_page_number(form.page) {
        Ok(page) => page,
        Err(err) => return (jar, HttpError::from(err)).into_response(),
    };
    apply_event(state, jar, FeedEvent::PageSelected(page)).await
}

async fn next_page(State(state): State<HttpState>, jar: CookieJar) -> Response {
    apply_event(state, jar, FeedEvent::NextPage).await
}

async fn previous_page(State(state): State<HttpState>, jar: CookieJar) -> Response {
    apply_event(state, jar, FeedEvent::PreviousPage).await
}

async fn retry(State(state): State<HttpState>, jar: CookieJar) -> Response {
    apply_event(state, jar, FeedEvent::Retry).await
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn not_found() -> HttpError {
    HttpError::new(
        "infra::http::public::not_found",
        StatusCode::NOT_FOUND,
        "Not found",
        "no route matched the request",
    )
}

/// Run an interaction and send the browser back to the feed (post/redirect/get).
async fn apply_event(state: HttpState, jar: CookieJar, event: FeedEvent) -> Response {
    let (session, jar) = open_session(&state, jar);
    match state.feed.dispatch(&session, event).await {
        Ok(_) => (jar, Redirect::to("/")).into_response(),
        Err(err) => (jar, HttpError::from(err)).into_response(),
    }
}

fn open_session(state: &HttpState, jar: CookieJar) -> (Arc<FeedSession>, CookieJar) {
    let presented = jar
        .get(&state.cookie_name)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok());
    let (session, created) = state.sessions.resolve(presented);
    if !created {
        return (session, jar);
    }

    // No Max-Age: the cookie, like the cache behind it, ends with the browser session.
    let cookie = Cookie::build((state.cookie_name.to_string(), session.id().to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (session, jar.add(cookie))
}
