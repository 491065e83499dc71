//! [`PostSource`] backed by a hosted PostgREST endpoint.
//!
//! Posts are read from `{url}/rest/v1/{posts_table}` with the company logo embedded
//! through the configured foreign key. The exact row count comes back in the
//! `Content-Range` header because every request sends `Prefer: count=exact`.

use async_trait::async_trait;
use reqwest::{
    Client, RequestBuilder, Response, StatusCode, Url,
    header::{ACCEPT, AUTHORIZATION, CONTENT_RANGE, HeaderMap, HeaderValue},
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::application::query::FeedQuery;
use crate::application::repos::{PostPage, PostSource, SourceError};
use crate::config::SourceSettings;
use crate::domain::entities::{CompanyRecord, PostRecord};
use crate::infra::error::InfraError;

const SOURCE: &str = "infra::postgrest";
const REST_PATH: &str = "rest/v1/";
const POST_COLUMNS: &str = "id,title,company,published_at,link,summary,description";

#[derive(Clone, Debug)]
pub struct PostgrestSource {
    client: Client,
    base: Url,
    posts_table: String,
    links_table: String,
    select: String,
}

impl PostgrestSource {
    pub fn new(settings: &SourceSettings) -> Result<Self, InfraError> {
        let url = settings
            .url
            .as_ref()
            .ok_or_else(|| InfraError::configuration("source url is not configured"))?;
        let api_key = settings
            .api_key
            .as_deref()
            .ok_or_else(|| InfraError::configuration("source api key is not configured"))?;

        let base = rest_base(url)?;
        let client = Client::builder()
            .user_agent(concat!("engblogs/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .default_headers(default_headers(api_key)?)
            .build()?;

        Ok(Self {
            client,
            base,
            posts_table: settings.posts_table.clone(),
            links_table: settings.links_table.clone(),
            select: format!(
                "{POST_COLUMNS},links:{}!{}(logo_url)",
                settings.links_table, settings.logo_relation
            ),
        })
    }

    /// Full request URL for one page of posts.
    pub fn posts_url(&self, query: &FeedQuery) -> Result<Url, SourceError> {
        let mut url = self
            .base
            .join(&self.posts_table)
            .map_err(SourceError::transport)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", &self.select);
            for (key, value) in query.filter_params() {
                pairs.append_pair(key, &value);
            }
        }
        Ok(url)
    }

    pub fn companies_url(&self) -> Result<Url, SourceError> {
        let mut url = self
            .base
            .join(&self.links_table)
            .map_err(SourceError::transport)?;
        url.query_pairs_mut()
            .append_pair("select", "company")
            .append_pair("order", "company.asc");
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SourceError> {
        request.send().await.map_err(|err| {
            if err.is_timeout() {
                SourceError::Timeout
            } else {
                SourceError::transport(err)
            }
        })
    }
}

#[async_trait]
impl PostSource for PostgrestSource {
    async fn fetch_page(&self, query: &FeedQuery) -> Result<PostPage, SourceError> {
        let url = self.posts_url(query)?;
        debug!(target = SOURCE, page = query.page.get(), url = %url, "fetching posts");

        let response = self
            .send(self.client.get(url).header("Prefer", "count=exact"))
            .await?;
        let status = response.status();
        let total_count = parse_total_count(
            response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|value| value.to_str().ok()),
        );

        // Offsets past the last row are answered with 416 and the real count.
        if status == StatusCode::RANGE_NOT_SATISFIABLE
            && let Ok(total_count) = &total_count
        {
            return Ok(PostPage {
                posts: Vec::new(),
                total_count: *total_count,
            });
        }

        let posts: Vec<PostRecord> = read_json(response).await?;
        Ok(PostPage {
            posts,
            total_count: total_count?,
        })
    }

    async fn list_companies(&self) -> Result<Vec<String>, SourceError> {
        let url = self.companies_url()?;
        let response = self.send(self.client.get(url)).await?;
        let rows: Vec<CompanyRecord> = read_json(response).await?;
        Ok(rows.into_iter().map(|row| row.company).collect())
    }
}

fn rest_base(url: &Url) -> Result<Url, InfraError> {
    let mut base = url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(REST_PATH).map_err(|err| InfraError::SourceUrl {
        url: url.to_string(),
        reason: err.to_string(),
    })
}

fn default_headers(api_key: &str) -> Result<HeaderMap, InfraError> {
    let invalid = |_| InfraError::InvalidApiKey;

    let mut key = HeaderValue::from_str(api_key).map_err(invalid)?;
    key.set_sensitive(true);
    let mut bearer = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(invalid)?;
    bearer.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert("apikey", key);
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// Total from a `Content-Range` value such as `0-11/25` or `*/0`.
fn parse_total_count(header: Option<&str>) -> Result<u64, SourceError> {
    let header = header.ok_or(SourceError::MissingCount)?;
    let (_, total) = header
        .rsplit_once('/')
        .ok_or_else(|| SourceError::decode(format!("malformed content-range `{header}`")))?;
    match total.trim() {
        "*" => Err(SourceError::MissingCount),
        digits => digits
            .parse::<u64>()
            .map_err(|_| SourceError::decode(format!("malformed content-range `{header}`"))),
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, SourceError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(SourceError::transport)?;
    if !status.is_success() {
        return Err(SourceError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }
    serde_json::from_slice(&bytes).map_err(SourceError::decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::query::SearchScope;
    use crate::domain::feed::{
        DEFAULT_PAGE_SIZE, FeedCriteria, FilterSet, PageIndex, SearchTerm,
    };
    use std::time::Duration;

    fn settings() -> SourceSettings {
        SourceSettings {
            url: Some(Url::parse("https://demo.supabase.co").expect("url")),
            api_key: Some("anon-key".to_string()),
            timeout: Duration::from_secs(5),
            posts_table: "poasts".to_string(),
            links_table: "links".to_string(),
            logo_relation: "posts_company_fkey".to_string(),
        }
    }

    fn query(filters: &[&str], term: &str, page: u32) -> FeedQuery {
        FeedQuery::new(
            PageIndex::new(page),
            DEFAULT_PAGE_SIZE,
            FeedCriteria::new(FilterSet::new(filters.iter().copied()), SearchTerm::new(term)),
            SearchScope::AllFields,
        )
    }

    #[test]
    fn unfiltered_page_url() {
        let source = PostgrestSource::new(&settings()).expect("source");
        let url = source.posts_url(&query(&[], "", 1)).expect("url");

        insta::assert_snapshot!(
            url.as_str(),
            @"https://demo.supabase.co/rest/v1/poasts?select=id%2Ctitle%2Ccompany%2Cpublished_at%2Clink%2Csummary%2Cdescription%2Clinks%3Alinks%21posts_company_fkey%28logo_url%29&order=published_at.desc%2Cid.desc&offset=12&limit=12"
        );
    }

    #[test]
    fn filtered_page_url() {
        let source = PostgrestSource::new(&settings()).expect("source");
        let url = source.posts_url(&query(&["Acme"], "", 0)).expect("url");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs[2],
            ("company".to_string(), r#"in.("Acme")"#.to_string())
        );
        assert_eq!(pairs[1].1, "published_at.desc,id.desc");
    }

    #[test]
    fn companies_url_orders_by_name() {
        let source = PostgrestSource::new(&settings()).expect("source");
        insta::assert_snapshot!(
            source.companies_url().expect("url").as_str(),
            @"https://demo.supabase.co/rest/v1/links?select=company&order=company.asc"
        );
    }

    #[test]
    fn base_path_is_preserved() {
        let mut settings = settings();
        settings.url = Some(Url::parse("https://proxy.example.com/supabase").expect("url"));
        let source = PostgrestSource::new(&settings).expect("source");

        assert!(
            source
                .companies_url()
                .expect("url")
                .as_str()
                .starts_with("https://proxy.example.com/supabase/rest/v1/links?")
        );
    }

    #[test]
    fn missing_credentials_are_configuration_errors() {
        let mut settings = settings();
        settings.api_key = None;
        assert!(matches!(
            PostgrestSource::new(&settings),
            Err(InfraError::Configuration { .. })
        ));
    }

    #[test]
    fn unusable_credentials_and_urls_are_rejected() {
        let mut bad_key = settings();
        bad_key.api_key = Some("anon\nkey".to_string());
        assert!(matches!(
            PostgrestSource::new(&bad_key),
            Err(InfraError::InvalidApiKey)
        ));

        let opaque = Url::parse("data:text/plain,hello").expect("url");
        assert!(matches!(
            rest_base(&opaque),
            Err(InfraError::SourceUrl { .. })
        ));
    }

    #[test]
    fn total_count_is_read_from_content_range() {
        assert_eq!(parse_total_count(Some("0-11/25")).ok(), Some(25));
        assert_eq!(parse_total_count(Some("*/0")).ok(), Some(0));
        assert!(matches!(
            parse_total_count(Some("0-11/*")),
            Err(SourceError::MissingCount)
        ));
        assert!(matches!(
            parse_total_count(None),
            Err(SourceError::MissingCount)
        ));
        assert!(matches!(
            parse_total_count(Some("garbage")),
            Err(SourceError::Decode(_))
        ));
    }
}
