//! Translation of the viewed feed slice into a single remote read.
//!
//! Results are always ordered newest first with the row id as tie-break so that
//! consecutive ranges never overlap or skip rows sharing a publication date.

use std::{fmt, num::NonZeroU32, str::FromStr};

use crate::domain::entities::PostRecord;
use crate::domain::feed::{self, FeedCriteria, PageIndex};

pub const ORDERING: &str = "published_at.desc,id.desc";

/// Columns a search term is matched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchScope {
    #[default]
    AllFields,
    TitleDescription,
}

impl SearchScope {
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            SearchScope::AllFields => &["title", "description", "summary", "company"],
            SearchScope::TitleDescription => &["title", "description"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchScope::AllFields => "all_fields",
            SearchScope::TitleDescription => "title_description",
        }
    }

    fn column_value<'a>(column: &str, post: &'a PostRecord) -> Option<&'a str> {
        match column {
            "title" => Some(&post.title),
            "description" => Some(&post.description),
            "summary" => Some(&post.summary),
            "company" => Some(&post.company),
            _ => None,
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all_fields" | "all" => Ok(SearchScope::AllFields),
            "title_description" => Ok(SearchScope::TitleDescription),
            other => Err(format!(
                "unknown search scope `{other}` (expected all_fields|title_description)"
            )),
        }
    }
}

/// A filtered, sorted, ranged read of the posts table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub page: PageIndex,
    pub page_size: NonZeroU32,
    pub criteria: FeedCriteria,
    pub scope: SearchScope,
}

impl FeedQuery {
    pub fn new(
        page: PageIndex,
        page_size: NonZeroU32,
        criteria: FeedCriteria,
        scope: SearchScope,
    ) -> Self {
        Self {
            page,
            page_size,
            criteria,
            scope,
        }
    }

    /// Inclusive row range `[first, last]` covered by the page.
    pub fn row_range(&self) -> (u64, u64) {
        (
            self.page.first_row(self.page_size),
            self.page.last_row(self.page_size),
        )
    }

    pub fn total_pages(&self, total_count: u64) -> u32 {
        feed::total_pages(total_count, self.page_size)
    }

    /// Whether a row belongs to the result set, ignoring the range.
    pub fn matches(&self, post: &PostRecord) -> bool {
        let filters = &self.criteria.filters;
        if !filters.is_empty() && !filters.contains(&post.company) {
            return false;
        }

        let term = self.criteria.search.as_str();
        if term.is_empty() {
            return true;
        }

        let needle: Vec<char> = term.to_lowercase().chars().collect();
        self.scope.columns().iter().any(|column| {
            SearchScope::column_value(column, post)
                .is_some_and(|value| contains_term(&value.to_lowercase(), &needle))
        })
    }

    /// PostgREST query parameters, excluding `select`.
    pub fn filter_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("order", ORDERING.to_string())];

        if !self.criteria.filters.is_empty() {
            let members = self
                .criteria
                .filters
                .iter()
                .map(quote_value)
                .collect::<Vec<_>>()
                .join(",");
            params.push(("company", format!("in.({members})")));
        }

        if !self.criteria.search.is_empty() {
            let pattern = quote_value(&format!(
                "%{}%",
                escape_like(self.criteria.search.as_str())
            ));
            let clauses = self
                .scope
                .columns()
                .iter()
                .map(|column| format!("{column}.ilike.{pattern}"))
                .collect::<Vec<_>>()
                .join(",");
            params.push(("or", format!("({clauses})")));
        }

        let (first, _) = self.row_range();
        params.push(("offset", first.to_string()));
        params.push(("limit", self.page_size.get().to_string()));
        params
    }
}

/// Escape LIKE metacharacters so the term matches literally.
///
/// PostgREST rewrites `*` to `%` inside like patterns and offers no escape for
/// it, so `*` is sent as `_` and stands for exactly one character.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        match ch {
            '\\' | '%' | '_' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '*' => escaped.push('_'),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Substring test where `*` in the needle matches any single character.
fn contains_term(haystack: &str, needle: &[char]) -> bool {
    let haystack: Vec<char> = haystack.chars().collect();
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|window| {
        window
            .iter()
            .zip(needle)
            .all(|(have, want)| *want == '*' || have == want)
    })
}

/// Double-quote a filter value so reserved characters (`,.:()`) are taken literally.
fn quote_value(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if matches!(ch, '\\' | '"') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feed::{DEFAULT_PAGE_SIZE, FilterSet, SearchTerm};
    use time::macros::date;

    fn post(id: i64, company: &str, title: &str) -> PostRecord {
        PostRecord {
            id,
            title: title.to_string(),
            published_at: date!(2024 - 01 - 01),
            link: format!("https://example.com/{id}"),
            summary: String::new(),
            company: company.to_string(),
            description: String::new(),
            logo: None,
        }
    }

    fn query(filters: &[&str], term: &str) -> FeedQuery {
        FeedQuery::new(
            PageIndex::FIRST,
            DEFAULT_PAGE_SIZE,
            FeedCriteria::new(FilterSet::new(filters.iter().copied()), SearchTerm::new(term)),
            SearchScope::AllFields,
        )
    }

    #[test]
    fn unfiltered_query_only_orders_and_ranges() {
        let mut q = query(&[], "");
        q.page = PageIndex::new(2);

        assert_eq!(
            q.filter_params(),
            vec![
                ("order", "published_at.desc,id.desc".to_string()),
                ("offset", "24".to_string()),
                ("limit", "12".to_string()),
            ]
        );
        assert_eq!(q.row_range(), (24, 35));
    }

    #[test]
    fn company_filter_restricts_to_members() {
        let q = query(&["Stripe", "Acme"], "");
        let params = q.filter_params();

        assert!(params.contains(&("company", r#"in.("Acme","Stripe")"#.to_string())));
        assert!(q.matches(&post(1, "Acme", "x")));
        assert!(!q.matches(&post(2, "Globex", "x")));
    }

    #[test]
    fn search_covers_all_four_columns() {
        let q = query(&[], "launch");
        let params = q.filter_params();

        assert!(params.contains(&(
            "or",
            r#"(title.ilike."%launch%",description.ilike."%launch%",summary.ilike."%launch%",company.ilike."%launch%")"#
                .to_string()
        )));

        let mut by_summary = post(1, "Acme", "Unrelated");
        by_summary.summary = "We LAUNCHED a thing".to_string();
        assert!(q.matches(&by_summary));
        assert!(q.matches(&post(2, "LaunchDarkly", "Flags")));
        assert!(!q.matches(&post(3, "Acme", "Nothing here")));
    }

    #[test]
    fn narrow_scope_ignores_summary_and_company() {
        let mut q = query(&[], "launch");
        q.scope = SearchScope::TitleDescription;

        assert!(!q.matches(&post(2, "LaunchDarkly", "Flags")));
        assert!(q.matches(&post(3, "Acme", "Launch week")));
    }

    #[test]
    fn search_term_is_escaped_and_quoted() {
        let q = query(&[], r#"50%_off "now""#);
        let or = q
            .filter_params()
            .into_iter()
            .find(|(key, _)| *key == "or")
            .map(|(_, value)| value)
            .expect("or clause present");

        assert!(or.starts_with(r#"(title.ilike."%50\\%\\_off \"now\"%","#));
    }

    #[test]
    fn star_is_a_single_character_on_both_paths() {
        let q = query(&[], "a*c");
        let or = q
            .filter_params()
            .into_iter()
            .find(|(key, _)| *key == "or")
            .map(|(_, value)| value)
            .expect("or clause present");

        assert!(or.starts_with(r#"(title.ilike."%a_c%","#));
        assert!(!or.contains('*'));

        assert!(q.matches(&post(1, "Acme", "abc")));
        assert!(q.matches(&post(2, "Acme", "a*c")));
        assert!(!q.matches(&post(3, "Acme", "a long way to c")));
    }

    #[test]
    fn search_scope_parses_config_values() {
        assert_eq!(
            "title_description".parse::<SearchScope>(),
            Ok(SearchScope::TitleDescription)
        );
        assert_eq!("ALL".parse::<SearchScope>(), Ok(SearchScope::AllFields));
        assert!("everything".parse::<SearchScope>().is_err());
    }
}
