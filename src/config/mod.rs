//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::query::SearchScope;
use crate::domain::feed::DEFAULT_PAGE_SIZE;

mod cli;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "engblogs";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POSTS_TABLE: &str = "poasts";
const DEFAULT_LINKS_TABLE: &str = "links";
const DEFAULT_LOGO_RELATION: &str = "posts_company_fkey";
const DEFAULT_COOKIE_NAME: &str = "engblogs_session";
const DEFAULT_MAX_SESSIONS: u64 = 10_000;
const DEFAULT_IDLE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_COMPANIES_TTL_SECS: u64 = 5 * 60;
const MAX_PAGE_SIZE: u32 = 100;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub source: SourceSettings,
    pub feed: FeedSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Connection details for the hosted posts table.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Base project URL; `/rest/v1/` is appended by the client.
    pub url: Option<Url>,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub posts_table: String,
    pub links_table: String,
    /// Foreign-key name used to embed the company logo in post rows.
    pub logo_relation: String,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub page_size: NonZeroU32,
    pub search_scope: SearchScope,
    pub prefetch: bool,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub max_sessions: NonZeroUsize,
    pub idle_ttl: Duration,
    pub companies_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("ENGBLOGS").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    source: RawSourceSettings,
    feed: RawFeedSettings,
    session: RawSessionSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.source_url.as_ref() {
            self.source.url = Some(url.clone());
        }
        if let Some(key) = overrides.source_api_key.as_ref() {
            self.source.api_key = Some(key.clone());
        }
        if let Some(seconds) = overrides.source_timeout_seconds {
            self.source.timeout_seconds = Some(seconds);
        }
        if let Some(size) = overrides.feed_page_size {
            self.feed.page_size = Some(size);
        }
        if let Some(scope) = overrides.feed_search_scope.as_ref() {
            self.feed.search_scope = Some(scope.clone());
        }
        if let Some(prefetch) = overrides.feed_prefetch {
            self.feed.prefetch = Some(prefetch);
        }
        if let Some(max) = overrides.session_max_sessions {
            self.session.max_sessions = Some(max);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            source,
            feed,
            session,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            source: build_source_settings(source)?,
            feed: build_feed_settings(feed)?,
            session: build_session_settings(session)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    let graceful_shutdown = positive_seconds(graceful_secs, "server.graceful_shutdown_seconds")?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_source_settings(source: RawSourceSettings) -> Result<SourceSettings, LoadError> {
    let url = match non_blank(source.url) {
        Some(value) => {
            let parsed = Url::parse(&value)
                .map_err(|err| LoadError::invalid("source.url", format!("{value}: {err}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(LoadError::invalid(
                    "source.url",
                    "scheme must be http or https",
                ));
            }
            Some(parsed)
        }
        None => None,
    };

    let timeout = positive_seconds(
        source.timeout_seconds.unwrap_or(DEFAULT_SOURCE_TIMEOUT_SECS),
        "source.timeout_seconds",
    )?;

    Ok(SourceSettings {
        url,
        api_key: non_blank(source.api_key),
        timeout,
        posts_table: identifier(source.posts_table, DEFAULT_POSTS_TABLE, "source.posts_table")?,
        links_table: identifier(source.links_table, DEFAULT_LINKS_TABLE, "source.links_table")?,
        logo_relation: identifier(
            source.logo_relation,
            DEFAULT_LOGO_RELATION,
            "source.logo_relation",
        )?,
    })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let page_size = match feed.page_size {
        Some(size) if size > MAX_PAGE_SIZE => {
            return Err(LoadError::invalid(
                "feed.page_size",
                format!("must not exceed {MAX_PAGE_SIZE}"),
            ));
        }
        Some(size) => non_zero_u32(size.into(), "feed.page_size")?,
        None => DEFAULT_PAGE_SIZE,
    };

    let search_scope = match feed.search_scope {
        Some(raw) => SearchScope::from_str(&raw)
            .map_err(|reason| LoadError::invalid("feed.search_scope", reason))?,
        None => SearchScope::default(),
    };

    Ok(FeedSettings {
        page_size,
        search_scope,
        prefetch: feed.prefetch.unwrap_or(true),
    })
}

fn build_session_settings(session: RawSessionSettings) -> Result<SessionSettings, LoadError> {
    let cookie_name = non_blank(session.cookie_name)
        .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string());
    if !cookie_name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-'))
    {
        return Err(LoadError::invalid(
            "session.cookie_name",
            "only ASCII letters, digits, `_` and `-` are allowed",
        ));
    }

    let max_sessions_value = session.max_sessions.unwrap_or(DEFAULT_MAX_SESSIONS);
    let max_sessions = usize::try_from(max_sessions_value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| LoadError::invalid("session.max_sessions", "must be greater than zero"))?;

    Ok(SessionSettings {
        cookie_name,
        max_sessions,
        idle_ttl: positive_seconds(
            session.idle_ttl_seconds.unwrap_or(DEFAULT_IDLE_TTL_SECS),
            "session.idle_ttl_seconds",
        )?,
        companies_ttl: positive_seconds(
            session
                .companies_ttl_seconds
                .unwrap_or(DEFAULT_COMPANIES_TTL_SECS),
            "session.companies_ttl_seconds",
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSourceSettings {
    url: Option<String>,
    api_key: Option<String>,
    timeout_seconds: Option<u64>,
    posts_table: Option<String>,
    links_table: Option<String>,
    logo_relation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    page_size: Option<u32>,
    search_scope: Option<String>,
    prefetch: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    cookie_name: Option<String>,
    max_sessions: Option<u64>,
    idle_ttl_seconds: Option<u64>,
    companies_ttl_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Table and relation names end up in the request path and `select` clause.
fn identifier(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let name = non_blank(value).unwrap_or_else(|| default.to_string());
    if name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        Ok(name)
    } else {
        Err(LoadError::invalid(
            key,
            format!("`{name}` is not a valid identifier"),
        ))
    }
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
