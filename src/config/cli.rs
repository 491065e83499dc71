use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the engblogs binary.
#[derive(Debug, Parser)]
#[command(name = "engblogs", version, about = "Engineering blog feed reader")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ENGBLOGS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP reader.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Base URL of the hosted data service.
    #[arg(long = "source-url", env = "SUPABASE_URL", value_name = "URL")]
    pub source_url: Option<String>,

    /// Public (anon) key of the hosted data service.
    #[arg(
        long = "source-api-key",
        env = "SUPABASE_KEY",
        value_name = "KEY",
        hide_env_values = true
    )]
    pub source_api_key: Option<String>,

    /// Override the remote request timeout.
    #[arg(long = "source-timeout-seconds", value_name = "SECONDS")]
    pub source_timeout_seconds: Option<u64>,

    /// Override the number of posts per page.
    #[arg(long = "feed-page-size", value_name = "COUNT")]
    pub feed_page_size: Option<u32>,

    /// Columns searched by the search box (all_fields|title_description).
    #[arg(long = "feed-search-scope", value_name = "SCOPE")]
    pub feed_search_scope: Option<String>,

    /// Toggle warming of neighbouring pages.
    #[arg(
        long = "feed-prefetch",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub feed_prefetch: Option<bool>,

    /// Override the maximum number of live browsing sessions.
    #[arg(long = "session-max-sessions", value_name = "COUNT")]
    pub session_max_sessions: Option<u64>,
}
