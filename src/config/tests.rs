use super::*;

#[test]
fn defaults_match_the_public_feed() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.feed.page_size.get(), 12);
    assert_eq!(settings.feed.search_scope, SearchScope::AllFields);
    assert!(settings.feed.prefetch);
    assert_eq!(settings.source.posts_table, "poasts");
    assert_eq!(settings.source.links_table, "links");
    assert_eq!(settings.source.logo_relation, "posts_company_fkey");
    assert!(settings.source.url.is_none());
    assert_eq!(settings.session.cookie_name, DEFAULT_COOKIE_NAME);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.feed.page_size = Some(20);

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        feed_page_size: Some(6),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.feed.page_size.get(), 6);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn source_url_must_be_http() {
    let mut raw = RawSettings::default();
    raw.source.url = Some("ftp://example.supabase.co".to_string());

    let err = Settings::from_raw(raw).expect_err("ftp is rejected");
    assert!(matches!(err, LoadError::Invalid { key: "source.url", .. }));
}

#[test]
fn blank_credentials_are_treated_as_missing() {
    let mut raw = RawSettings::default();
    raw.source.url = Some("https://demo.supabase.co".to_string());
    raw.source.api_key = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.source.url.as_ref().map(Url::as_str),
        Some("https://demo.supabase.co/")
    );
    assert!(settings.source.api_key.is_none());
}

#[test]
fn zero_page_size_is_rejected() {
    let mut raw = RawSettings::default();
    raw.feed.page_size = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero page size");
    assert!(matches!(err, LoadError::Invalid { key: "feed.page_size", .. }));
}

#[test]
fn unknown_search_scope_is_rejected() {
    let mut raw = RawSettings::default();
    raw.feed.search_scope = Some("everything".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn table_names_must_be_identifiers() {
    let mut raw = RawSettings::default();
    raw.source.posts_table = Some("poasts?select=*".to_string());

    let err = Settings::from_raw(raw).expect_err("query string in table name");
    assert!(matches!(err, LoadError::Invalid { key: "source.posts_table", .. }));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["engblogs"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "engblogs",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--source-url",
        "https://demo.supabase.co",
        "--feed-search-scope",
        "title_description",
        "--feed-prefetch",
        "false",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.source_url.as_deref(),
                Some("https://demo.supabase.co")
            );
            assert_eq!(
                serve.overrides.feed_search_scope.as_deref(),
                Some("title_description")
            );
            assert_eq!(serve.overrides.feed_prefetch, Some(false));
        }
    }
}
