use std::{process, sync::Arc, time::Duration};

use engblogs::{
    application::{
        error::AppError,
        feed::{FeedOptions, FeedService},
        repos::PostSource,
    },
    config,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        postgrest::PostgrestSource,
        telemetry,
    },
};
use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let source: Arc<dyn PostSource> = Arc::new(PostgrestSource::new(&settings.source)?);
    let feed = FeedService::new(source, FeedOptions::from(&settings));
    let state = HttpState::new(feed, &settings.session);
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "engblogs::serve",
        addr = %settings.server.addr,
        page_size = settings.feed.page_size.get(),
        search_scope = %settings.feed.search_scope,
        prefetch = settings.feed.prefetch,
        "Listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!(target = "engblogs::serve", "Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C, then arm a hard deadline for in-flight requests.
async fn shutdown_signal(grace: Duration) {
    if let Err(err) = signal::ctrl_c().await {
        warn!(target = "engblogs::serve", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    info!(
        target = "engblogs::serve",
        grace_seconds = grace.as_secs(),
        "Shutdown requested; draining connections"
    );
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(target = "engblogs::serve", "Graceful shutdown timed out");
        process::exit(1);
    });
}
