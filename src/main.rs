use std::{future::IntoFuture, process, sync::Arc};

use axum::http::HeaderName;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use yatube::{
    application::{error::AppError, groups::GroupService, repos::UsersRepo},
    cache::FeedCache,
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AuthState, HeaderAuthenticator, HttpState, RouterState},
        memory::InMemoryRepositories,
        telemetry,
    },
};

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
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::CreateGroup(args) => run_create_group(settings, args).await,
    }
}

async fn connect_postgres(
    settings: &config::Settings,
    database_url: &str,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn require_database_url(settings: &config::Settings) -> Result<&str, AppError> {
    settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let page_size = settings.feed.page_size.get();

    let (http_state, users) = match settings.database.url.as_deref() {
        Some(url) => {
            let store = connect_postgres(&settings, url).await?;
            let users: Arc<dyn UsersRepo> = store.clone();
            (HttpState::from_store(store, page_size), users)
        }
        None => {
            warn!("no database url configured; serving from the in-process store");
            let store = Arc::new(InMemoryRepositories::new());
            let users: Arc<dyn UsersRepo> = store.clone();
            (HttpState::from_store(store, page_size), users)
        }
    };

    let header = HeaderName::from_bytes(settings.auth.user_header.to_ascii_lowercase().as_bytes())
        .map_err(|err| {
            AppError::from(InfraError::configuration(format!(
                "auth.user_header `{}` is not a valid header name: {err}",
                settings.auth.user_header
            )))
        })?;
    let authenticator = Arc::new(HeaderAuthenticator::new(header, users));

    let router_state = RouterState {
        http: http_state,
        auth: AuthState::new(authenticator, settings.auth.login_url.as_str()),
        cache: FeedCache::new(settings.feed.index_cache_ttl),
    };

    serve_http(&settings, router_state).await
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let database_url = require_database_url(&settings)?;
    connect_postgres(&settings, database_url).await?;
    info!(target: "yatube::migrate", "Migrations applied");
    Ok(())
}

async fn run_create_group(
    settings: config::Settings,
    args: config::CreateGroupArgs,
) -> Result<(), AppError> {
    let database_url = require_database_url(&settings)?;
    let store = connect_postgres(&settings, database_url).await?;
    let groups = GroupService::new(store);

    let group = groups
        .create_group(&args.title, args.slug.as_deref(), &args.description)
        .await?;
    info!(
        target: "yatube::create_group",
        group_id = group.id,
        slug = %group.slug,
        "Group created"
    );
    Ok(())
}

async fn serve_http(settings: &config::Settings, state: RouterState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let grace = settings.server.graceful_shutdown;
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(());
    });

    let drain_deadline = async {
        if stop_rx.await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server.into_future() => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = drain_deadline => {
            warn!(grace_secs = grace.as_secs(), "graceful shutdown timed out; dropping connections");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
