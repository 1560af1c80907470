use std::{future::IntoFuture, process, sync::Arc};

use taskdeck::{
    application::{
        error::{AppError, error_chain},
        tasks::TaskService,
    },
    cache::{CacheBackend, CacheConfig, CacheState, CacheStore, MemoryStore, RedisStore},
    config,
    infra::{
        db::InMemoryTasks,
        error::InfraError,
        http::{self, ApiState, HttpState, RateLimiter},
        telemetry,
    },
};
use tokio::sync::Notify;
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
    let chain = error_chain(error);
    let emit = || error!(error = %error, chain = ?chain, "taskdeck exited with an error");

    if dispatcher::has_been_set() {
        emit();
        return;
    }

    // Failed before telemetry was installed.
    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    dispatcher::with_default(&Dispatch::new(subscriber), emit);
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
        config::Command::FlushCache(_) => run_flush_cache(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let store = connect_store(&cache_config).await?;

    let cache = if cache_config.enabled {
        Some(CacheState::new(cache_config, store.clone()))
    } else {
        info!(target = "taskdeck::cache", "response cache disabled");
        None
    };

    let limits = &settings.rate_limit;
    let rate_limit = if limits.enabled {
        Some(RateLimiter::new(limits.window, limits.max_requests))
    } else {
        info!(target = "taskdeck::http", "rate limit disabled");
        None
    };

    let tasks = Arc::new(TaskService::new(Arc::new(InMemoryTasks::new())));
    let state = HttpState {
        api: ApiState { tasks },
        store,
        cache,
        rate_limit,
    };

    serve_http(&settings, state).await
}

async fn run_flush_cache(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let store = connect_store(&cache_config).await?;

    store
        .clear()
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "taskdeck::cache",
        backend = ?cache_config.backend,
        "cache store flushed"
    );
    Ok(())
}

async fn connect_store(cache: &CacheConfig) -> Result<Arc<dyn CacheStore>, AppError> {
    match cache.backend {
        CacheBackend::Redis => {
            let store = RedisStore::connect(&cache.redis_url, cache.operation_timeout)
                .await
                .map_err(|err| AppError::from(InfraError::from(err)))?;
            info!(
                target = "taskdeck::cache",
                timeout_ms = cache.operation_timeout.as_millis() as u64,
                "connected to redis cache store"
            );
            Ok(Arc::new(store))
        }
        CacheBackend::Memory => {
            info!(target = "taskdeck::cache", "using in-process cache store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let stop = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown({
        let stop = stop.clone();
        async move { stop.notified().await }
    });
    let mut server = tokio::spawn(server.into_future());

    tokio::select! {
        result = &mut server => return server_result(result),
        () = shutdown_signal() => {}
    }

    info!(
        grace_secs = settings.server.graceful_shutdown.as_secs(),
        "shutdown signal received, draining connections"
    );
    stop.notify_one();

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => server_result(result),
        Err(_) => {
            warn!("graceful shutdown timed out, dropping open connections");
            Ok(())
        }
    }
}

fn server_result(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
