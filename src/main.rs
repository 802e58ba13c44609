use std::{process, sync::Arc, time::Duration};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use feedline::{
    application::{
        error::AppError,
        jobs::{FanOutContext, LocalFanOutQueue, LocalQueueOptions, process_fan_out_job},
    },
    cache::{CacheConfig, CacheLayer, ObjectCache},
    config::{self, StorageBackend},
    domain::types::JobType,
    infra::{
        db::{
            PostgresAuthorLocks, PostgresCacheBroadcast, PostgresFanOutQueue,
            PostgresRepositories, spawn_cache_listener,
        },
        error::InfraError,
        http::{self, HttpState},
        memory::InMemoryRepositories,
        telemetry,
    },
};
use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

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
        config::Command::Worker(_) => run_worker(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache = build_cache(&settings.cache);
    info!(
        target = "feedline::bootstrap",
        backend = settings.storage.backend.as_str(),
        cache = cache.is_some(),
        "starting server"
    );

    match settings.storage.backend {
        StorageBackend::Memory => {
            let repositories = Arc::new(InMemoryRepositories::new());
            let context = FanOutContext::new(
                repositories.clone(),
                repositories.clone(),
                repositories.clone(),
            );
            let (queue, workers) = LocalFanOutQueue::spawn(context, local_queue_options(&settings));

            let state = HttpState::from_stores(
                repositories.clone(),
                repositories.clone(),
                repositories.clone(),
                repositories,
                Arc::new(queue.clone()),
                cache.map(CacheLayer::local),
            );
            let result = serve_http(&settings, state).await;

            drain_local_queue(&queue, settings.server.graceful_shutdown).await;
            for worker in workers {
                worker.abort();
            }
            result
        }
        StorageBackend::Postgres => {
            let repositories = init_repositories(&settings).await?;
            let (cache, listener_handle) = match cache {
                Some(store) => {
                    let (layer, handle) = shared_cache(&repositories, store).await?;
                    (Some(layer), Some(handle))
                }
                None => (None, None),
            };
            let context = postgres_fan_out_context(&settings, &repositories).await?;
            let monitor_handle = spawn_job_monitor(&repositories, context, &settings.jobs);

            let queue = PostgresFanOutQueue::new(
                repositories.as_ref().clone(),
                settings.jobs.max_attempts.get(),
            );
            let state = HttpState::from_stores(
                repositories.clone(),
                repositories.clone(),
                repositories.clone(),
                repositories,
                Arc::new(queue),
                cache,
            );
            let result = serve_http(&settings, state).await;

            if let Some(handle) = listener_handle {
                handle.abort();
            }
            monitor_handle.abort();
            let _ = monitor_handle.await;
            result
        }
    }
}

async fn run_worker(settings: config::Settings) -> Result<(), AppError> {
    if settings.storage.backend != StorageBackend::Postgres {
        return Err(AppError::from(InfraError::configuration(
            "worker mode requires storage.backend = postgres",
        )));
    }

    let repositories = init_repositories(&settings).await?;
    let context = postgres_fan_out_context(&settings, &repositories).await?;
    let monitor_handle = spawn_job_monitor(&repositories, context, &settings.jobs);
    info!(
        target = "feedline::bootstrap",
        concurrency = settings.jobs.fan_out_concurrency.get(),
        "fan-out worker running"
    );

    shutdown_signal().await;

    monitor_handle.abort();
    let _ = monitor_handle.await;
    Ok(())
}

fn build_cache(settings: &config::CacheSettings) -> Option<Arc<ObjectCache>> {
    let config = CacheConfig::from(settings);
    config
        .is_enabled()
        .then(|| Arc::new(ObjectCache::new(&config)))
}

fn local_queue_options(settings: &config::Settings) -> LocalQueueOptions {
    LocalQueueOptions {
        concurrency: settings.jobs.fan_out_concurrency.get() as usize,
        max_attempts: settings.jobs.max_attempts.get(),
        retry_backoff: settings.jobs.retry_backoff,
    }
}

async fn drain_local_queue(queue: &LocalFanOutQueue, grace: Duration) {
    if tokio::time::timeout(grace, queue.wait_idle()).await.is_err() {
        warn!(
            target = "feedline::bootstrap",
            pending = queue.pending(),
            "fan-out queue not drained before shutdown"
        );
    }
}

fn database_url(settings: &config::Settings) -> Result<&str, AppError> {
    settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = database_url(settings)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

/// Fan-out context whose author locks are shared with every other process
/// on the database. Held locks live on a pool of their own, one connection
/// per concurrent job.
async fn postgres_fan_out_context(
    settings: &config::Settings,
    repositories: &Arc<PostgresRepositories>,
) -> Result<FanOutContext, AppError> {
    let lock_pool = PostgresRepositories::connect(
        database_url(settings)?,
        settings.jobs.fan_out_concurrency.get(),
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(FanOutContext::new(
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
    )
    .with_locks(Arc::new(PostgresAuthorLocks::new(lock_pool))))
}

/// Attach cross-process invalidation to `store`.
async fn shared_cache(
    repositories: &PostgresRepositories,
    store: Arc<ObjectCache>,
) -> Result<(CacheLayer, JoinHandle<()>), AppError> {
    let origin = Uuid::new_v4().to_string();
    let handle = spawn_cache_listener(repositories.pool(), store.clone(), origin.clone())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    info!(target = "feedline::bootstrap", origin = %origin, "cache invalidation listener running");

    let broadcast = PostgresCacheBroadcast::new(repositories.pool().clone(), origin);
    Ok((
        CacheLayer::local(store).with_broadcast(Arc::new(broadcast)),
        handle,
    ))
}

fn spawn_job_monitor(
    repositories: &PostgresRepositories,
    context: FanOutContext,
    jobs: &config::JobsSettings,
) -> JoinHandle<()> {
    let fan_out_storage = PostgresStorage::new_with_config(
        repositories.pool().clone(),
        ApalisSqlConfig::new(JobType::FanOut.as_str()),
    );

    let fan_out_worker = WorkerBuilder::new("fan-out-worker")
        .concurrency(jobs.fan_out_concurrency.get() as usize)
        .data(context)
        .backend(fan_out_storage)
        .build_fn(process_fan_out_job);

    let monitor = Monitor::new().register(fan_out_worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    })
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let addr = settings.server.addr;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(addr, err)))?;
    info!(target = "feedline::bootstrap", addr = %addr, "listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "feedline::bootstrap", "shutdown requested");
}
