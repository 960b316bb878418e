use std::{process, sync::Arc, time::Duration};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vitrine::{
    application::{
        cache::ProductCache,
        error::AppError,
        jobs::{
            ArtifactStore, ImageFetcher, ImagePipeline, JobWorkerContext, PipelineSettings,
            RetryConfig, process_compress_image_job,
        },
        products::ProductService,
        repos::{JobsRepo, ProductsRepo, ProductsWriteRepo},
    },
    config,
    domain::types::JobType,
    infra::{
        artifacts::ArtifactStorage,
        cache::{MemoryProductCache, RedisProductCache},
        db::PostgresRepositories,
        error::InfraError,
        fetch::HttpImageFetcher,
        http::{self, ApiState, DatabaseHealth},
        telemetry,
    },
};

const SOURCE: &str = "vitrine::main";

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
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let database_url = database_url(&settings)?;
    let pool = PostgresRepositories::connect(database_url, 1)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    info!(target = SOURCE, "migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (http_repositories, job_repositories) = init_repositories(&settings).await?;
    let cache = build_cache(&settings.cache).await?;

    let artifacts = Arc::new(
        ArtifactStorage::new(settings.artifacts.directory.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );
    let fetcher = Arc::new(
        HttpImageFetcher::new(
            settings.fetch.timeout,
            settings.fetch.max_body_bytes.get(),
            &settings.fetch.user_agent,
        )
        .map_err(AppError::from)?,
    );

    let products_repo: Arc<dyn ProductsRepo> = http_repositories.clone();
    let products_write_repo: Arc<dyn ProductsWriteRepo> = http_repositories.clone();
    let jobs_repo: Arc<dyn JobsRepo> = http_repositories.clone();
    let db_health: Arc<dyn DatabaseHealth> = http_repositories.clone();

    let product_service = Arc::new(ProductService::new(
        products_repo,
        products_write_repo,
        jobs_repo.clone(),
        cache.clone(),
    ));

    let worker_reader: Arc<dyn ProductsRepo> = job_repositories.clone();
    let worker_writer: Arc<dyn ProductsWriteRepo> = job_repositories.clone();
    let artifact_store: Arc<dyn ArtifactStore> = artifacts.clone();
    let image_fetcher: Arc<dyn ImageFetcher> = fetcher;
    let pipeline = Arc::new(ImagePipeline::new(
        worker_reader,
        worker_writer,
        cache,
        image_fetcher,
        artifact_store,
        PipelineSettings {
            retry: RetryConfig {
                max_retries: settings.jobs.retry_attempts,
                initial_backoff: settings.jobs.initial_backoff,
                max_backoff: settings.jobs.max_backoff,
                backoff_multiplier: 2.0,
                jitter: true,
            },
            max_pixels: settings.fetch.max_pixels.get(),
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_handle = spawn_job_monitor(
        &job_repositories,
        JobWorkerContext::new(pipeline),
        &settings,
        shutdown_rx,
    );

    let api_state = ApiState {
        products: product_service,
        jobs: jobs_repo,
        artifacts,
        db: db_health,
    };

    let result = serve_http(&settings, api_state, shutdown_tx).await;

    // Workers get the same grace period as HTTP connections to finish in-flight jobs.
    let grace = settings.server.graceful_shutdown + Duration::from_secs(1);
    let abort = monitor_handle.abort_handle();
    if tokio::time::timeout(grace, monitor_handle).await.is_err() {
        warn!(target = SOURCE, "job monitor did not stop in time; aborting");
        abort.abort();
    }

    result
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
) -> Result<(Arc<PostgresRepositories>, Arc<PostgresRepositories>), AppError> {
    let database_url = database_url(settings)?;

    let http_pool =
        PostgresRepositories::connect(database_url, settings.database.http_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&http_pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let jobs_pool =
        PostgresRepositories::connect(database_url, settings.database.jobs_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok((
        Arc::new(PostgresRepositories::new(http_pool)),
        Arc::new(PostgresRepositories::new(jobs_pool)),
    ))
}

async fn build_cache(settings: &config::CacheSettings) -> Result<Arc<dyn ProductCache>, AppError> {
    match settings {
        config::CacheSettings::Memory { capacity } => {
            info!(
                target = SOURCE,
                backend = "memory",
                capacity = capacity.get(),
                "product cache ready"
            );
            Ok(Arc::new(MemoryProductCache::new(*capacity)))
        }
        config::CacheSettings::Redis { url, key_prefix } => {
            let cache = RedisProductCache::connect(url, key_prefix.clone())
                .await
                .map_err(|err| AppError::from(InfraError::cache(err.to_string())))?;
            info!(target = SOURCE, backend = "redis", "product cache ready");
            Ok(Arc::new(cache))
        }
    }
}

fn spawn_job_monitor(
    repositories: &PostgresRepositories,
    context: JobWorkerContext,
    settings: &config::Settings,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let compress_storage = PostgresStorage::new_with_config(
        repositories.pool().clone(),
        ApalisSqlConfig::new(JobType::CompressImage.as_str()),
    );

    let compress_concurrency = settings.jobs.compress_image_concurrency.get() as usize;

    let compress_worker = WorkerBuilder::new("compress-image-worker")
        .concurrency(compress_concurrency)
        .data(context)
        .backend(compress_storage)
        .build_fn(process_compress_image_job);

    let monitor = Monitor::new()
        .register(compress_worker)
        .shutdown_timeout(settings.server.graceful_shutdown);

    tokio::spawn(async move {
        let signal = async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
            Ok::<(), std::io::Error>(())
        };
        if let Err(err) = monitor.run_with_signal(signal).await {
            error!(error = %err, "job monitor stopped");
        }
    })
}

async fn serve_http(
    settings: &config::Settings,
    api_state: ApiState,
    shutdown_tx: watch::Sender<bool>,
) -> Result<(), AppError> {
    let router = http::build_router(api_state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(target = SOURCE, addr = %settings.server.addr, "listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!(target = SOURCE, "shutdown requested; draining");
            let _ = shutdown_tx.send(true);
        })
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = SOURCE, error = %err, "failed to listen for ctrl-c");
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
                warn!(target = SOURCE, error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
