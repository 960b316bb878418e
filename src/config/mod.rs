//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vitrine";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_HTTP_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_JOBS_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_MEMORY_CAPACITY: u64 = 1024;
const DEFAULT_CACHE_KEY_PREFIX: &str = "";
const DEFAULT_ARTIFACT_DIR: &str = "artifacts";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;
const DEFAULT_FETCH_MAX_BODY_BYTES: u64 = 20 * 1024 * 1024;
const DEFAULT_FETCH_MAX_PIXELS: u64 = 40_000_000;
const DEFAULT_FETCH_USER_AGENT: &str = concat!("vitrine/", env!("CARGO_PKG_VERSION"));
const DEFAULT_JOB_COMPRESS_IMAGE_CONCURRENCY: u32 = 4;
const DEFAULT_JOB_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_JOB_INITIAL_BACKOFF_MS: u64 = 200;
const DEFAULT_JOB_MAX_BACKOFF_MS: u64 = 5_000;

/// Command-line arguments for the vitrine binary.
#[derive(Debug, Parser)]
#[command(name = "vitrine", version, about = "Product catalog service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VITRINE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API and the image compression workers.
    Serve(Box<ServeArgs>),
    /// Apply database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
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

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the HTTP database pool size.
    #[arg(long = "database-http-max-connections", value_name = "COUNT")]
    pub database_http_max_connections: Option<u32>,

    /// Override the jobs database pool size.
    #[arg(long = "database-jobs-max-connections", value_name = "COUNT")]
    pub database_jobs_max_connections: Option<u32>,

    /// Override the cache backend (memory|redis).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the Redis connection URL.
    #[arg(long = "cache-redis-url", value_name = "URL")]
    pub cache_redis_url: Option<String>,

    /// Override the artifact directory.
    #[arg(long = "artifacts-directory", value_name = "PATH")]
    pub artifacts_directory: Option<PathBuf>,

    /// Override the image fetch timeout.
    #[arg(long = "fetch-timeout-seconds", value_name = "SECONDS")]
    pub fetch_timeout_seconds: Option<u64>,

    /// Override the compress-image worker concurrency.
    #[arg(long = "jobs-compress-image-concurrency", value_name = "COUNT")]
    pub jobs_compress_image_concurrency: Option<u32>,

    /// Override the number of retries for transient job failures.
    #[arg(long = "jobs-retry-attempts", value_name = "COUNT")]
    pub jobs_retry_attempts: Option<u32>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub artifacts: ArtifactSettings,
    pub fetch: FetchSettings,
    pub jobs: JobsSettings,
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

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub http_max_connections: NonZeroU32,
    pub jobs_max_connections: NonZeroU32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheSettings {
    Memory { capacity: NonZeroUsize },
    Redis { url: String, key_prefix: String },
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub max_body_bytes: NonZeroU64,
    pub max_pixels: NonZeroU64,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub compress_image_concurrency: NonZeroU32,
    pub retry_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
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

    builder = builder.add_source(Environment::with_prefix("VITRINE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    artifacts: RawArtifactSettings,
    fetch: RawFetchSettings,
    jobs: RawJobsSettings,
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
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_http_max_connections {
            self.database.http_max_connections = Some(max);
        }
        if let Some(max) = overrides.database_jobs_max_connections {
            self.database.jobs_max_connections = Some(max);
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.cache_redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(directory) = overrides.artifacts_directory.as_ref() {
            self.artifacts.directory = Some(directory.clone());
        }
        if let Some(seconds) = overrides.fetch_timeout_seconds {
            self.fetch.timeout_seconds = Some(seconds);
        }
        if let Some(value) = overrides.jobs_compress_image_concurrency {
            self.jobs.compress_image_concurrency = Some(value);
        }
        if let Some(value) = overrides.jobs_retry_attempts {
            self.jobs.retry_attempts = Some(value);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            artifacts,
            fetch,
            jobs,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            artifacts: build_artifact_settings(artifacts)?,
            fetch: build_fetch_settings(fetch)?,
            jobs: build_jobs_settings(jobs)?,
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
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);

    let http_value = database
        .http_max_connections
        .unwrap_or(DEFAULT_DB_HTTP_MAX_CONNECTIONS);
    let jobs_value = database
        .jobs_max_connections
        .unwrap_or(DEFAULT_DB_JOBS_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url,
        http_max_connections: non_zero_u32(http_value.into(), "database.http_max_connections")?,
        jobs_max_connections: non_zero_u32(jobs_value.into(), "database.jobs_max_connections")?,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let redis_url = non_blank(cache.redis_url);
    let backend = match non_blank(cache.backend) {
        Some(backend) => backend.to_ascii_lowercase(),
        None if redis_url.is_some() => "redis".to_string(),
        None => "memory".to_string(),
    };

    match backend.as_str() {
        "memory" => {
            let capacity = cache
                .memory_capacity
                .unwrap_or(DEFAULT_CACHE_MEMORY_CAPACITY);
            let capacity = usize::try_from(capacity)
                .ok()
                .and_then(NonZeroUsize::new)
                .ok_or_else(|| {
                    LoadError::invalid("cache.memory_capacity", "must be greater than zero")
                })?;
            Ok(CacheSettings::Memory { capacity })
        }
        "redis" => {
            let url = redis_url.ok_or_else(|| {
                LoadError::invalid("cache.redis_url", "required when the backend is `redis`")
            })?;
            let key_prefix = cache
                .key_prefix
                .unwrap_or_else(|| DEFAULT_CACHE_KEY_PREFIX.to_string());
            Ok(CacheSettings::Redis { url, key_prefix })
        }
        other => Err(LoadError::invalid(
            "cache.backend",
            format!("unknown backend `{other}` (expected `memory` or `redis`)"),
        )),
    }
}

fn build_artifact_settings(artifacts: RawArtifactSettings) -> Result<ArtifactSettings, LoadError> {
    let directory = artifacts
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "artifacts.directory",
            "path must not be empty",
        ));
    }

    Ok(ArtifactSettings { directory })
}

fn build_fetch_settings(fetch: RawFetchSettings) -> Result<FetchSettings, LoadError> {
    let timeout_secs = fetch.timeout_seconds.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "fetch.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let max_body_bytes_value = fetch.max_body_bytes.unwrap_or(DEFAULT_FETCH_MAX_BODY_BYTES);
    let max_body_bytes = NonZeroU64::new(max_body_bytes_value).ok_or_else(|| {
        LoadError::invalid("fetch.max_body_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_body_bytes_value).map_err(|_| {
        LoadError::invalid(
            "fetch.max_body_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    let max_pixels = NonZeroU64::new(fetch.max_pixels.unwrap_or(DEFAULT_FETCH_MAX_PIXELS))
        .ok_or_else(|| LoadError::invalid("fetch.max_pixels", "must be greater than zero"))?;

    let user_agent =
        non_blank(fetch.user_agent).unwrap_or_else(|| DEFAULT_FETCH_USER_AGENT.to_string());

    Ok(FetchSettings {
        timeout: Duration::from_secs(timeout_secs),
        max_body_bytes,
        max_pixels,
        user_agent,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let concurrency = jobs
        .compress_image_concurrency
        .unwrap_or(DEFAULT_JOB_COMPRESS_IMAGE_CONCURRENCY);

    let initial_ms = jobs
        .initial_backoff_ms
        .unwrap_or(DEFAULT_JOB_INITIAL_BACKOFF_MS);
    if initial_ms == 0 {
        return Err(LoadError::invalid(
            "jobs.initial_backoff_ms",
            "must be greater than zero",
        ));
    }

    let max_ms = jobs.max_backoff_ms.unwrap_or(DEFAULT_JOB_MAX_BACKOFF_MS);
    if max_ms < initial_ms {
        return Err(LoadError::invalid(
            "jobs.max_backoff_ms",
            "must not be smaller than jobs.initial_backoff_ms",
        ));
    }

    Ok(JobsSettings {
        compress_image_concurrency: non_zero_u32(
            concurrency.into(),
            "jobs.compress_image_concurrency",
        )?,
        retry_attempts: jobs.retry_attempts.unwrap_or(DEFAULT_JOB_RETRY_ATTEMPTS),
        initial_backoff: Duration::from_millis(initial_ms),
        max_backoff: Duration::from_millis(max_ms),
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
struct RawDatabaseSettings {
    url: Option<String>,
    http_max_connections: Option<u32>,
    jobs_max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    redis_url: Option<String>,
    key_prefix: Option<String>,
    memory_capacity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawArtifactSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFetchSettings {
    timeout_seconds: Option<u64>,
    max_body_bytes: Option<u64>,
    max_pixels: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    compress_image_concurrency: Option<u32>,
    retry_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
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

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
