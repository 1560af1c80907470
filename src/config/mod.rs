//! Service settings. Sources are merged in order `config/default`, `taskdeck`,
//! `--config-file`, `TASKDECK__*` environment variables, then CLI flags, and the
//! merged raw values are validated once into [`Settings`].

use std::{net::SocketAddr, num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{
    CacheBackend, DEFAULT_MAX_BODY_BYTES, DEFAULT_OPERATION_TIMEOUT_MS, DEFAULT_REDIS_URL,
    DEFAULT_RESOURCE_TYPE, DEFAULT_TTL_SECS, DEFAULT_VERSION, MAX_TTL_SECS,
};

mod cli;

pub use cli::{
    BackendArg, CacheOverrides, CliArgs, Command, FlushCacheArgs, ServeArgs, ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "taskdeck";
const ENV_PREFIX: &str = "TASKDECK";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 1_000;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 1_000;

/// Validated settings; every field has been defaulted and range-checked.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
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
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub redis_url: String,
    pub ttl: Duration,
    pub operation_timeout: Duration,
    pub max_body_bytes: NonZeroUsize,
    pub default_version: String,
    pub resource_type: String,
}

/// Service-wide request ceiling applied in front of every route.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub window: Duration,
    pub max_requests: u32,
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

/// Merges every source for the parsed command line and validates the result.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::FlushCache(args)) => raw.apply_cache_overrides(&args.cache),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Parses the process arguments and loads settings for them.
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
    cache: RawCacheSettings,
    rate_limit: RawRateLimitSettings,
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
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(limit) = overrides.cache_max_body_bytes {
            self.cache.max_body_bytes = Some(limit);
        }
        if let Some(enabled) = overrides.rate_limit_enabled {
            self.rate_limit.enabled = Some(enabled);
        }
        if let Some(max) = overrides.rate_limit_max_requests {
            self.rate_limit.max_requests = Some(max);
        }

        self.apply_cache_overrides(&overrides.cache);
    }

    fn apply_cache_overrides(&mut self, overrides: &CacheOverrides) {
        if let Some(backend) = overrides.backend {
            self.cache.backend = Some(backend.as_str().to_string());
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(timeout) = overrides.operation_timeout_ms {
            self.cache.operation_timeout_ms = Some(timeout);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            rate_limit,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let rate_limit = build_rate_limit_settings(rate_limit)?;

        Ok(Self {
            server,
            logging,
            cache,
            rate_limit,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = non_empty(server.host).unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = positive("server.port", server.port.unwrap_or(DEFAULT_PORT))?;
    let addr: SocketAddr = format!("{host}:{port}").parse().map_err(|err| {
        LoadError::invalid("server.host", format!("`{host}:{port}` is not a socket address: {err}"))
    })?;
    let grace = positive(
        "server.graceful_shutdown_seconds",
        server
            .graceful_shutdown_seconds
            .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS),
    )?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(grace),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = non_empty(logging.level)
        .map(|level| {
            LevelFilter::from_str(&level).map_err(|err| {
                LoadError::invalid("logging.level", format!("`{level}` is not a level: {err}"))
            })
        })
        .transpose()?
        .unwrap_or(LevelFilter::INFO);

    let format = match logging.json {
        Some(true) => LogFormat::Json,
        Some(false) | None => LogFormat::Compact,
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend.as_deref().map(str::trim) {
        None | Some("redis") => CacheBackend::Redis,
        Some("memory") => CacheBackend::Memory,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("unknown backend `{other}`, expected `redis` or `memory`"),
            ));
        }
    };

    let redis_url = non_empty(cache.redis_url).unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());

    let ttl_seconds = positive(
        "cache.ttl_seconds",
        cache.ttl_seconds.unwrap_or(DEFAULT_TTL_SECS),
    )?;
    if ttl_seconds > MAX_TTL_SECS {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            format!("must not exceed {MAX_TTL_SECS} (30 days)"),
        ));
    }
    let timeout_ms = positive(
        "cache.operation_timeout_ms",
        cache
            .operation_timeout_ms
            .unwrap_or(DEFAULT_OPERATION_TIMEOUT_MS),
    )?;

    let max_body_bytes = match cache.max_body_bytes {
        None => NonZeroUsize::new(DEFAULT_MAX_BODY_BYTES),
        Some(limit) => usize::try_from(limit).ok().and_then(NonZeroUsize::new),
    }
    .ok_or_else(|| {
        LoadError::invalid(
            "cache.max_body_bytes",
            "must be between 1 and the platform's usize range",
        )
    })?;

    let default_version =
        non_empty(cache.default_version).unwrap_or_else(|| DEFAULT_VERSION.to_string());
    let resource_type =
        non_empty(cache.resource_type).unwrap_or_else(|| DEFAULT_RESOURCE_TYPE.to_string());
    for (key, value) in [
        ("cache.default_version", &default_version),
        ("cache.resource_type", &resource_type),
    ] {
        if value.contains(':') {
            return Err(LoadError::invalid(key, "must not contain `:`"));
        }
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        backend,
        redis_url,
        ttl: Duration::from_secs(ttl_seconds),
        operation_timeout: Duration::from_millis(timeout_ms),
        max_body_bytes,
        default_version,
        resource_type,
    })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let window_ms = positive(
        "rate_limit.window_ms",
        rate_limit
            .window_ms
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_MS),
    )?;
    let max_requests = positive(
        "rate_limit.max_requests",
        rate_limit
            .max_requests
            .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS),
    )?;

    Ok(RateLimitSettings {
        enabled: rate_limit.enabled.unwrap_or(true),
        window: Duration::from_millis(window_ms),
        max_requests,
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
struct RawCacheSettings {
    enabled: Option<bool>,
    backend: Option<String>,
    redis_url: Option<String>,
    ttl_seconds: Option<u64>,
    operation_timeout_ms: Option<u64>,
    max_body_bytes: Option<u64>,
    default_version: Option<String>,
    resource_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    enabled: Option<bool>,
    window_ms: Option<u64>,
    max_requests: Option<u32>,
}

/// Rejects zero, which is never a usable port, timeout, or expiry.
fn positive<T>(key: &'static str, value: T) -> Result<T, LoadError>
where
    T: PartialEq + Default,
{
    if value == T::default() {
        Err(LoadError::invalid(key, "must be greater than zero"))
    } else {
        Ok(value)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[cfg(test)]
mod tests;
